//! Domain model module declarations.

pub mod exit_code;
pub mod session;
