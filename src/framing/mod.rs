//! Framing of the child's stdout.
//!
//! The child's stdout carries program output interleaved with completion
//! markers. [`OutputFraming`] hides how the two are told apart so the
//! session and dispatcher never depend on the concrete encoding.
//!
//! [`LineMarkerFraming`] is the shipped encoding: the marker is a reserved
//! line starting with [`ESCAPE`], and program output that happens to start
//! with [`ESCAPE`] is escaped by doubling it, including every line after an
//! embedded newline. No output line can therefore ever decode as a marker.

pub mod codec;

/// Leading byte that introduces a control line.
pub const ESCAPE: char = '\u{1}';

/// Control line announcing that all output of a call has been written.
pub const COMPLETION_MARKER: &str = "\u{1}console-host:complete";

/// One decoded line of child stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Program output, already unescaped.
    Output(String),
    /// The completion marker.
    Complete,
}

/// Encoding of program output and completion markers on a line stream.
pub trait OutputFraming: Send + Sync + std::fmt::Debug {
    /// Encode program output. Embedded newlines split it into several
    /// lines, each encoded on its own.
    fn encode_output(&self, line: &str) -> String;

    /// The encoded completion marker line.
    fn completion(&self) -> String;

    /// Decode one received line.
    fn decode(&self, line: String) -> Frame;
}

/// Framing for streams that never carry control lines (child stderr).
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainFraming;

impl OutputFraming for PlainFraming {
    fn encode_output(&self, line: &str) -> String {
        line.to_owned()
    }

    fn completion(&self) -> String {
        String::new()
    }

    fn decode(&self, line: String) -> Frame {
        Frame::Output(line)
    }
}

/// Line-marker framing with escaping of colliding output.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineMarkerFraming;

impl OutputFraming for LineMarkerFraming {
    fn encode_output(&self, line: &str) -> String {
        let mut encoded = String::with_capacity(line.len() + 1);
        for (index, part) in line.split('\n').enumerate() {
            if index > 0 {
                encoded.push('\n');
            }
            if part.starts_with(ESCAPE) {
                encoded.push(ESCAPE);
            }
            encoded.push_str(part);
        }
        encoded
    }

    fn completion(&self) -> String {
        COMPLETION_MARKER.to_owned()
    }

    fn decode(&self, line: String) -> Frame {
        if line == COMPLETION_MARKER {
            return Frame::Complete;
        }
        match line.strip_prefix(ESCAPE) {
            Some(rest) if rest.starts_with(ESCAPE) => Frame::Output(rest.to_owned()),
            // Unescaped control lines other than the marker are not produced
            // by the encoder; pass them through rather than dropping output.
            _ => Frame::Output(line),
        }
    }
}
