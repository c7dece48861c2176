//! Console capability used for everything the user sees.
//!
//! The console is handed to each session explicitly; nothing in the crate
//! writes to the terminal through ambient state except [`StdConsole`].

use std::io::Write;

/// Rendering style of a console write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Style {
    /// Input prompt.
    Prompt,
    /// Regular program output.
    Out,
    /// Error output.
    Error,
    /// Warnings, including interrupt notices.
    Warning,
}

/// Sink for user-visible text.
pub trait Console: Send + Sync {
    /// Write `text` without a trailing newline.
    fn write(&self, text: &str, style: Style);

    /// Write `text` followed by a newline.
    fn write_line(&self, text: &str, style: Style) {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        self.write(&line, style);
    }
}

/// Console backed by the process's standard streams.
///
/// `Prompt` and `Out` go to stdout, `Error` and `Warning` to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole;

impl Console for StdConsole {
    fn write(&self, text: &str, style: Style) {
        // A closed terminal is not something the console can report to.
        let _ = match style {
            Style::Prompt | Style::Out => {
                let mut out = std::io::stdout().lock();
                out.write_all(text.as_bytes()).and_then(|()| out.flush())
            }
            Style::Error | Style::Warning => {
                let mut err = std::io::stderr().lock();
                err.write_all(text.as_bytes()).and_then(|()| err.flush())
            }
        };
    }
}
