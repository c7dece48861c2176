//! Child-side output: framed stdout, plain stderr.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use bytes::BytesMut;
use tokio_util::codec::Encoder;
use tracing::warn;

use crate::engine::OutputSink;
use crate::framing::codec::OutputCodec;
use crate::framing::Frame;

/// Announces that all output of a call has been written.
pub trait CompletionSignal: Send + Sync {
    /// Emit one completion marker.
    fn complete(&self);
}

/// Output sink writing to the process's own stdout and stderr.
///
/// Stdout lines go through [`OutputCodec`] so that program output can never
/// be mistaken for a completion marker. Every write is flushed immediately:
/// the parent relies on output preceding the marker that follows it.
#[derive(Debug, Default)]
pub struct StdioOutput {
    codec: Mutex<OutputCodec>,
}

impl StdioOutput {
    /// Create the sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn write_frame(&self, frame: Frame) {
        let mut codec = self.codec.lock().unwrap_or_else(PoisonError::into_inner);
        let mut buf = BytesMut::new();
        if let Err(err) = codec.encode(frame, &mut buf) {
            warn!(%err, "failed to encode stdout frame");
            return;
        }
        // The codec lock also serializes whole lines on stdout.
        let mut stdout = std::io::stdout().lock();
        if let Err(err) = stdout.write_all(&buf).and_then(|()| stdout.flush()) {
            warn!(%err, "failed to write stdout frame");
        }
    }
}

impl OutputSink for StdioOutput {
    fn out_line(&self, line: &str) {
        self.write_frame(Frame::Output(line.to_owned()));
    }

    fn err_line(&self, line: &str) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{line}").and_then(|()| stderr.flush());
    }
}

impl CompletionSignal for StdioOutput {
    fn complete(&self) {
        self.write_frame(Frame::Complete);
    }
}
