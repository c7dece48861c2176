//! Frame codec for child stdout.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a configurable maximum line
//! length and an [`OutputFraming`] so that [`FramedRead`] yields decoded
//! [`Frame`]s directly.
//!
//! [`FramedRead`]: tokio_util::codec::FramedRead

use std::sync::Arc;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::framing::{Frame, LineMarkerFraming, OutputFraming};
use crate::{AppError, Result};

/// Maximum line length accepted from the child: 1 MiB.
///
/// Longer lines are replaced by a placeholder output frame and the rest of
/// the line is discarded; the codec resynchronises on the next newline.
/// Reporting them as errors would end the [`FramedRead`] stream, which must
/// keep delivering markers.
///
/// [`FramedRead`]: tokio_util::codec::FramedRead
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Line codec producing [`Frame`]s.
///
/// # Examples
///
/// ```rust,ignore
/// use tokio_util::codec::FramedRead;
/// use console_host::framing::codec::OutputCodec;
///
/// let frames = FramedRead::new(child_stdout, OutputCodec::new());
/// ```
#[derive(Debug)]
pub struct OutputCodec {
    lines: LinesCodec,
    framing: Arc<dyn OutputFraming>,
}

impl OutputCodec {
    /// Create a codec using [`LineMarkerFraming`] and [`MAX_LINE_BYTES`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_framing(Arc::new(LineMarkerFraming))
    }

    /// Create a codec using a custom framing.
    #[must_use]
    pub fn with_framing(framing: Arc<dyn OutputFraming>) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_BYTES),
            framing,
        }
    }

    fn frame(
        &self,
        line: std::result::Result<Option<String>, LinesCodecError>,
    ) -> Result<Option<Frame>> {
        match line {
            Ok(line) => Ok(line.map(|line| self.framing.decode(line))),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Frame::Output(format!(
                "<line dropped: exceeded {MAX_LINE_BYTES} bytes>"
            )))),
            Err(err) => Err(map_codec_error(err)),
        }
    }
}

impl Default for OutputCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for OutputCodec {
    type Item = Frame;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let line = self.lines.decode(src);
        self.frame(line)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let line = self.lines.decode_eof(src);
        self.frame(line)
    }
}

impl Encoder<Frame> for OutputCodec {
    type Error = AppError;

    /// Encode `item` as a `\n`-terminated line into `dst`.
    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        let line = match item {
            Frame::Output(text) => self.framing.encode_output(&text),
            Frame::Complete => self.framing.completion(),
        };
        self.lines.encode(line, dst).map_err(map_codec_error)
    }
}

/// Map a [`LinesCodecError`] to an [`AppError`].
pub(crate) fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Protocol(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
