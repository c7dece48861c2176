//! Output pumps forwarding the child's stdout and stderr to the console.
//!
//! The stdout pump is the only place completion markers are observed: each
//! one releases the session's [`OutputSync`]. Because the pump forwards
//! lines in order, every output line written before a marker reaches the
//! console before the waiter on that marker resumes.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn, Instrument};

use crate::console::{Console, Style};
use crate::framing::codec::OutputCodec;
use crate::framing::{Frame, PlainFraming};
use crate::orchestrator::sync::OutputSync;

/// Spawn the stdout pump.
///
/// Ends at EOF; it never closes `sync` itself, the exit monitor does.
#[must_use]
pub fn spawn_stdout_pump<R>(
    stdout: R,
    console: Arc<dyn Console>,
    sync: Arc<OutputSync>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let span = tracing::info_span!("stdout_pump");
    tokio::spawn(
        async move {
            let mut frames = FramedRead::new(stdout, OutputCodec::new());
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(Frame::Complete) => {
                        debug!("completion marker received");
                        sync.release();
                    }
                    Ok(Frame::Output(line)) => console.write_line(&line, Style::Out),
                    Err(err) => {
                        warn!(%err, "child stdout read failed");
                        break;
                    }
                }
            }
            debug!("child stdout closed");
        }
        .instrument(span),
    )
}

/// Spawn the stderr pump. Stderr never carries markers.
#[must_use]
pub fn spawn_stderr_pump<R>(stderr: R, console: Arc<dyn Console>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let span = tracing::info_span!("stderr_pump");
    tokio::spawn(
        async move {
            let codec = OutputCodec::with_framing(Arc::new(PlainFraming));
            let mut frames = FramedRead::new(stderr, codec);
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(Frame::Output(line)) => console.write_line(&line, Style::Error),
                    Ok(Frame::Complete) => {}
                    Err(err) => {
                        warn!(%err, "child stderr read failed");
                        break;
                    }
                }
            }
            debug!("child stderr closed");
        }
        .instrument(span),
    )
}
