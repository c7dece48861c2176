//! Output-sync primitive.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Single-slot signal pairing each completion marker with one waiter.
///
/// Releases do not accumulate: at most one pending release is stored, so a
/// release with nobody waiting is consumed by the next [`wait`](Self::wait)
/// and any further releases are no-ops. Once [`close`](Self::close)d, every
/// wait returns immediately.
#[derive(Debug, Default)]
pub struct OutputSync {
    notify: Notify,
    closed: AtomicBool,
}

impl OutputSync {
    /// Create an open primitive with no pending release.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one release, waking the current waiter if any.
    pub fn release(&self) {
        self.notify.notify_one();
    }

    /// Close the primitive; current and future waits return at once.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait for one release, or for the primitive to be closed.
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking `closed` so a concurrent close cannot slip
        // between the check and the await.
        notified.as_mut().enable();
        if self.is_closed() {
            return;
        }
        notified.await;
    }
}
