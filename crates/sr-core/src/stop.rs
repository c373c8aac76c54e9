//! Cooperative cancellation for worker and runner loops.
//!
//! A `StopSource` is held by whoever owns the lifecycle (main, a test, a
//! supervisor task); `StopToken` clones are handed to loops, which poll
//! `is_stopped` at every suspension point or `select!` on `stopped()`.
//!
//! Stopping is one-way and idempotent: once signalled, every token observes
//! it and no token can un-stop the source.

use tokio::sync::watch;

/// The owning side of a stop signal.
pub struct StopSource {
    tx: watch::Sender<bool>,
}

/// A cheaply clonable handle observing a stop signal.
#[derive(Debug, Clone)]
pub struct StopToken {
    rx: watch::Receiver<bool>,
}

impl StopSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        StopSource { tx }
    }

    /// Create a token observing this source.
    pub fn token(&self) -> StopToken {
        StopToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Signal stop. Idempotent; all outstanding tokens observe it.
    pub fn stop(&self) {
        // send_replace never fails even with zero receivers.
        self.tx.send_replace(true);
    }
}

impl Default for StopSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StopToken {
    /// Non-blocking check used inside tight loops.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when stop is signalled. If the source is dropped without
    /// signalling, this also resolves (an orphaned loop must not run forever).
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// A token that never signals stop; for tests and fire-and-forget tools.
    pub fn never() -> StopToken {
        let (tx, rx) = watch::channel(false);
        // Leak the sender so the channel stays open for the process lifetime.
        std::mem::forget(tx);
        StopToken { rx }
    }
}
