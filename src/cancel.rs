//! Cancellation for blocking throttle waits
//!
//! A throttled compaction or flush can sit in a token wait for a long time when
//! the limiter rate is low. Engine shutdown and operation abort reach those
//! waits through a [`CancelSignal`]: a `watch` shutdown channel plus an
//! optional deadline.

use std::future;

use tokio::sync::watch;
use tokio::time::Instant;

/// Cancellation handle passed to every blocking limiter wait
///
/// Cloning is cheap; all clones observe the same shutdown channel.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    /// Shutdown receiver; `None` means the wait can only end by acquiring tokens
    shutdown_rx: Option<watch::Receiver<bool>>,

    /// Point in time after which waits fail instead of sleeping
    deadline: Option<Instant>,
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        Self::default()
    }

    /// Wrap an existing shutdown receiver
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            shutdown_rx: Some(shutdown_rx),
            deadline: None,
        }
    }

    /// Create a signal together with the sender that fires it
    ///
    /// ```ignore
    /// let (shutdown_tx, cancel) = CancelSignal::channel();
    /// // hand `cancel` to the pacer env, later:
    /// shutdown_tx.send(true).ok();
    /// ```
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (shutdown_tx, Self::new(shutdown_rx))
    }

    /// Attach a deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check whether shutdown has been requested
    pub fn is_cancelled(&self) -> bool {
        self.shutdown_rx
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }

    /// Resolve once shutdown is requested
    ///
    /// A dropped sender can no longer request shutdown, so the future then
    /// stays pending forever.
    pub async fn cancelled(&self) {
        let Some(rx) = self.shutdown_rx.as_ref() else {
            return future::pending().await;
        };

        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return future::pending().await;
            }
        }
    }
}
