//! Pacer error types

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by pacers and rate limiters
///
/// Every variant is fatal to the compaction or flush that observed it. Retry
/// happens by rescheduling a fresh operation, never inside the pacer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacerError {
    /// A debt or dirty-byte pacer was called without forward progress
    #[error("maybe_throttle supplied with invalid bytes iterated: {0}")]
    InvalidBytesIterated(u64),

    /// A blocking wait was interrupted by its cancel signal
    #[error("throttle wait cancelled")]
    Cancelled,

    /// A blocking wait would have run past the signal's deadline
    #[error("throttle wait of {wait:?} would exceed deadline")]
    DeadlineExceeded { wait: Duration },

    /// A single blocking request larger than the limiter can ever grant
    #[error("wait for {requested} tokens exceeds limiter burst {burst}")]
    BurstExceeded { requested: u64, burst: u64 },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type for pacer operations
pub type PacerResult<T> = Result<T, PacerError>;
