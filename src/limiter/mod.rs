//! Rate limiter contract consumed by the pacers
//!
//! Pacers never look inside a limiter. They only need three things from it:
//! - a blocking (async, cancellable) wait for tokens
//! - a best-effort, never-blocking consume
//! - the current burst size, read on every throttle call
//!
//! The auto-tuned pacer additionally reads and retunes the rate through
//! [`TunableRateLimiter`].

pub mod token_bucket;

#[cfg(test)]
pub(crate) mod recording;

pub use token_bucket::TokenBucketLimiter;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::cancel::CancelSignal;
use crate::error::PacerResult;

/// Token-bucket rate limiter shared between background operations
///
/// Implementations must be safe for concurrent blocking and non-blocking
/// consumption from many compactions at once.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Wait until `amount` tokens have been granted
    ///
    /// Fails with the limiter's own error when `amount` exceeds the burst, when
    /// `cancel` fires, or when the wait would overrun the signal's deadline.
    async fn wait_for_tokens(&self, amount: u64, cancel: &CancelSignal) -> PacerResult<()>;

    /// Take `amount` tokens without blocking
    ///
    /// Returns whether the tokens were available. The caller proceeds either
    /// way; implementations may let the balance go negative.
    fn try_consume(&self, amount: u64, now: Instant) -> bool;

    /// Maximum tokens released in one draw
    fn burst(&self) -> u64;
}

/// Rate limiter whose rate can be read and retuned at runtime
pub trait TunableRateLimiter: RateLimiter {
    /// Current rate (tokens/sec)
    fn rate(&self) -> u64;

    /// Replace the rate; tokens already accrued are kept
    fn set_rate(&self, rate: u64);
}
