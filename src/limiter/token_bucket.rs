//! Token bucket rate limiter for background I/O
//!
//! Tokens are bytes. The bucket refills continuously at `rate` bytes/sec up to
//! `burst`. Two consumption modes:
//! - blocking: reserve the tokens up front and sleep until the reservation
//!   matures, racing the sleep against a [`CancelSignal`]
//! - best-effort: take the tokens immediately, borrowing against future
//!   refills when the bucket is short

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{RateLimiter, TunableRateLimiter};
use crate::cancel::CancelSignal;
use crate::error::{PacerError, PacerResult};

/// Token bucket state
#[derive(Debug)]
struct Bucket {
    /// Available tokens; negative while best-effort callers are in debt
    tokens: f64,
    /// Maximum tokens (bucket size)
    burst: u64,
    /// Token refill rate (bytes/sec)
    rate: u64,
    /// Last refill time
    last_refill: Instant,
}

impl Bucket {
    fn new(rate: u64, burst: u64, now: Instant) -> Self {
        Self {
            tokens: burst as f64,
            burst,
            rate,
            last_refill: now,
        }
    }

    /// Refill tokens based on elapsed time
    fn refill(&mut self, now: Instant) {
        if now <= self.last_refill {
            return;
        }
        let elapsed = now.duration_since(self.last_refill);
        let refill_amount = self.rate as f64 * elapsed.as_secs_f64();

        self.tokens = (self.tokens + refill_amount).min(self.burst as f64);
        self.last_refill = now;
    }

    /// Time until a deficit of `-tokens` has been repaid
    fn wait_for_deficit(&self) -> Duration {
        if self.tokens >= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(-self.tokens / self.rate as f64)
    }

    /// Return tokens taken by a reservation that was never used
    fn give_back(&mut self, amount: u64) {
        self.tokens = (self.tokens + amount as f64).min(self.burst as f64);
    }
}

/// Thread-safe token bucket
///
/// Shared through `Arc` by every pacer that throttles against it. The mutex is
/// never held across an await point.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    bucket: Mutex<Bucket>,
}

impl TokenBucketLimiter {
    /// Create a full bucket
    ///
    /// A zero rate or burst is raised to one token so waits always terminate.
    pub fn new(rate: u64, burst: u64) -> Self {
        Self {
            bucket: Mutex::new(Bucket::new(rate.max(1), burst.max(1), Instant::now())),
        }
    }

    /// Tokens available right now (negative while in debt)
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        bucket.refill(Instant::now());
        bucket.tokens
    }

}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn wait_for_tokens(&self, amount: u64, cancel: &CancelSignal) -> PacerResult<()> {
        if amount == 0 {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(PacerError::Cancelled);
        }

        let wait = {
            let mut bucket = self.bucket.lock();
            if amount > bucket.burst {
                return Err(PacerError::BurstExceeded {
                    requested: amount,
                    burst: bucket.burst,
                });
            }

            let now = Instant::now();
            bucket.refill(now);
            bucket.tokens -= amount as f64;
            let wait = bucket.wait_for_deficit();

            if let Some(deadline) = cancel.deadline() {
                if now + wait > deadline {
                    bucket.give_back(amount);
                    tracing::warn!(amount, ?wait, "Throttle wait would overrun deadline");
                    return Err(PacerError::DeadlineExceeded { wait });
                }
            }
            wait
        };

        if wait.is_zero() {
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(wait) => Ok(()),
            _ = cancel.cancelled() => {
                self.bucket.lock().give_back(amount);
                tracing::warn!(amount, ?wait, "Throttle wait cancelled");
                Err(PacerError::Cancelled)
            }
        }
    }

    fn try_consume(&self, amount: u64, now: Instant) -> bool {
        let mut bucket = self.bucket.lock();
        bucket.refill(now);
        let available = bucket.tokens >= amount as f64;
        bucket.tokens -= amount as f64;
        available
    }

    fn burst(&self) -> u64 {
        self.bucket.lock().burst
    }
}

impl TunableRateLimiter for TokenBucketLimiter {
    fn rate(&self) -> u64 {
        self.bucket.lock().rate
    }

    fn set_rate(&self, rate: u64) {
        let mut bucket = self.bucket.lock();
        // Tokens accrued so far are credited at the old rate
        bucket.refill(Instant::now());
        bucket.rate = rate.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_starts_full() {
        let limiter = TokenBucketLimiter::new(1_000, 100);
        assert_eq!(limiter.burst(), 100);
        assert_eq!(limiter.rate(), 1_000);
        assert_eq!(limiter.available_tokens(), 100.0);

        let start = Instant::now();
        limiter
            .wait_for_tokens(100, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_wait_sleeps_for_deficit() {
        let limiter = TokenBucketLimiter::new(1_000, 100);
        let cancel = CancelSignal::never();

        limiter.wait_for_tokens(100, &cancel).await.unwrap();

        // Bucket empty: 50 tokens at 1000/s take 50ms
        let start = Instant::now();
        limiter.wait_for_tokens(50, &cancel).await.unwrap();
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(49) && elapsed <= Duration::from_millis(55),
            "elapsed {:?}",
            elapsed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_consume_borrows() {
        let limiter = TokenBucketLimiter::new(1_000, 100);
        let now = Instant::now();

        assert!(limiter.try_consume(100, now));
        assert!(!limiter.try_consume(100, now));
        assert!(limiter.available_tokens() < -99.0);

        // The debt delays the next blocking caller: 100 borrowed + 10 wanted
        let start = Instant::now();
        limiter
            .wait_for_tokens(10, &CancelSignal::never())
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(109));
    }

    #[tokio::test]
    async fn test_burst_exceeded() {
        let limiter = TokenBucketLimiter::new(1_000, 100);
        let err = limiter
            .wait_for_tokens(101, &CancelSignal::never())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PacerError::BurstExceeded {
                requested: 101,
                burst: 100
            }
        );
    }

    #[tokio::test]
    async fn test_zero_amount_never_waits() {
        let limiter = TokenBucketLimiter::new(1, 1);
        let (shutdown_tx, cancel) = CancelSignal::channel();
        shutdown_tx.send(true).unwrap();
        limiter.wait_for_tokens(0, &cancel).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_tokens() {
        let limiter = std::sync::Arc::new(TokenBucketLimiter::new(10, 100));
        let (shutdown_tx, cancel) = CancelSignal::channel();

        limiter.wait_for_tokens(100, &cancel).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.wait_for_tokens(100, &cancel).await })
        };

        // Let the waiter reserve and go to sleep (10s wait at 10 tokens/s)
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(limiter.available_tokens() < -90.0);

        shutdown_tx.send(true).unwrap();
        assert_eq!(waiter.await.unwrap(), Err(PacerError::Cancelled));
        assert!(limiter.available_tokens() >= 0.0);
    }

    #[tokio::test]
    async fn test_already_cancelled_fails_fast() {
        let limiter = TokenBucketLimiter::new(1_000, 100);
        let (shutdown_tx, cancel) = CancelSignal::channel();
        shutdown_tx.send(true).unwrap();

        assert_eq!(
            limiter.wait_for_tokens(10, &cancel).await,
            Err(PacerError::Cancelled)
        );
        // Nothing was reserved
        assert_eq!(limiter.available_tokens(), 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_overrun_fails_without_reserving() {
        let limiter = TokenBucketLimiter::new(1_000, 100);
        limiter
            .wait_for_tokens(100, &CancelSignal::never())
            .await
            .unwrap();

        let deadline = Instant::now() + Duration::from_millis(10);
        let cancel = CancelSignal::never().with_deadline(deadline);
        let err = limiter.wait_for_tokens(100, &cancel).await.unwrap_err();
        assert!(matches!(err, PacerError::DeadlineExceeded { .. }));

        // Still 100ms worth of refill away from a full bucket, no extra debt
        assert!(limiter.available_tokens() > -1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_rate_keeps_accrued_tokens() {
        let limiter = TokenBucketLimiter::new(1_000, 1_000);
        let now = Instant::now();
        assert!(limiter.try_consume(1_000, now));

        tokio::time::advance(Duration::from_millis(100)).await;
        limiter.set_rate(10_000);
        assert_eq!(limiter.rate(), 10_000);

        // 100 tokens accrued at the old rate
        let tokens = limiter.available_tokens();
        assert!((99.0..=101.0).contains(&tokens), "tokens {}", tokens);
    }
}
