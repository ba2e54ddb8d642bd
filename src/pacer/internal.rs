//! Throttle primitive shared by the debt and dirty-byte pacers

use std::sync::Arc;

use tokio::time::Instant;

use crate::cancel::CancelSignal;
use crate::config::{refresh_bytes, REFRESH_ITERATIONS};
use crate::error::PacerResult;
use crate::limiter::RateLimiter;
use crate::metrics::PacerMetrics;

/// State and throttling common to [`CompactionPacer`](super::CompactionPacer)
/// and [`FlushPacer`](super::FlushPacer)
pub(crate) struct InternalPacer {
    limiter: Arc<dyn RateLimiter>,
    cancel: CancelSignal,
    metrics: Option<Arc<PacerMetrics>>,

    /// Calls left before the engine snapshot is re-read
    iter_count: u64,
    /// Cumulative bytes seen on the previous call
    prev_bytes_iterated: u64,
    /// Cumulative bytes past which the engine snapshot is re-read
    refresh_bytes_threshold: u64,
    /// Pressure at or below which the blocking path is taken
    pub(crate) slowdown_threshold: u64,
}

impl InternalPacer {
    pub(crate) fn new(
        limiter: Arc<dyn RateLimiter>,
        cancel: CancelSignal,
        metrics: Option<Arc<PacerMetrics>>,
        slowdown_threshold: u64,
    ) -> Self {
        Self {
            limiter,
            cancel,
            metrics,
            iter_count: 0,
            prev_bytes_iterated: 0,
            refresh_bytes_threshold: 0,
            slowdown_threshold,
        }
    }

    /// Whether the cached engine snapshot must be re-read before this call
    pub(crate) fn refresh_due(&self, bytes_iterated: u64) -> bool {
        self.iter_count == 0 || bytes_iterated > self.refresh_bytes_threshold
    }

    /// Restart the amortization window after a snapshot refresh
    pub(crate) fn mark_refreshed(&mut self, bytes_iterated: u64, mem_table_size: u64) {
        self.refresh_bytes_threshold = bytes_iterated.saturating_add(refresh_bytes(mem_table_size));
        self.iter_count = REFRESH_ITERATIONS;
        if let Some(metrics) = &self.metrics {
            metrics.record_refresh();
        }
    }

    /// Count one call against the amortization window
    pub(crate) fn tick(&mut self) {
        self.iter_count = self.iter_count.saturating_sub(1);
    }

    /// Bytes processed since the previous call; never negative
    pub(crate) fn advance(&mut self, bytes_iterated: u64) -> u64 {
        let amount = bytes_iterated.saturating_sub(self.prev_bytes_iterated);
        self.prev_bytes_iterated = bytes_iterated;
        amount
    }

    /// Rate limit `amount` bytes if `current_level` is at or below the
    /// slowdown threshold, otherwise drain tokens without blocking
    pub(crate) async fn limit(&self, amount: u64, current_level: u64) -> PacerResult<()> {
        // Burst may change under us when the limiter is retuned
        let burst = self.limiter.burst();

        if current_level <= self.slowdown_threshold {
            tracing::trace!(
                amount,
                current_level,
                threshold = self.slowdown_threshold,
                "Throttling background I/O"
            );
            let start = Instant::now();
            let waits = wait_chunked(&*self.limiter, amount, burst, &self.cancel).await?;
            if let Some(metrics) = &self.metrics {
                metrics.record_throttled(amount, waits, start.elapsed());
            }
        } else {
            tracing::trace!(
                amount,
                current_level,
                threshold = self.slowdown_threshold,
                "Background I/O behind, draining without throttling"
            );
            self.drain_chunked(amount, burst);
            if let Some(metrics) = &self.metrics {
                metrics.record_best_effort(amount);
            }
        }
        Ok(())
    }

    fn drain_chunked(&self, mut amount: u64, burst: u64) {
        let now = Instant::now();
        if burst > 0 {
            while amount > burst {
                self.limiter.try_consume(burst, now);
                amount -= burst;
            }
        }
        self.limiter.try_consume(amount, now);
    }
}

/// Wait for `amount` tokens in draws of at most `burst`, returning the number
/// of limiter calls made
pub(crate) async fn wait_chunked<L>(
    limiter: &L,
    mut amount: u64,
    burst: u64,
    cancel: &CancelSignal,
) -> PacerResult<u64>
where
    L: RateLimiter + ?Sized,
{
    let mut waits = 0;
    if burst > 0 {
        while amount > burst {
            limiter.wait_for_tokens(burst, cancel).await?;
            waits += 1;
            amount -= burst;
        }
    }
    limiter.wait_for_tokens(amount, cancel).await?;
    Ok(waits + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PacerError;
    use crate::limiter::recording::{LimiterCall, RecordingLimiter};

    fn pacer(limiter: Arc<RecordingLimiter>, threshold: u64) -> InternalPacer {
        InternalPacer::new(limiter, CancelSignal::never(), None, threshold)
    }

    #[tokio::test]
    async fn test_below_threshold_blocks_in_burst_chunks() {
        let limiter = Arc::new(RecordingLimiter::new(100));
        let p = pacer(limiter.clone(), 1_000);

        p.limit(350, 1_000).await.unwrap();
        assert_eq!(limiter.waited(), vec![100, 100, 100, 50]);
        assert!(limiter.consumed().is_empty());
    }

    #[tokio::test]
    async fn test_exact_multiple_ends_with_full_burst() {
        let limiter = Arc::new(RecordingLimiter::new(100));
        let p = pacer(limiter.clone(), 1_000);

        p.limit(200, 0).await.unwrap();
        assert_eq!(limiter.waited(), vec![100, 100]);
    }

    #[tokio::test]
    async fn test_above_threshold_drains_without_waiting() {
        let limiter = Arc::new(RecordingLimiter::new(100));
        let p = pacer(limiter.clone(), 1_000);

        p.limit(250, 1_001).await.unwrap();
        assert_eq!(
            limiter.calls(),
            vec![
                LimiterCall::TryConsume(100),
                LimiterCall::TryConsume(100),
                LimiterCall::TryConsume(50),
            ]
        );
    }

    #[tokio::test]
    async fn test_burst_read_on_every_call() {
        let limiter = Arc::new(RecordingLimiter::new(100));
        let p = pacer(limiter.clone(), 1_000);

        p.limit(250, 0).await.unwrap();
        assert_eq!(limiter.waited(), vec![100, 100, 50]);

        limiter.clear();
        limiter.set_burst(200);
        p.limit(250, 0).await.unwrap();
        assert_eq!(limiter.waited(), vec![200, 50]);

        limiter.clear();
        limiter.set_burst(40);
        p.limit(100, 2_000).await.unwrap();
        assert_eq!(limiter.consumed(), vec![40, 40, 20]);
    }

    #[tokio::test]
    async fn test_wait_error_aborts_loop() {
        let limiter = Arc::new(RecordingLimiter::failing_at(
            100,
            1,
            PacerError::Cancelled,
        ));
        let p = pacer(limiter.clone(), 1_000);

        assert_eq!(p.limit(500, 0).await, Err(PacerError::Cancelled));
        // Second wait failed, nothing after it
        assert_eq!(limiter.waited(), vec![100, 100]);
    }

    #[tokio::test]
    async fn test_metrics_split_by_path() {
        let limiter = Arc::new(RecordingLimiter::new(100));
        let metrics = Arc::new(PacerMetrics::new());
        let p = InternalPacer::new(limiter, CancelSignal::never(), Some(metrics.clone()), 10);

        p.limit(250, 10).await.unwrap();
        p.limit(40, 11).await.unwrap();

        let snap = metrics.snapshot();
        assert_eq!(snap.throttled_bytes, 250);
        assert_eq!(snap.blocking_waits, 3);
        assert_eq!(snap.best_effort_bytes, 40);
    }

    #[test]
    fn test_refresh_window() {
        let limiter = Arc::new(RecordingLimiter::new(100));
        let mut p = pacer(limiter, 0);

        assert!(p.refresh_due(1));
        p.mark_refreshed(1, 1_000);
        p.tick();
        // 5% of 1000 = 50 bytes of headroom
        assert!(!p.refresh_due(51));
        assert!(p.refresh_due(52));

        for _ in 0..REFRESH_ITERATIONS - 1 {
            assert!(!p.refresh_due(2));
            p.tick();
        }
        assert!(p.refresh_due(2));
    }

    #[test]
    fn test_huge_mem_table_does_not_overflow() {
        let limiter = Arc::new(RecordingLimiter::new(100));
        let mut p = pacer(limiter, 0);

        p.mark_refreshed(1, u64::MAX);
        assert!(!p.refresh_due(u64::MAX / 100));
        assert!(p.refresh_due(u64::MAX));
    }

    #[test]
    fn test_advance_saturates() {
        let limiter = Arc::new(RecordingLimiter::new(100));
        let mut p = pacer(limiter, 0);

        assert_eq!(p.advance(10), 10);
        assert_eq!(p.advance(25), 15);
        assert_eq!(p.advance(25), 0);
        assert_eq!(p.advance(5), 0);
        assert_eq!(p.advance(7), 2);
    }
}
