//! Self-tuning compaction pacing
//!
//! Unlike the debt-driven [`CompactionPacer`](super::CompactionPacer), this
//! policy never reads engine state. It owns a token bucket, always waits on it,
//! and infers backlog from how much of each window's capacity was actually
//! drained:
//! - below the low watermark the rate drops by the adjustment step
//! - above the high watermark the rate rises by the adjustment step
//! - in between the rate is left alone

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::internal::wait_chunked;
use super::Pacer;
use crate::cancel::CancelSignal;
use crate::config::AutoTuneConfig;
use crate::error::PacerResult;
use crate::limiter::{TokenBucketLimiter, TunableRateLimiter};
use crate::metrics::PacerMetrics;

/// Burst of the owned limiter; large enough to never bound a single call
pub const UNBOUNDED_BURST: u64 = i32::MAX as u64;

/// Compaction pacer that tunes its own rate from observed utilization
pub struct AutoTunedCompactionPacer {
    limiter: Arc<dyn TunableRateLimiter>,
    config: AutoTuneConfig,
    cancel: CancelSignal,
    metrics: Option<Arc<PacerMetrics>>,

    /// Last time the rate was adjusted
    last_refresh: Instant,
    /// Bytes drained since the last adjustment
    cur_amount: u64,
    /// Bytes one window can drain at the current rate
    max_capacity: u64,
    prev_bytes_iterated: u64,
}

impl AutoTunedCompactionPacer {
    /// Create a pacer starting at the maximum rate
    ///
    /// Fails with [`PacerError::Config`](crate::PacerError::Config) when
    /// `config` does not validate.
    pub fn new(config: AutoTuneConfig) -> PacerResult<Self> {
        let limiter = Arc::new(TokenBucketLimiter::new(config.max_rate, UNBOUNDED_BURST));
        Self::with_limiter(limiter, config)
    }

    /// Create a pacer around an existing limiter, starting at its current rate
    pub fn with_limiter(
        limiter: Arc<dyn TunableRateLimiter>,
        config: AutoTuneConfig,
    ) -> PacerResult<Self> {
        config.validate()?;
        let max_capacity = window_capacity(limiter.rate(), config.recalculate_interval);
        Ok(Self {
            limiter,
            config,
            cancel: CancelSignal::never(),
            metrics: None,
            last_refresh: Instant::now(),
            cur_amount: 0,
            max_capacity,
            prev_bytes_iterated: 0,
        })
    }

    /// Set the cancel signal handed to blocking waits
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Attach shared metrics
    pub fn with_metrics(mut self, metrics: Arc<PacerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Current rate (bytes/sec)
    pub fn rate(&self) -> u64 {
        self.limiter.rate()
    }

    /// Bytes one window can drain at the current rate
    pub fn window_capacity(&self) -> u64 {
        self.max_capacity
    }

    /// Close the current window and retune the rate
    fn recalculate(&mut self, elapsed: Duration) {
        let interval = self.config.recalculate_interval;
        let windows = (elapsed.as_nanos() / interval.as_nanos().max(1)).max(1);
        let capacity = self.max_capacity as u128 * windows;
        let drained_percent = if capacity == 0 {
            100
        } else {
            (self.cur_amount as u128 * 100 / capacity) as u64
        };

        let rate = self.limiter.rate();
        let step = self.config.adjustment_percent;
        let new_rate = if drained_percent < self.config.low_watermark_percent {
            (rate.saturating_mul(100u64.saturating_sub(step)) / 100).max(self.config.min_rate)
        } else if drained_percent > self.config.high_watermark_percent {
            (rate.saturating_mul(100u64.saturating_add(step)) / 100).min(self.config.max_rate)
        } else {
            rate
        };

        if new_rate != rate {
            self.limiter.set_rate(new_rate);
            if let Some(metrics) = &self.metrics {
                metrics.record_rate_change(rate, new_rate);
            }
            tracing::debug!(
                drained_percent,
                old_rate = rate,
                new_rate,
                "Auto-tuned compaction rate"
            );
        }

        self.cur_amount = 0;
        self.max_capacity = window_capacity(self.limiter.rate(), interval);
    }
}

/// Bytes drainable in one interval; `rate / 10` at the default 100ms
fn window_capacity(rate: u64, interval: Duration) -> u64 {
    (rate as u128 * interval.as_micros() / 1_000_000) as u64
}

#[async_trait]
impl Pacer for AutoTunedCompactionPacer {
    async fn maybe_throttle(&mut self, bytes_iterated: u64) -> PacerResult<()> {
        let amount = bytes_iterated.saturating_sub(self.prev_bytes_iterated);
        self.prev_bytes_iterated = bytes_iterated;

        let start = Instant::now();
        let burst = self.limiter.burst();
        let waits = wait_chunked(&*self.limiter, amount, burst, &self.cancel).await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_throttled(amount, waits, start.elapsed());
        }
        self.cur_amount = self.cur_amount.saturating_add(amount);

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refresh);
        if elapsed > self.config.recalculate_interval {
            self.last_refresh = now;
            self.recalculate(elapsed);
        }

        Ok(())
    }
}
