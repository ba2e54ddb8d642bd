//! Compaction pacing driven by compaction debt

use std::sync::Arc;

use async_trait::async_trait;

use super::internal::InternalPacer;
use super::Pacer;
use crate::cancel::CancelSignal;
use crate::error::{PacerError, PacerResult};
use crate::limiter::RateLimiter;
use crate::metrics::PacerMetrics;

/// Engine state needed for compaction pacing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionPacerInfo {
    /// Low watermark for compaction debt. Below it compactions are slowed to
    /// match flush speed; above it they run as fast as possible. Sized so that
    /// a single flush cannot add enough debt to overshoot it.
    pub slowdown_threshold: u64,
    /// Estimated bytes of outstanding compaction work across all levels
    pub total_compaction_debt: u64,
}

/// Accessor returning a fresh [`CompactionPacerInfo`]
///
/// Expected to take the engine lock, so it is only called on refresh.
pub type CompactionInfoFn = Arc<dyn Fn() -> CompactionPacerInfo + Send + Sync>;

/// Environment a compaction pacer runs in
#[derive(Clone)]
pub struct CompactionPacerEnv {
    pub limiter: Arc<dyn RateLimiter>,
    pub mem_table_size: u64,
    pub get_info: CompactionInfoFn,
    pub cancel: CancelSignal,
    pub metrics: Option<Arc<PacerMetrics>>,
}

impl CompactionPacerEnv {
    /// Create an env with no cancellation and no metrics
    pub fn new<F>(limiter: Arc<dyn RateLimiter>, mem_table_size: u64, get_info: F) -> Self
    where
        F: Fn() -> CompactionPacerInfo + Send + Sync + 'static,
    {
        Self {
            limiter,
            mem_table_size,
            get_info: Arc::new(get_info),
            cancel: CancelSignal::never(),
            metrics: None,
        }
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
}

/// Rate limits a compaction depending on compaction debt
///
/// The limiter is applied at a rate that keeps debt at a steady level. When
/// debt grows faster than compactions can pay it down, no limit is applied.
pub struct CompactionPacer {
    inner: InternalPacer,
    mem_table_size: u64,
    get_info: CompactionInfoFn,
    total_compaction_debt: u64,
}

impl CompactionPacer {
    /// Create a pacer for one compaction
    pub fn new(env: CompactionPacerEnv) -> Self {
        Self {
            inner: InternalPacer::new(env.limiter, env.cancel, env.metrics, 0),
            mem_table_size: env.mem_table_size,
            get_info: env.get_info,
            total_compaction_debt: 0,
        }
    }

    /// Slowdown threshold from the most recent snapshot
    pub fn slowdown_threshold(&self) -> u64 {
        self.inner.slowdown_threshold
    }

    /// Total debt from the most recent snapshot
    pub fn total_compaction_debt(&self) -> u64 {
        self.total_compaction_debt
    }
}

#[async_trait]
impl Pacer for CompactionPacer {
    /// Slow the compaction down to the flush rate
    ///
    /// Debt is estimated as the snapshot debt minus the bytes this compaction
    /// has iterated since. At or below the slowdown threshold the limiter is
    /// applied; above it the compaction runs unthrottled.
    async fn maybe_throttle(&mut self, bytes_iterated: u64) -> PacerResult<()> {
        if bytes_iterated == 0 {
            return Err(PacerError::InvalidBytesIterated(bytes_iterated));
        }

        if self.inner.refresh_due(bytes_iterated) {
            let info = (self.get_info)();
            self.inner.slowdown_threshold = info.slowdown_threshold;
            self.total_compaction_debt = info.total_compaction_debt;
            self.inner.mark_refreshed(bytes_iterated, self.mem_table_size);
            tracing::debug!(
                bytes_iterated,
                slowdown_threshold = info.slowdown_threshold,
                total_compaction_debt = info.total_compaction_debt,
                "Refreshed compaction pacer info"
            );
        }
        self.inner.tick();

        let current_debt = self.total_compaction_debt.saturating_sub(bytes_iterated);
        let amount = self.inner.advance(bytes_iterated);

        self.inner.limit(amount, current_debt).await
    }
}
