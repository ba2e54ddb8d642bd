//! Flush pacing driven by dirty memtable bytes

use std::sync::Arc;

use async_trait::async_trait;

use super::internal::InternalPacer;
use super::Pacer;
use crate::cancel::CancelSignal;
use crate::config::{flush_slowdown_threshold, DirtyBytesMode};
use crate::error::{PacerError, PacerResult};
use crate::limiter::RateLimiter;
use crate::metrics::PacerMetrics;

/// Engine state needed for flush pacing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushPacerInfo {
    /// Bytes resident across all memtables, mutable one included
    pub total_bytes: u64,
}

impl FlushPacerInfo {
    /// Sum the sizes of every memtable
    pub fn from_memtables(sizes: &[u64]) -> Self {
        Self {
            total_bytes: sizes.iter().sum(),
        }
    }
}

/// Accessor returning a fresh [`FlushPacerInfo`]
pub type FlushInfoFn = Arc<dyn Fn() -> FlushPacerInfo + Send + Sync>;

/// Environment a flush pacer runs in
#[derive(Clone)]
pub struct FlushPacerEnv {
    pub limiter: Arc<dyn RateLimiter>,
    pub mem_table_size: u64,
    pub get_info: FlushInfoFn,
    pub cancel: CancelSignal,
    pub metrics: Option<Arc<PacerMetrics>>,
    pub dirty_bytes_mode: DirtyBytesMode,
}

impl FlushPacerEnv {
    /// Create an env with no cancellation, no metrics and saturating dirty bytes
    pub fn new<F>(limiter: Arc<dyn RateLimiter>, mem_table_size: u64, get_info: F) -> Self
    where
        F: Fn() -> FlushPacerInfo + Send + Sync + 'static,
    {
        Self {
            limiter,
            mem_table_size,
            get_info: Arc::new(get_info),
            cancel: CancelSignal::never(),
            metrics: None,
            dirty_bytes_mode: DirtyBytesMode::default(),
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

    /// Set how a stale snapshot smaller than the flush's progress is handled
    pub fn with_dirty_bytes_mode(mut self, mode: DirtyBytesMode) -> Self {
        self.dirty_bytes_mode = mode;
        self
    }
}

/// Rate limits a memtable flush to match the speed of incoming user writes
///
/// When writes arrive faster than the memtable can be flushed, no limit is
/// applied.
pub struct FlushPacer {
    inner: InternalPacer,
    mem_table_size: u64,
    get_info: FlushInfoFn,
    dirty_bytes_mode: DirtyBytesMode,
    total_bytes: u64,
}

impl FlushPacer {
    /// Create a pacer for one flush
    ///
    /// The slowdown threshold depends only on configuration and is fixed here
    /// at 105% of the memtable size.
    pub fn new(env: FlushPacerEnv) -> Self {
        let slowdown_threshold = flush_slowdown_threshold(env.mem_table_size);
        Self {
            inner: InternalPacer::new(env.limiter, env.cancel, env.metrics, slowdown_threshold),
            mem_table_size: env.mem_table_size,
            get_info: env.get_info,
            dirty_bytes_mode: env.dirty_bytes_mode,
            total_bytes: 0,
        }
    }

    /// Dirty-byte level at or below which the flush is throttled
    pub fn slowdown_threshold(&self) -> u64 {
        self.inner.slowdown_threshold
    }

    /// Unflushed bytes across all memtables, given this flush's progress
    pub fn dirty_bytes(&self, bytes_iterated: u64) -> u64 {
        match self.dirty_bytes_mode {
            DirtyBytesMode::Saturating => self.total_bytes.saturating_sub(bytes_iterated),
            DirtyBytesMode::Wrapping => self.total_bytes.wrapping_sub(bytes_iterated),
        }
    }
}

#[async_trait]
impl Pacer for FlushPacer {
    async fn maybe_throttle(&mut self, bytes_iterated: u64) -> PacerResult<()> {
        if bytes_iterated == 0 {
            return Err(PacerError::InvalidBytesIterated(bytes_iterated));
        }

        if self.inner.refresh_due(bytes_iterated) {
            let info = (self.get_info)();
            self.total_bytes = info.total_bytes;
            self.inner.mark_refreshed(bytes_iterated, self.mem_table_size);
            tracing::debug!(
                bytes_iterated,
                total_bytes = info.total_bytes,
                "Refreshed flush pacer info"
            );
        }
        self.inner.tick();

        // Includes memtables not part of this flush, such as the mutable one
        let dirty_bytes = self.dirty_bytes(bytes_iterated);
        let amount = self.inner.advance(bytes_iterated);

        // Throttled only while flushing keeps up with incoming writes
        self.inner.limit(amount, dirty_bytes).await
    }
}
