//! Pacer configuration

use std::time::Duration;

use crate::error::{PacerError, PacerResult};
use crate::limiter::TokenBucketLimiter;

/// Calls between forced engine-state refreshes
pub const REFRESH_ITERATIONS: u64 = 1000;

/// Bytes iterated between refreshes, as a percentage of memtable size
pub const REFRESH_BYTES_PERCENT: u64 = 5;

/// Flush slowdown threshold, as a percentage of memtable size
pub const FLUSH_SLOWDOWN_PERCENT: u64 = 105;

/// Interval in which the auto-tuned pacer readjusts its rate
pub const RECALCULATE_INTERVAL: Duration = Duration::from_millis(100);

/// Token refills per second; one refill period holds `rate / 10` tokens
pub const REFILLS_PER_SECOND: u64 = 10;

/// Auto-tuned rate ceiling (1000 MiB/s)
pub const MAXIMUM_RATE: u64 = 1000 << 20;

/// Auto-tuned rate floor (50 MiB/s)
pub const MINIMUM_RATE: u64 = 50 << 20;

/// Window utilization below which the auto-tuned rate is lowered
pub const LOW_WATERMARK_PERCENT: u64 = 50;

/// Window utilization above which the auto-tuned rate is raised
pub const HIGH_WATERMARK_PERCENT: u64 = 90;

/// Tune by 5% each time
pub const ADJUSTMENT_FACTOR_PERCENT: u64 = 5;

/// Default memtable size (64 MiB)
pub const DEFAULT_MEM_TABLE_SIZE: u64 = 64 << 20;

/// Default shared limiter rate (100 MiB/s)
pub const DEFAULT_RATE_LIMIT: u64 = 100 << 20;

/// Bytes of progress that force a snapshot refresh for a given memtable size
pub fn refresh_bytes(mem_table_size: u64) -> u64 {
    mem_table_size.saturating_mul(REFRESH_BYTES_PERCENT) / 100
}

/// Dirty-byte level at or below which flushes are throttled
pub fn flush_slowdown_threshold(mem_table_size: u64) -> u64 {
    mem_table_size.saturating_mul(FLUSH_SLOWDOWN_PERCENT) / 100
}

/// Which policy paces compactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompactionPacing {
    /// No pacing
    #[default]
    Disabled,
    /// Throttle while compaction debt is below the slowdown threshold
    DebtBased,
    /// Self-tuning rate driven by observed limiter utilization
    AutoTuned,
}

/// How the flush pacer derives dirty bytes when a stale snapshot is smaller
/// than the flush's own progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirtyBytesMode {
    /// Clamp at zero: a drained memtable list counts as no pressure
    #[default]
    Saturating,
    /// Wrap around: underflow becomes huge pressure and disables throttling
    Wrapping,
}

/// Tuning knobs for the auto-tuned compaction pacer
#[derive(Debug, Clone)]
pub struct AutoTuneConfig {
    /// Rate floor (bytes/sec)
    pub min_rate: u64,

    /// Rate ceiling and starting rate (bytes/sec)
    pub max_rate: u64,

    /// Length of one accounting window
    pub recalculate_interval: Duration,

    /// Utilization below which the rate is lowered
    pub low_watermark_percent: u64,

    /// Utilization above which the rate is raised
    pub high_watermark_percent: u64,

    /// Step applied on each adjustment
    pub adjustment_percent: u64,
}

impl Default for AutoTuneConfig {
    fn default() -> Self {
        Self {
            min_rate: MINIMUM_RATE,
            max_rate: MAXIMUM_RATE,
            recalculate_interval: RECALCULATE_INTERVAL,
            low_watermark_percent: LOW_WATERMARK_PERCENT,
            high_watermark_percent: HIGH_WATERMARK_PERCENT,
            adjustment_percent: ADJUSTMENT_FACTOR_PERCENT,
        }
    }
}

impl AutoTuneConfig {
    /// Set the rate bounds
    pub fn with_rate_bounds(mut self, min_rate: u64, max_rate: u64) -> Self {
        self.min_rate = min_rate;
        self.max_rate = max_rate;
        self
    }

    /// Set the recalculation interval
    pub fn with_recalculate_interval(mut self, interval: Duration) -> Self {
        self.recalculate_interval = interval;
        self
    }

    /// Set the hysteresis band
    pub fn with_watermarks(mut self, low_percent: u64, high_percent: u64) -> Self {
        self.low_watermark_percent = low_percent;
        self.high_watermark_percent = high_percent;
        self
    }

    /// Set the adjustment step
    pub fn with_adjustment_percent(mut self, percent: u64) -> Self {
        self.adjustment_percent = percent;
        self
    }

    /// Check bounds and band
    pub fn validate(&self) -> PacerResult<()> {
        if self.min_rate < REFILLS_PER_SECOND {
            return Err(PacerError::Config(format!(
                "auto-tune min_rate must be at least {} bytes/sec, got {}",
                REFILLS_PER_SECOND, self.min_rate
            )));
        }
        if self.min_rate > self.max_rate {
            return Err(PacerError::Config(format!(
                "auto-tune min_rate {} exceeds max_rate {}",
                self.min_rate, self.max_rate
            )));
        }
        if self.recalculate_interval.is_zero() {
            return Err(PacerError::Config(
                "auto-tune recalculate_interval must be non-zero".to_string(),
            ));
        }
        if self.low_watermark_percent >= self.high_watermark_percent {
            return Err(PacerError::Config(format!(
                "auto-tune low watermark {}% must be below high watermark {}%",
                self.low_watermark_percent, self.high_watermark_percent
            )));
        }
        if self.adjustment_percent == 0 || self.adjustment_percent >= 100 {
            return Err(PacerError::Config(format!(
                "auto-tune adjustment must be within 1..100 percent, got {}",
                self.adjustment_percent
            )));
        }
        Ok(())
    }
}

/// Configuration for compaction and flush pacing
#[derive(Debug, Clone)]
pub struct PacerConfig {
    /// Configured memtable size (bytes)
    pub mem_table_size: u64,

    /// Shared limiter rate (bytes/sec)
    pub rate_limit: u64,

    /// Shared limiter burst (bytes, 0 = one refill period of `rate_limit`)
    pub burst: u64,

    /// Compaction pacing policy
    pub compaction_pacing: CompactionPacing,

    /// Enable flush pacing
    pub flush_pacing: bool,

    /// Dirty-byte derivation for the flush pacer
    pub dirty_bytes_mode: DirtyBytesMode,

    /// Auto-tuned policy knobs
    pub auto_tune: AutoTuneConfig,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            mem_table_size: DEFAULT_MEM_TABLE_SIZE,
            rate_limit: DEFAULT_RATE_LIMIT,
            burst: 0,
            compaction_pacing: CompactionPacing::Disabled,
            flush_pacing: false,
            dirty_bytes_mode: DirtyBytesMode::Saturating,
            auto_tune: AutoTuneConfig::default(),
        }
    }
}

impl PacerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the memtable size
    pub fn with_mem_table_size(mut self, size: u64) -> Self {
        self.mem_table_size = size;
        self
    }

    /// Set the shared limiter rate
    pub fn with_rate_limit(mut self, rate: u64) -> Self {
        self.rate_limit = rate;
        self
    }

    /// Set the shared limiter burst
    pub fn with_burst(mut self, burst: u64) -> Self {
        self.burst = burst;
        self
    }

    /// Select the compaction pacing policy
    pub fn with_compaction_pacing(mut self, pacing: CompactionPacing) -> Self {
        self.compaction_pacing = pacing;
        self
    }

    /// Enable or disable flush pacing
    pub fn with_flush_pacing(mut self, enabled: bool) -> Self {
        self.flush_pacing = enabled;
        self
    }

    /// Set the dirty-byte derivation
    pub fn with_dirty_bytes_mode(mut self, mode: DirtyBytesMode) -> Self {
        self.dirty_bytes_mode = mode;
        self
    }

    /// Set the auto-tune knobs
    pub fn with_auto_tune(mut self, auto_tune: AutoTuneConfig) -> Self {
        self.auto_tune = auto_tune;
        self
    }

    /// Burst actually used by the shared limiter
    pub fn effective_burst(&self) -> u64 {
        if self.burst == 0 {
            (self.rate_limit / REFILLS_PER_SECOND).max(1)
        } else {
            self.burst
        }
    }

    /// Create the limiter shared by every pacer built from this config
    pub fn build_limiter(&self) -> TokenBucketLimiter {
        TokenBucketLimiter::new(self.rate_limit, self.effective_burst())
    }

    /// Check the configuration
    pub fn validate(&self) -> PacerResult<()> {
        if self.mem_table_size == 0 {
            return Err(PacerError::Config(
                "mem_table_size must be non-zero".to_string(),
            ));
        }
        if self.rate_limit == 0 {
            return Err(PacerError::Config("rate_limit must be non-zero".to_string()));
        }
        if self.compaction_pacing == CompactionPacing::AutoTuned {
            self.auto_tune.validate()?;
        }
        Ok(())
    }
}
