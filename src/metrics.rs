//! Pacing metrics
//!
//! Lock-free counters shared by every pacer attached to the same engine, so an
//! operator can see how much background I/O went through the blocking path
//! versus the best-effort path and how often engine state was re-read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters for pacer activity
#[derive(Debug, Default)]
pub struct PacerMetrics {
    /// Bytes that went through the blocking (throttled) path
    pub throttled_bytes: AtomicU64,
    /// Bytes drained through the best-effort path
    pub best_effort_bytes: AtomicU64,
    /// Blocking limiter calls
    pub blocking_waits: AtomicU64,
    /// Total time spent in blocking waits (microseconds)
    pub wait_time_us: AtomicU64,
    /// Engine-state snapshot refreshes
    pub info_refreshes: AtomicU64,
    /// Auto-tuned rate increases
    pub rate_increases: AtomicU64,
    /// Auto-tuned rate decreases
    pub rate_decreases: AtomicU64,
}

impl PacerMetrics {
    /// Create zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record bytes pushed through the blocking path
    pub fn record_throttled(&self, bytes: u64, waits: u64, waited: Duration) {
        self.throttled_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.blocking_waits.fetch_add(waits, Ordering::Relaxed);
        self.wait_time_us
            .fetch_add(waited.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record bytes drained without blocking
    pub fn record_best_effort(&self, bytes: u64) {
        self.best_effort_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record an engine-state refresh
    pub fn record_refresh(&self) {
        self.info_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an auto-tuned rate change
    pub fn record_rate_change(&self, old_rate: u64, new_rate: u64) {
        if new_rate > old_rate {
            self.rate_increases.fetch_add(1, Ordering::Relaxed);
        } else if new_rate < old_rate {
            self.rate_decreases.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> PacerMetricsSnapshot {
        PacerMetricsSnapshot {
            throttled_bytes: self.throttled_bytes.load(Ordering::Relaxed),
            best_effort_bytes: self.best_effort_bytes.load(Ordering::Relaxed),
            blocking_waits: self.blocking_waits.load(Ordering::Relaxed),
            wait_time: Duration::from_micros(self.wait_time_us.load(Ordering::Relaxed)),
            info_refreshes: self.info_refreshes.load(Ordering::Relaxed),
            rate_increases: self.rate_increases.load(Ordering::Relaxed),
            rate_decreases: self.rate_decreases.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.throttled_bytes.store(0, Ordering::Relaxed);
        self.best_effort_bytes.store(0, Ordering::Relaxed);
        self.blocking_waits.store(0, Ordering::Relaxed);
        self.wait_time_us.store(0, Ordering::Relaxed);
        self.info_refreshes.store(0, Ordering::Relaxed);
        self.rate_increases.store(0, Ordering::Relaxed);
        self.rate_decreases.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time snapshot of pacer metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacerMetricsSnapshot {
    pub throttled_bytes: u64,
    pub best_effort_bytes: u64,
    pub blocking_waits: u64,
    pub wait_time: Duration,
    pub info_refreshes: u64,
    pub rate_increases: u64,
    pub rate_decreases: u64,
}

impl PacerMetricsSnapshot {
    /// Total bytes seen by the pacers
    pub fn total_bytes(&self) -> u64 {
        self.throttled_bytes + self.best_effort_bytes
    }

    /// Fraction of bytes that went through the blocking path
    pub fn throttled_fraction(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            return 0.0;
        }
        self.throttled_bytes as f64 / total as f64
    }
}
