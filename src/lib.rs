//! lsm-pacer - background I/O pacing for an LSM-tree storage engine
//!
//! Throttles compaction and memtable flush so background maintenance does not
//! starve foreground traffic, without throttling so hard that it falls behind
//! and stalls writes.
//!
//! Features:
//! - Debt-driven compaction pacing and dirty-byte-driven flush pacing with
//!   amortized engine-state refresh
//! - Self-tuning compaction pacing from observed limiter utilization
//! - Shared, cancellable token-bucket limiter

pub mod cancel;
pub mod config;
pub mod error;
pub mod levels;
pub mod limiter;
pub mod metrics;
pub mod pacer;

pub use cancel::CancelSignal;
pub use config::{AutoTuneConfig, CompactionPacing, DirtyBytesMode, PacerConfig};
pub use error::{PacerError, PacerResult};
pub use limiter::{RateLimiter, TokenBucketLimiter, TunableRateLimiter};
pub use metrics::{PacerMetrics, PacerMetricsSnapshot};
pub use pacer::{
    new_compaction_pacer, new_flush_pacer, AutoTunedCompactionPacer, CompactionPacer,
    CompactionPacerEnv, CompactionPacerInfo, FlushPacer, FlushPacerEnv, FlushPacerInfo, NoopPacer,
    Pacer,
};
