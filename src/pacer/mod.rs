//! Flush and compaction pacers
//!
//! A pacer is applied on each iteration step of a flush or compaction so that
//! background I/O does not contend with foreground traffic. The scheduler
//! calls [`Pacer::maybe_throttle`] with the cumulative bytes the current
//! operation has produced; the pacer decides whether to wait on the shared
//! limiter or drain it without blocking.
//!
//! # Policies
//! - [`CompactionPacer`]: throttles while compaction debt is low
//! - [`FlushPacer`]: throttles while dirty memtable bytes are low
//! - [`AutoTunedCompactionPacer`]: always throttles, retuning its own rate
//! - [`NoopPacer`]: never throttles

mod internal;

pub mod auto_tuned;
pub mod compaction;
pub mod flush;

pub use auto_tuned::{AutoTunedCompactionPacer, UNBOUNDED_BURST};
pub use compaction::{CompactionInfoFn, CompactionPacer, CompactionPacerEnv, CompactionPacerInfo};
pub use flush::{FlushInfoFn, FlushPacer, FlushPacerEnv, FlushPacerInfo};

use async_trait::async_trait;

use crate::config::{CompactionPacing, PacerConfig};
use crate::error::PacerResult;

/// Rate limiter applied per iteration step of a flush or compaction
///
/// One instance per operation; `bytes_iterated` must be non-decreasing across
/// calls on the same instance.
#[async_trait]
pub trait Pacer: Send {
    /// Throttle the caller if the policy says background work is ahead
    async fn maybe_throttle(&mut self, bytes_iterated: u64) -> PacerResult<()>;
}

/// Pacer that never throttles
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPacer;

#[async_trait]
impl Pacer for NoopPacer {
    async fn maybe_throttle(&mut self, _bytes_iterated: u64) -> PacerResult<()> {
        Ok(())
    }
}

/// Build the compaction pacer selected by `config`
///
/// The debt-based policy uses `env`; the auto-tuned policy owns its limiter
/// and only borrows the env's cancel signal and metrics. Fails when the
/// auto-tune knobs do not validate.
pub fn new_compaction_pacer(
    config: &PacerConfig,
    env: CompactionPacerEnv,
) -> PacerResult<Box<dyn Pacer>> {
    let pacer: Box<dyn Pacer> = match config.compaction_pacing {
        CompactionPacing::Disabled => Box::new(NoopPacer),
        CompactionPacing::DebtBased => Box::new(CompactionPacer::new(env)),
        CompactionPacing::AutoTuned => {
            let mut pacer =
                AutoTunedCompactionPacer::new(config.auto_tune.clone())?.with_cancel(env.cancel);
            if let Some(metrics) = env.metrics {
                pacer = pacer.with_metrics(metrics);
            }
            Box::new(pacer)
        }
    };
    Ok(pacer)
}

/// Build the flush pacer selected by `config`
pub fn new_flush_pacer(config: &PacerConfig, env: FlushPacerEnv) -> Box<dyn Pacer> {
    if config.flush_pacing {
        Box::new(FlushPacer::new(
            env.with_dirty_bytes_mode(config.dirty_bytes_mode),
        ))
    } else {
        Box::new(NoopPacer)
    }
}
