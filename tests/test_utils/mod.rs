//! Shared test utilities
//!
//! Note: clippy reports false-positive dead_code warnings because it can't
//! trace usage across test binaries. These utilities are used by multiple tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use lsm_pacer::{CancelSignal, PacerResult, RateLimiter};

pub const MIB: u64 = 1 << 20;

/// Limiter that grants everything immediately and counts what it was asked for
#[derive(Debug)]
pub struct CountingLimiter {
    burst: u64,
    waited: AtomicU64,
    wait_calls: AtomicU64,
    consumed: AtomicU64,
    consume_calls: AtomicU64,
}

impl CountingLimiter {
    pub fn new(burst: u64) -> Self {
        Self {
            burst,
            waited: AtomicU64::new(0),
            wait_calls: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            consume_calls: AtomicU64::new(0),
        }
    }

    pub fn waited(&self) -> u64 {
        self.waited.load(Ordering::SeqCst)
    }

    pub fn wait_calls(&self) -> u64 {
        self.wait_calls.load(Ordering::SeqCst)
    }

    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::SeqCst)
    }

    pub fn consume_calls(&self) -> u64 {
        self.consume_calls.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> u64 {
        self.waited() + self.consumed()
    }
}

#[async_trait]
impl RateLimiter for CountingLimiter {
    async fn wait_for_tokens(&self, amount: u64, _cancel: &CancelSignal) -> PacerResult<()> {
        self.waited.fetch_add(amount, Ordering::SeqCst);
        self.wait_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn try_consume(&self, amount: u64, _now: Instant) -> bool {
        self.consumed.fetch_add(amount, Ordering::SeqCst);
        self.consume_calls.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn burst(&self) -> u64 {
        self.burst
    }
}

/// Counter for engine-state accessor invocations
#[derive(Debug, Clone, Default)]
pub struct AccessorCalls(Arc<AtomicU64>);

impl AccessorCalls {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}
