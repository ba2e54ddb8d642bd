//! Limiter that records calls instead of throttling (unit tests only)

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{RateLimiter, TunableRateLimiter};
use crate::cancel::CancelSignal;
use crate::error::{PacerError, PacerResult};

/// One call observed by a [`RecordingLimiter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LimiterCall {
    Wait(u64),
    TryConsume(u64),
}

#[derive(Debug, Default)]
pub(crate) struct RecordingLimiter {
    burst: Mutex<u64>,
    rate: Mutex<u64>,
    calls: Mutex<Vec<LimiterCall>>,
    /// Error returned by the n-th blocking wait (0-based)
    fail_wait_at: Option<(usize, PacerError)>,
}

impl RecordingLimiter {
    pub(crate) fn new(burst: u64) -> Self {
        Self {
            burst: Mutex::new(burst),
            rate: Mutex::new(burst.saturating_mul(10)),
            ..Default::default()
        }
    }

    pub(crate) fn failing_at(burst: u64, index: usize, err: PacerError) -> Self {
        Self {
            fail_wait_at: Some((index, err)),
            ..Self::new(burst)
        }
    }

    pub(crate) fn calls(&self) -> Vec<LimiterCall> {
        self.calls.lock().clone()
    }

    pub(crate) fn waited(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                LimiterCall::Wait(n) => Some(n),
                LimiterCall::TryConsume(_) => None,
            })
            .collect()
    }

    pub(crate) fn consumed(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                LimiterCall::TryConsume(n) => Some(n),
                LimiterCall::Wait(_) => None,
            })
            .collect()
    }

    pub(crate) fn total(&self) -> u64 {
        self.calls()
            .into_iter()
            .map(|c| match c {
                LimiterCall::Wait(n) | LimiterCall::TryConsume(n) => n,
            })
            .sum()
    }

    pub(crate) fn clear(&self) {
        self.calls.lock().clear();
    }

    pub(crate) fn set_burst(&self, burst: u64) {
        *self.burst.lock() = burst;
    }
}

#[async_trait]
impl RateLimiter for RecordingLimiter {
    async fn wait_for_tokens(&self, amount: u64, _cancel: &CancelSignal) -> PacerResult<()> {
        let mut calls = self.calls.lock();
        let index = calls
            .iter()
            .filter(|c| matches!(c, LimiterCall::Wait(_)))
            .count();
        calls.push(LimiterCall::Wait(amount));
        match &self.fail_wait_at {
            Some((at, err)) if *at == index => Err(err.clone()),
            _ => Ok(()),
        }
    }

    fn try_consume(&self, amount: u64, _now: Instant) -> bool {
        self.calls.lock().push(LimiterCall::TryConsume(amount));
        true
    }

    fn burst(&self) -> u64 {
        *self.burst.lock()
    }
}

impl TunableRateLimiter for RecordingLimiter {
    fn rate(&self) -> u64 {
        *self.rate.lock()
    }

    fn set_rate(&self, rate: u64) {
        *self.rate.lock() = rate;
    }
}
