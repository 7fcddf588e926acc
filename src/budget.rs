//! Time budgets and cooperative cancellation for long-running strategies.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::time::{Duration, Instant};

/// Cancellation flag shared between a caller and its workers.
#[derive(Clone, Default, Debug)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Relaxed)
    }

    #[inline]
    pub fn request_stop(&self) {
        self.0.store(true, Relaxed)
    }
}

/// Wall-clock budget for a single planning call.
///
/// Strategies poll [`TimeBudget::is_exhausted`] between units of work and return their
/// best feasible answer once it flips.
#[derive(Debug, Clone)]
pub struct TimeBudget {
    started: Instant,
    limit: Option<Duration>,
    stop: StopToken,
}

impl Default for TimeBudget {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl TimeBudget {
    pub fn new(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit: Some(limit),
            stop: StopToken::new(),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            started: Instant::now(),
            limit: None,
            stop: StopToken::new(),
        }
    }

    pub fn from_millis(limit_ms: Option<u64>) -> Self {
        match limit_ms {
            Some(ms) => Self::new(Duration::from_millis(ms)),
            None => Self::unbounded(),
        }
    }

    /// Share an external token so the caller can cancel the run early.
    pub fn with_stop_token(mut self, stop: StopToken) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_token(&self) -> &StopToken {
        &self.stop
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the deadline; `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.limit.map(|limit| limit.saturating_sub(self.started.elapsed()))
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        if self.stop.is_set() {
            return true;
        }
        match self.limit {
            Some(limit) => self.started.elapsed() >= limit,
            None => false,
        }
    }
}
