//! Request rate limiting.
//!
//! Two independent layers share one implementation:
//! - [`FixedWindowLimiter`] keyed by client IP, applied before authentication
//! - [`SlidingWindowLimiter`] keyed by API key, applied after authentication
//!
//! Each layer owns its own [`RateStore`], so counters and window policies
//! never interact.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{AdmissionError, RateLimitScope};
use crate::observability::metrics;
use crate::security::clock::Clock;
use crate::security::store::{RateDecision, RateStore};

/// Ceiling and window length for one limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RatePolicy {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self::new(50, Duration::from_secs(15 * 60))
    }
}

/// Per-key window bookkeeping.
pub trait WindowState: Default + Send + 'static {
    /// Record `now` if the policy allows it.
    fn admit(&mut self, now: Instant, policy: RatePolicy) -> RateDecision;
}

/// Arrival instants inside the trailing window, oldest first.
#[derive(Debug, Default)]
pub struct SlidingWindow {
    timestamps: VecDeque<Instant>,
}

impl WindowState for SlidingWindow {
    fn admit(&mut self, now: Instant, policy: RatePolicy) -> RateDecision {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= policy.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }

        if self.timestamps.len() >= policy.max_requests as usize {
            let retry_after = match self.timestamps.front() {
                Some(&oldest) => until_window_end(oldest, now, policy.window),
                None => policy.window,
            };
            return Err(retry_after);
        }

        self.timestamps.push_back(now);
        Ok(())
    }
}

/// Time from `now` until a window opened at `start` closes. A window too long
/// to represent as an `Instant` reports its full length.
fn until_window_end(start: Instant, now: Instant, window: Duration) -> Duration {
    start
        .checked_add(window)
        .map_or(window, |end| end.saturating_duration_since(now))
}

/// Counter that resets when its window elapses.
#[derive(Debug, Default)]
pub struct FixedWindow {
    started: Option<Instant>,
    count: u32,
}

impl WindowState for FixedWindow {
    fn admit(&mut self, now: Instant, policy: RatePolicy) -> RateDecision {
        let started = match self.started {
            Some(started) if now.saturating_duration_since(started) < policy.window => started,
            _ => {
                self.started = Some(now);
                self.count = 0;
                now
            }
        };

        if self.count >= policy.max_requests {
            return Err(until_window_end(started, now, policy.window));
        }

        self.count += 1;
        Ok(())
    }
}

/// Rate limiter over an injected store and clock.
pub struct RateLimiter<W: WindowState> {
    scope: RateLimitScope,
    policy: RatePolicy,
    store: Arc<dyn RateStore<W>>,
    clock: Arc<dyn Clock>,
}

/// Per-API-key limiter; the window trails "now" continuously.
pub type SlidingWindowLimiter = RateLimiter<SlidingWindow>;

/// Per-IP limiter with fixed window boundaries.
pub type FixedWindowLimiter = RateLimiter<FixedWindow>;

impl<W: WindowState> RateLimiter<W> {
    pub fn new(
        scope: RateLimitScope,
        policy: RatePolicy,
        store: Arc<dyn RateStore<W>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            scope,
            policy,
            store,
            clock,
        }
    }

    pub fn policy(&self) -> RatePolicy {
        self.policy
    }

    /// Count one request for `key`, or reject it with the time to wait.
    pub fn check(&self, key: &str) -> Result<(), AdmissionError> {
        let now = self.clock.now();
        let policy = self.policy;

        self.store
            .with_entry(key, now, &mut |state: &mut W| state.admit(now, policy))
            .map_err(|retry_after| AdmissionError::RateLimited {
                scope: self.scope,
                limit: policy.max_requests,
                window: policy.window,
                retry_after,
            })
    }

    /// Drop keys that have been idle for a full window.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let removed = match now.checked_sub(self.policy.window) {
            Some(cutoff) => self.store.sweep(cutoff),
            None => 0,
        };
        metrics::record_rate_limit_entries(self.scope.as_str(), self.tracked_keys());
        removed
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }
}
