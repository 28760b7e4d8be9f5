//! Identity rotation and escalation policy.
//!
//! Decides when the active identity has to be replaced and when a failure
//! streak is long enough to also drop the session cookies. All counters live
//! behind a single lock so concurrent requests never lose a failure signal.

use rand::Rng;
use std::ops::RangeInclusive;
use std::sync::{Mutex, PoisonError};

/// Recovery action requested after a blocked response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Rotate,
    RotateAndResetCookies,
}

/// Counter values as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationCounters {
    pub requests_since_rotation: u32,
    pub rotation_threshold: u32,
    pub consecutive_errors: u32,
}

#[derive(Debug)]
struct PolicyState {
    counters: RotationCounters,
    pending_rotation: bool,
}

#[derive(Debug)]
pub struct RotationPolicy {
    threshold_range: RangeInclusive<u32>,
    escalation_threshold: u32,
    state: Mutex<PolicyState>,
}

impl RotationPolicy {
    /// `threshold_range` bounds are clamped to at least 1 so the modulo check
    /// is always defined.
    pub fn new(threshold_range: RangeInclusive<u32>, escalation_threshold: u32) -> Self {
        let min = (*threshold_range.start()).max(1);
        let max = (*threshold_range.end()).max(min);
        let threshold_range = min..=max;
        let rotation_threshold = draw_threshold(&threshold_range);
        Self {
            threshold_range,
            escalation_threshold: escalation_threshold.max(1),
            state: Mutex::new(PolicyState {
                counters: RotationCounters {
                    requests_since_rotation: 0,
                    rotation_threshold,
                    consecutive_errors: 0,
                },
                pending_rotation: false,
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut PolicyState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// True when the previous request crossed a rotation boundary. The flag is
    /// consumed, so only one of several racing callers sees it.
    pub fn should_rotate(&self) -> bool {
        self.with_state(|state| std::mem::take(&mut state.pending_rotation))
    }

    /// Counts a sent request. Crossing the boundary re-draws the threshold,
    /// resets the counter and arms the next `should_rotate`.
    pub fn on_request_sent(&self) {
        let range = &self.threshold_range;
        self.with_state(|state| {
            let counters = &mut state.counters;
            counters.requests_since_rotation = counters.requests_since_rotation.saturating_add(1);
            if counters.requests_since_rotation % counters.rotation_threshold == 0 {
                counters.rotation_threshold = draw_threshold(range);
                counters.requests_since_rotation = 0;
                state.pending_rotation = true;
            }
        });
    }

    pub fn on_success(&self) {
        self.with_state(|state| state.counters.consecutive_errors = 0);
    }

    pub fn on_failure(&self) -> Escalation {
        let threshold = self.escalation_threshold;
        self.with_state(|state| {
            let counters = &mut state.counters;
            counters.consecutive_errors = counters.consecutive_errors.saturating_add(1);
            if counters.consecutive_errors >= threshold {
                counters.consecutive_errors = 0;
                Escalation::RotateAndResetCookies
            } else {
                Escalation::Rotate
            }
        })
    }

    pub fn snapshot(&self) -> RotationCounters {
        self.with_state(|state| state.counters)
    }

    pub fn threshold_range(&self) -> RangeInclusive<u32> {
        self.threshold_range.clone()
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::new(1..=10, 3)
    }
}

fn draw_threshold(range: &RangeInclusive<u32>) -> u32 {
    rand::thread_rng().gen_range(range.clone())
}
