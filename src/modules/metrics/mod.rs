//! Metrics collection utilities.
//!
//! Aggregates attempt, response, rotation and backoff counters with latency
//! percentiles for observability.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Point-in-time copy of the collected counters.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub attempts: u64,
    pub responses: u64,
    pub successes: u64,
    pub blocked: u64,
    pub rejected: u64,
    pub failures: u64,
    pub rotations: u64,
    pub cookie_resets: u64,
    pub backoffs: u64,
    pub total_backoff: Duration,
    pub batches: u64,
    pub batched_requests: u64,
    pub status_counts: BTreeMap<u16, u64>,
    pub average_latency: Option<Duration>,
    pub p95_latency: Option<Duration>,
}

#[derive(Debug)]
struct MetricsState {
    started_at: DateTime<Utc>,
    attempts: u64,
    responses: u64,
    successes: u64,
    blocked: u64,
    rejected: u64,
    failures: u64,
    rotations: u64,
    cookie_resets: u64,
    backoffs: u64,
    total_backoff: Duration,
    batches: u64,
    batched_requests: u64,
    status_counts: BTreeMap<u16, u64>,
    latencies: VecDeque<Duration>,
    max_window: usize,
}

impl MetricsState {
    fn new(max_window: usize) -> Self {
        Self {
            started_at: Utc::now(),
            attempts: 0,
            responses: 0,
            successes: 0,
            blocked: 0,
            rejected: 0,
            failures: 0,
            rotations: 0,
            cookie_resets: 0,
            backoffs: 0,
            total_backoff: Duration::ZERO,
            batches: 0,
            batched_requests: 0,
            status_counts: BTreeMap::new(),
            latencies: VecDeque::with_capacity(max_window),
            max_window,
        }
    }

    fn latency_stats(&self) -> (Option<Duration>, Option<Duration>) {
        if self.latencies.is_empty() {
            return (None, None);
        }
        let mut samples: Vec<_> = self.latencies.iter().cloned().collect();
        samples.sort_unstable();
        let avg = samples.iter().map(|d| d.as_secs_f64()).sum::<f64>() / samples.len() as f64;
        let p95_index = ((samples.len() as f64 * 0.95).ceil() as usize).saturating_sub(1);
        (Some(Duration::from_secs_f64(avg)), Some(samples[p95_index]))
    }
}

/// Thread-safe metrics collector shared by the execution layer.
#[derive(Clone, Debug)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState::new(128))),
        }
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState::new(window.max(16)))),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MetricsState) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn record_attempt(&self) {
        self.with_state(|state| state.attempts += 1);
    }

    pub fn record_response(&self, status: u16, latency: Duration) {
        self.with_state(|state| {
            state.responses += 1;
            *state.status_counts.entry(status).or_insert(0) += 1;
            match status {
                200..=299 => state.successes += 1,
                403 | 429 => state.blocked += 1,
                _ => state.rejected += 1,
            }
            if state.latencies.len() == state.max_window {
                state.latencies.pop_front();
            }
            state.latencies.push_back(latency);
        });
    }

    pub fn record_failure(&self) {
        self.with_state(|state| state.failures += 1);
    }

    pub fn record_rotation(&self) {
        self.with_state(|state| state.rotations += 1);
    }

    pub fn record_cookie_reset(&self) {
        self.with_state(|state| state.cookie_resets += 1);
    }

    pub fn record_backoff(&self, wait: Duration) {
        self.with_state(|state| {
            state.backoffs += 1;
            state.total_backoff += wait;
        });
    }

    pub fn record_batch(&self, size: usize) {
        self.with_state(|state| {
            state.batches += 1;
            state.batched_requests += size as u64;
        });
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.with_state(|state| {
            let (average_latency, p95_latency) = state.latency_stats();
            MetricsSnapshot {
                started_at: state.started_at,
                attempts: state.attempts,
                responses: state.responses,
                successes: state.successes,
                blocked: state.blocked,
                rejected: state.rejected,
                failures: state.failures,
                rotations: state.rotations,
                cookie_resets: state.cookie_resets,
                backoffs: state.backoffs,
                total_backoff: state.total_backoff,
                batches: state.batches,
                batched_requests: state.batched_requests,
                status_counts: state.status_counts.clone(),
                average_latency,
                p95_latency,
            }
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
