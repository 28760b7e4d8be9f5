//! Event system for the request-execution layer.
//!
//! Components receive an [`EventDispatcher`] handle when they are built and
//! report what they do through it. Logging and metrics are just handlers, so
//! callers decide where records go by choosing which handlers to register.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::metrics::MetricsCollector;
use crate::identity::IdentityProfile;

/// Why the active identity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    Initial,
    Threshold,
    Blocked,
}

/// Emitted right before a network attempt.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub url: Url,
    pub attempt: u32,
    pub signature: String,
    pub timestamp: DateTime<Utc>,
}

/// Emitted once a response status is known.
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    pub url: Url,
    pub status: u16,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RotationEvent {
    pub signature: String,
    pub user_agent: String,
    pub reason: RotationReason,
    pub timestamp: DateTime<Utc>,
}

impl RotationEvent {
    pub fn new(profile: &IdentityProfile, reason: RotationReason) -> Self {
        Self {
            signature: profile.signature.clone(),
            user_agent: profile.user_agent.clone(),
            reason,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CookieResetEvent {
    pub url: Url,
    pub timestamp: DateTime<Utc>,
}

/// A blocked attempt that will be retried after `scheduled_after`.
#[derive(Debug, Clone)]
pub struct RetryEvent {
    pub url: Url,
    pub attempt: u32,
    pub status: u16,
    pub scheduled_after: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FailureEvent {
    pub url: Url,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BatchEvent {
    pub size: usize,
    pub succeeded: usize,
    pub elapsed: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum FetchEvent {
    Request(RequestEvent),
    Response(ResponseEvent),
    Rotation(RotationEvent),
    CookieReset(CookieResetEvent),
    Retry(RetryEvent),
    Failure(FailureEvent),
    EmptyBatch,
    BatchCompleted(BatchEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &FetchEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Dispatcher with the logging handler and a metrics handler feeding `metrics`.
    pub fn with_defaults(metrics: &MetricsCollector) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register_handler(Arc::new(LoggingHandler));
        dispatcher.register_handler(Arc::new(MetricsHandler::new(metrics.clone())));
        dispatcher
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: FetchEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &FetchEvent) {
        match event {
            FetchEvent::Request(request) => {
                log::debug!(
                    "-> GET {} (attempt {}, identity {})",
                    request.url,
                    request.attempt,
                    request.signature
                );
            }
            FetchEvent::Response(response) => {
                log::debug!(
                    "<- {} -> {} ({:.2}s)",
                    response.url,
                    response.status,
                    response.latency.as_secs_f64()
                );
            }
            FetchEvent::Rotation(rotation) => match rotation.reason {
                RotationReason::Initial => {
                    log::debug!("initial identity {} ({})", rotation.signature, rotation.user_agent);
                }
                RotationReason::Threshold => {
                    log::info!(
                        "request threshold reached, rotated identity -> {} ({})",
                        rotation.signature,
                        rotation.user_agent
                    );
                }
                RotationReason::Blocked => {
                    log::info!(
                        "blocked, rotated identity -> {} ({})",
                        rotation.signature,
                        rotation.user_agent
                    );
                }
            },
            FetchEvent::CookieReset(reset) => {
                log::warn!("multiple consecutive failures on {}, clearing cookies", reset.url);
            }
            FetchEvent::Retry(retry) => {
                log::warn!(
                    "received HTTP {} for {}, retry {} after {:.2}s",
                    retry.status,
                    retry.url,
                    retry.attempt,
                    retry.scheduled_after.as_secs_f64()
                );
            }
            FetchEvent::Failure(failure) => {
                log::error!("request to {} failed: {}", failure.url, failure.reason);
            }
            FetchEvent::EmptyBatch => {
                log::warn!("no pending requests to execute");
            }
            FetchEvent::BatchCompleted(batch) => {
                log::info!(
                    "batch finished: {}/{} succeeded in {:.2}s",
                    batch.succeeded,
                    batch.size,
                    batch.elapsed.as_secs_f64()
                );
            }
        }
    }
}

/// Metrics handler that feeds the metrics collector.
#[derive(Clone, Debug)]
pub struct MetricsHandler {
    metrics: MetricsCollector,
}

impl MetricsHandler {
    pub fn new(metrics: MetricsCollector) -> Self {
        Self { metrics }
    }
}

impl EventHandler for MetricsHandler {
    fn handle(&self, event: &FetchEvent) {
        match event {
            FetchEvent::Request(_) => self.metrics.record_attempt(),
            FetchEvent::Response(response) => {
                self.metrics.record_response(response.status, response.latency);
            }
            FetchEvent::Rotation(rotation) if rotation.reason != RotationReason::Initial => {
                self.metrics.record_rotation();
            }
            FetchEvent::CookieReset(_) => self.metrics.record_cookie_reset(),
            FetchEvent::Retry(retry) => self.metrics.record_backoff(retry.scheduled_after),
            FetchEvent::Failure(_) => self.metrics.record_failure(),
            FetchEvent::BatchCompleted(batch) => self.metrics.record_batch(batch.size),
            _ => {}
        }
    }
}
