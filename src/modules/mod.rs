//! Cross-cutting services module
//!
//! Supports request execution with rotation bookkeeping, pacing, events and
//! metrics. Each service is shared by handle between the executor and the
//! batch runner.

pub mod events;
pub mod metrics;
pub mod pacing;
pub mod rotation;

// Re-export commonly used types
pub use events::{
    BatchEvent, CookieResetEvent, EventDispatcher, EventHandler, FailureEvent, FetchEvent,
    LoggingHandler, MetricsHandler, RequestEvent, ResponseEvent, RetryEvent, RotationEvent,
    RotationReason,
};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use pacing::{BackoffPolicy, FixedDelayPacer, NoopPacer, RequestPacer};
pub use rotation::{Escalation, RotationCounters, RotationPolicy};
