//! Single-request execution with identity rotation and block recovery.
//!
//! Attempt loop:
//! 1. Rotate the identity when the policy reports a crossed request boundary.
//! 2. Wait on the pacer unless the request carries its own timeout.
//! 3. Send the GET with the current identity headers.
//! 4. Classify: 2xx decodes the body, 403/429 rotates (and on a long enough
//!    failure streak clears cookies), backs off and retries, anything else
//!    ends the request as failed.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::time::{Instant, sleep};

use super::transport::{HttpTransport, TransportRequest};
use super::types::{ExecutionResult, RequestDescriptor, RequestFailure};
use crate::identity::{IdentityError, IdentityRotator};
use crate::modules::events::{
    CookieResetEvent, EventDispatcher, FailureEvent, FetchEvent, RequestEvent, ResponseEvent,
    RetryEvent, RotationReason,
};
use crate::modules::pacing::{BackoffPolicy, RequestPacer};
use crate::modules::rotation::{Escalation, RotationPolicy};

/// Errors that stop execution altogether instead of failing one request.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("identity configuration error: {0}")]
    Identity(#[from] IdentityError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Success,
    Blocked,
    Rejected,
}

fn classify(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        403 | 429 => StatusClass::Blocked,
        _ => StatusClass::Rejected,
    }
}

/// Runs descriptors against the transport, one retry loop per descriptor.
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    rotator: Arc<IdentityRotator>,
    policy: Arc<RotationPolicy>,
    pacer: Arc<dyn RequestPacer>,
    backoff: BackoffPolicy,
    max_block_retries: Option<u32>,
    events: Arc<EventDispatcher>,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        rotator: Arc<IdentityRotator>,
        policy: Arc<RotationPolicy>,
        pacer: Arc<dyn RequestPacer>,
        events: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            transport,
            rotator,
            policy,
            pacer,
            backoff: BackoffPolicy::default(),
            max_block_retries: None,
            events,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// `None` keeps retrying blocked requests for as long as they stay blocked.
    pub fn with_max_block_retries(mut self, retries: Option<u32>) -> Self {
        self.max_block_retries = retries;
        self
    }

    pub fn rotator(&self) -> &Arc<IdentityRotator> {
        &self.rotator
    }

    pub fn policy(&self) -> &Arc<RotationPolicy> {
        &self.policy
    }

    /// Executes one descriptor until it succeeds, fails, or runs out of
    /// retries. Only identity configuration problems are returned as errors.
    pub async fn send(
        &self,
        index: usize,
        descriptor: &RequestDescriptor,
    ) -> Result<ExecutionResult, ExecutionError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            if self.policy.should_rotate() {
                self.rotator.rotate(RotationReason::Threshold)?;
            }

            if descriptor.timeout_override.is_none() {
                self.pacer.pace().await;
            }

            let identity = self.rotator.current();
            self.events.dispatch(FetchEvent::Request(RequestEvent {
                url: descriptor.url.clone(),
                attempt,
                signature: identity.profile.signature.clone(),
                timestamp: chrono::Utc::now(),
            }));

            let started = Instant::now();
            let outcome = self
                .transport
                .get(TransportRequest {
                    url: &descriptor.url,
                    params: &descriptor.params,
                    headers: &identity.headers,
                    timeout: descriptor.timeout_override,
                })
                .await;
            self.policy.on_request_sent();

            let response = match outcome {
                Ok(response) => response,
                Err(err) => return Ok(self.fail(index, descriptor, attempt, err.into())),
            };

            self.events.dispatch(FetchEvent::Response(ResponseEvent {
                url: descriptor.url.clone(),
                status: response.status,
                latency: started.elapsed(),
                timestamp: chrono::Utc::now(),
            }));

            match classify(response.status) {
                StatusClass::Success => {
                    self.policy.on_success();
                    return Ok(match serde_json::from_slice::<Value>(&response.body) {
                        Ok(body) => ExecutionResult::success(index, attempt, body),
                        Err(err) => self.fail(
                            index,
                            descriptor,
                            attempt,
                            RequestFailure::Decode(err.to_string()),
                        ),
                    });
                }
                StatusClass::Rejected => {
                    return Ok(self.fail(
                        index,
                        descriptor,
                        attempt,
                        RequestFailure::Status(response.status),
                    ));
                }
                StatusClass::Blocked => {
                    self.recover_from_block(descriptor)?;

                    if let Some(limit) = self.max_block_retries
                        && attempt > limit
                    {
                        return Ok(self.fail(
                            index,
                            descriptor,
                            attempt,
                            RequestFailure::RetriesExhausted {
                                attempts: attempt,
                                status: response.status,
                            },
                        ));
                    }

                    let wait = self.backoff.next_delay(descriptor.timeout_override);
                    self.events.dispatch(FetchEvent::Retry(RetryEvent {
                        url: descriptor.url.clone(),
                        attempt: attempt + 1,
                        status: response.status,
                        scheduled_after: wait,
                        timestamp: chrono::Utc::now(),
                    }));
                    if wait > Duration::ZERO {
                        sleep(wait).await;
                    }
                }
            }
        }
    }

    fn recover_from_block(&self, descriptor: &RequestDescriptor) -> Result<(), IdentityError> {
        if self.policy.on_failure() == Escalation::RotateAndResetCookies {
            self.events.dispatch(FetchEvent::CookieReset(CookieResetEvent {
                url: descriptor.url.clone(),
                timestamp: chrono::Utc::now(),
            }));
            if let Err(err) = self.transport.clear_cookies() {
                log::warn!("cookie reset failed, keeping current jar: {err}");
            }
        }
        self.rotator.rotate(RotationReason::Blocked)?;
        Ok(())
    }

    fn fail(
        &self,
        index: usize,
        descriptor: &RequestDescriptor,
        attempt: u32,
        failure: RequestFailure,
    ) -> ExecutionResult {
        self.events.dispatch(FetchEvent::Failure(FailureEvent {
            url: descriptor.url.clone(),
            reason: failure.to_string(),
            timestamp: chrono::Utc::now(),
        }));
        ExecutionResult::failure(index, attempt, failure)
    }
}
