//! Request descriptors and per-request results exchanged with callers.

use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// One logical GET request queued by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub url: Url,
    pub params: BTreeMap<String, String>,
    pub timeout_override: Option<Duration>,
}

impl RequestDescriptor {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            params: BTreeMap::new(),
            timeout_override: None,
        }
    }

    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(url)?))
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Bounds the network call by `timeout` and skips the pacing delay.
    /// A zero timeout means no override.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = (!timeout.is_zero()).then_some(timeout);
        self
    }
}

/// Why a request ended without a usable body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestFailure {
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("response body is not valid JSON: {0}")]
    Decode(String),
    #[error("still blocked (HTTP {status}) after {attempts} attempts")]
    RetriesExhausted { attempts: u32, status: u16 },
    #[error("batch deadline expired before the request completed")]
    DeadlineExceeded,
    #[error("request task aborted: {0}")]
    Aborted(String),
}

/// Outcome of one descriptor, tagged with its enqueue position.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub index: usize,
    pub body: Value,
    pub ok: bool,
    pub attempts: u32,
    pub failure: Option<RequestFailure>,
}

impl ExecutionResult {
    pub fn success(index: usize, attempts: u32, body: Value) -> Self {
        Self {
            index,
            body,
            ok: true,
            attempts,
            failure: None,
        }
    }

    pub fn failure(index: usize, attempts: u32, failure: RequestFailure) -> Self {
        Self {
            index,
            body: Value::Null,
            ok: false,
            attempts,
            failure: Some(failure),
        }
    }

    /// The body for successful results, `None` for failed ones.
    pub fn into_body(self) -> Option<Value> {
        self.ok.then_some(self.body)
    }
}
