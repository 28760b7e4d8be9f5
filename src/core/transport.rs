//! Transport abstraction used by the request executor.
//!
//! Implementations own the persistent cookie store; cookies survive between
//! calls for the lifetime of the transport and are only dropped through
//! [`HttpTransport::clear_cookies`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use thiserror::Error;
use url::Url;

use super::types::RequestFailure;

/// Borrowed view of a single GET attempt.
#[derive(Debug, Clone, Copy)]
pub struct TransportRequest<'a> {
    pub url: &'a Url,
    pub params: &'a BTreeMap<String, String>,
    pub headers: &'a HeaderMap,
    /// Replaces the transport's default timeout for this call.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub url: Url,
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("connection error: {0}")]
    Connect(String),
    #[error("{0}")]
    Other(String),
}

impl From<TransportError> for RequestFailure {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(msg) => RequestFailure::Timeout(msg),
            TransportError::Connect(msg) => RequestFailure::Connect(msg),
            TransportError::Other(msg) => RequestFailure::Transport(msg),
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, request: TransportRequest<'_>) -> Result<TransportResponse, TransportError>;

    /// Drops every stored cookie.
    fn clear_cookies(&self) -> Result<(), TransportError>;
}
