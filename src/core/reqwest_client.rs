//! Reqwest-based implementation of the `HttpTransport` trait.
//!
//! Wraps a `reqwest::Client` with its own cookie jar. Clearing cookies builds a
//! new client around an empty jar and swaps it in; requests already in flight
//! finish on the old client.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use http::HeaderValue;
use reqwest::Client;
use reqwest::cookie::{CookieStore, Jar};
use url::Url;

use super::{HttpTransport, TransportError, TransportRequest, TransportResponse};

/// A cookie placed in the jar when the transport is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedCookie {
    pub name: String,
    pub value: String,
}

impl SeedCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Client and the jar it stores cookies in; swapped together on reset.
struct Session {
    client: Client,
    jar: Arc<Jar>,
}

/// Reqwest-backed transport used for the quotation API.
pub struct ReqwestTransport {
    timeout: Duration,
    session: RwLock<Session>,
}

impl ReqwestTransport {
    /// Creates a transport whose jar starts with `seed_cookies` scoped to
    /// `cookie_url`.
    pub fn new(
        timeout: Duration,
        cookie_url: &Url,
        seed_cookies: &[SeedCookie],
    ) -> Result<Self, reqwest::Error> {
        let jar = Jar::default();
        for cookie in seed_cookies {
            jar.add_cookie_str(&format!("{}={}", cookie.name, cookie.value), cookie_url);
        }
        Ok(Self {
            timeout,
            session: RwLock::new(build_session(timeout, jar)?),
        })
    }

    /// `Cookie` header the current jar would send to `url`.
    pub fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let jar = self
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .jar
            .clone();
        jar.cookies(url)
    }

    fn client(&self) -> Client {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .client
            .clone()
    }
}

fn build_session(timeout: Duration, jar: Jar) -> Result<Session, reqwest::Error> {
    let jar = Arc::new(jar);
    let client = Client::builder()
        .cookie_provider(jar.clone())
        .gzip(true)
        .brotli(true)
        .timeout(timeout)
        .build()?;
    Ok(Session { client, jar })
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: TransportRequest<'_>) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client()
            .get(request.url.clone())
            .headers(request.headers.clone());

        if !request.params.is_empty() {
            builder = builder.query(request.params);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(map_error)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await.map_err(map_error)?;

        Ok(TransportResponse {
            status,
            headers,
            body,
            url,
        })
    }

    fn clear_cookies(&self) -> Result<(), TransportError> {
        let fresh = build_session(self.timeout, Jar::default())
            .map_err(|err| TransportError::Other(err.to_string()))?;
        let mut guard = self.session.write().unwrap_or_else(PoisonError::into_inner);
        *guard = fresh;
        log::debug!("cookie jar replaced with an empty one");
        Ok(())
    }
}

fn map_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}
