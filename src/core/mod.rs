//! Request-execution core: descriptors, transport, executor and batch runner.

pub mod batch;
pub mod executor;
pub mod reqwest_client;
pub mod transport;
pub mod types;

pub use batch::BatchRunner;
pub use executor::{ExecutionError, RequestExecutor};
pub use reqwest_client::{ReqwestTransport, SeedCookie};
pub use transport::{HttpTransport, TransportError, TransportRequest, TransportResponse};
pub use types::{ExecutionResult, RequestDescriptor, RequestFailure};

#[cfg(test)]
pub(crate) mod test_support {
    //! Scripted transport shared by the executor and batch tests.

    use super::*;
    use crate::identity::{IdentityProvider, IdentityRotator, rotator::SiteHeaders};
    use crate::modules::events::EventDispatcher;
    use crate::modules::metrics::MetricsCollector;
    use crate::modules::pacing::{BackoffPolicy, NoopPacer};
    use crate::modules::rotation::RotationPolicy;
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::HeaderMap;
    use serde_json::Value;
    use std::collections::{BTreeMap, HashMap, VecDeque};
    use std::ops::RangeInclusive;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone)]
    pub enum Reply {
        Status(u16, Bytes),
        Timeout,
        Connect,
        Delayed(Duration, Box<Reply>),
    }

    impl Reply {
        pub fn status(status: u16) -> Self {
            Reply::Status(status, Bytes::new())
        }

        pub fn json(body: Value) -> Self {
            Reply::Status(200, Bytes::from(body.to_string()))
        }

        pub fn raw(status: u16, body: &str) -> Self {
            Reply::Status(status, Bytes::from(body.to_string()))
        }

        pub fn timeout() -> Self {
            Reply::Timeout
        }

        pub fn connect_error() -> Self {
            Reply::Connect
        }

        pub fn delayed(self, wait: Duration) -> Self {
            Reply::Delayed(wait, Box::new(self))
        }
    }

    #[derive(Debug, Clone)]
    pub struct SeenRequest {
        pub path: String,
        pub headers: HeaderMap,
        pub params: BTreeMap<String, String>,
        pub timeout: Option<Duration>,
    }

    #[derive(Default)]
    pub struct ScriptedTransport {
        scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
        seen: Mutex<Vec<SeenRequest>>,
        cookie_resets: Mutex<usize>,
    }

    impl ScriptedTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn script(&self, path: &str, replies: impl IntoIterator<Item = Reply>) {
            self.scripts
                .lock()
                .unwrap()
                .entry(path.to_string())
                .or_default()
                .extend(replies);
        }

        pub fn calls(&self, path: &str) -> usize {
            self.seen.lock().unwrap().iter().filter(|s| s.path == path).count()
        }

        pub fn total_calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        pub fn timeouts(&self, path: &str) -> Vec<Option<Duration>> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.path == path)
                .map(|s| s.timeout)
                .collect()
        }

        pub fn headers(&self, path: &str) -> Vec<HeaderMap> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.path == path)
                .map(|s| s.headers.clone())
                .collect()
        }

        pub fn params(&self, path: &str) -> Vec<BTreeMap<String, String>> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.path == path)
                .map(|s| s.params.clone())
                .collect()
        }

        pub fn cookie_resets(&self) -> usize {
            *self.cookie_resets.lock().unwrap()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn get(
            &self,
            request: TransportRequest<'_>,
        ) -> Result<TransportResponse, TransportError> {
            let path = request.url.path().to_string();
            self.seen.lock().unwrap().push(SeenRequest {
                path: path.clone(),
                headers: request.headers.clone(),
                params: request.params.clone(),
                timeout: request.timeout,
            });
            let mut reply = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&path)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Reply::status(404));

            loop {
                match reply {
                    Reply::Delayed(wait, inner) => {
                        tokio::time::sleep(wait).await;
                        reply = *inner;
                    }
                    Reply::Timeout => return Err(TransportError::Timeout("deadline elapsed".into())),
                    Reply::Connect => return Err(TransportError::Connect("connection refused".into())),
                    Reply::Status(status, body) => {
                        return Ok(TransportResponse {
                            status,
                            headers: HeaderMap::new(),
                            body,
                            url: request.url.clone(),
                        });
                    }
                }
            }
        }

        fn clear_cookies(&self) -> Result<(), TransportError> {
            *self.cookie_resets.lock().unwrap() += 1;
            Ok(())
        }
    }

    pub fn executor_with(
        transport: Arc<ScriptedTransport>,
        metrics: &MetricsCollector,
        threshold_range: RangeInclusive<u32>,
    ) -> RequestExecutor {
        let events = Arc::new(EventDispatcher::with_defaults(metrics));
        let rotator = IdentityRotator::new(
            IdentityProvider::default(),
            SiteHeaders::new("gmgn.ai", "https://gmgn.ai/?chain=sol"),
            events.clone(),
        )
        .unwrap();
        RequestExecutor::new(
            transport,
            Arc::new(rotator),
            Arc::new(RotationPolicy::new(threshold_range, 3)),
            Arc::new(NoopPacer),
            events,
        )
        .with_backoff(BackoffPolicy::none())
    }
}
