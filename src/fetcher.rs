//! High level fetcher orchestration.
//!
//! Wires the identity rotator, rotation policy, pacing, transport and batch
//! runner together behind one builder-constructed entry point.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::config::{ConfigError, FetchConfig};
use crate::core::{
	BatchRunner, ExecutionError, ExecutionResult, HttpTransport, RequestDescriptor,
	RequestExecutor, RequestFailure, ReqwestTransport, SeedCookie,
};
use crate::gmgn::RepositoryError;
use crate::identity::rotator::SiteHeaders;
use crate::identity::{
	ActiveIdentity, CatalogEntry, IdentityError, IdentityProvider, IdentityRotator,
	TemplateUserAgentGenerator, UserAgentGenerator, default_catalog,
};
use crate::modules::events::{EventDispatcher, EventHandler};
use crate::modules::metrics::{MetricsCollector, MetricsSnapshot};
use crate::modules::pacing::{BackoffPolicy, FixedDelayPacer, NoopPacer, RequestPacer};
use crate::modules::rotation::{RotationCounters, RotationPolicy};

/// Result alias used across the orchestration layer.
pub type FetchResult<T> = Result<T, FetchError>;

/// High-level error surfaced by the fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
	#[error("http client error: {0}")]
	Http(#[from] reqwest::Error),
	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),
	#[error("identity configuration error: {0}")]
	Identity(#[from] IdentityError),
	#[error("execution aborted: {0}")]
	Execution(#[from] ExecutionError),
	#[error("url parse error: {0}")]
	Url(#[from] url::ParseError),
	#[error("repository error: {0}")]
	Repository(#[from] RepositoryError),
	#[error("request failed: {0}")]
	Request(RequestFailure),
}

/// Fluent builder for [`Fetcher`].
pub struct FetcherBuilder {
	config: FetchConfig,
	catalog: Option<Vec<CatalogEntry>>,
	generator: Option<Arc<dyn UserAgentGenerator>>,
	transport: Option<Arc<dyn HttpTransport>>,
	pacer: Option<Arc<dyn RequestPacer>>,
	handlers: Vec<Arc<dyn EventHandler>>,
}

impl FetcherBuilder {
	pub fn new() -> Self {
		Self {
			config: FetchConfig::default(),
			catalog: None,
			generator: None,
			transport: None,
			pacer: None,
			handlers: Vec::new(),
		}
	}

	pub fn with_config(mut self, config: FetchConfig) -> Self {
		self.config = config;
		self
	}

	pub fn with_base_url(mut self, base_url: Url) -> Self {
		self.config.base_url = base_url;
		self
	}

	pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
		self.config.referer = referer.into();
		self
	}

	pub fn with_rotation_threshold(mut self, min: u32, max: u32) -> Self {
		self.config.rotation_threshold = min..=max;
		self
	}

	pub fn with_escalation_threshold(mut self, threshold: u32) -> Self {
		self.config.escalation_threshold = threshold;
		self
	}

	pub fn with_min_request_interval(mut self, interval: Duration) -> Self {
		self.config.min_request_interval = interval;
		self
	}

	pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
		self.config.backoff_min = min;
		self.config.backoff_max = max;
		self
	}

	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.config.request_timeout = timeout;
		self
	}

	pub fn with_max_block_retries(mut self, retries: Option<u32>) -> Self {
		self.config.max_block_retries = retries;
		self
	}

	pub fn with_seed_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.config.seed_cookies.push(SeedCookie::new(name, value));
		self
	}

	pub fn with_catalog(mut self, catalog: Vec<CatalogEntry>) -> Self {
		self.catalog = Some(catalog);
		self
	}

	pub fn with_user_agent_generator(mut self, generator: Arc<dyn UserAgentGenerator>) -> Self {
		self.generator = Some(generator);
		self
	}

	pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
		self.transport = Some(transport);
		self
	}

	pub fn with_pacer(mut self, pacer: Arc<dyn RequestPacer>) -> Self {
		self.pacer = Some(pacer);
		self
	}

	pub fn disable_pacing(mut self) -> Self {
		self.pacer = Some(Arc::new(NoopPacer));
		self
	}

	pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
		self.handlers.push(handler);
		self
	}

	pub fn build(self) -> FetchResult<Fetcher> {
		Fetcher::from_builder(self)
	}
}

impl Default for FetcherBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Entry point for callers: queue descriptors, run them as a batch.
pub struct Fetcher {
	config: FetchConfig,
	runner: BatchRunner,
	metrics: MetricsCollector,
}

impl Fetcher {
	/// Construct a fetcher with default configuration.
	pub fn new() -> FetchResult<Self> {
		FetcherBuilder::new().build()
	}

	/// Obtain a builder to customise the fetcher instance.
	pub fn builder() -> FetcherBuilder {
		FetcherBuilder::new()
	}

	fn from_builder(builder: FetcherBuilder) -> FetchResult<Self> {
		let FetcherBuilder {
			config,
			catalog,
			generator,
			transport,
			pacer,
			handlers,
		} = builder;
		config.validate()?;

		let provider = IdentityProvider::new(
			catalog.unwrap_or_else(default_catalog),
			generator.unwrap_or_else(|| Arc::new(TemplateUserAgentGenerator)),
		);
		provider.validate()?;

		let metrics = MetricsCollector::new();
		let mut events = EventDispatcher::with_defaults(&metrics);
		for handler in handlers {
			events.register_handler(handler);
		}
		let events = Arc::new(events);

		let site = SiteHeaders::new(config.host()?, config.referer.clone());
		let rotator = Arc::new(IdentityRotator::new(provider, site, events.clone())?);
		let policy = Arc::new(RotationPolicy::new(
			config.rotation_threshold.clone(),
			config.escalation_threshold,
		));

		let transport: Arc<dyn HttpTransport> = match transport {
			Some(transport) => transport,
			None => Arc::new(ReqwestTransport::new(
				config.request_timeout,
				&config.base_url,
				&config.seed_cookies,
			)?),
		};
		let pacer = pacer
			.unwrap_or_else(|| Arc::new(FixedDelayPacer::new(config.min_request_interval)));

		let executor = RequestExecutor::new(transport, rotator, policy, pacer, events.clone())
			.with_backoff(BackoffPolicy::new(config.backoff_min, config.backoff_max))
			.with_max_block_retries(config.max_block_retries);

		log::debug!(
			"fetcher ready: base {} rotation {:?} escalation {}",
			config.base_url,
			config.rotation_threshold,
			config.escalation_threshold
		);

		Ok(Self {
			config,
			runner: BatchRunner::new(Arc::new(executor), events),
			metrics,
		})
	}

	pub fn config(&self) -> &FetchConfig {
		&self.config
	}

	/// Append a descriptor to the pending batch.
	pub fn enqueue(&self, descriptor: RequestDescriptor) {
		self.runner.enqueue(descriptor);
	}

	/// Parse `url` and queue it with the given query parameters.
	pub fn queue_request<I, K, V>(
		&self,
		url: &str,
		params: I,
		timeout: Option<Duration>,
	) -> FetchResult<()>
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let mut descriptor = RequestDescriptor::parse(url)?.with_params(params);
		if let Some(timeout) = timeout {
			descriptor = descriptor.with_timeout(timeout);
		}
		self.enqueue(descriptor);
		Ok(())
	}

	pub fn pending(&self) -> usize {
		self.runner.len()
	}

	/// Execute every queued request concurrently; results follow enqueue order.
	pub async fn run_all(&self) -> FetchResult<Vec<ExecutionResult>> {
		Ok(self.runner.run_all().await?)
	}

	pub async fn run_all_with_deadline(
		&self,
		deadline: Duration,
	) -> FetchResult<Vec<ExecutionResult>> {
		Ok(self.runner.run_all_with_deadline(deadline).await?)
	}

	/// Execute `descriptors` as their own batch without touching the queue.
	pub async fn run_batch(
		&self,
		descriptors: Vec<RequestDescriptor>,
	) -> FetchResult<Vec<ExecutionResult>> {
		Ok(self.runner.run_batch(descriptors).await?)
	}

	/// Execute one descriptor immediately, outside the pending batch.
	pub async fn fetch(&self, descriptor: RequestDescriptor) -> FetchResult<ExecutionResult> {
		Ok(self.runner.executor().send(0, &descriptor).await?)
	}

	pub fn metrics(&self) -> MetricsSnapshot {
		self.metrics.snapshot()
	}

	pub fn rotation_counters(&self) -> RotationCounters {
		self.runner.executor().policy().snapshot()
	}

	pub fn current_identity(&self) -> Arc<ActiveIdentity> {
		self.runner.executor().rotator().current()
	}
}
