//! # walletwave-fetch
//!
//! Resilient request execution for the GMGN wallet-data API.
//!
//! Requests go out under a rotating browser identity. Blocked responses
//! (403/429) trigger an identity change, a randomized backoff and, after a
//! streak of failures, a fresh cookie jar. Queued requests run concurrently
//! and come back in the order they were queued.
//!
//! ## Features
//!
//! - Browser identity catalog with generated User-Agent strings
//! - Threshold-based identity rotation with cookie-reset escalation
//! - Fixed request spacing and randomized backoff on blocks
//! - Batch queue with concurrent execution and an optional deadline
//! - Event handlers for logging and metrics
//! - Typed GMGN endpoints and repository lookups
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use walletwave_fetch::{Direction, Fetcher, GmgnRepository, Timeframe, WalletTag};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = GmgnRepository::new(Arc::new(Fetcher::new()?));
//!     let wallets = repo
//!         .trending_wallets(Timeframe::SevenDays, WalletTag::SmartDegen, Direction::Desc)
//!         .await?;
//!     println!("{wallets}");
//!     Ok(())
//! }
//! ```

mod fetcher;

pub mod config;
pub mod core;
pub mod gmgn;
pub mod identity;
pub mod modules;

pub use crate::fetcher::{FetchError, FetchResult, Fetcher, FetcherBuilder};

pub use crate::config::{ConfigError, FetchConfig, FetchSettings};

pub use crate::core::{
    BatchRunner,
    ExecutionError,
    ExecutionResult,
    HttpTransport,
    RequestDescriptor,
    RequestExecutor,
    RequestFailure,
    ReqwestTransport,
    SeedCookie,
    TransportError,
    TransportRequest,
    TransportResponse,
};

pub use crate::gmgn::{
    Direction,
    GmgnEndpoint,
    GmgnRepository,
    Period,
    RepositoryError,
    Timeframe,
    WalletTag,
};

pub use crate::identity::{
    ActiveIdentity,
    CatalogEntry,
    IdentityError,
    IdentityProfile,
    IdentityProvider,
    IdentityRotator,
    SiteHeaders,
    TemplateUserAgentGenerator,
    UserAgentGenerator,
};

pub use crate::modules::{
    EventDispatcher,
    EventHandler,
    FetchEvent,
    MetricsCollector,
    MetricsSnapshot,
    RequestPacer,
    RotationCounters,
    RotationPolicy,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
