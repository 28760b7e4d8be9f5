//! Settings and configuration module
//!
//! Provides:
//! - [`FetchConfig`], the validated runtime configuration
//! - [`FetchSettings`], its serde form for JSON configuration files
//! - Validation shared by both paths

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::core::SeedCookie;

pub const DEFAULT_BASE_URL: &str = "https://gmgn.ai/defi/quotation";
pub const DEFAULT_REFERER: &str = "https://gmgn.ai/?chain=sol";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name} range: min {min} is greater than max {max}")]
    InvalidRange {
        name: &'static str,
        min: String,
        max: String,
    },
    #[error("{0} must be at least 1")]
    ZeroThreshold(&'static str),
    #[error("{0} must be a finite, non-negative number of seconds")]
    InvalidDuration(&'static str),
    #[error("invalid base url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("base url '{0}' has no host")]
    MissingHost(String),
    #[error("I/O error reading {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("config JSON invalid: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Runtime configuration of the request-execution layer.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub base_url: Url,
    pub referer: String,
    pub rotation_threshold: RangeInclusive<u32>,
    pub escalation_threshold: u32,
    pub min_request_interval: Duration,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub request_timeout: Duration,
    /// `None` retries blocked requests without limit.
    pub max_block_retries: Option<u32>,
    pub seed_cookies: Vec<SeedCookie>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url is valid"),
            referer: DEFAULT_REFERER.into(),
            rotation_threshold: 1..=10,
            escalation_threshold: 3,
            min_request_interval: Duration::from_secs(2),
            backoff_min: Duration::from_secs(5),
            backoff_max: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            max_block_retries: Some(8),
            seed_cookies: Vec::new(),
        }
    }
}

impl FetchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (min, max) = (
            *self.rotation_threshold.start(),
            *self.rotation_threshold.end(),
        );
        if min == 0 {
            return Err(ConfigError::ZeroThreshold("rotation threshold"));
        }
        if min > max {
            return Err(ConfigError::InvalidRange {
                name: "rotation threshold",
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        if self.escalation_threshold == 0 {
            return Err(ConfigError::ZeroThreshold("escalation threshold"));
        }
        if self.backoff_min > self.backoff_max {
            return Err(ConfigError::InvalidRange {
                name: "backoff",
                min: format!("{:?}", self.backoff_min),
                max: format!("{:?}", self.backoff_max),
            });
        }
        if self.base_url.host_str().is_none() {
            return Err(ConfigError::MissingHost(self.base_url.to_string()));
        }
        Ok(())
    }

    /// Host the identity headers announce, taken from the base url.
    pub fn host(&self) -> Result<String, ConfigError> {
        self.base_url
            .host_str()
            .map(str::to_string)
            .ok_or_else(|| ConfigError::MissingHost(self.base_url.to_string()))
    }
}

/// File representation of [`FetchConfig`]. Durations are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchSettings {
    pub base_url: String,
    pub referer: String,
    pub rotation_threshold_min: u32,
    pub rotation_threshold_max: u32,
    pub escalation_threshold: u32,
    pub min_request_interval_secs: f64,
    pub backoff_min_secs: f64,
    pub backoff_max_secs: f64,
    pub request_timeout_secs: f64,
    pub max_block_retries: Option<u32>,
    pub cookies: BTreeMap<String, String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            referer: DEFAULT_REFERER.into(),
            rotation_threshold_min: 1,
            rotation_threshold_max: 10,
            escalation_threshold: 3,
            min_request_interval_secs: 2.0,
            backoff_min_secs: 5.0,
            backoff_max_secs: 10.0,
            request_timeout_secs: 5.0,
            max_block_retries: Some(8),
            cookies: BTreeMap::new(),
        }
    }
}

impl FetchSettings {
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn into_config(self) -> Result<FetchConfig, ConfigError> {
        let config = FetchConfig {
            base_url: Url::parse(&self.base_url)?,
            referer: self.referer,
            rotation_threshold: self.rotation_threshold_min..=self.rotation_threshold_max,
            escalation_threshold: self.escalation_threshold,
            min_request_interval: secs(
                "min_request_interval_secs",
                self.min_request_interval_secs,
            )?,
            backoff_min: secs("backoff_min_secs", self.backoff_min_secs)?,
            backoff_max: secs("backoff_max_secs", self.backoff_max_secs)?,
            request_timeout: secs("request_timeout_secs", self.request_timeout_secs)?,
            max_block_retries: self.max_block_retries,
            seed_cookies: self
                .cookies
                .into_iter()
                .map(|(name, value)| SeedCookie::new(name, value))
                .collect(),
        };
        config.validate()?;
        Ok(config)
    }
}

fn secs(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidDuration(name))
}
