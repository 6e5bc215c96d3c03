//! Client configuration.
//!
//! A [`ClientConfig`] is built once and then only read. There are three ways
//! to get one:
//! - a bare API key (`ClientConfig::new` / `From<&str>`), which uses the defaults
//! - [`ClientConfig::builder`], which validates every field on `build()`
//! - [`ClientConfig::from_env`] / [`ClientConfig::load`] for the binary
//!
//! Environment variables:
//! - `CAPTCHA_SOLVER_API_KEY` (required)
//! - `CAPTCHA_SOLVER_BASE_URL`
//! - `CAPTCHA_SOLVER_POLL_INTERVAL_MS`
//! - `CAPTCHA_SOLVER_MAX_POLL_ATTEMPTS`
//! - `CAPTCHA_SOLVER_CREATE_MAX_RETRIES`
//! - `CAPTCHA_SOLVER_CREATE_BASE_DELAY_MS`
//! - `CAPTCHA_SOLVER_REQUEST_TIMEOUT_MS`
//! - `CAPTCHA_SOLVER_DEBUG`

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{SolverError, SolverResult};

pub const DEFAULT_BASE_URL: &str = "https://api.yescaptcha.com";
pub const DEFAULT_USER_AGENT: &str = concat!("captcha-solver-rs/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 3000;
pub const DEFAULT_MAX_POLLING_ATTEMPTS: u32 = 60;
pub const DEFAULT_CREATE_TASK_MAX_RETRIES: u32 = 3;
pub const DEFAULT_CREATE_TASK_BASE_DELAY_MS: u64 = 3000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;

const ENV_PREFIX: &str = "CAPTCHA_SOLVER_";

/// Fully populated solver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Account key sent as `clientKey` with every request
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Identifying `User-Agent` header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-request timeout, independent of the overall polling budget
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
    #[serde(default = "default_max_polling_attempts")]
    pub max_polling_attempts: u32,
    #[serde(default = "default_create_task_max_retries")]
    pub create_task_max_retries: u32,
    #[serde(default = "default_create_task_base_delay_ms")]
    pub create_task_base_delay_ms: u64,
    /// Log phase transitions at `info` instead of `debug`
    #[serde(default)]
    pub debug: bool,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_polling_interval_ms() -> u64 {
    DEFAULT_POLLING_INTERVAL_MS
}

fn default_max_polling_attempts() -> u32 {
    DEFAULT_MAX_POLLING_ATTEMPTS
}

fn default_create_task_max_retries() -> u32 {
    DEFAULT_CREATE_TASK_MAX_RETRIES
}

fn default_create_task_base_delay_ms() -> u64 {
    DEFAULT_CREATE_TASK_BASE_DELAY_MS
}

impl ClientConfig {
    /// Configuration with every default applied.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            polling_interval_ms: DEFAULT_POLLING_INTERVAL_MS,
            max_polling_attempts: DEFAULT_MAX_POLLING_ATTEMPTS,
            create_task_max_retries: DEFAULT_CREATE_TASK_MAX_RETRIES,
            create_task_base_delay_ms: DEFAULT_CREATE_TASK_BASE_DELAY_MS,
            debug: false,
        }
    }

    pub fn builder(api_key: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::new(api_key),
        }
    }

    /// Load configuration from `CAPTCHA_SOLVER_*` environment variables.
    pub fn from_env() -> SolverResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> SolverResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, suffix)).filter(|v| !v.trim().is_empty())
        };

        let api_key = var("API_KEY").ok_or_else(|| {
            SolverError::InvalidConfig(format!("{}API_KEY is not set", ENV_PREFIX))
        })?;
        let mut builder = Self::builder(api_key);

        if let Some(url) = var("BASE_URL") {
            builder = builder.base_url(url);
        }
        if let Some(v) = var("POLL_INTERVAL_MS") {
            builder = builder.polling_interval_ms(parse_var("POLL_INTERVAL_MS", &v)?);
        }
        if let Some(v) = var("MAX_POLL_ATTEMPTS") {
            builder = builder.max_polling_attempts(parse_var("MAX_POLL_ATTEMPTS", &v)?);
        }
        if let Some(v) = var("CREATE_MAX_RETRIES") {
            builder = builder.create_task_max_retries(parse_var("CREATE_MAX_RETRIES", &v)?);
        }
        if let Some(v) = var("CREATE_BASE_DELAY_MS") {
            builder = builder.create_task_base_delay_ms(parse_var("CREATE_BASE_DELAY_MS", &v)?);
        }
        if let Some(v) = var("REQUEST_TIMEOUT_MS") {
            builder = builder.request_timeout_ms(parse_var("REQUEST_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = var("DEBUG") {
            builder = builder.debug(matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ));
        }

        builder.build()
    }

    /// Load configuration from a JSON file (camelCase keys, only `apiKey` required).
    pub fn load(path: &Path) -> SolverResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SolverError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            SolverError::InvalidConfig(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        tracing::debug!("Loaded solver config from {}", path.display());
        Ok(config)
    }

    /// Check the invariants `build()` enforces.
    pub fn validate(&self) -> SolverResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(SolverError::InvalidConfig("api key is empty".to_string()));
        }
        if self.polling_interval_ms == 0 {
            return Err(SolverError::InvalidConfig(
                "polling interval must be greater than zero".to_string(),
            ));
        }
        if self.max_polling_attempts == 0 {
            return Err(SolverError::InvalidConfig(
                "max polling attempts must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(SolverError::InvalidConfig(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        url::Url::parse(&self.base_url).map_err(|e| {
            SolverError::InvalidConfig(format!("invalid base url {:?}: {}", self.base_url, e))
        })?;
        Ok(())
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn create_task_base_delay(&self) -> Duration {
        Duration::from_millis(self.create_task_base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Upper bound on time spent waiting between polls for one task.
    pub fn max_poll_wait(&self) -> Duration {
        self.polling_interval()
            .saturating_mul(self.max_polling_attempts)
    }
}

impl From<&str> for ClientConfig {
    fn from(api_key: &str) -> Self {
        Self::new(api_key)
    }
}

impl From<String> for ClientConfig {
    fn from(api_key: String) -> Self {
        Self::new(api_key)
    }
}

fn parse_var<T: FromStr>(suffix: &str, value: &str) -> SolverResult<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        SolverError::InvalidConfig(format!("{}{}={:?}: {}", ENV_PREFIX, suffix, value, e))
    })
}

/// Builder for [`ClientConfig`]. Explicit zeros are kept as given.
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    pub fn polling_interval_ms(mut self, ms: u64) -> Self {
        self.config.polling_interval_ms = ms;
        self
    }

    pub fn max_polling_attempts(mut self, attempts: u32) -> Self {
        self.config.max_polling_attempts = attempts;
        self
    }

    pub fn create_task_max_retries(mut self, retries: u32) -> Self {
        self.config.create_task_max_retries = retries;
        self
    }

    pub fn create_task_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.create_task_base_delay_ms = ms;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn build(self) -> SolverResult<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
