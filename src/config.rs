//! Configuration Module
//!
//! Handles loading and managing service configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, StoreError};

/// Value of `CLOUD_MONGO` that switches to credential-based URI construction.
pub const CLOUD: &str = "1";

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Connection attempts per acquire (at least 1)
    pub max_retries: u32,
    /// Sleep between connection attempts in milliseconds
    pub retry_backoff_ms: u64,
    /// Bound on each connection attempt and each store call in milliseconds
    pub connect_timeout_ms: u64,
    /// Explicit connection URI, takes priority over everything else
    pub mongo_uri: Option<String>,
    /// Build the URI from cloud credentials
    pub cloud: bool,
    pub mongo_user: Option<String>,
    pub mongo_password: Option<String>,
    pub mongo_host: Option<String>,
    /// Maximum number of entries per resource cache
    pub cache_max_size: usize,
    /// Cache entry TTL in seconds
    pub cache_expiry_seconds: u64,
    /// Background sweep interval in seconds, 0 disables the sweeper
    pub cache_sweep_interval: u64,
    /// Deadline applied to each HTTP request's store work
    pub request_timeout_ms: u64,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_RETRIES` - Connection attempts (default: 3)
    /// - `RETRY_BACKOFF_MS` - Backoff between attempts (default: 200)
    /// - `CONNECT_TIMEOUT_MS` - Per-attempt and per-call bound (default: 2000)
    /// - `MONGO_URI` - Explicit connection URI
    /// - `CLOUD_MONGO` - "1" to build the URI from `MONGO_USER`, `MONGO_PASSWD`, `MONGO_HOST`
    /// - `CACHE_MAX_SIZE` - Entries per resource cache (default: 1000)
    /// - `CACHE_EXPIRY_SECONDS` - Cache TTL (default: 300)
    /// - `CACHE_SWEEP_INTERVAL` - Sweep frequency in seconds (default: 0, disabled)
    /// - `REQUEST_TIMEOUT_MS` - Per-request deadline (default: 10000)
    /// - `SERVER_PORT` - HTTP server port (default: 8000)
    pub fn from_env() -> Self {
        Self::from_source(|name| env::var(name).ok())
    }

    /// Builds a Config from an arbitrary variable lookup.
    pub fn from_source<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            max_retries: parse_var(&lookup, "MAX_RETRIES")
                .unwrap_or(defaults.max_retries)
                .max(1),
            retry_backoff_ms: parse_var(&lookup, "RETRY_BACKOFF_MS")
                .unwrap_or(defaults.retry_backoff_ms),
            connect_timeout_ms: parse_var(&lookup, "CONNECT_TIMEOUT_MS")
                .unwrap_or(defaults.connect_timeout_ms),
            mongo_uri: text("MONGO_URI"),
            cloud: lookup("CLOUD_MONGO").map_or(false, |v| v.trim() == CLOUD),
            mongo_user: text("MONGO_USER"),
            mongo_password: text("MONGO_PASSWD"),
            mongo_host: text("MONGO_HOST"),
            cache_max_size: parse_var(&lookup, "CACHE_MAX_SIZE")
                .unwrap_or(defaults.cache_max_size),
            cache_expiry_seconds: parse_var(&lookup, "CACHE_EXPIRY_SECONDS")
                .unwrap_or(defaults.cache_expiry_seconds),
            cache_sweep_interval: parse_var(&lookup, "CACHE_SWEEP_INTERVAL")
                .unwrap_or(defaults.cache_sweep_interval),
            request_timeout_ms: parse_var(&lookup, "REQUEST_TIMEOUT_MS")
                .unwrap_or(defaults.request_timeout_ms),
            server_port: parse_var(&lookup, "SERVER_PORT").unwrap_or(defaults.server_port),
        }
    }

    /// Resolves the connection URI.
    ///
    /// Priority: explicit `MONGO_URI`, then the cloud credentials when
    /// `CLOUD_MONGO=1`, then `None` (the connector's local default).
    pub fn connection_uri(&self) -> Result<Option<String>> {
        if let Some(uri) = &self.mongo_uri {
            return Ok(Some(uri.clone()));
        }
        if !self.cloud {
            return Ok(None);
        }

        let mut missing = Vec::new();
        if self.mongo_user.is_none() {
            missing.push("MONGO_USER");
        }
        if self.mongo_password.is_none() {
            missing.push("MONGO_PASSWD");
        }
        if self.mongo_host.is_none() {
            missing.push("MONGO_HOST");
        }
        match (&self.mongo_user, &self.mongo_password, &self.mongo_host) {
            (Some(user), Some(password), Some(host)) => Ok(Some(format!(
                "mongodb+srv://{}:{}@{}/?retryWrites=true&w=majority",
                urlencoding::encode(user),
                urlencoding::encode(password),
                host
            ))),
            _ => Err(StoreError::Config(format!(
                "CLOUD_MONGO=1 requires {}",
                missing.join(", ")
            ))),
        }
    }

    /// Backoff between connection attempts.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Bound on each connection attempt and store call.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Cache entry TTL.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_expiry_seconds)
    }

    /// Per-request deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Parses a variable, treating absent or unparsable values as unset.
fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 200,
            connect_timeout_ms: 2000,
            mongo_uri: None,
            cloud: false,
            mongo_user: None,
            mongo_password: None,
            mongo_host: None,
            cache_max_size: 1000,
            cache_expiry_seconds: 300,
            cache_sweep_interval: 0,
            request_timeout_ms: 10_000,
            server_port: 8000,
        }
    }
}
