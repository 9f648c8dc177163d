//! Runtime configuration for the HTTP server.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use axum::http::HeaderValue;
use notebox_core::{KeyStrategy, RateLimitConfig};
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_DATABASE: &str = "notebox.sqlite3";
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("rate limit threshold must be at least 1")]
    ZeroRateLimit,

    #[error("rate limit window must be at least 1 second")]
    ZeroRateWindow,

    #[error("storage timeout must be greater than zero")]
    ZeroStorageTimeout,

    #[error("allowed origin `{0}` is not a valid header value")]
    InvalidOrigin(String),
}

/// Runtime settings for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub database: PathBuf,
    /// The single browser origin allowed to call the API.
    pub allowed_origin: String,
    pub rate_limit: RateLimitConfig,
    pub rate_limit_key: KeyStrategy,
    /// Upper bound on one storage round-trip before it counts as unavailable.
    pub storage_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            database: PathBuf::from(DEFAULT_DATABASE),
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_string(),
            rate_limit: RateLimitConfig::default(),
            rate_limit_key: KeyStrategy::default(),
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::ZeroRateLimit);
        }
        if self.rate_limit.window.as_secs() == 0 {
            return Err(ConfigError::ZeroRateWindow);
        }
        if self.storage_timeout.is_zero() {
            return Err(ConfigError::ZeroStorageTimeout);
        }
        self.allowed_origin_header()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn allowed_origin_header(&self) -> Result<HeaderValue, ConfigError> {
        HeaderValue::from_str(self.allowed_origin.trim_end_matches('/'))
            .map_err(|_| ConfigError::InvalidOrigin(self.allowed_origin.clone()))
    }
}
