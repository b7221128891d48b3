//! Error types shared by every client in the crate.
//!
//! Two layers:
//!
//! - [`ConfigError`] - raised while reading or validating configuration,
//!   always before any network call is attempted
//! - [`Error`] - everything else (transport, health checks, missing keys,
//!   Redis/JSON failures, timeouts), wrapping [`ConfigError`] when a
//!   constructor fails validation

use std::time::Duration;

use crate::redis::RedisMode;

/// Configuration and environment errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable `{0}` is not set")]
    MissingVar(&'static str),

    #[error("invalid value `{value}` for {field}")]
    InvalidValue { field: &'static str, value: String },

    #[error("consul address is required")]
    EmptyConsulAddress,

    #[error("invalid consul scheme `{0}`, must be http or https")]
    InvalidScheme(String),

    #[error("redis host is required")]
    EmptyRedisHost,

    #[error("invalid redis port: {0}")]
    InvalidPort(i64),

    #[error("invalid redis db: {0}")]
    InvalidDb(i64),

    #[error("cluster mode requires cluster addresses")]
    ClusterAddrsRequired,

    #[error("sentinel mode requires sentinel addresses")]
    SentinelAddrsRequired,

    #[error("sentinel mode requires master name")]
    SentinelMasterRequired,

    #[error("cluster mode and sentinel mode are mutually exclusive")]
    ConflictingModes,

    #[error("{0} mode is not supported by this client")]
    UnsupportedMode(RedisMode),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            value: value.into(),
        }
    }
}

/// Crate-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to connect to {target}: {message}")]
    Connection {
        target: &'static str,
        message: String,
    },

    #[error("{target} health check failed: {message}")]
    HealthCheck {
        target: &'static str,
        message: String,
    },

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("{target} returned status {status} for `{key}`")]
    UnexpectedStatus {
        target: &'static str,
        status: u16,
        key: String,
    },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    #[error("{op} timed out after {timeout:?}")]
    Timeout { op: &'static str, timeout: Duration },

    #[error("redis client is closed")]
    Closed,

    #[error("{0} client is not initialized")]
    NotInitialized(&'static str),
}

impl Error {
    pub(crate) fn connection(target: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Connection {
            target,
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            what: what.into(),
            message: err.to_string(),
        }
    }

    /// Returns true when the error reports an absent key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for crate operations.
pub type Result<T> = std::result::Result<T, Error>;
