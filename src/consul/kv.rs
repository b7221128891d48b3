//! KV read seams and the key layout for Redis settings.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::Deserialize;

use crate::environment::Environment;
use crate::error::{Error, Result};

/// Domain segment of the Redis settings paths.
pub const DEFAULT_KV_DOMAIN: &str = "dentistry";

/// Raw key reads against a KV backend.
///
/// # Implementations
///
/// - [`crate::consul::ConsulClient`] - Consul HTTP API
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads the value stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the key does not exist.
    async fn get_value(&self, key: &str) -> Result<String>;
}

/// Typed access to the Redis connection parameters.
///
/// Each getter returns the raw stored string; parsing is left to
/// [`crate::redis::RedisConfig::from_settings`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RedisSettingsSource: Send + Sync {
    async fn redis_host(&self) -> Result<String>;
    async fn redis_port(&self) -> Result<String>;
    async fn redis_db(&self) -> Result<String>;
    async fn redis_password(&self) -> Result<String>;
}

/// Builds `config/<domain>/<env>/redis/<field>` paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPaths {
    domain: String,
    env: Environment,
}

impl KvPaths {
    pub fn new(domain: impl Into<String>, env: Environment) -> Self {
        Self {
            domain: domain.into(),
            env,
        }
    }

    /// Paths under [`DEFAULT_KV_DOMAIN`].
    pub fn for_env(env: Environment) -> Self {
        Self::new(DEFAULT_KV_DOMAIN, env)
    }

    pub fn redis(&self, field: &str) -> String {
        format!("config/{}/{}/redis/{}", self.domain, self.env, field)
    }

    pub fn redis_host(&self) -> String {
        self.redis("host")
    }

    pub fn redis_port(&self) -> String {
        self.redis("port")
    }

    pub fn redis_db(&self) -> String {
        self.redis("db")
    }

    pub fn redis_password(&self) -> String {
        self.redis("password")
    }
}

/// One entry of a `GET /v1/kv/<key>` response.
#[derive(Debug, Clone, Deserialize)]
pub struct KvPair {
    #[serde(rename = "Key")]
    pub key: String,

    #[serde(rename = "ModifyIndex", default)]
    pub modify_index: u64,

    #[serde(rename = "Flags", default)]
    pub flags: u64,

    /// Base64-encoded value; `null` for keys stored without a value.
    #[serde(rename = "Value", default)]
    pub value: Option<String>,
}

impl KvPair {
    /// Decodes the value as UTF-8. A `null` value decodes to an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] on invalid base64 or UTF-8.
    pub fn decoded_value(&self) -> Result<String> {
        let Some(encoded) = &self.value else {
            return Ok(String::new());
        };

        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| Error::decode(&self.key, e))?;
        String::from_utf8(bytes).map_err(|e| Error::decode(&self.key, e))
    }
}
