//! Watched key/value stores holding middleware connection settings.
//!
//! A [`ConfigCenter`] reads a key once and streams later changes to it.
//! Settings for middleware `m` of service `s` in environment `e` live under
//! [`watch_key`] `/config/<e>/<s>/<m>` as a JSON blob.
//!
//! # Implementations
//!
//! - [`EtcdConfigCenter`] - etcd v3 through its JSON gateway
//! - [`MemoryConfigCenter`] - in-process map for tests and local runs

mod etcd;
mod memory;

pub use etcd::EtcdConfigCenter;
pub use memory::MemoryConfigCenter;

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::service::ServiceName;

/// Buffer of each watch channel.
pub const WATCH_BUFFER: usize = 16;

/// One change to a watched key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChange {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl ConfigChange {
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// Source of watched configuration blobs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigCenter: Send + Sync {
    /// Current value of `key`, `None` if it is not set.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Streams changes to `key` made after this call.
    ///
    /// The stream ends when the receiver is dropped or the store shuts down.
    async fn watch(&self, key: &str) -> Result<mpsc::Receiver<ConfigChange>>;
}

/// Middleware whose settings live in the config center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Middleware {
    Redis,
}

impl Middleware {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redis => "redis",
        }
    }
}

impl fmt::Display for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `/config/<env>/<service>/<middleware>`
pub fn watch_key(env: Environment, service: &ServiceName, middleware: Middleware) -> String {
    format!("/config/{env}/{service}/{middleware}")
}

/// Reads `key` and decodes it as JSON.
///
/// # Errors
///
/// - [`Error::NotFound`] if the key is not set
/// - [`Error::Json`] if the blob does not decode into `T`
pub async fn fetch_json<C, T>(center: &C, key: &str) -> Result<T>
where
    C: ConfigCenter + ?Sized,
    T: DeserializeOwned,
{
    let raw = center
        .get(key)
        .await?
        .ok_or_else(|| Error::NotFound(key.to_string()))?;
    Ok(serde_json::from_slice(&raw)?)
}
