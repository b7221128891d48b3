//! Consul KV access for configuration lookups.
//!
//! - [`ConsulConfig`] - agent address, scheme, datacenter, token, timeout
//! - [`ConsulClient`] - validated, health-checked client with typed getters
//!   for the Redis parameters under `config/<domain>/<env>/redis/*`
//! - [`KvStore`] / [`RedisSettingsSource`] - trait seams used by the Redis
//!   bootstrap and by tests
//!
//! Applications can own a [`ConsulClient`] directly, or use the process-wide
//! instance managed by [`initialize`], [`client`] and [`shutdown`].

mod client;
mod config;
mod kv;

pub use client::ConsulClient;
pub use config::ConsulConfig;
pub use kv::{DEFAULT_KV_DOMAIN, KvPair, KvPaths, KvStore, RedisSettingsSource};

#[cfg(test)]
pub use kv::MockRedisSettingsSource;

use std::sync::{Arc, LazyLock};

use crate::environment::Environment;
use crate::error::Result;
use crate::holder::ClientHolder;

static GLOBAL: LazyLock<ClientHolder<ConsulClient>> = LazyLock::new(|| ClientHolder::new("consul"));

/// Initializes the process-wide client once; later calls return it.
///
/// # Errors
///
/// Returns the construction error. The process-wide slot stays empty, so
/// initialization can be attempted again.
pub async fn initialize(config: ConsulConfig, env: Environment) -> Result<Arc<ConsulClient>> {
    GLOBAL
        .get_or_try_init(|| ConsulClient::new(config, env))
        .await
}

/// Initializes the process-wide client from `CONSUL_*` and `ENV`.
///
/// # Errors
///
/// See [`initialize`].
pub async fn initialize_from_env() -> Result<Arc<ConsulClient>> {
    initialize(ConsulConfig::from_env(), Environment::from_env()).await
}

/// Returns the process-wide client.
///
/// # Errors
///
/// Returns [`crate::Error::NotInitialized`] before [`initialize`] succeeded.
pub fn client() -> Result<Arc<ConsulClient>> {
    GLOBAL.get()
}

/// Drops the process-wide client so it can be initialized again.
pub fn shutdown() {
    if let Some(client) = GLOBAL.shutdown() {
        client.close();
    }
}
