//! Redis clients for standalone, cluster and sentinel deployments.
//!
//! Two ways to hold a client:
//!
//! - static: settings read once from Consul (`config/dentistry/<env>/redis/*`)
//!   through [`initialize`], then shared process-wide via [`client`]
//! - dynamic: [`DynamicRedis`] follows a JSON blob in a
//!   [`crate::config_center::ConfigCenter`] and hot-swaps the client when it
//!   changes
//!
//! Either way the handle is a [`RedisClient`], whose command methods are
//! bounded by the configured read/write timeouts.
//!
//! ```no_run
//! # async fn demo() -> service_common::Result<()> {
//! use std::time::Duration;
//! use service_common::redis::{self, build_cache_key};
//!
//! let client = redis::initialize().await?;
//! let key = build_cache_key("patients", "17");
//! client.set(&key, "cached", Some(Duration::from_secs(60))).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod commands;
mod config;
mod connection;
mod dynamic;
mod keys;

#[cfg(test)]
pub(crate) mod test_server;

pub use client::RedisClient;
pub use commands::{KeyTtl, LOCK_VALUE};
pub use config::{RedisConfig, RedisMode};
pub use connection::RedisConnection;
pub use dynamic::{Connector, DynamicRedis, RedisConnector};
pub use keys::{build_cache_key, build_key, build_lock_key};

use std::sync::{Arc, LazyLock};

use crate::consul::{self, RedisSettingsSource};
use crate::error::Result;
use crate::holder::ClientHolder;

static GLOBAL: LazyLock<ClientHolder<RedisClient>> = LazyLock::new(|| ClientHolder::new("redis"));

/// Initializes the process-wide client once; later calls return it.
///
/// Initializes the process-wide Consul client from the environment, reads
/// the Redis parameters for the current environment and connects.
///
/// # Errors
///
/// Returns the first Consul, configuration or connection error. The
/// process-wide slot stays empty, so initialization can be attempted again.
pub async fn initialize() -> Result<Arc<RedisClient>> {
    GLOBAL
        .get_or_try_init(|| async {
            let settings = consul::initialize_from_env().await?;
            connect_from(settings.as_ref()).await
        })
        .await
}

/// Initializes the process-wide client from an explicit settings source.
///
/// # Errors
///
/// See [`initialize`].
pub async fn initialize_with<S>(source: &S) -> Result<Arc<RedisClient>>
where
    S: RedisSettingsSource + ?Sized,
{
    GLOBAL.get_or_try_init(|| connect_from(source)).await
}

/// Returns the process-wide client.
///
/// # Errors
///
/// Returns [`crate::Error::NotInitialized`] before [`initialize`] succeeded.
pub fn client() -> Result<Arc<RedisClient>> {
    GLOBAL.get()
}

/// Closes and drops the process-wide client so it can be initialized again.
pub fn shutdown() {
    if let Some(client) = GLOBAL.shutdown() {
        client.close();
    }
}

async fn connect_from<S>(source: &S) -> Result<RedisClient>
where
    S: RedisSettingsSource + ?Sized,
{
    let config = RedisConfig::from_settings(source).await?;
    RedisClient::connect(config).await
}
