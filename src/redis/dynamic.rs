//! Redis client whose connection parameters follow a watched config key.
//!
//! [`DynamicRedis`] reads a JSON blob `{host, port, password[, db]}` from a
//! [`ConfigCenter`], connects, and keeps listening to the key. Every change
//! builds a new client *outside* the holder and then swaps it in atomically:
//!
//! - readers always get a complete client, never a half-updated one
//! - a reader that took a snapshot before the swap finishes on the old client;
//!   the old connection is released when the last such snapshot is dropped
//! - a failed reload keeps the previous client and is logged at `error`
//!
//! Only standalone blobs are accepted; cluster and sentinel settings are
//! rejected with [`ConfigError::UnsupportedMode`].

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use metrics::counter;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::client::RedisClient;
use super::config::{RedisConfig, RedisMode};
use crate::config::StartupConfig;
use crate::config_center::{
    ConfigCenter, ConfigChange, EtcdConfigCenter, Middleware, fetch_json, watch_key,
};
use crate::error::{ConfigError, Error, Result};
use crate::holder::ClientHolder;

/// Builds a client from validated settings.
///
/// The seam lets the reload machinery run against something other than a
/// live server.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Client: Send + Sync + 'static;

    async fn connect(&self, config: RedisConfig) -> Result<Self::Client>;
}

/// Connects real [`RedisClient`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

#[async_trait]
impl Connector for RedisConnector {
    type Client = RedisClient;

    async fn connect(&self, config: RedisConfig) -> Result<RedisClient> {
        RedisClient::connect(config).await
    }
}

/// Hot-reloading Redis client holder.
pub struct DynamicRedis<C: Connector = RedisConnector> {
    center: Arc<dyn ConfigCenter>,
    key: String,
    connector: C,
    holder: ClientHolder<C::Client>,
    reload_lock: Mutex<()>,
    listener: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl DynamicRedis<RedisConnector> {
    /// Holder for the Redis settings of `config.service` in `config.env`,
    /// watched in etcd at `config.etcd_addr`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the etcd HTTP client cannot be built.
    pub fn from_startup(config: &StartupConfig) -> Result<Arc<Self>> {
        let center = Arc::new(EtcdConfigCenter::from_startup(config)?);
        let key = watch_key(config.env, &config.service, Middleware::Redis);
        Ok(Arc::new(Self::new(center, key, RedisConnector)))
    }
}

impl<C: Connector> DynamicRedis<C> {
    pub fn new(center: Arc<dyn ConfigCenter>, key: impl Into<String>, connector: C) -> Self {
        Self {
            center,
            key: key.into(),
            connector,
            holder: ClientHolder::new("dynamic redis"),
            reload_lock: Mutex::new(()),
            listener: parking_lot::Mutex::new(None),
        }
    }

    /// The watched key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Connects on first call and starts following the key; later calls
    /// return the live client.
    ///
    /// # Errors
    ///
    /// Returns the fetch, decode, validation or connection error. Nothing is
    /// stored and no listener runs in that case, so `start` can be retried.
    pub async fn start(self: &Arc<Self>) -> Result<Arc<C::Client>> {
        let mut subscription = None;
        let slot = &mut subscription;

        let client = self
            .holder
            .get_or_try_init(move || async move {
                // Subscribe first so a change racing the initial read is not lost.
                let changes = self.center.watch(&self.key).await?;
                let config = self.fetch_config().await?;
                let client = self.connector.connect(config).await?;
                *slot = Some(changes);
                Ok(client)
            })
            .await?;

        if let Some(changes) = subscription {
            self.spawn_listener(changes);
            info!(key = %self.key, "Dynamic Redis client started");
        }

        Ok(client)
    }

    /// The live client snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before [`DynamicRedis::start`]
    /// succeeded or after [`DynamicRedis::shutdown`].
    pub fn current(&self) -> Result<Arc<C::Client>> {
        self.holder.get()
    }

    /// Re-reads the key and swaps in a freshly connected client.
    ///
    /// Reloads are serialized. Readers are never blocked: the new client is
    /// connected before the swap.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if the holder is not running, or the
    /// fetch/connect error. The previous client stays live on failure.
    pub async fn reload(&self) -> Result<()> {
        let _guard = self.reload_lock.lock().await;

        match self.try_reload().await {
            Ok(()) => {
                counter!("redis_config_reloads_total", "outcome" => "success").increment(1);
                info!(key = %self.key, "Redis client reloaded");
                Ok(())
            }
            Err(e) => {
                counter!("redis_config_reloads_total", "outcome" => "failure").increment(1);
                error!(
                    key = %self.key,
                    error = %e,
                    "Redis reload failed, keeping current client"
                );
                Err(e)
            }
        }
    }

    /// Stops following the key and releases the held client.
    ///
    /// Snapshots already handed out stay usable until dropped.
    pub fn shutdown(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        if self.holder.shutdown().is_some() {
            info!(key = %self.key, "Dynamic Redis client stopped");
        }
    }

    async fn try_reload(&self) -> Result<()> {
        let current = self.holder.get()?;

        let config = self.fetch_config().await?;
        let client = self.connector.connect(config).await?;

        // A shutdown during the connect must not be undone.
        if !self.holder.replace_if(&current, Arc::new(client)) {
            return Err(Error::NotInitialized(self.holder.name()));
        }
        Ok(())
    }

    async fn fetch_config(&self) -> Result<RedisConfig> {
        let mut config: RedisConfig = fetch_json(self.center.as_ref(), &self.key).await?;

        let mode = config.mode();
        if mode != RedisMode::Standalone {
            return Err(ConfigError::UnsupportedMode(mode).into());
        }
        config.validate()?;

        Ok(config)
    }

    fn spawn_listener(self: &Arc<Self>, mut changes: mpsc::Receiver<ConfigChange>) {
        let this: Weak<Self> = Arc::downgrade(self);
        let key = self.key.clone();

        let handle = tokio::spawn(async move {
            while let Some(change) = changes.recv().await {
                let Some(this) = this.upgrade() else {
                    break;
                };

                if let ConfigChange::Delete { .. } = change {
                    warn!(key = %key, "Redis config deleted, keeping current client");
                    continue;
                }

                // Failures are logged and counted inside reload.
                let _ = this.reload().await;
            }
        });

        if let Some(previous) = self.listener.lock().replace(handle) {
            previous.abort();
        }
    }
}

impl<C: Connector> Drop for DynamicRedis<C> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}
