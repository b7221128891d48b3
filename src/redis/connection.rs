//! Topology-specific connection setup.
//!
//! Every topology ends up behind [`RedisConnection`], which implements
//! [`ConnectionLike`] so commands and pipelines are written once.

use redis::aio::{
    ConnectionLike, ConnectionManager, ConnectionManagerConfig, MultiplexedConnection,
};
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::sentinel::{SentinelClient, SentinelNodeConnectionInfo, SentinelServerType};
use redis::{Client, Cmd, IntoConnectionInfo, Pipeline, RedisFuture, Value};
use tokio::sync::Mutex;
use tracing::debug;

use super::config::{RedisConfig, RedisMode, node_url};
use crate::error::{Error, Result};
use crate::utils::mask_connection_string;

const TARGET: &str = "redis";

/// A live connection to whichever topology the configuration selected.
///
/// Cheap to clone; every clone multiplexes over the same underlying socket(s).
#[derive(Clone)]
pub enum RedisConnection {
    /// Standalone server behind a reconnecting manager.
    Managed(ConnectionManager),
    /// Sharded cluster with slot routing.
    Cluster(ClusterConnection),
    /// Plain multiplexed connection: the sentinel-resolved master, or a
    /// dedicated standalone connection.
    Multiplexed(MultiplexedConnection),
}

impl ConnectionLike for RedisConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            Self::Managed(conn) => conn.req_packed_command(cmd),
            Self::Cluster(conn) => conn.req_packed_command(cmd),
            Self::Multiplexed(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            Self::Managed(conn) => conn.req_packed_commands(cmd, offset, count),
            Self::Cluster(conn) => conn.req_packed_commands(cmd, offset, count),
            Self::Multiplexed(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            Self::Managed(conn) => conn.get_db(),
            Self::Cluster(conn) => conn.get_db(),
            Self::Multiplexed(conn) => conn.get_db(),
        }
    }
}

/// Source of connections that must not be shared with other callers,
/// such as the one holding a `WATCH` for an optimistic transaction.
pub(crate) enum DedicatedSource {
    Standalone(Client),
    Sentinel(Mutex<SentinelClient>),
    /// Cluster connections route by slot; transactions reuse the shared one.
    Shared,
}

impl DedicatedSource {
    pub(crate) async fn connect(&self, shared: &RedisConnection) -> Result<RedisConnection> {
        match self {
            Self::Standalone(client) => {
                let conn = client.get_multiplexed_async_connection().await?;
                Ok(RedisConnection::Multiplexed(conn))
            }
            Self::Sentinel(client) => {
                let conn = client.lock().await.get_async_connection().await?;
                Ok(RedisConnection::Multiplexed(conn))
            }
            Self::Shared => Ok(shared.clone()),
        }
    }
}

/// Opens the connection selected by `config.mode()`, bounded by `dial_timeout`.
///
/// `config` is expected to be validated.
pub(crate) async fn open(config: &RedisConfig) -> Result<(RedisConnection, DedicatedSource)> {
    let mode = config.mode();
    debug!(
        mode = %mode,
        pool_size = config.pool_size,
        min_idle_conns = config.min_idle_conns,
        max_retries = config.max_retries,
        "Opening Redis connection"
    );

    let dial = async {
        match mode {
            RedisMode::Standalone => open_standalone(config).await,
            RedisMode::Cluster => open_cluster(config).await,
            RedisMode::Sentinel => open_sentinel(config).await,
        }
    };

    if config.dial_timeout.is_zero() {
        return dial.await;
    }

    tokio::time::timeout(config.dial_timeout, dial)
        .await
        .map_err(|_| {
            Error::connection(
                TARGET,
                format!("dial timed out after {:?}", config.dial_timeout),
            )
        })?
}

async fn open_standalone(config: &RedisConfig) -> Result<(RedisConnection, DedicatedSource)> {
    let url = config.connection_url()?;
    debug!(url = %mask_connection_string(url.as_str()), "Dialing Redis");
    let client = Client::open(url.as_str()).map_err(|e| Error::connection(TARGET, e))?;

    let manager_config =
        ConnectionManagerConfig::new().set_number_of_retries(config.retries() as usize);
    let manager = ConnectionManager::new_with_config(client.clone(), manager_config)
        .await
        .map_err(|e| Error::connection(TARGET, e))?;

    Ok((
        RedisConnection::Managed(manager),
        DedicatedSource::Standalone(client),
    ))
}

async fn open_cluster(config: &RedisConfig) -> Result<(RedisConnection, DedicatedSource)> {
    let nodes: Vec<String> = config.cluster_addrs.iter().map(|a| node_url(a)).collect();

    let mut builder = ClusterClient::builder(nodes)
        .retries(config.retries())
        .connection_timeout(config.dial_timeout)
        .response_timeout(config.read_timeout.max(config.write_timeout));
    if !config.password.is_empty() {
        builder = builder.password(config.password.clone());
    }

    let client = builder.build().map_err(|e| Error::connection(TARGET, e))?;
    let conn = client
        .get_async_connection()
        .await
        .map_err(|e| Error::connection(TARGET, e))?;

    Ok((RedisConnection::Cluster(conn), DedicatedSource::Shared))
}

async fn open_sentinel(config: &RedisConfig) -> Result<(RedisConnection, DedicatedSource)> {
    let sentinels: Vec<String> = config.sentinel_addrs.iter().map(|a| node_url(a)).collect();

    // Password and db apply to the master, not to the sentinels.
    let master_info = config
        .connection_url()?
        .as_str()
        .into_connection_info()
        .map_err(|e| Error::connection(TARGET, e))?
        .redis;
    let node_info = SentinelNodeConnectionInfo {
        redis_connection_info: Some(master_info),
        ..Default::default()
    };

    let mut client = SentinelClient::build(
        sentinels,
        config.sentinel_master_name.clone(),
        Some(node_info),
        SentinelServerType::Master,
    )
    .map_err(|e| Error::connection(TARGET, e))?;

    let conn = client
        .get_async_connection()
        .await
        .map_err(|e| Error::connection(TARGET, e))?;

    Ok((
        RedisConnection::Multiplexed(conn),
        DedicatedSource::Sentinel(Mutex::new(client)),
    ))
}
