//! Redis client handle: connection lifecycle and per-operation bounds.

use std::future::Future;
use std::time::Duration;

use parking_lot::RwLock;
use redis::AsyncCommands;
use tokio::sync::watch;
use tracing::{debug, info};

use super::config::{RedisConfig, RedisMode};
use super::connection::{self, DedicatedSource, RedisConnection};
use crate::error::{Error, Result};

const PING_TIMEOUT: Duration = Duration::from_secs(3);

/// Connected Redis client for one topology.
///
/// Commands borrow a clone of the shared connection, so a `RedisClient` can
/// be used from many tasks at once (wrap it in an [`std::sync::Arc`]). Every
/// command is bounded by the configured read or write timeout and fails with
/// [`Error::Closed`] once [`RedisClient::close`] has been called, including
/// commands already in flight.
pub struct RedisClient {
    config: RedisConfig,
    mode: RedisMode,
    conn: RwLock<Option<RedisConnection>>,
    dedicated: DedicatedSource,
    closed: watch::Sender<bool>,
}

impl RedisClient {
    /// Validates `config`, connects to the selected topology and pings it.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if validation fails (no network call is made)
    /// - [`Error::Connection`] if the connection cannot be established
    ///   within `dial_timeout`
    /// - [`Error::HealthCheck`] if the initial `PING` fails
    pub async fn connect(mut config: RedisConfig) -> Result<Self> {
        config.validate()?;
        let mode = config.mode();

        let (conn, dedicated) = connection::open(&config).await?;
        let (closed, _) = watch::channel(false);

        let client = Self {
            config,
            mode,
            conn: RwLock::new(Some(conn)),
            dedicated,
            closed,
        };

        client.ping().await.map_err(|e| Error::HealthCheck {
            target: "redis",
            message: e.to_string(),
        })?;

        info!(
            mode = %client.mode,
            addr = %client.display_addr(),
            db = client.config.db,
            "✓ Connected to Redis"
        );

        Ok(client)
    }

    pub fn mode(&self) -> RedisMode {
        self.mode
    }

    /// The validated configuration this client was built from.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Round-trips a `PING`, bounded by three seconds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`], [`Error::Timeout`] or the Redis error.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection()?;
        let _: String = self.run("PING", PING_TIMEOUT, conn.ping()).await?;
        Ok(())
    }

    /// Releases the connection. Idempotent.
    ///
    /// In-flight commands fail with [`Error::Closed`]; later calls fail
    /// immediately.
    pub fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }

        self.conn.write().take();
        info!(mode = %self.mode, addr = %self.display_addr(), "Redis client closed");
    }

    fn display_addr(&self) -> String {
        match self.mode {
            RedisMode::Standalone => self.config.addr(),
            RedisMode::Cluster => self.config.cluster_addrs.join(","),
            RedisMode::Sentinel => format!(
                "{}@{}",
                self.config.sentinel_master_name,
                self.config.sentinel_addrs.join(",")
            ),
        }
    }

    /// Clone of the shared connection.
    pub(crate) fn connection(&self) -> Result<RedisConnection> {
        self.conn.read().clone().ok_or(Error::Closed)
    }

    /// Connection not shared with other callers, for `WATCH`.
    pub(crate) async fn dedicated_connection(&self) -> Result<RedisConnection> {
        let shared = self.connection()?;
        self.dedicated.connect(&shared).await
    }

    /// Runs `fut` under the read timeout.
    pub(crate) async fn read<T, E: Into<Error>>(
        &self,
        op: &'static str,
        fut: impl Future<Output = std::result::Result<T, E>>,
    ) -> Result<T> {
        self.run(op, self.config.read_timeout, fut).await
    }

    /// Runs `fut` under the write timeout.
    pub(crate) async fn write<T, E: Into<Error>>(
        &self,
        op: &'static str,
        fut: impl Future<Output = std::result::Result<T, E>>,
    ) -> Result<T> {
        self.run(op, self.config.write_timeout, fut).await
    }

    /// Bounds `fut` by `timeout` (zero means unbounded) and by `close`.
    pub(crate) async fn run<T, E: Into<Error>>(
        &self,
        op: &'static str,
        timeout: Duration,
        fut: impl Future<Output = std::result::Result<T, E>>,
    ) -> Result<T> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(Error::Closed);
        }

        let bounded = async {
            if timeout.is_zero() {
                return fut.await.map_err(Into::into);
            }

            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(Error::Timeout { op, timeout }),
            }
        };

        tokio::select! {
            result = bounded => result,
            _ = closed.wait_for(|closed| *closed) => {
                debug!(op, "Redis command aborted by close");
                Err(Error::Closed)
            }
        }
    }
}

impl Drop for RedisClient {
    fn drop(&mut self) {
        if !self.closed.send_replace(true) {
            debug!(mode = %self.mode, addr = %self.display_addr(), "Redis connection released");
        }
    }
}
