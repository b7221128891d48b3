//! Redis connection settings and topology selection.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationNanoSeconds, serde_as};
use url::Url;

use crate::consul::RedisSettingsSource;
use crate::error::{ConfigError, Result};

const DEFAULT_POOL_SIZE: i64 = 10;

/// Connection topology selected by the mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedisMode {
    Standalone,
    Cluster,
    Sentinel,
}

impl fmt::Display for RedisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Standalone => "standalone",
            Self::Cluster => "cluster",
            Self::Sentinel => "sentinel",
        })
    }
}

/// Redis connection settings.
///
/// Durations (de)serialize as integer nanoseconds. Missing fields take the
/// values of [`RedisConfig::default`].
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: i64,
    pub password: String,
    pub db: i64,

    // Pool tuning
    pub pool_size: i64,
    pub min_idle_conns: i64,
    /// Reconnect attempts handed to the client crate. Negative disables retries.
    pub max_retries: i64,

    // Timeouts
    #[serde_as(as = "DurationNanoSeconds<u64>")]
    pub dial_timeout: Duration,
    #[serde_as(as = "DurationNanoSeconds<u64>")]
    pub read_timeout: Duration,
    #[serde_as(as = "DurationNanoSeconds<u64>")]
    pub write_timeout: Duration,
    #[serde_as(as = "DurationNanoSeconds<u64>")]
    pub pool_timeout: Duration,

    // Idle connections
    #[serde_as(as = "DurationNanoSeconds<u64>")]
    pub idle_timeout: Duration,
    #[serde_as(as = "DurationNanoSeconds<u64>")]
    pub idle_check_frequency: Duration,

    // Cluster
    pub cluster_mode: bool,
    pub cluster_addrs: Vec<String>,

    // Sentinel
    pub sentinel_mode: bool,
    pub sentinel_addrs: Vec<String>,
    pub sentinel_master_name: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: String::new(),
            db: 0,
            pool_size: DEFAULT_POOL_SIZE,
            min_idle_conns: 5,
            max_retries: 3,
            dial_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(3),
            pool_timeout: Duration::from_secs(4),
            idle_timeout: Duration::from_secs(5 * 60),
            idle_check_frequency: Duration::from_secs(60),
            cluster_mode: false,
            cluster_addrs: Vec::new(),
            sentinel_mode: false,
            sentinel_addrs: Vec::new(),
            sentinel_master_name: String::new(),
        }
    }
}

impl RedisConfig {
    /// Builds a configuration from the four stored parameters.
    ///
    /// Starts from [`RedisConfig::default`] and overrides host, port, db and
    /// password.
    ///
    /// # Errors
    ///
    /// - any error returned by a getter (including [`crate::Error::NotFound`])
    /// - [`ConfigError::InvalidValue`] if port or db is not an integer
    pub async fn from_settings<S>(source: &S) -> Result<Self>
    where
        S: RedisSettingsSource + ?Sized,
    {
        let host = source.redis_host().await?;
        let port = source.redis_port().await?;
        let db = source.redis_db().await?;
        let password = source.redis_password().await?;

        Ok(Self {
            host,
            port: parse_int("redis port", &port)?,
            db: parse_int("redis db", &db)?,
            password,
            ..Self::default()
        })
    }

    /// Topology selected by the mode flags. Cluster wins over sentinel;
    /// [`RedisConfig::validate`] rejects enabling both.
    pub fn mode(&self) -> RedisMode {
        if self.cluster_mode {
            RedisMode::Cluster
        } else if self.sentinel_mode {
            RedisMode::Sentinel
        } else {
            RedisMode::Standalone
        }
    }

    /// `host:port` of the standalone server.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates the settings and clamps pool tuning to sane values.
    ///
    /// Non-positive `pool_size` becomes 10 and negative `min_idle_conns`
    /// becomes 0 instead of failing.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule: empty host, port outside 1–65535,
    /// negative db, both modes enabled, cluster mode without addresses,
    /// sentinel mode without addresses or master name.
    pub fn validate(&mut self) -> std::result::Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::EmptyRedisHost);
        }

        if self.port <= 0 || self.port > 65535 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.db < 0 {
            return Err(ConfigError::InvalidDb(self.db));
        }

        if self.pool_size <= 0 {
            self.pool_size = DEFAULT_POOL_SIZE;
        }

        if self.min_idle_conns < 0 {
            self.min_idle_conns = 0;
        }

        if self.cluster_mode && self.sentinel_mode {
            return Err(ConfigError::ConflictingModes);
        }

        if self.cluster_mode && self.cluster_addrs.is_empty() {
            return Err(ConfigError::ClusterAddrsRequired);
        }

        if self.sentinel_mode && self.sentinel_addrs.is_empty() {
            return Err(ConfigError::SentinelAddrsRequired);
        }

        if self.sentinel_mode && self.sentinel_master_name.is_empty() {
            return Err(ConfigError::SentinelMasterRequired);
        }

        Ok(())
    }

    /// `redis://[:password@]host:port/db` for the standalone server.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if host or password cannot be
    /// placed in a URL.
    pub fn connection_url(&self) -> std::result::Result<Url, ConfigError> {
        let mut url = Url::parse(&format!("redis://{}/{}", self.addr(), self.db))
            .map_err(|_| ConfigError::invalid("redis host", &self.host))?;

        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| ConfigError::invalid("redis password", "***"))?;
        }

        Ok(url)
    }

    /// Retry count handed to the client crate.
    pub(crate) fn retries(&self) -> u32 {
        u32::try_from(self.max_retries).unwrap_or(0)
    }
}

/// Normalizes a `host:port` node address into a `redis://` URL.
pub(crate) fn node_url(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("redis://{addr}")
    }
}

fn parse_int(field: &'static str, value: &str) -> std::result::Result<i64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::invalid(field, value))
}
