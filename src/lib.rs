//! # Service Common
//!
//! Connection helpers shared by backend services: environment and service
//! resolution, a Consul KV client, and Redis clients whose settings come from
//! Consul or from a watched etcd key.
//!
//! ## Modules
//!
//! - **Startup** ([`config`], [`environment`], [`service`], [`telemetry`]) -
//!   `ENV`, `Service`, etcd address and logging, loaded once at process start
//! - **Consul** ([`consul`]) - KV reads, Redis parameters under
//!   `config/dentistry/<env>/redis/*`
//! - **Redis** ([`redis`]) - standalone/cluster/sentinel client, process-wide
//!   holder, hot-reloading [`redis::DynamicRedis`], key builders
//! - **Config center** ([`config_center`]) - watched JSON blobs in etcd or in
//!   memory
//!
//! ## Quick Start
//!
//! ```bash
//! export ENV="prod"
//! export Service="billing"
//! export CONSUL_HTTP_ADDR="consul:8500"
//! ```
//!
//! ```no_run
//! # async fn demo() -> service_common::Result<()> {
//! use service_common::{config, redis, telemetry};
//!
//! let startup = config::load_from_env()?;
//! telemetry::init(&startup.log_level, startup.log_format);
//!
//! let client = redis::initialize().await?;
//! client.ping().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Nothing in this crate panics or exits on bad configuration. Failures are
//! returned as [`Error`], with [`ConfigError`] for problems detected before
//! any network call.

pub mod config;
pub mod config_center;
pub mod consul;
pub mod environment;
pub mod error;
pub mod holder;
pub mod redis;
pub mod service;
pub mod telemetry;
pub mod utils;

pub use environment::Environment;
pub use error::{ConfigError, Error, Result};
pub use service::ServiceName;

/// Commonly used types for external consumers.
///
/// Re-exports frequently used types to simplify imports for library users
/// and integration tests.
pub mod prelude {
    pub use crate::config::StartupConfig;
    pub use crate::config_center::{ConfigCenter, EtcdConfigCenter, MemoryConfigCenter};
    pub use crate::consul::{ConsulClient, ConsulConfig};
    pub use crate::environment::Environment;
    pub use crate::error::{ConfigError, Error, Result};
    pub use crate::redis::{DynamicRedis, RedisClient, RedisConfig, RedisMode};
    pub use crate::service::ServiceName;
}
