//! Process startup configuration loaded from environment variables.
//!
//! Collects the values every client in this crate is namespaced by, and is
//! meant to be loaded once at the process entry point:
//!
//! ```bash
//! export ENV="prod"                  # dev | prod | test (default: dev)
//! export Service="billing"           # required
//! export ETCD_HTTP_ADDR="etcd:2379"  # required outside development
//! ```
//!
//! ## Optional Variables
//!
//! - `RUST_LOG` - Log level (default: `info`)
//! - `LOG_FORMAT` - Log format: `text` or `json` (default: `text`)
//!
//! Consul connection variables are read separately by
//! [`crate::consul::ConsulConfig::from_env`].

use std::env;

use crate::environment::Environment;
use crate::error::ConfigError;
use crate::service::ServiceName;
use crate::telemetry::LogFormat;

/// Variable holding the etcd address used by the dynamic Redis client.
pub const ETCD_ADDR_VAR: &str = "ETCD_HTTP_ADDR";

/// etcd address assumed in development when `ETCD_HTTP_ADDR` is unset.
pub const DEFAULT_DEV_ETCD_ADDR: &str = "127.0.0.1:2379";

/// Startup configuration shared by every client.
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub env: Environment,
    pub service: ServiceName,
    /// Address of the etcd JSON gateway, with or without scheme.
    pub etcd_addr: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl StartupConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `Service` is unset or empty
    /// - `ETCD_HTTP_ADDR` is unset outside development
    /// - `LOG_FORMAT` is neither `text` nor `json`
    pub fn from_env() -> Result<Self, ConfigError> {
        let env = Environment::from_env();
        let service = ServiceName::from_env()?;
        let etcd_addr = Self::load_etcd_addr(env)?;

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let log_format = env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "text".to_string())
            .parse()?;

        Ok(Self {
            env,
            service,
            etcd_addr,
            log_level,
            log_format,
        })
    }

    /// Resolves the etcd address.
    ///
    /// Priority:
    /// 1. `ETCD_HTTP_ADDR` environment variable
    /// 2. [`DEFAULT_DEV_ETCD_ADDR`], in development only
    fn load_etcd_addr(env: Environment) -> Result<String, ConfigError> {
        if let Ok(addr) = env::var(ETCD_ADDR_VAR)
            && !addr.is_empty()
        {
            return Ok(addr);
        }

        if env.is_development() {
            return Ok(DEFAULT_DEV_ETCD_ADDR.to_string());
        }

        Err(ConfigError::MissingVar(ETCD_ADDR_VAR))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `etcd_addr` has no port or an unsupported scheme.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let host_port = match self.etcd_addr.split_once("://") {
            Some(("http" | "https", rest)) => rest,
            Some(_) => return Err(ConfigError::invalid(ETCD_ADDR_VAR, &self.etcd_addr)),
            None => self.etcd_addr.as_str(),
        };

        if !host_port.contains(':') {
            return Err(ConfigError::invalid(ETCD_ADDR_VAR, &self.etcd_addr));
        }

        Ok(())
    }

    /// Prints configuration summary.
    pub fn print_summary(&self) {
        tracing::info!("Configuration loaded:");
        tracing::info!("  Environment: {}", self.env);
        tracing::info!("  Service: {}", self.service);
        tracing::info!(
            "  etcd: {}",
            crate::utils::mask_connection_string(&self.etcd_addr)
        );
        tracing::info!("  Log level: {}", self.log_level);
        tracing::info!("  Log format: {}", self.log_format);
    }
}

/// Loads `.env` (if present), then loads and validates configuration.
///
/// # Errors
///
/// Returns an error if required variables are missing or validation fails.
pub fn load_from_env() -> Result<StartupConfig, ConfigError> {
    dotenvy::dotenv().ok();

    let config = StartupConfig::from_env()?;
    config.validate()?;
    Ok(config)
}
