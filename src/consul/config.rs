//! Consul connection settings.

use std::env;
use std::time::Duration;

use crate::error::ConfigError;
use crate::utils::parse_duration;

/// Consul agent connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsulConfig {
    /// Agent address, e.g. `localhost:8500`. May carry its own scheme.
    pub address: String,
    /// `http` or `https`.
    pub scheme: String,
    pub datacenter: String,
    /// ACL token, sent as `X-Consul-Token` when non-empty.
    pub token: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8500".to_string(),
            scheme: "http".to_string(),
            datacenter: "dc1".to_string(),
            token: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl ConsulConfig {
    /// Loads settings from `CONSUL_*` variables over [`ConsulConfig::default`].
    ///
    /// Unset or empty variables keep their default. An unparsable
    /// `CONSUL_TIMEOUT` is ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(addr) = non_empty_var("CONSUL_HTTP_ADDR") {
            config.address = addr;
        }
        if let Some(scheme) = non_empty_var("CONSUL_HTTP_SCHEME") {
            config.scheme = scheme;
        }
        if let Some(dc) = non_empty_var("CONSUL_DATACENTER") {
            config.datacenter = dc;
        }
        if let Some(token) = non_empty_var("CONSUL_HTTP_TOKEN") {
            config.token = token;
        }
        if let Some(timeout) = non_empty_var("CONSUL_TIMEOUT") {
            match parse_duration(&timeout) {
                Ok(d) => config.timeout = d,
                Err(e) => tracing::warn!("Ignoring CONSUL_TIMEOUT: {}", e),
            }
        }

        config
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::EmptyConsulAddress`] if `address` is empty
    /// - [`ConfigError::InvalidScheme`] if `scheme` is not `http` or `https`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.is_empty() {
            return Err(ConfigError::EmptyConsulAddress);
        }

        if self.scheme != "http" && self.scheme != "https" {
            return Err(ConfigError::InvalidScheme(self.scheme.clone()));
        }

        Ok(())
    }

    /// Base URL of the agent's HTTP API.
    ///
    /// An address that already carries a scheme is used as is.
    pub fn base_url(&self) -> String {
        let address = self.address.trim_end_matches('/');
        if address.contains("://") {
            address.to_string()
        } else {
            format!("{}://{}", self.scheme, address)
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}
