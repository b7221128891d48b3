//! Consul HTTP client wrapper.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use super::config::ConsulConfig;
use super::kv::{KvPair, KvPaths, KvStore, RedisSettingsSource};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::utils::{format_duration, mask_secret};

const TARGET: &str = "consul";
const TOKEN_HEADER: &str = "X-Consul-Token";

/// Consul client scoped to one environment.
///
/// Construction validates the settings, builds the HTTP client and performs
/// a health check, so a constructed client has talked to the agent at least
/// once.
pub struct ConsulClient {
    http: Client,
    base_url: String,
    config: ConsulConfig,
    env: Environment,
    paths: KvPaths,
}

impl ConsulClient {
    /// Connects to the agent described by `config`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `config` fails validation (no network call is made)
    /// - [`Error::Connection`] if the HTTP client cannot be built
    /// - [`Error::HealthCheck`] if the catalog query fails
    pub async fn new(config: ConsulConfig, env: Environment) -> Result<Self> {
        config.validate()?;

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::connection(TARGET, e))?;

        let client = Self {
            http,
            base_url: config.base_url(),
            paths: KvPaths::for_env(env),
            config,
            env,
        };

        client.health().await?;
        info!(
            address = %client.base_url,
            datacenter = %client.config.datacenter,
            token = mask_secret(&client.config.token),
            timeout = %format_duration(client.config.timeout),
            env = %env,
            "✓ Connected to Consul"
        );

        Ok(client)
    }

    /// Overrides the domain segment of the Redis settings paths.
    pub fn with_kv_domain(mut self, domain: impl Into<String>) -> Self {
        self.paths = KvPaths::new(domain, self.env);
        self
    }

    pub fn config(&self) -> &ConsulConfig {
        &self.config
    }

    pub fn env(&self) -> Environment {
        self.env
    }

    pub fn paths(&self) -> &KvPaths {
        &self.paths
    }

    /// Lightweight liveness check: lists the known datacenters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HealthCheck`] on transport failure or a non-success status.
    pub async fn health(&self) -> Result<()> {
        let health_err = |message: String| Error::HealthCheck {
            target: TARGET,
            message,
        };

        let response = self
            .request(&format!("{}/v1/catalog/datacenters", self.base_url))
            .send()
            .await
            .map_err(|e| health_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(health_err(format!("unexpected status {status}")));
        }

        let datacenters: Vec<String> = response
            .json()
            .await
            .map_err(|e| health_err(e.to_string()))?;
        debug!(?datacenters, "Consul health check passed");

        Ok(())
    }

    /// Consul's HTTP client holds no resources that need explicit release.
    pub fn close(&self) {
        debug!("Consul client closed");
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.http.get(url);
        if self.config.token.is_empty() {
            builder
        } else {
            builder.header(TOKEN_HEADER, &self.config.token)
        }
    }

    async fn read_key(&self, key: &str) -> Result<String> {
        let url = format!("{}/v1/kv/{}", self.base_url, key.trim_start_matches('/'));
        let response = self
            .request(&url)
            .query(&[("dc", self.config.datacenter.as_str())])
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(Error::NotFound(key.to_string())),
            status if !status.is_success() => Err(Error::UnexpectedStatus {
                target: TARGET,
                status: status.as_u16(),
                key: key.to_string(),
            }),
            _ => {
                let pairs: Vec<KvPair> = response.json().await?;
                let pair = pairs
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::NotFound(key.to_string()))?;
                pair.decoded_value()
            }
        }
    }
}

#[async_trait]
impl KvStore for ConsulClient {
    async fn get_value(&self, key: &str) -> Result<String> {
        self.read_key(key).await
    }
}

#[async_trait]
impl RedisSettingsSource for ConsulClient {
    async fn redis_host(&self) -> Result<String> {
        self.read_key(&self.paths.redis_host()).await
    }

    async fn redis_port(&self) -> Result<String> {
        self.read_key(&self.paths.redis_port()).await
    }

    async fn redis_db(&self) -> Result<String> {
        self.read_key(&self.paths.redis_db()).await
    }

    async fn redis_password(&self) -> Result<String> {
        self.read_key(&self.paths.redis_password()).await
    }
}
