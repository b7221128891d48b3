//! etcd v3 config center over the JSON gateway (`/v3/kv/range`, `/v3/watch`).
//!
//! Keys and values travel base64-encoded and 64-bit integers as strings, as
//! the gateway's protobuf JSON mapping requires. A watch is one long-lived
//! `POST /v3/watch` whose body is a newline-delimited stream of frames; when
//! it drops, the watcher reconnects with jittered exponential backoff and
//! resumes from the revision after the last event it delivered.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use futures::StreamExt;
use metrics::counter;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use tokio::sync::mpsc;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

use super::{ConfigCenter, ConfigChange, WATCH_BUFFER};
use crate::config::StartupConfig;
use crate::error::{Error, Result};

const TARGET: &str = "etcd";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

// int64 fields arrive as strings; accept bare numbers too.
#[serde_as]
#[derive(Debug, Default, Deserialize)]
struct Header {
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    #[serde(default)]
    revision: i64,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct KeyValue {
    key: String,
    #[serde(default)]
    value: String,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    #[serde(default)]
    mod_revision: i64,
}

#[derive(Debug, Deserialize)]
struct RangeResponse {
    #[serde(default)]
    header: Header,
    #[serde(default)]
    kvs: Vec<KeyValue>,
}

#[derive(Debug, Deserialize)]
struct WatchFrame {
    result: Option<WatchResult>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct WatchResult {
    #[serde(default)]
    created: bool,
    #[serde(default)]
    canceled: bool,
    #[serde(default)]
    events: Vec<WatchEvent>,
}

#[derive(Debug, Deserialize)]
struct WatchEvent {
    /// Absent for `PUT`, the zero value of the enum.
    #[serde(rename = "type", default)]
    kind: Option<String>,
    kv: KeyValue,
}

fn decode(what: &str, encoded: &str) -> Result<Vec<u8>> {
    BASE64.decode(encoded).map_err(|e| Error::decode(what, e))
}

fn decode_string(what: &str, encoded: &str) -> Result<String> {
    String::from_utf8(decode(what, encoded)?).map_err(|e| Error::decode(what, e))
}

fn backoff() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(100)
        .max_delay(MAX_BACKOFF)
        .map(jitter)
}

/// Config center backed by an etcd cluster.
pub struct EtcdConfigCenter {
    http: Client,
    base_url: String,
}

impl EtcdConfigCenter {
    /// `addr` is `host:port` or a full `http(s)://host:port` URL.
    ///
    /// No request is made until the first `get` or `watch`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the HTTP client cannot be built.
    pub fn new(addr: &str) -> Result<Self> {
        let addr = addr.trim_end_matches('/');
        let base_url = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        };

        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::connection(TARGET, e))?;

        info!(address = %base_url, "etcd config center ready");
        Ok(Self { http, base_url })
    }

    /// Uses the `ETCD_HTTP_ADDR` resolved at startup.
    pub fn from_startup(config: &StartupConfig) -> Result<Self> {
        Self::new(&config.etcd_addr)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn range(&self, key: &str) -> Result<RangeResponse> {
        let response = self
            .http
            .post(format!("{}/v3/kv/range", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({ "key": BASE64.encode(key) }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UnexpectedStatus {
                target: TARGET,
                status: status.as_u16(),
                key: key.to_string(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ConfigCenter for EtcdConfigCenter {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let range = self.range(key).await?;
        match range.kvs.first() {
            Some(kv) => Ok(Some(decode(key, &kv.value)?)),
            None => Ok(None),
        }
    }

    async fn watch(&self, key: &str) -> Result<mpsc::Receiver<ConfigChange>> {
        let start_revision = self.range(key).await?.header.revision + 1;

        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let mut task = WatchTask {
            http: self.http.clone(),
            url: format!("{}/v3/watch", self.base_url),
            key: key.to_string(),
            next_revision: start_revision,
            tx,
        };

        let stream = task.open().await?;
        tokio::spawn(async move { task.run(stream).await });

        debug!(key, start_revision, "etcd watch started");
        Ok(rx)
    }
}

struct WatchTask {
    http: Client,
    url: String,
    key: String,
    next_revision: i64,
    tx: mpsc::Sender<ConfigChange>,
}

impl WatchTask {
    async fn run(&mut self, mut stream: Response) {
        loop {
            let tx = self.tx.clone();
            tokio::select! {
                result = self.consume(stream) => match result {
                    Ok(()) => debug!(key = %self.key, "etcd watch stream ended"),
                    Err(e) => warn!(key = %self.key, error = %e, "etcd watch stream failed"),
                },
                _ = tx.closed() => break,
            }

            if self.tx.is_closed() {
                break;
            }

            counter!("redis_watch_reconnects_total").increment(1);
            let tx = self.tx.clone();
            let reopened = tokio::select! {
                result = Retry::spawn(backoff(), || self.reopen()) => result,
                _ = tx.closed() => break,
            };

            match reopened {
                Ok(next) => stream = next,
                Err(e) => {
                    warn!(key = %self.key, error = %e, "etcd watch abandoned");
                    break;
                }
            }
        }

        debug!(key = %self.key, "etcd watch stopped");
    }

    async fn open(&self) -> Result<Response> {
        let body = json!({
            "create_request": {
                "key": BASE64.encode(&self.key),
                "start_revision": self.next_revision.to_string(),
            }
        });

        let response = self.http.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::UnexpectedStatus {
                target: TARGET,
                status: status.as_u16(),
                key: self.key.clone(),
            });
        }

        Ok(response)
    }

    async fn reopen(&self) -> Result<Response> {
        self.open().await.inspect_err(|e| {
            warn!(key = %self.key, error = %e, "etcd watch reconnect failed");
        })
    }

    /// Forwards events until the stream ends or the receiver goes away.
    async fn consume(&mut self, stream: Response) -> Result<()> {
        let mut chunks = stream.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();

        while let Some(chunk) = chunks.next().await {
            buf.extend_from_slice(&chunk?);

            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                if !self.handle_frame(&line).await? {
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    /// Returns `false` once the receiver is gone.
    async fn handle_frame(&mut self, line: &[u8]) -> Result<bool> {
        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(true);
        }

        let frame: WatchFrame = serde_json::from_slice(line)?;
        if let Some(error) = frame.error {
            return Err(Error::decode("etcd watch frame", error));
        }

        let result = frame.result.unwrap_or_default();
        if result.created {
            debug!(key = %self.key, "etcd watch created");
        }
        if result.canceled {
            return Err(Error::Connection {
                target: TARGET,
                message: "watch canceled by server".to_string(),
            });
        }

        for event in result.events {
            let key = decode_string("etcd key", &event.kv.key)?;
            self.next_revision = self.next_revision.max(event.kv.mod_revision + 1);

            let change = match event.kind.as_deref() {
                Some("DELETE") => ConfigChange::Delete { key },
                _ => ConfigChange::Put {
                    value: decode(&key, &event.kv.value)?,
                    key,
                },
            };

            if self.tx.send(change).await.is_err() {
                return Ok(false);
            }
        }

        Ok(true)
    }
}
