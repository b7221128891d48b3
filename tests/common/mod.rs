#![allow(dead_code)]

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde_json::json;
use service_common::consul::ConsulConfig;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Starts a fake Consul agent that passes the health check.
pub async fn start_consul() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/catalog/datacenters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["dc1"])))
        .mount(&server)
        .await;
    server
}

/// Stores `value` under `key` on the fake agent.
pub async fn put_kv(server: &MockServer, key: &str, value: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/kv/{key}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "Key": key,
            "CreateIndex": 100,
            "ModifyIndex": 101,
            "LockIndex": 0,
            "Flags": 0,
            "Value": BASE64.encode(value),
            "Session": null
        }])))
        .mount(server)
        .await;
}

/// Seeds the four Redis parameters for the `test` environment.
pub async fn seed_redis_settings(server: &MockServer, host: &str, port: &str, db: &str, pw: &str) {
    put_kv(server, "config/dentistry/test/redis/host", host).await;
    put_kv(server, "config/dentistry/test/redis/port", port).await;
    put_kv(server, "config/dentistry/test/redis/db", db).await;
    put_kv(server, "config/dentistry/test/redis/password", pw).await;
}

pub fn consul_config(server: &MockServer) -> ConsulConfig {
    ConsulConfig {
        address: server.uri(),
        timeout: Duration::from_secs(2),
        ..Default::default()
    }
}
