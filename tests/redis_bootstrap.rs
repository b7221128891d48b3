mod common;

use std::time::Duration;

use ::redis::AsyncCommands;
use serial_test::serial;
use service_common::consul::{self, ConsulClient};
use service_common::redis::{self, KeyTtl, RedisClient, RedisConfig, RedisMode};
use service_common::{ConfigError, Environment, Error};

// ─── SETTINGS FROM CONSUL ────────────────────────────────────────────────────

#[tokio::test]
async fn test_settings_resolve_to_standalone_config() {
    let server = common::start_consul().await;
    common::seed_redis_settings(&server, "127.0.0.1", "6379", "0", "").await;

    let consul = ConsulClient::new(common::consul_config(&server), Environment::Test)
        .await
        .unwrap();

    let mut config = RedisConfig::from_settings(&consul).await.unwrap();
    config.validate().unwrap();

    assert_eq!(config.mode(), RedisMode::Standalone);
    assert_eq!(config.addr(), "127.0.0.1:6379");
    assert_eq!(config.db, 0);
    assert_eq!(config.password, "");
    assert_eq!(config.pool_size, 10);
    assert_eq!(config.read_timeout, Duration::from_secs(3));
}

#[tokio::test]
async fn test_non_numeric_db_is_config_error() {
    let server = common::start_consul().await;
    common::seed_redis_settings(&server, "127.0.0.1", "6379", "zero", "").await;

    let consul = ConsulClient::new(common::consul_config(&server), Environment::Test)
        .await
        .unwrap();

    let err = RedisConfig::from_settings(&consul).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::InvalidValue {
            field: "redis db",
            ..
        })
    ));
}

// ─── CONNECT ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cluster_without_addresses_fails_before_network() {
    let config = RedisConfig {
        cluster_mode: true,
        ..Default::default()
    };

    let result = RedisClient::connect(config).await;
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::ClusterAddrsRequired))
    ));
}

#[tokio::test]
async fn test_sentinel_without_master_fails_before_network() {
    let config = RedisConfig {
        sentinel_mode: true,
        sentinel_addrs: vec!["127.0.0.1:26379".to_string()],
        ..Default::default()
    };

    let result = RedisClient::connect(config).await;
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::SentinelMasterRequired))
    ));
}

// ─── PROCESS-WIDE CLIENT ─────────────────────────────────────────────────────

#[tokio::test]
#[serial]
async fn test_failed_initialize_leaves_holder_empty() {
    let server = common::start_consul().await;
    common::seed_redis_settings(&server, "127.0.0.1", "1", "0", "").await;

    // SAFETY: Tests are run serially due to #[serial], so no concurrent access
    unsafe {
        std::env::set_var("ENV", "test");
        std::env::set_var("CONSUL_HTTP_ADDR", server.uri());
    }

    let result = redis::initialize().await;
    assert!(matches!(result, Err(Error::Connection { .. })));
    assert!(matches!(
        redis::client(),
        Err(Error::NotInitialized("redis"))
    ));

    // Consul itself came up and stays available.
    assert_eq!(consul::client().unwrap().env(), Environment::Test);

    consul::shutdown();
    assert!(consul::client().is_err());

    // Cleanup
    unsafe {
        std::env::remove_var("ENV");
        std::env::remove_var("CONSUL_HTTP_ADDR");
    }
}

#[tokio::test]
#[serial]
async fn test_client_before_initialize_fails() {
    redis::shutdown();
    assert!(matches!(
        redis::client(),
        Err(Error::NotInitialized("redis"))
    ));
}

// ─── LIVE SERVER ─────────────────────────────────────────────────────────────

/// Needs a Redis server on 127.0.0.1:6379, db 15 is used and flushed of the
/// keys below.
#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn test_live_round_trip() {
    let server = common::start_consul().await;
    common::seed_redis_settings(&server, "127.0.0.1", "6379", "15", "").await;
    let consul = ConsulClient::new(common::consul_config(&server), Environment::Test)
        .await
        .unwrap();

    let client = redis::initialize_with(&consul).await.unwrap();
    assert!(client.ping().await.is_ok());

    let key = redis::build_cache_key("it", "greeting");
    client.set(&key, "hello", Some(Duration::from_secs(30))).await.unwrap();
    assert_eq!(client.get(&key).await.unwrap().as_deref(), Some("hello"));
    assert!(matches!(client.ttl(&key).await.unwrap(), KeyTtl::Expires(_)));

    let lock = redis::build_lock_key("it-job");
    client.unlock(&lock).await.unwrap();
    assert!(client.lock(&lock, Duration::from_secs(5)).await.unwrap());
    assert!(!client.lock(&lock, Duration::from_secs(5)).await.unwrap());
    client.unlock(&lock).await.unwrap();

    let counter = redis::build_key(&["it", "counter"]);
    client.del(&[&counter]).await.unwrap();
    let (first, second): (i64, i64) = client
        .transaction(&[&counter], async |conn| {
            let start: Option<i64> = conn.get(&counter).await?;
            assert_eq!(start, None);
            let mut pipe = ::redis::pipe();
            pipe.incr(&counter, 1).incr(&counter, 2);
            Ok(pipe)
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!((first, second), (1, 3));

    client.hset("it:hash", &[("a", 1), ("b", 2)]).await.unwrap();
    assert_eq!(client.hget("it:hash", "b").await.unwrap().as_deref(), Some("2"));
    client.del(&[&key, &counter, "it:hash"]).await.unwrap();

    redis::shutdown();
    assert!(client.is_closed());
    assert!(matches!(client.get(&key).await, Err(Error::Closed)));
}
