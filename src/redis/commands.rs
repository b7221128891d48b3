//! Command surface of [`RedisClient`].
//!
//! Every method runs exactly one round trip (or one pipeline), bounded by
//! the read or write timeout, and returns the server's reply or error
//! unchanged. Durations are sent with millisecond precision (`PX`,
//! `PEXPIRE`, `PTTL`).

use std::collections::HashMap;
use std::time::Duration;

use redis::{
    AsyncCommands, ExistenceCheck, Expiry, FromRedisValue, Pipeline, RedisResult, SetExpiry,
    SetOptions, ToRedisArgs,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::client::RedisClient;
use super::connection::RedisConnection;
use crate::error::{Error, Result};

/// Value stored by [`RedisClient::lock`].
pub const LOCK_VALUE: &str = "locked";

/// Remaining lifetime of a key as reported by `PTTL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists and never expires.
    Persistent,
    Expires(Duration),
}

impl KeyTtl {
    fn from_millis(millis: i64) -> Self {
        match millis {
            -2 => Self::Missing,
            ms if ms < 0 => Self::Persistent,
            ms => Self::Expires(Duration::from_millis(ms.unsigned_abs())),
        }
    }
}

/// `PX` argument for `ttl`. Redis rejects zero, so sub-millisecond values
/// round up to one.
fn px(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

// Strings
impl RedisClient {
    /// `SET key value`, or `PSETEX` when `ttl` is given.
    pub async fn set<V>(&self, key: &str, value: V, ttl: Option<Duration>) -> Result<()>
    where
        V: ToRedisArgs + Send + Sync,
    {
        let mut conn = self.connection()?;
        match ttl {
            Some(ttl) => self.write("PSETEX", conn.pset_ex(key, value, px(ttl))).await,
            None => self.write("SET", conn.set(key, value)).await,
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection()?;
        self.read("GET", conn.get(key)).await
    }

    /// `GETEX key PX ttl`: reads the value and resets its expiry.
    pub async fn get_ex(&self, key: &str, ttl: Duration) -> Result<Option<String>> {
        let mut conn = self.connection()?;
        self.write("GETEX", conn.get_ex(key, Expiry::PX(px(ttl))))
            .await
    }

    /// `SET key value NX [PX ttl]`. Returns whether the key was set.
    pub async fn set_nx<V>(&self, key: &str, value: V, ttl: Option<Duration>) -> Result<bool>
    where
        V: ToRedisArgs + Send + Sync,
    {
        let mut options = SetOptions::default().conditional_set(ExistenceCheck::NX);
        if let Some(ttl) = ttl {
            options = options.with_expiration(SetExpiry::PX(px(ttl)));
        }

        let mut conn = self.connection()?;
        let reply: Option<String> = self
            .write("SET", conn.set_options(key, value, options))
            .await?;
        Ok(reply.is_some())
    }

    pub async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<String>>> {
        let mut conn = self.connection()?;
        self.read("MGET", conn.mget(keys)).await
    }

    pub async fn mset<V>(&self, pairs: &[(&str, V)]) -> Result<()>
    where
        V: ToRedisArgs + Send + Sync,
    {
        let mut conn = self.connection()?;
        self.write("MSET", conn.mset(pairs)).await
    }

    pub async fn incr(&self, key: &str) -> Result<i64> {
        self.incr_by(key, 1).await
    }

    pub async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.connection()?;
        self.write("INCRBY", conn.incr(key, delta)).await
    }

    pub async fn decr(&self, key: &str) -> Result<i64> {
        let mut conn = self.connection()?;
        self.write("DECRBY", conn.decr(key, 1)).await
    }
}

// Keys
impl RedisClient {
    /// Number of `keys` that exist; a key listed twice counts twice.
    pub async fn exists(&self, keys: &[&str]) -> Result<i64> {
        let mut conn = self.connection()?;
        self.read("EXISTS", conn.exists(keys)).await
    }

    /// Number of keys removed.
    pub async fn del(&self, keys: &[&str]) -> Result<i64> {
        let mut conn = self.connection()?;
        self.write("DEL", conn.del(keys)).await
    }

    /// Returns `false` if the key does not exist.
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let millis = i64::try_from(px(ttl)).unwrap_or(i64::MAX);
        let mut conn = self.connection()?;
        self.write("PEXPIRE", conn.pexpire(key, millis)).await
    }

    pub async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let mut conn = self.connection()?;
        let millis: i64 = self.read("PTTL", conn.pttl(key)).await?;
        Ok(KeyTtl::from_millis(millis))
    }

    pub async fn rename(&self, key: &str, new_key: &str) -> Result<()> {
        let mut conn = self.connection()?;
        self.write("RENAME", conn.rename(key, new_key)).await
    }

    /// `KEYS pattern`. Blocks the server while it walks the keyspace; prefer
    /// [`RedisClient::scan`] on large databases.
    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection()?;
        self.read("KEYS", conn.keys(pattern)).await
    }

    /// One `SCAN` step. Returns the keys of this step and the next cursor;
    /// iteration is complete when the cursor is 0.
    pub async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(Vec<String>, u64)> {
        // `AsyncCommands::scan_match` hides the cursor behind an iterator.
        let mut cmd = redis::cmd("SCAN");
        cmd.arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count);

        let mut conn = self.connection()?;
        let (next, keys): (u64, Vec<String>) =
            self.read("SCAN", cmd.query_async(&mut conn)).await?;
        Ok((keys, next))
    }
}

// Hashes
impl RedisClient {
    /// Number of fields that were added (updates are not counted).
    pub async fn hset<V>(&self, key: &str, fields: &[(&str, V)]) -> Result<i64>
    where
        V: ToRedisArgs + Send + Sync,
    {
        // `AsyncCommands::hset_multiple` sends HMSET, which does not count.
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key).arg(fields);

        let mut conn = self.connection()?;
        self.write("HSET", cmd.query_async(&mut conn)).await
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.connection()?;
        self.read("HGET", conn.hget(key, field)).await
    }

    pub async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.connection()?;
        self.read("HGETALL", conn.hgetall(key)).await
    }

    pub async fn hmget(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>> {
        let mut conn = self.connection()?;
        self.read("HMGET", conn.hmget(key, fields)).await
    }

    pub async fn hdel(&self, key: &str, fields: &[&str]) -> Result<i64> {
        let mut conn = self.connection()?;
        self.write("HDEL", conn.hdel(key, fields)).await
    }

    pub async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        let mut conn = self.connection()?;
        self.read("HEXISTS", conn.hexists(key, field)).await
    }

    pub async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let mut conn = self.connection()?;
        self.write("HINCRBY", conn.hincr(key, field, delta)).await
    }
}

// Lists
impl RedisClient {
    /// Returns the list length after the push.
    pub async fn lpush<V>(&self, key: &str, values: &[V]) -> Result<i64>
    where
        V: ToRedisArgs + Send + Sync,
    {
        let mut conn = self.connection()?;
        self.write("LPUSH", conn.lpush(key, values)).await
    }

    /// Returns the list length after the push.
    pub async fn rpush<V>(&self, key: &str, values: &[V]) -> Result<i64>
    where
        V: ToRedisArgs + Send + Sync,
    {
        let mut conn = self.connection()?;
        self.write("RPUSH", conn.rpush(key, values)).await
    }

    pub async fn lpop(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection()?;
        self.write("LPOP", conn.lpop(key, None)).await
    }

    pub async fn rpop(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection()?;
        self.write("RPOP", conn.rpop(key, None)).await
    }

    /// Inclusive range; negative indexes count from the tail.
    pub async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.connection()?;
        self.read("LRANGE", conn.lrange(key, start, stop)).await
    }

    pub async fn llen(&self, key: &str) -> Result<i64> {
        let mut conn = self.connection()?;
        self.read("LLEN", conn.llen(key)).await
    }
}

// Sets
impl RedisClient {
    /// Number of members that were not already present.
    pub async fn sadd<V>(&self, key: &str, members: &[V]) -> Result<i64>
    where
        V: ToRedisArgs + Send + Sync,
    {
        let mut conn = self.connection()?;
        self.write("SADD", conn.sadd(key, members)).await
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.connection()?;
        self.read("SMEMBERS", conn.smembers(key)).await
    }

    pub async fn sismember<V>(&self, key: &str, member: V) -> Result<bool>
    where
        V: ToRedisArgs + Send + Sync,
    {
        let mut conn = self.connection()?;
        self.read("SISMEMBER", conn.sismember(key, member)).await
    }

    pub async fn srem<V>(&self, key: &str, members: &[V]) -> Result<i64>
    where
        V: ToRedisArgs + Send + Sync,
    {
        let mut conn = self.connection()?;
        self.write("SREM", conn.srem(key, members)).await
    }

    pub async fn scard(&self, key: &str) -> Result<i64> {
        let mut conn = self.connection()?;
        self.read("SCARD", conn.scard(key)).await
    }
}

// Sorted sets
impl RedisClient {
    /// Adds `(score, member)` pairs. Returns the number of new members.
    pub async fn zadd<V>(&self, key: &str, members: &[(f64, V)]) -> Result<i64>
    where
        V: ToRedisArgs + Send + Sync,
    {
        let mut conn = self.connection()?;
        self.write("ZADD", conn.zadd_multiple(key, members)).await
    }

    /// Members by rank, lowest score first.
    pub async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.connection()?;
        self.read("ZRANGE", conn.zrange(key, start, stop)).await
    }

    pub async fn zrange_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>> {
        let mut conn = self.connection()?;
        self.read("ZRANGE", conn.zrange_withscores(key, start, stop))
            .await
    }

    pub async fn zrem<V>(&self, key: &str, members: &[V]) -> Result<i64>
    where
        V: ToRedisArgs + Send + Sync,
    {
        let mut conn = self.connection()?;
        self.write("ZREM", conn.zrem(key, members)).await
    }

    pub async fn zscore<V>(&self, key: &str, member: V) -> Result<Option<f64>>
    where
        V: ToRedisArgs + Send + Sync,
    {
        let mut conn = self.connection()?;
        self.read("ZSCORE", conn.zscore(key, member)).await
    }

    pub async fn zcard(&self, key: &str) -> Result<i64> {
        let mut conn = self.connection()?;
        self.read("ZCARD", conn.zcard(key)).await
    }
}

// JSON, locks, batches
impl RedisClient {
    /// Stores `value` serialized as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails (nothing is sent).
    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.set(key, json, ttl).await
    }

    /// Reads and deserializes a JSON value. A missing key yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the stored value is not valid JSON for `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(json) => serde_json::from_str(&json).map(Some).map_err(Error::from),
            None => Ok(None),
        }
    }

    /// Best-effort lock: sets `key` to [`LOCK_VALUE`] if absent, expiring
    /// after `ttl`. Returns whether the lock was acquired.
    ///
    /// The lock is not owner-checked; [`RedisClient::unlock`] releases it
    /// regardless of who acquired it.
    pub async fn lock(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.set_nx(key, LOCK_VALUE, Some(ttl)).await
    }

    pub async fn unlock(&self, key: &str) -> Result<()> {
        self.del(&[key]).await?;
        Ok(())
    }

    /// Sends the commands added by `build` in one round trip and decodes the
    /// replies into `T` (typically a tuple, one element per command without
    /// `.ignore()`).
    ///
    /// ```no_run
    /// # async fn demo(client: &service_common::redis::RedisClient) -> service_common::Result<()> {
    /// let (hits, _): (i64, ()) = client
    ///     .pipeline(|pipe| {
    ///         pipe.incr("hits", 1).expire("hits", 60);
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn pipeline<T, F>(&self, build: F) -> Result<T>
    where
        T: FromRedisValue,
        F: FnOnce(&mut Pipeline),
    {
        let mut pipe = redis::pipe();
        build(&mut pipe);

        let mut conn = self.connection()?;
        self.write("PIPELINE", pipe.query_async(&mut conn)).await
    }

    /// Optimistic transaction: `WATCH keys`, let `build` read them, then
    /// run the pipeline it returns inside `MULTI`/`EXEC`.
    ///
    /// `build` receives the connection holding the watch, so its reads see
    /// the values the transaction is conditioned on. Returns `None` when a
    /// watched key changed between `WATCH` and `EXEC` and the server aborted
    /// the transaction; the caller decides whether to retry.
    ///
    /// Dialing, `WATCH`, `build` and `EXEC` share one write-timeout bound
    /// and abort on [`RedisClient::close`]. Standalone and sentinel clients
    /// watch on a dedicated connection; cluster clients share the routed
    /// connection, so all keys must hash to one slot.
    ///
    /// ```no_run
    /// # async fn demo(client: &service_common::redis::RedisClient) -> service_common::Result<()> {
    /// use redis::AsyncCommands;
    ///
    /// let applied: Option<(i64,)> = client
    ///     .transaction(&["balance"], async |conn| {
    ///         let balance: Option<i64> = conn.get("balance").await?;
    ///         let mut pipe = redis::pipe();
    ///         pipe.set("balance", balance.unwrap_or(0) + 10)
    ///             .ignore()
    ///             .get("balance");
    ///         Ok(pipe)
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn transaction<T, F>(&self, keys: &[&str], build: F) -> Result<Option<T>>
    where
        T: FromRedisValue,
        F: AsyncFnOnce(&mut RedisConnection) -> Result<Pipeline>,
    {
        self.write("EXEC", async {
            let mut conn = self.dedicated_connection().await?;
            if !keys.is_empty() {
                redis::cmd("WATCH")
                    .arg(keys)
                    .exec_async(&mut conn)
                    .await?;
            }

            let mut pipe = match build(&mut conn).await {
                Ok(pipe) => pipe,
                Err(e) => {
                    // Cluster clients watch on the shared connection.
                    let _: RedisResult<()> = redis::cmd("UNWATCH").query_async(&mut conn).await;
                    return Err(e);
                }
            };
            pipe.atomic();

            let reply: Option<T> = pipe.query_async(&mut conn).await?;
            Ok::<_, Error>(reply)
        })
        .await
    }
}
