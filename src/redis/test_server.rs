//! In-process RESP2 responder for exercising the client without a Redis
//! server.
//!
//! Keeps a small keyspace (strings, hashes, sorted sets, millisecond TTLs)
//! shared by every connection, with per-connection `WATCH`/`MULTI`/`EXEC`
//! state. `GET slow` never gets a reply; unknown commands get `+OK`. Each
//! accepted connection bumps a counter so tests can tell which server a
//! client is talking to.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::config::RedisConfig;

type Args = Vec<Vec<u8>>;

pub(crate) struct FakeRedis {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    store: Arc<Mutex<Store>>,
    handle: JoinHandle<()>,
}

impl FakeRedis {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(Mutex::new(Store::default()));

        let counter = connections.clone();
        let shared = store.clone();
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(socket, shared.clone()));
            }
        });

        Self {
            addr,
            connections,
            store,
            handle,
        }
    }

    pub(crate) fn port(&self) -> i64 {
        i64::from(self.addr.port())
    }

    pub(crate) fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Writes a string directly, as another client of the server would.
    pub(crate) fn put(&self, key: &str, value: &str) {
        self.store
            .lock()
            .insert(key.as_bytes(), Value::Str(value.as_bytes().to_vec()), None);
    }

    pub(crate) fn config(&self) -> RedisConfig {
        RedisConfig {
            host: "127.0.0.1".to_string(),
            port: self.port(),
            max_retries: 0,
            dial_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_millis(200),
            write_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }
}

impl Drop for FakeRedis {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ─── KEYSPACE ────────────────────────────────────────────────────────────────

enum Value {
    Str(Vec<u8>),
    Hash(Vec<(Vec<u8>, Vec<u8>)>),
    ZSet(Vec<(Vec<u8>, f64)>),
}

struct Entry {
    value: Value,
    ttl_ms: Option<i64>,
}

#[derive(Default)]
struct Store {
    entries: BTreeMap<Vec<u8>, Entry>,
    /// Bumped on every write; `EXEC` compares them against `WATCH` time.
    versions: HashMap<Vec<u8>, u64>,
}

impl Store {
    fn version(&self, key: &[u8]) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn touch(&mut self, key: &[u8]) {
        *self.versions.entry(key.to_vec()).or_default() += 1;
    }

    fn insert(&mut self, key: &[u8], value: Value, ttl_ms: Option<i64>) {
        self.entries.insert(key.to_vec(), Entry { value, ttl_ms });
        self.touch(key);
    }

    fn string(&self, key: &[u8]) -> Option<&[u8]> {
        match self.entries.get(key) {
            Some(Entry {
                value: Value::Str(value),
                ..
            }) => Some(value),
            _ => None,
        }
    }

    fn execute(&mut self, args: &[Vec<u8>]) -> Vec<u8> {
        let name = args[0].to_ascii_uppercase();
        let arg = |i: usize| args.get(i).map(Vec::as_slice).unwrap_or_default();

        match name.as_slice() {
            b"PING" => b"+PONG\r\n".to_vec(),
            b"GET" => bulk(self.string(arg(1))),
            b"MGET" => array(args[1..].iter().map(|k| bulk(self.string(k))).collect()),
            b"SET" => self.set(args),
            b"PSETEX" => {
                self.insert(arg(1), Value::Str(arg(3).to_vec()), Some(number(arg(2))));
                ok()
            }
            b"GETEX" => {
                let reply = bulk(self.string(arg(1)));
                if let Some(entry) = self.entries.get_mut(arg(1))
                    && arg(2).eq_ignore_ascii_case(b"PX")
                {
                    entry.ttl_ms = Some(number(arg(3)));
                }
                reply
            }
            b"INCR" => self.incr_by(arg(1), 1),
            b"DECR" => self.incr_by(arg(1), -1),
            b"INCRBY" => self.incr_by(arg(1), number(arg(2))),
            b"DECRBY" => self.incr_by(arg(1), -number(arg(2))),
            b"DEL" => {
                let mut removed = 0;
                for key in &args[1..] {
                    if self.entries.remove(key).is_some() {
                        self.touch(key);
                        removed += 1;
                    }
                }
                int(removed)
            }
            b"EXISTS" => {
                let found = args[1..].iter().filter(|k| self.entries.contains_key(*k));
                int(found.count() as i64)
            }
            b"PTTL" => int(match self.entries.get(arg(1)) {
                None => -2,
                Some(entry) => entry.ttl_ms.unwrap_or(-1),
            }),
            b"PEXPIRE" => match self.entries.get_mut(arg(1)) {
                Some(entry) => {
                    entry.ttl_ms = Some(number(arg(2)));
                    int(1)
                }
                None => int(0),
            },
            b"SCAN" => self.scan(args),
            b"HSET" => self.hset(args),
            b"HGET" => match self.entries.get(arg(1)) {
                Some(Entry {
                    value: Value::Hash(fields),
                    ..
                }) => bulk(
                    fields
                        .iter()
                        .find(|(f, _)| f.as_slice() == arg(2))
                        .map(|(_, v)| v.as_slice()),
                ),
                _ => bulk(None),
            },
            b"HGETALL" => match self.entries.get(arg(1)) {
                Some(Entry {
                    value: Value::Hash(fields),
                    ..
                }) => array(
                    fields
                        .iter()
                        .flat_map(|(f, v)| {
                            [bulk(Some(f.as_slice())), bulk(Some(v.as_slice()))]
                        })
                        .collect(),
                ),
                _ => array(Vec::new()),
            },
            b"ZADD" => self.zadd(args),
            b"ZRANGE" => self.zrange(args),
            b"ZSCORE" => match self.entries.get(arg(1)) {
                Some(Entry {
                    value: Value::ZSet(members),
                    ..
                }) => bulk(
                    members
                        .iter()
                        .find(|(m, _)| m.as_slice() == arg(2))
                        .map(|(_, score)| score.to_string().into_bytes())
                        .as_deref(),
                ),
                _ => bulk(None),
            },
            _ => ok(),
        }
    }

    /// `SET key value [NX] [PX ms | EX s]`
    fn set(&mut self, args: &[Vec<u8>]) -> Vec<u8> {
        let (key, value) = (&args[1], &args[2]);
        let mut nx = false;
        let mut ttl_ms = None;

        let mut options = args[3..].iter();
        while let Some(option) = options.next() {
            match option.to_ascii_uppercase().as_slice() {
                b"NX" => nx = true,
                b"PX" => ttl_ms = options.next().map(|v| number(v)),
                b"EX" => ttl_ms = options.next().map(|v| number(v) * 1000),
                _ => {}
            }
        }

        if nx && self.entries.contains_key(key) {
            return bulk(None);
        }
        self.insert(key, Value::Str(value.clone()), ttl_ms);
        ok()
    }

    fn incr_by(&mut self, key: &[u8], delta: i64) -> Vec<u8> {
        let ttl_ms = self.entries.get(key).and_then(|e| e.ttl_ms);
        let current = self.string(key).map(number).unwrap_or(0);
        let next = current + delta;
        self.insert(key, Value::Str(next.to_string().into_bytes()), ttl_ms);
        int(next)
    }

    /// `SCAN cursor [MATCH pattern] [COUNT n]` over the sorted keyspace. The
    /// cursor is an offset into the matching keys.
    fn scan(&self, args: &[Vec<u8>]) -> Vec<u8> {
        let cursor = usize::try_from(number(&args[1])).unwrap_or(0);
        let mut pattern: &[u8] = b"*";
        let mut count = 10;

        let mut options = args[2..].iter();
        while let Some(option) = options.next() {
            match option.to_ascii_uppercase().as_slice() {
                b"MATCH" => pattern = options.next().map(Vec::as_slice).unwrap_or(b"*"),
                b"COUNT" => {
                    count = options
                        .next()
                        .map(|v| usize::try_from(number(v)).unwrap_or(10))
                        .unwrap_or(10)
                }
                _ => {}
            }
        }

        let matching: Vec<&Vec<u8>> = self
            .entries
            .keys()
            .filter(|key| glob(pattern, key))
            .collect();
        let page: Vec<Vec<u8>> = matching
            .iter()
            .skip(cursor)
            .take(count)
            .map(|key| bulk(Some(key.as_slice())))
            .collect();
        let next = if cursor + count < matching.len() {
            cursor + count
        } else {
            0
        };

        array(vec![bulk(Some(next.to_string().as_bytes())), array(page)])
    }

    fn hset(&mut self, args: &[Vec<u8>]) -> Vec<u8> {
        let key = &args[1];
        let entry = self.entries.entry(key.clone()).or_insert(Entry {
            value: Value::Hash(Vec::new()),
            ttl_ms: None,
        });
        let Value::Hash(fields) = &mut entry.value else {
            return wrong_type();
        };

        let mut added = 0;
        for pair in args[2..].chunks_exact(2) {
            match fields.iter_mut().find(|(f, _)| *f == pair[0]) {
                Some((_, value)) => *value = pair[1].clone(),
                None => {
                    fields.push((pair[0].clone(), pair[1].clone()));
                    added += 1;
                }
            }
        }
        self.touch(key);
        int(added)
    }

    fn zadd(&mut self, args: &[Vec<u8>]) -> Vec<u8> {
        let key = &args[1];
        let entry = self.entries.entry(key.clone()).or_insert(Entry {
            value: Value::ZSet(Vec::new()),
            ttl_ms: None,
        });
        let Value::ZSet(members) = &mut entry.value else {
            return wrong_type();
        };

        let mut added = 0;
        for pair in args[2..].chunks_exact(2) {
            let score = float(&pair[0]);
            match members.iter_mut().find(|(m, _)| *m == pair[1]) {
                Some((_, existing)) => *existing = score,
                None => {
                    members.push((pair[1].clone(), score));
                    added += 1;
                }
            }
        }
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        self.touch(key);
        int(added)
    }

    /// `ZRANGE key start stop [WITHSCORES]` by rank.
    fn zrange(&self, args: &[Vec<u8>]) -> Vec<u8> {
        let Some(Entry {
            value: Value::ZSet(members),
            ..
        }) = self.entries.get(&args[1])
        else {
            return array(Vec::new());
        };
        let with_scores = args
            .get(4)
            .is_some_and(|a| a.eq_ignore_ascii_case(b"WITHSCORES"));

        let mut reply = Vec::new();
        for (member, score) in rank_range(members, number(&args[2]), number(&args[3])) {
            reply.push(bulk(Some(member.as_slice())));
            if with_scores {
                reply.push(bulk(Some(score.to_string().as_bytes())));
            }
        }
        array(reply)
    }
}

/// Inclusive `start..=stop` with negative indexes counted from the tail.
fn rank_range<T>(items: &[T], start: i64, stop: i64) -> &[T] {
    let len = items.len() as i64;
    let norm = |i: i64| if i < 0 { (len + i).max(0) } else { i };
    let (start, stop) = (norm(start), norm(stop).min(len - 1));
    if start > stop {
        return &[];
    }
    &items[start as usize..=stop as usize]
}

/// `*` matches everything after the literal prefix; no other wildcards.
fn glob(pattern: &[u8], key: &[u8]) -> bool {
    match pattern.strip_suffix(b"*") {
        Some(prefix) => key.starts_with(prefix),
        None => pattern == key,
    }
}

fn number(raw: &[u8]) -> i64 {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

fn float(raw: &[u8]) -> f64 {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0)
}

// ─── RESP ────────────────────────────────────────────────────────────────────

fn ok() -> Vec<u8> {
    b"+OK\r\n".to_vec()
}

fn wrong_type() -> Vec<u8> {
    b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n".to_vec()
}

fn int(n: i64) -> Vec<u8> {
    format!(":{n}\r\n").into_bytes()
}

fn bulk(value: Option<&[u8]>) -> Vec<u8> {
    match value {
        Some(value) => {
            let mut out = format!("${}\r\n", value.len()).into_bytes();
            out.extend_from_slice(value);
            out.extend_from_slice(b"\r\n");
            out
        }
        None => b"$-1\r\n".to_vec(),
    }
}

fn array(items: Vec<Vec<u8>>) -> Vec<u8> {
    let mut out = format!("*{}\r\n", items.len()).into_bytes();
    for item in items {
        out.extend(item);
    }
    out
}

// ─── CONNECTIONS ─────────────────────────────────────────────────────────────

/// Transaction state of one client connection.
#[derive(Default)]
struct Session {
    watched: Vec<(Vec<u8>, u64)>,
    queued: Option<Vec<Args>>,
}

impl Session {
    fn handle(&mut self, store: &Mutex<Store>, args: Args) -> Vec<u8> {
        let name = args[0].to_ascii_uppercase();

        match name.as_slice() {
            b"MULTI" => {
                self.queued = Some(Vec::new());
                ok()
            }
            b"DISCARD" => {
                self.queued = None;
                self.watched.clear();
                ok()
            }
            b"EXEC" => {
                let queued = self.queued.take().unwrap_or_default();
                let mut store = store.lock();
                let stale = self
                    .watched
                    .drain(..)
                    .any(|(key, version)| store.version(&key) != version);
                if stale {
                    return b"*-1\r\n".to_vec();
                }
                array(queued.iter().map(|cmd| store.execute(cmd)).collect())
            }
            _ if self.queued.is_some() => {
                if let Some(queued) = self.queued.as_mut() {
                    queued.push(args);
                }
                b"+QUEUED\r\n".to_vec()
            }
            b"WATCH" => {
                let store = store.lock();
                for key in &args[1..] {
                    self.watched.push((key.clone(), store.version(key)));
                }
                ok()
            }
            b"UNWATCH" => {
                self.watched.clear();
                ok()
            }
            _ => store.lock().execute(&args),
        }
    }
}

async fn serve(socket: TcpStream, store: Arc<Mutex<Store>>) {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);
    let mut session = Session::default();

    while let Some(args) = read_command(&mut reader).await {
        let is_slow_get = args[0].eq_ignore_ascii_case(b"GET")
            && args.get(1).is_some_and(|key| key == b"slow");
        if is_slow_get {
            continue;
        }

        let reply = session.handle(&store, args);
        if write.write_all(&reply).await.is_err() {
            return;
        }
    }
}

async fn read_command(reader: &mut BufReader<OwnedReadHalf>) -> Option<Args> {
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;
    if count == 0 {
        return None;
    }

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await.ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;

        let mut buf = vec![0; len + 2];
        reader.read_exact(&mut buf).await.ok()?;
        buf.truncate(len);
        args.push(buf);
    }

    Some(args)
}
