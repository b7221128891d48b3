//! In-process config center.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::{ConfigCenter, ConfigChange, WATCH_BUFFER};
use crate::error::Result;

/// Config center backed by a map.
///
/// [`MemoryConfigCenter::set`] and [`MemoryConfigCenter::remove`] notify
/// every live watcher of the key. Useful in tests and when running a service
/// without etcd.
#[derive(Default)]
pub struct MemoryConfigCenter {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    values: HashMap<String, Vec<u8>>,
    watchers: HashMap<String, Vec<mpsc::Sender<ConfigChange>>>,
}

impl MemoryConfigCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key` and notifies its watchers.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        let key = key.into();
        let value = value.into();

        let mut state = self.state.lock();
        state.values.insert(key.clone(), value.clone());
        state.notify(ConfigChange::Put { key, value });
    }

    /// Removes `key` and notifies its watchers if it was set.
    pub fn remove(&self, key: &str) {
        let mut state = self.state.lock();
        if state.values.remove(key).is_some() {
            state.notify(ConfigChange::Delete {
                key: key.to_string(),
            });
        }
    }

    /// Number of open watch streams on `key`.
    pub fn watcher_count(&self, key: &str) -> usize {
        let mut state = self.state.lock();
        match state.watchers.get_mut(key) {
            Some(senders) => {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            }
            None => 0,
        }
    }
}

impl State {
    fn notify(&mut self, change: ConfigChange) {
        let Some(senders) = self.watchers.get_mut(change.key()) else {
            return;
        };

        senders.retain(|tx| match tx.try_send(change.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(key = change.key(), "Config watcher is lagging, change dropped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        debug!(key = change.key(), watchers = senders.len(), "Config change published");
    }
}

#[async_trait]
impl ConfigCenter for MemoryConfigCenter {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.state.lock().values.get(key).cloned())
    }

    async fn watch(&self, key: &str) -> Result<mpsc::Receiver<ConfigChange>> {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        self.state
            .lock()
            .watchers
            .entry(key.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
