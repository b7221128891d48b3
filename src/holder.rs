//! Hot-swappable holder for a single live client.
//!
//! [`ClientHolder`] owns at most one client snapshot at a time:
//!
//! - the first [`ClientHolder::get_or_try_init`] runs the initializer exactly
//!   once; concurrent first callers wait for it and share the result
//! - readers take a cheap [`Arc`] snapshot and keep it for the duration of
//!   their call, so a concurrent swap never leaves them with a half-updated
//!   client
//! - [`ClientHolder::swap`] replaces the snapshot atomically; the displaced
//!   client is released when its last reader drops it
//! - [`ClientHolder::replace_if`] swaps only if the holder still holds a
//!   given snapshot, so a slow reload cannot resurrect a shut-down holder
//! - [`ClientHolder::shutdown`] empties the holder so it can be initialized
//!   again (tests, graceful restarts)
//!
//! A failed initializer leaves the holder empty and returns the error; the
//! next caller runs the initializer again.

use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Process- or application-owned slot for one client instance.
pub struct ClientHolder<T> {
    name: &'static str,
    current: ArcSwapOption<T>,
    init_lock: Mutex<()>,
}

impl<T> ClientHolder<T> {
    /// Creates an empty holder. `name` is used in logs and errors.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            current: ArcSwapOption::empty(),
            init_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the live client, running `init` if the holder is empty.
    ///
    /// Only one initializer runs at a time; callers arriving while it runs
    /// wait and then observe its result.
    ///
    /// # Errors
    ///
    /// Returns the initializer's error. The holder stays empty in that case.
    pub async fn get_or_try_init<F, Fut>(&self, init: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(client) = self.current.load_full() {
            return Ok(client);
        }

        let _guard = self.init_lock.lock().await;
        if let Some(client) = self.current.load_full() {
            return Ok(client);
        }

        let client = Arc::new(init().await?);
        self.current.store(Some(client.clone()));
        info!(holder = self.name, "client initialized");

        Ok(client)
    }

    /// Returns the live client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if the holder is empty.
    pub fn get(&self) -> Result<Arc<T>> {
        self.current
            .load_full()
            .ok_or(Error::NotInitialized(self.name))
    }

    pub fn is_initialized(&self) -> bool {
        self.current.load().is_some()
    }

    /// Installs `client` and returns the previous snapshot, if any.
    ///
    /// Readers holding the previous snapshot keep using it until they drop
    /// it; new readers see `client`.
    pub fn swap(&self, client: Arc<T>) -> Option<Arc<T>> {
        let previous = self.current.swap(Some(client));
        debug!(
            holder = self.name,
            replaced = previous.is_some(),
            "client snapshot swapped"
        );
        previous
    }

    /// Installs `client` only if the holder still holds `expected`.
    ///
    /// Returns `false` if the holder was emptied or swapped since `expected`
    /// was read; `client` is dropped in that case.
    pub fn replace_if(&self, expected: &Arc<T>, client: Arc<T>) -> bool {
        let previous = self
            .current
            .compare_and_swap(&Some(expected.clone()), Some(client));
        let replaced = (*previous)
            .as_ref()
            .is_some_and(|previous| Arc::ptr_eq(previous, expected));

        debug!(holder = self.name, replaced, "conditional client swap");
        replaced
    }

    /// Empties the holder and returns the last snapshot.
    pub fn shutdown(&self) -> Option<Arc<T>> {
        let previous = self.current.swap(None);
        if previous.is_some() {
            info!(holder = self.name, "client released");
        }
        previous
    }
}
