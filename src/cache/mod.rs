pub mod key;

pub use key::{KeyPart, QueryKey};

use crate::error::CacheError;
use log::{debug, error};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use uuid::Uuid;

/// Receiver of cache notifications for one key.
///
/// `refetch` is called by prefix invalidation; `set_data` whenever a new value
/// is written for the exact key.
pub trait QueryListener: Send + Sync {
    fn refetch(&self);
    fn set_data(&self, data: &Value);
}

pub struct FnListener {
    refetch: Box<dyn Fn() + Send + Sync>,
    set_data: Box<dyn Fn(&Value) + Send + Sync>,
}

impl FnListener {
    pub fn new(
        refetch: impl Fn() + Send + Sync + 'static,
        set_data: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Self {
        Self {
            refetch: Box::new(refetch),
            set_data: Box::new(set_data),
        }
    }
}

impl QueryListener for FnListener {
    fn refetch(&self) {
        (self.refetch)()
    }

    fn set_data(&self, data: &Value) {
        (self.set_data)(data)
    }
}

struct CacheEntry {
    key: QueryKey,
    value: Value,
}

struct ListenerSet {
    key: QueryKey,
    listeners: Vec<(Uuid, Arc<dyn QueryListener>)>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    listeners: HashMap<String, ListenerSet>,
}

/// Process-wide store of server-derived data, keyed by [`QueryKey`]. Clones
/// share the same store.
#[derive(Clone, Default)]
pub struct QueryClient {
    inner: Arc<Mutex<Inner>>,
}

impl QueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers `listener` under `key` until the returned handle is dropped.
    pub fn subscribe(&self, key: &QueryKey, listener: Arc<dyn QueryListener>) -> Subscription {
        let id = Uuid::new_v4();
        let hash = key.serialize();
        {
            let mut inner = self.lock();
            inner
                .listeners
                .entry(hash.clone())
                .or_insert_with(|| ListenerSet {
                    key: key.clone(),
                    listeners: Vec::new(),
                })
                .listeners
                .push((id, listener));
        }
        debug!("Subscribed listener {} to {}", id, key);

        Subscription {
            id,
            hash,
            client: Some(Arc::downgrade(&self.inner)),
        }
    }

    pub fn get_raw(&self, key: &QueryKey) -> Option<Value> {
        self.lock().entries.get(&key.serialize()).map(|entry| entry.value.clone())
    }

    pub fn get_query_data<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let raw = self.get_raw(key)?;
        match serde_json::from_value(raw) {
            Ok(value) => Some(value),
            // another shape reads as empty
            Err(e) => {
                debug!("Cached value under {} has an unexpected shape: {}", key, e);
                None
            }
        }
    }

    pub fn set_query_data<T: Serialize>(&self, key: &QueryKey, value: &T) -> Result<(), CacheError> {
        let value = serde_json::to_value(value)?;
        self.set_raw(key, value);
        Ok(())
    }

    /// Writes `value` under `key` and notifies the exact key's listeners.
    /// Callbacks run after the lock is released, so they may call back in.
    pub fn set_raw(&self, key: &QueryKey, value: Value) {
        let hash = key.serialize();
        let listeners = {
            let mut inner = self.lock();
            inner.entries.insert(
                hash.clone(),
                CacheEntry {
                    key: key.clone(),
                    value: value.clone(),
                },
            );
            Self::listeners_for(&inner, &hash)
        };

        for listener in listeners {
            notify(key, || listener.set_data(&value));
        }
    }

    /// Asks every listener whose key starts with `prefix` to refetch. Cached
    /// values are left in place; listeners write the fresh value when it arrives.
    pub fn invalidate_queries(&self, prefix: &QueryKey) {
        // Snapshot matching listeners first; a refetch may re-enter the client.
        let targets: Vec<(QueryKey, Vec<Arc<dyn QueryListener>>)> = {
            let inner = self.lock();
            inner
                .listeners
                .values()
                .filter(|set| set.key.starts_with(prefix))
                .map(|set| {
                    let listeners = set.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
                    (set.key.clone(), listeners)
                })
                .collect()
        };

        debug!("Invalidating {} key(s) under {}", targets.len(), prefix);
        for (key, listeners) in targets {
            for listener in listeners {
                notify(&key, || listener.refetch());
            }
        }
    }

    /// Replaces every cached value under `prefix` with `updater(old)`. Keys
    /// without a cached value are left alone.
    pub fn update_queries_data<T, F>(&self, prefix: &QueryKey, updater: F)
    where
        T: Serialize + DeserializeOwned,
        F: Fn(T) -> T,
    {
        let matching: Vec<(QueryKey, Value)> = {
            let inner = self.lock();
            inner
                .entries
                .values()
                .filter(|entry| entry.key.starts_with(prefix))
                .map(|entry| (entry.key.clone(), entry.value.clone()))
                .collect()
        };

        for (key, old) in matching {
            // Entries of another shape share the prefix; skip them
            let old: T = match serde_json::from_value(old) {
                Ok(old) => old,
                Err(e) => {
                    debug!("Skipping update of {}: {}", key, e);
                    continue;
                }
            };
            match serde_json::to_value(updater(old)) {
                Ok(new) => self.set_raw(&key, new),
                Err(e) => error!("Updated value for {} could not be encoded: {}", key, e),
            }
        }
    }

    // Listeners stay registered.
    pub fn remove_queries(&self, prefix: &QueryKey) {
        self.lock().entries.retain(|_, entry| !entry.key.starts_with(prefix));
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.listeners.clear();
    }

    pub fn listener_count(&self, key: &QueryKey) -> usize {
        self.lock()
            .listeners
            .get(&key.serialize())
            .map_or(0, |set| set.listeners.len())
    }

    fn listeners_for(inner: &Inner, hash: &str) -> Vec<Arc<dyn QueryListener>> {
        inner
            .listeners
            .get(hash)
            .map(|set| set.listeners.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default()
    }
}

// A panicking listener must not stop the others from being notified.
fn notify(key: &QueryKey, callback: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
        error!("Listener for {} panicked; other subscribers were still notified", key);
    }
}

pub struct Subscription {
    id: Uuid,
    hash: String,
    client: Option<Weak<Mutex<Inner>>>,
}

impl Subscription {
    pub fn unsubscribe(&mut self) {
        let Some(client) = self.client.take().and_then(|weak| weak.upgrade()) else {
            return;
        };
        let mut inner = client.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(set) = inner.listeners.get_mut(&self.hash) {
            set.listeners.retain(|(id, _)| *id != self.id);
            if set.listeners.is_empty() {
                inner.listeners.remove(&self.hash);
            }
        }
        debug!("Unsubscribed listener {}", self.id);
    }

    pub fn is_active(&self) -> bool {
        self.client.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
