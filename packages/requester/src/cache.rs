//! Response cache with time-based expiry.
//!
//! Values live either in a per-requester map or in a persistent
//! [`KeyValueStore`] under one namespace key whose value is a JSON object
//! mapping cache keys to responses. Expiry stamps are always kept in memory,
//! keyed by store and cache key, so a fresh requester treats every entry as
//! expired until it has fetched it once.
//!
//! Writes to the persistent store read the namespace document, insert the
//! entry and write the document back. Nothing serializes concurrent writers,
//! so two processes sharing a store can lose each other's updates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sycamore_cache_store::KeyValueStore;
use sycamore_http::HttpResponse;

use crate::descriptor::{CacheSpec, CacheStoreKind};

/// Source of the current time for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct ResponseCache {
    memory: Mutex<HashMap<String, Value>>,
    expirations: Mutex<HashMap<(CacheStoreKind, String), DateTime<Utc>>>,
    local: Option<Arc<dyn KeyValueStore>>,
    namespace: String,
    clock: Arc<dyn Clock>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ResponseCache {
    /// Create a cache. `local` is probed once; a store that fails the probe is
    /// discarded and `local` entries go to memory instead.
    pub fn new(
        namespace: impl Into<String>,
        local: Option<Arc<dyn KeyValueStore>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let local = local.filter(|store| {
            let available = store.is_available();
            if !available {
                log::warn!("Persistent store is unavailable; caching in memory instead");
            }
            available
        });

        Self {
            memory: Mutex::new(HashMap::new()),
            expirations: Mutex::new(HashMap::new()),
            local,
            namespace: namespace.into(),
            clock,
        }
    }

    pub fn memory_only() -> Self {
        Self::new(
            crate::config::DEFAULT_CACHE_NAMESPACE,
            None,
            Arc::new(SystemClock),
        )
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn has_local_store(&self) -> bool {
        self.local.is_some()
    }

    /// The store that actually holds entries for `spec`.
    fn store_kind(&self, spec: &CacheSpec) -> CacheStoreKind {
        match (spec.store, &self.local) {
            (CacheStoreKind::Local, Some(_)) => CacheStoreKind::Local,
            _ => CacheStoreKind::Memory,
        }
    }

    fn stamp_key(&self, spec: &CacheSpec) -> (CacheStoreKind, String) {
        (self.store_kind(spec), spec.key.clone())
    }

    pub fn expires_at(&self, spec: &CacheSpec) -> Option<DateTime<Utc>> {
        lock(&self.expirations).get(&self.stamp_key(spec)).copied()
    }

    pub fn is_expired(&self, spec: &CacheSpec) -> bool {
        match self.expires_at(spec) {
            Some(expires_at) => self.clock.now() >= expires_at,
            None => true,
        }
    }

    /// The cached response for `spec`, unless it is missing or expired.
    pub fn lookup(&self, spec: &CacheSpec) -> Option<HttpResponse> {
        if self.is_expired(spec) {
            return None;
        }

        let value = match (spec.store, &self.local) {
            (CacheStoreKind::Local, Some(store)) => self.read_local(store.as_ref(), &spec.key),
            _ => lock(&self.memory).get(&spec.key).cloned(),
        }?;

        match serde_json::from_value(value) {
            Ok(response) => Some(response),
            Err(error) => {
                log::warn!("Discarding unreadable cache entry {:?}: {}", spec.key, error);
                None
            }
        }
    }

    /// Store `response` under `spec.key` and restart its expiry window.
    pub fn store(&self, spec: &CacheSpec, response: &HttpResponse) {
        let value = match serde_json::to_value(response) {
            Ok(value) => value,
            Err(error) => {
                log::warn!("Could not serialize response for {:?}: {}", spec.key, error);
                return;
            }
        };

        let stored_locally = match (spec.store, &self.local) {
            (CacheStoreKind::Local, Some(store)) => {
                self.write_local(store.as_ref(), &spec.key, value.clone())
            }
            _ => false,
        };
        if !stored_locally {
            lock(&self.memory).insert(spec.key.clone(), value);
        }

        let now = self.clock.now();
        let expires_at = spec
            .ttl()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        lock(&self.expirations).insert(self.stamp_key(spec), expires_at);
        log::debug!("Cached {:?} until {}", spec.key, expires_at);
    }

    fn read_namespace(&self, store: &dyn KeyValueStore) -> Option<Map<String, Value>> {
        let text = match store.get(&self.namespace) {
            Ok(text) => text?,
            Err(error) => {
                log::warn!("Could not read cache namespace {:?}: {}", self.namespace, error);
                return None;
            }
        };

        match serde_json::from_str(&text) {
            Ok(Value::Object(entries)) => Some(entries),
            Ok(_) | Err(_) => {
                log::warn!("Cache namespace {:?} is not a JSON object", self.namespace);
                None
            }
        }
    }

    fn read_local(&self, store: &dyn KeyValueStore, key: &str) -> Option<Value> {
        self.read_namespace(store)?.remove(key)
    }

    fn write_local(&self, store: &dyn KeyValueStore, key: &str, value: Value) -> bool {
        let mut entries = self.read_namespace(store).unwrap_or_default();
        entries.insert(key.to_string(), value);

        match store.set(&self.namespace, &Value::Object(entries).to_string()) {
            Ok(()) => true,
            Err(error) => {
                log::warn!("Persistent cache write failed, using memory: {}", error);
                false
            }
        }
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("namespace", &self.namespace)
            .field("local", &self.local.is_some())
            .finish_non_exhaustive()
    }
}
