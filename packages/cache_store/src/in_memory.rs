//! In-memory key-value store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::StoreError;
use crate::KeyValueStore;

/// A process-local store backed by a mutexed `HashMap`.
///
/// A store built with [`MemoryKeyValueStore::unavailable`] rejects every
/// write, which mimics an environment where persistent storage is switched
/// off.
///
/// # Example
///
/// ```rust
/// use sycamore_cache_store::{KeyValueStore, MemoryKeyValueStore};
///
/// let store = MemoryKeyValueStore::new();
/// store.set("requestDataCache", "{}").unwrap();
/// assert_eq!(store.get("requestDataCache").unwrap().as_deref(), Some("{}"));
/// ```
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
    available: bool,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: true,
        }
    }

    /// A store that refuses all writes.
    pub fn unavailable() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: false,
        }
    }

    /// Create a store with initial entries.
    pub fn with_entries(entries: HashMap<String, String>) -> Self {
        Self {
            entries: Mutex::new(entries),
            available: true,
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available {
            Ok(())
        } else {
            Err(StoreError::Unavailable {
                message: "storage is disabled".to_string(),
            })
        }
    }
}

impl Default for MemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.entries().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_set_get() {
        let store = MemoryKeyValueStore::new();
        store.set("foo", "bar").unwrap();
        assert_eq!(store.get("foo").unwrap(), Some("bar".to_string()));
    }

    #[test]
    fn get_missing_returns_none() {
        let store = MemoryKeyValueStore::new();
        assert!(store.get("nonexistent").unwrap().is_none());
    }

    #[test]
    fn overwrite_works() {
        let store = MemoryKeyValueStore::new();
        store.set("value", "first").unwrap();
        store.set("value", "second").unwrap();
        assert_eq!(store.get("value").unwrap(), Some("second".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn probe_leaves_no_trace() {
        let store = MemoryKeyValueStore::new();
        assert!(store.is_available());
        assert!(store.is_empty());
    }

    #[test]
    fn unavailable_store_fails_probe_and_writes() {
        let store = MemoryKeyValueStore::unavailable();
        assert!(!store.is_available());
        assert!(matches!(
            store.set("foo", "bar"),
            Err(StoreError::Unavailable { .. })
        ));
        assert!(store.get("foo").unwrap().is_none());
    }

    #[test]
    fn with_entries_constructor() {
        let mut entries = HashMap::new();
        entries.insert("key".to_string(), "value".to_string());
        let store = MemoryKeyValueStore::with_entries(entries);
        assert_eq!(store.get("key").unwrap(), Some("value".to_string()));
    }
}
