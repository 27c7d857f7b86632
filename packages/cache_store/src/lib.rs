//! Key-value stores for sycamore's `local` response cache.
//!
//! The requester keeps its persistent cache as one serialized JSON document
//! under a single namespace key. Anything that can `get`/`set`/`remove` a
//! string by key can back it; [`KeyValueStore::is_available`] lets the
//! requester probe a store before trusting it and fall back to memory when the
//! store refuses writes.

pub mod error;
pub mod in_memory;
pub mod local_disk;

pub use error::StoreError;
pub use in_memory::MemoryKeyValueStore;
pub use local_disk::JsonFileStore;

/// Key written and removed by the default availability probe.
pub const PROBE_KEY: &str = "supported";

/// A string-valued key-value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Probe the store by writing and removing a throwaway key.
    fn is_available(&self) -> bool {
        match self.set(PROBE_KEY, PROBE_KEY).and_then(|_| self.remove(PROBE_KEY)) {
            Ok(()) => true,
            Err(error) => {
                log::debug!("Key-value store probe failed: {}", error);
                false
            }
        }
    }
}
