use std::{fs, io, path};

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::StoreError;
use crate::KeyValueStore;

lazy_static! {
    static ref VALID_KEY: Regex = Regex::new(r"^[A-Za-z0-9_-][A-Za-z0-9_.-]*$").unwrap();
}

/// A key-value store that keeps one file per key under a root directory.
///
/// Values are written as-is; the requester stores serialized JSON documents,
/// so each file is `<root>/<key>.json`.
pub struct JsonFileStore {
    root: path::PathBuf,
}

impl JsonFileStore {
    pub fn new(root: path::PathBuf) -> Result<JsonFileStore, StoreError> {
        let attr = fs::metadata(&root).map_err(|error| StoreError::RootPathInvalid {
            path: root.clone(),
            error,
        })?;

        if !attr.is_dir() {
            return Err(StoreError::RootPathInvalid {
                path: root,
                error: io::Error::other("Root path must be a directory."),
            });
        }

        if attr.permissions().readonly() {
            return Err(StoreError::RootPathInvalid {
                path: root,
                error: io::Error::other("Root directory must be writable"),
            });
        }

        match root.canonicalize() {
            Ok(root) => Ok(JsonFileStore { root }),
            Err(error) => Err(StoreError::RootPathInvalid { path: root, error }),
        }
    }

    pub fn root(&self) -> &path::Path {
        &self.root
    }

    fn key_to_file_path(&self, key: &str) -> Result<path::PathBuf, StoreError> {
        if !VALID_KEY.is_match(key) {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                message: "keys may only contain ASCII letters, digits, '_', '-' and '.'"
                    .to_string(),
            });
        }
        Ok(self.root.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let file_path = self.key_to_file_path(key)?;
        log::debug!("Reading {}...", file_path.display());

        match fs::read_to_string(&file_path) {
            Ok(contents) => Ok(Some(contents)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(StoreError::from(error)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let file_path = self.key_to_file_path(key)?;
        log::debug!("Writing {}...", file_path.display());

        fs::write(&file_path, value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let file_path = self.key_to_file_path(key)?;

        match fs::remove_file(&file_path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(StoreError::from(error)),
        }
    }
}

#[cfg(test)]
mod json_file_store_tests {
    use super::*;

    #[test]
    fn works() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(path::PathBuf::from(dir.path())).unwrap();

        store
            .set("requestDataCache", r#"{"leagues":{"id":1}}"#)
            .unwrap();

        assert_eq!(
            store.get("requestDataCache").unwrap().as_deref(),
            Some(r#"{"leagues":{"id":1}}"#)
        );
        assert!(dir.path().join("requestDataCache.json").exists());

        store.remove("requestDataCache").unwrap();
        assert!(store.get("requestDataCache").unwrap().is_none());
    }

    #[test]
    fn missing_key_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(path::PathBuf::from(dir.path())).unwrap();
        assert!(store.get("absent").unwrap().is_none());
        store.remove("absent").unwrap();
    }

    #[test]
    fn rejects_keys_that_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(path::PathBuf::from(dir.path())).unwrap();

        assert!(matches!(
            store.set("../outside", "{}"),
            Err(StoreError::InvalidKey { .. })
        ));
        assert!(matches!(
            store.get("nested/key"),
            Err(StoreError::InvalidKey { .. })
        ));
    }

    #[test]
    fn root_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("plain-file");
        fs::write(&file_path, "not a directory").unwrap();

        assert!(matches!(
            JsonFileStore::new(file_path),
            Err(StoreError::RootPathInvalid { .. })
        ));
    }

    #[test]
    fn missing_root_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(JsonFileStore::new(missing).is_err());
    }

    #[test]
    fn probe_succeeds_on_writable_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(path::PathBuf::from(dir.path())).unwrap();
        assert!(store.is_available());
        assert!(!dir.path().join("supported.json").exists());
    }
}
