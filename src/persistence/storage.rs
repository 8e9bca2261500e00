//! Snapshot Storage Backends

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing store failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),

    /// Keys may only contain ASCII letters, digits, `-`, `_` and `.`, and must not start
    /// with a dot.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
}

/// Durable key-value storage for serialized snapshots.
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotStorage {
    /// Read the value stored under `key`, `None` when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `contents` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend cannot be written.
    fn write(&mut self, key: &str, contents: &str) -> Result<(), StorageError>;

    /// Delete the value under `key`. Deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend cannot be written.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// In-process storage, lost when dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    values: FxHashMap<String, String>,
}

impl MemoryStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage seeded with one value.
    pub fn with_value(key: impl Into<String>, contents: impl Into<String>) -> Self {
        let mut storage = Self::new();
        storage.values.insert(key.into(), contents.into());
        storage
    }

    /// The raw value under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

impl SnapshotStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.get(key).cloned())
    }

    fn write(&mut self, key: &str, contents: &str) -> Result<(), StorageError> {
        self.values.insert(key.to_string(), contents.to_string());

        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.values.remove(key);

        Ok(())
    }
}

/// Storage that keeps nothing, for contexts without durable storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStorage;

impl SnapshotStorage for NullStorage {
    fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    fn write(&mut self, _key: &str, _contents: &str) -> Result<(), StorageError> {
        Ok(())
    }

    fn remove(&mut self, _key: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
///
/// Writes go to a temporary file that is then renamed over the target, so readers never
/// see a half-written snapshot.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Storage rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for keys that are empty, start with a dot, or
    /// contain anything but ASCII letters, digits, `-`, `_` and `.`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl SnapshotStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;

        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn write(&mut self, key: &str, contents: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");

        fs::create_dir_all(&self.dir)?;
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &path)?;

        debug!(path = %path.display(), bytes = contents.len(), "wrote snapshot file");

        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;
    use testresult::TestResult;

    use super::*;

    #[test]
    fn memory_storage_round_trips() -> TestResult {
        let mut storage = MemoryStorage::new();

        storage.write("cart", "{}")?;

        assert_eq!(storage.read("cart")?.as_deref(), Some("{}"));

        storage.remove("cart")?;

        assert_eq!(storage.read("cart")?, None);

        Ok(())
    }

    #[test]
    fn null_storage_keeps_nothing() -> TestResult {
        let mut storage = NullStorage;

        storage.write("cart", "{}")?;

        assert_eq!(storage.read("cart")?, None);

        Ok(())
    }

    #[test]
    fn file_storage_round_trips() -> TestResult {
        let dir = tempdir()?;
        let mut storage = FileStorage::new(dir.path().join("nested"));

        assert_eq!(storage.read("cart")?, None);

        storage.write("cart", r#"{"carts":{}}"#)?;

        assert_eq!(storage.read("cart")?.as_deref(), Some(r#"{"carts":{}}"#));
        assert!(dir.path().join("nested").join("cart.json").exists());
        assert!(!dir.path().join("nested").join("cart.json.tmp").exists());

        storage.remove("cart")?;
        storage.remove("cart")?;

        assert_eq!(storage.read("cart")?, None);

        Ok(())
    }

    #[test]
    fn file_storage_rejects_path_like_keys() {
        let storage = FileStorage::new("/tmp");

        for key in ["", "../cart", "a/b", ".hidden"] {
            let result = storage.path_for(key);

            assert!(
                matches!(result, Err(StorageError::InvalidKey(_))),
                "expected InvalidKey for {key:?}, got {result:?}"
            );
        }
    }
}
