//! Store backends
//!
//! A backend is a synchronous, string-keyed get/set facility over UTF-8 text.
//! It knows nothing about the shape of the values it holds.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::{LEASE_EXTENSION, LOCK_FILE, VALUE_EXTENSION};

/// Synchronous key-value backend
pub trait StoreBackend: Send + Sync {
    /// Read the raw value stored under `key`, `None` if the key is absent
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// List all stored keys in sorted order
    fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Read `key`, derive its next value and store it with no other writer in between
    ///
    /// `apply` sees the current raw value and returns the replacement, or
    /// `None` to leave the key untouched.
    fn update(&self, key: &str, apply: &mut dyn FnMut(Option<String>) -> Option<String>) -> Result<(), StoreError>;
}

/// Reject keys that cannot be used as a file stem
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// Directory-backed store: one `<key>.json` file per key
pub struct FileBackend {
    /// Base path for storage
    base_path: PathBuf,
}

impl FileBackend {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_path = path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        debug!(?base_path, "Opened file backend");
        Ok(Self { base_path })
    }

    /// Base directory of this store
    pub fn path(&self) -> &Path {
        &self.base_path
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.{}", key, VALUE_EXTENSION))
    }

    fn lease_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{}.{}", name, LEASE_EXTENSION))
    }

    /// Claim `name` for as long as the returned [`Lease`] lives
    ///
    /// Returns `None` when another holder, in this process or another one,
    /// already has it.
    pub fn try_lease(&self, name: &str) -> Result<Option<Lease>, StoreError> {
        debug!(%name, "FileBackend::try_lease: called");
        validate_key(name)?;
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lease_path(name))?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(%name, "FileBackend::try_lease: acquired");
                Ok(Some(Lease {
                    name: name.to_string(),
                    file,
                }))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                debug!(%name, "FileBackend::try_lease: held elsewhere");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_value(path: &Path, value: &str) -> Result<(), StoreError> {
        let tmp_path = path.with_extension(format!("{}.tmp", VALUE_EXTENSION));
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Run `f` while holding the exclusive directory lock
    fn with_lock<T>(&self, f: impl FnOnce() -> Result<T, StoreError>) -> Result<T, StoreError> {
        let lock = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.base_path.join(LOCK_FILE))?;
        lock.lock_exclusive()?;
        let result = f();
        if let Err(e) = FileExt::unlock(&lock) {
            debug!(error = %e, "with_lock: unlock failed");
        }
        result
    }
}

impl StoreBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        debug!(%key, "FileBackend::get: called");
        validate_key(key)?;
        match fs::read_to_string(self.value_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(%key, "FileBackend::get: key not found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        debug!(%key, len = value.len(), "FileBackend::set: called");
        validate_key(key)?;
        let path = self.value_path(key);
        self.with_lock(|| Self::write_value(&path, value))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        debug!(%key, "FileBackend::remove: called");
        validate_key(key)?;
        let path = self.value_path(key);
        self.with_lock(|| match fs::remove_file(&path) {
            Ok(()) => {
                info!(%key, "Removed key");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        })
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.is_file()
                && path.extension().map(|e| e == VALUE_EXTENSION).unwrap_or(false)
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && validate_key(stem).is_ok()
            {
                keys.push(stem.to_string());
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn update(&self, key: &str, apply: &mut dyn FnMut(Option<String>) -> Option<String>) -> Result<(), StoreError> {
        debug!(%key, "FileBackend::update: called");
        validate_key(key)?;
        let path = self.value_path(key);
        self.with_lock(|| {
            let current = match fs::read_to_string(&path) {
                Ok(content) => Some(content),
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            };
            match apply(current) {
                Some(next) => Self::write_value(&path, &next),
                None => Ok(()),
            }
        })
    }
}

/// Exclusive claim on a name in a [`FileBackend`] directory, released on drop
#[derive(Debug)]
pub struct Lease {
    name: String,
    file: fs::File,
}

impl Lease {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(name = %self.name, error = %e, "Lease::drop: unlock failed");
        }
    }
}

/// In-memory backend, used in tests and for throwaway sessions
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn update(&self, key: &str, apply: &mut dyn FnMut(Option<String>) -> Option<String>) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        if let Some(next) = apply(entries.get(key).cloned()) {
            entries.insert(key.to_string(), next);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_backend_set_get_remove() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::open(temp.path().join("store")).unwrap();

        assert_eq!(backend.get("greeting").unwrap(), None);

        backend.set("greeting", "\"hello\"").unwrap();
        assert_eq!(backend.get("greeting").unwrap(), Some("\"hello\"".to_string()));

        backend.set("greeting", "\"bye\"").unwrap();
        assert_eq!(backend.get("greeting").unwrap(), Some("\"bye\"".to_string()));

        backend.remove("greeting").unwrap();
        assert_eq!(backend.get("greeting").unwrap(), None);

        // Removing twice is fine
        backend.remove("greeting").unwrap();
    }

    #[test]
    fn test_file_backend_keys_skip_lock_and_temp_files() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::open(temp.path()).unwrap();

        backend.set("b-key", "1").unwrap();
        backend.set("a.key", "2").unwrap();
        fs::write(temp.path().join("stray.txt"), "x").unwrap();

        assert_eq!(backend.keys().unwrap(), vec!["a.key".to_string(), "b-key".to_string()]);
        assert!(temp.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn test_keys_do_not_interfere() {
        let backend = MemoryBackend::new();
        backend.set("one", "1").unwrap();
        backend.set("two", "2").unwrap();

        assert_eq!(backend.get("one").unwrap(), Some("1".to_string()));
        assert_eq!(backend.get("two").unwrap(), Some("2".to_string()));

        backend.remove("one").unwrap();
        assert_eq!(backend.get("two").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn test_update_sees_writes_from_another_handle() {
        let temp = TempDir::new().unwrap();
        let first = FileBackend::open(temp.path()).unwrap();
        let second = FileBackend::open(temp.path()).unwrap();

        first.set("list", "a").unwrap();
        second.set("list", "a,b").unwrap();

        first
            .update("list", &mut |current| current.map(|c| format!("{},c", c)))
            .unwrap();
        assert_eq!(second.get("list").unwrap(), Some("a,b,c".to_string()));

        // None leaves the key alone
        first.update("list", &mut |_| None).unwrap();
        assert_eq!(first.get("list").unwrap(), Some("a,b,c".to_string()));

        first
            .update("fresh", &mut |current| {
                assert!(current.is_none());
                Some("1".to_string())
            })
            .unwrap();
        assert_eq!(first.get("fresh").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn test_memory_update() {
        let backend = MemoryBackend::new();
        backend.update("n", &mut |_| Some("1".to_string())).unwrap();
        backend
            .update("n", &mut |current| current.map(|c| format!("{}1", c)))
            .unwrap();
        assert_eq!(backend.get("n").unwrap(), Some("11".to_string()));
    }

    #[test]
    fn test_lease_is_exclusive_until_dropped() {
        let temp = TempDir::new().unwrap();
        let first = FileBackend::open(temp.path()).unwrap();
        let second = FileBackend::open(temp.path()).unwrap();

        let lease = first.try_lease("task-1").unwrap().expect("first lease");
        assert_eq!(lease.name(), "task-1");
        assert!(second.try_lease("task-1").unwrap().is_none());
        assert!(second.try_lease("task-2").unwrap().is_some());

        drop(lease);
        assert!(second.try_lease("task-1").unwrap().is_some());

        // Lease files are not values
        assert!(first.keys().unwrap().is_empty());
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("chrono-flow-tasks").is_ok());
        assert!(validate_key("a_b.c").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key(".lock").is_err());
        assert!(validate_key("../escape").is_err());
        assert!(validate_key("with space").is_err());
    }

    #[test]
    fn test_file_backend_rejects_invalid_key() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::open(temp.path()).unwrap();

        let err = backend.set("../oops", "1").unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }
}
