use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::StoreError;

/// Key-value blob store the adventure collection is persisted through.
///
/// Implemented by the host (user defaults, keychain, files) or by the Rust
/// stores below.
#[uniffi::export(with_foreign)]
pub trait ByteStore: Send + Sync {
    fn get(&self, key: String) -> Result<Option<Vec<u8>>, StoreError>;
    fn set(&self, key: String, value: Vec<u8>) -> Result<(), StoreError>;
}

/// In-process store, mainly for tests and previews.
#[derive(Debug, Default)]
pub struct MemoryByteStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    fail_writes: bool,
}

impl MemoryByteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail. Reads still work.
    pub fn with_failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn with_entry(key: &str, value: Vec<u8>) -> Self {
        let store = Self::new();
        if let Ok(mut entries) = store.entries.lock() {
            entries.insert(key.to_string(), value);
        }
        store
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>, StoreError> {
        self.entries.lock().map_err(|_| StoreError::Unavailable {
            message: "memory store lock poisoned".to_string(),
        })
    }
}

impl ByteStore for MemoryByteStore {
    fn get(&self, key: String) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries()?.get(&key).cloned())
    }

    fn set(&self, key: String, value: Vec<u8>) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Io {
                message: "writes disabled".to_string(),
            });
        }
        self.entries()?.insert(key, value);
        Ok(())
    }
}

/// One file per key under a directory. Writes go to a temp file that is
/// synced and renamed over the target.
#[derive(Debug, Clone)]
pub struct FileByteStore {
    dir: PathBuf,
}

impl FileByteStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

impl ByteStore for FileByteStore {
    fn get(&self, key: String) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(&key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(&path)?))
    }

    fn set(&self, key: String, value: Vec<u8>) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&key);
        let tmp_path = path.with_extension("json.tmp");

        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(&value)?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

/// File-backed store rooted at `dir`, for hosts without their own blob store.
#[uniffi::export]
pub fn file_byte_store(dir: String) -> Arc<dyn ByteStore> {
    Arc::new(FileByteStore::new(dir))
}
