//! Persistence for the three independent state blobs (auth, settings, PR
//! cache) on top of a plain key-value store.

pub mod accounts;
pub mod cache;
pub mod settings;

#[cfg(test)]
use std::collections::HashMap;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

#[cfg(test)]
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;

pub use accounts::AccountStore;
pub use cache::PrCache;
pub use settings::SettingsStore;

pub const AUTH_KEY: &str = "gh_pr_auth";
pub const SETTINGS_KEY: &str = "gh_pr_settings";
pub const CACHE_KEY: &str = "gh_pr_cache";

/// Whole-blob get/set storage. Each key is a read-modify-write unit: callers
/// read the full value, mutate it, and write the full value back.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    fn set(&self, key: &str, value: &Value) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Stores every key as `<dir>/<key>.json`.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let data = serde_json::to_string_pretty(value)?;
        let path = self.path_for(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, data)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_owned(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error while handling stored state: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to serialize stored state: {0}")]
    Serialization(#[from] serde_json::Error),
}
