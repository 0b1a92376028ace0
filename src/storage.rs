//! Namespaced key-value persistence.
//!
//! Every key written through [`KeyValueStore`] is prefixed with
//! [`NAMESPACE`]; callers pass bare keys from [`keys`].

use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, instrument};

pub const NAMESPACE: &str = "account_plans.";

pub mod keys {
    pub const AUTH_CREDENTIAL: &str = "auth.credential";
    pub const MASTER_SHEET: &str = "master_sheet";
    pub const RECENT_PLANS: &str = "recent_plans";
    pub const DARK_MODE: &str = "dark_mode";
    pub const PLANS_CACHE: &str = "plans_cache";
    pub const PLANS_CACHE_EXPIRY: &str = "plans_cache_expiry";
}

/// A change observed on the store. `new_value` is `None` for removals.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub new_value: Option<Value>,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>>;

    async fn set(&self, values: HashMap<String, Value>) -> Result<()>;

    async fn remove(&self, keys: &[&str]) -> Result<()>;

    async fn get_all(&self) -> Result<HashMap<String, Value>>;

    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

/// Typed helpers over the raw JSON interface.
pub async fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    let mut values = store.get(&[key]).await?;
    match values.remove(key) {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| AppError::Storage(format!("Failed to decode '{}': {}", key, e))),
        None => Ok(None),
    }
}

pub async fn save<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)?;
    store.set(HashMap::from([(key.to_string(), value)])).await
}

/// Trace every change made to the store until it is dropped.
pub fn log_changes(store: &dyn KeyValueStore) -> tokio::task::JoinHandle<()> {
    let mut changes = store.subscribe();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => debug!(
                    key = %change.key,
                    removed = change.new_value.is_none(),
                    "Stored value changed"
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Missed store change notifications")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn namespaced(key: &str) -> String {
    format!("{}{}", NAMESPACE, key)
}

/// Shared bookkeeping for both store implementations.
struct Entries {
    values: Mutex<Map<String, Value>>,
    changes: broadcast::Sender<StorageChange>,
}

impl Entries {
    fn new(values: Map<String, Value>) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            values: Mutex::new(values),
            changes,
        }
    }

    fn get(values: &Map<String, Value>, keys: &[&str]) -> HashMap<String, Value> {
        keys.iter()
            .filter_map(|key| {
                values
                    .get(&namespaced(key))
                    .map(|v| (key.to_string(), v.clone()))
            })
            .collect()
    }

    fn get_all(values: &Map<String, Value>) -> HashMap<String, Value> {
        values
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(NAMESPACE)
                    .map(|key| (key.to_string(), v.clone()))
            })
            .collect()
    }

    fn notify(&self, key: &str, new_value: Option<Value>) {
        // No receivers is not an error
        let _ = self.changes.send(StorageChange {
            key: key.to_string(),
            new_value,
        });
    }
}

/// In-memory store for tests.
#[cfg(test)]
pub struct MemoryStore {
    entries: Entries,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Entries::new(Map::new()),
        }
    }
}

#[cfg(test)]
impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let values = self.entries.values.lock().await;
        Ok(Entries::get(&values, keys))
    }

    async fn set(&self, new_values: HashMap<String, Value>) -> Result<()> {
        let mut values = self.entries.values.lock().await;
        for (key, value) in new_values {
            values.insert(namespaced(&key), value.clone());
            self.entries.notify(&key, Some(value));
        }
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut values = self.entries.values.lock().await;
        for key in keys {
            if values.remove(&namespaced(key)).is_some() {
                self.entries.notify(key, None);
            }
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        let values = self.entries.values.lock().await;
        Ok(Entries::get_all(&values))
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.entries.changes.subscribe()
    }
}

/// JSON file backed store. The whole file is rewritten on every mutation.
pub struct FileStore {
    path: PathBuf,
    entries: Entries,
}

impl FileStore {
    #[instrument(name = "Opening local store", skip_all, fields(path = ?path))]
    pub fn open(path: PathBuf) -> Result<Self> {
        let values = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                Map::new()
            } else {
                serde_json::from_str(&contents).map_err(|e| {
                    AppError::Storage(format!("Failed to parse store {:?}: {}", path, e))
                })?
            }
        } else {
            debug!("No local store yet, starting empty");
            Map::new()
        };

        Ok(Self {
            path,
            entries: Entries::new(values),
        })
    }

    fn persist(&self, values: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(values)?;
        let tmp_path = self.path.with_extension("json.tmp");

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|e| AppError::Storage(format!("Failed to create store file: {}", e)))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| AppError::Storage(format!("Failed to write store file: {}", e)))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| AppError::Storage(format!("Failed to replace store file: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let values = self.entries.values.lock().await;
        Ok(Entries::get(&values, keys))
    }

    async fn set(&self, new_values: HashMap<String, Value>) -> Result<()> {
        let mut values = self.entries.values.lock().await;
        let mut changed = Vec::with_capacity(new_values.len());
        for (key, value) in new_values {
            values.insert(namespaced(&key), value.clone());
            changed.push((key, value));
        }
        self.persist(&values)?;

        for (key, value) in changed {
            self.entries.notify(&key, Some(value));
        }
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut values = self.entries.values.lock().await;
        let removed: Vec<&str> = keys
            .iter()
            .copied()
            .filter(|key| values.remove(&namespaced(key)).is_some())
            .collect();
        if removed.is_empty() {
            return Ok(());
        }
        self.persist(&values)?;

        for key in removed {
            self.entries.notify(key, None);
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        let values = self.entries.values.lock().await;
        Ok(Entries::get_all(&values))
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.entries.changes.subscribe()
    }
}
