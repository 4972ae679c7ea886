/*!
 * Durable key/value storage for pipeline state.
 *
 * The translation cache persists itself as a single JSON object saved under a
 * namespace. Stores are best-effort: callers log failures and carry on with
 * their in-memory state.
 *
 * - `KeyValueStore`: the async load/save contract
 * - `MemoryStore`: process-local store, used by tests and the `memory` backend
 * - `sqlite::SqliteStore`: on-disk store backed by SQLite
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use parking_lot::RwLock;
use serde_json::Value;

use crate::app_config::{StorageBackend, StorageConfig};
use crate::errors::CacheIoError;

pub mod sqlite;

pub use self::sqlite::SqliteStore;

/// Async namespace-keyed value store
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Load the value saved under `namespace`, if any
    async fn load(&self, namespace: &str) -> Result<Option<Value>, CacheIoError>;

    /// Replace the value saved under `namespace`
    async fn save(&self, namespace: &str, value: Value) -> Result<(), CacheIoError>;

    /// Delete the value saved under `namespace`
    async fn remove(&self, namespace: &str) -> Result<(), CacheIoError>;
}

/// Store kept in process memory
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: Arc<RwLock<HashMap<String, Value>>>,
    fail_writes: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail, to exercise best-effort persistence
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Synchronous peek at a namespace
    pub fn snapshot(&self, namespace: &str) -> Option<Value> {
        self.values.read().get(namespace).cloned()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn load(&self, namespace: &str) -> Result<Option<Value>, CacheIoError> {
        Ok(self.values.read().get(namespace).cloned())
    }

    async fn save(&self, namespace: &str, value: Value) -> Result<(), CacheIoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheIoError::Store(format!("write to '{}' rejected", namespace)));
        }
        self.values.write().insert(namespace.to_string(), value);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, namespace: &str) -> Result<(), CacheIoError> {
        self.values.write().remove(namespace);
        Ok(())
    }
}

/// Open the store selected by the configuration
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn KeyValueStore>> {
    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory cache store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Sqlite => {
            let store = match &config.path {
                Some(path) => SqliteStore::new(path)?,
                None => SqliteStore::new_default()?,
            };
            Ok(Arc::new(store))
        }
    }
}
