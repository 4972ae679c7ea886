/*!
 * SQLite-backed key/value store.
 *
 * One table, `kv_store`, holds a JSON document per namespace. Access from
 * async code goes through `tokio::task::spawn_blocking` so the runtime is never
 * blocked on disk I/O.
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::KeyValueStore;
use crate::errors::CacheIoError;

/// Default database filename
const DEFAULT_DB_FILENAME: &str = "livetl.db";

/// Default database directory name under user's data directory
const DEFAULT_DB_DIRNAME: &str = "livetl";

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS kv_store (
    namespace TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

/// SQLite store with thread-safe connection access
#[derive(Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
    connection: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("db_path", &self.db_path).finish()
    }
}

impl SqliteStore {
    /// Open the store at the default location
    pub fn new_default() -> Result<Self> {
        let db_path = Self::default_database_path()?;
        Self::new(db_path)
    }

    /// Open (or create) the store at `db_path`
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }

        info!("Opening cache store at: {:?}", db_path);

        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open database: {:?}", db_path))?;
        conn.execute(CREATE_TABLE, []).context("Failed to create kv_store table")?;

        Ok(Self {
            db_path,
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing)
    pub fn new_in_memory() -> Result<Self> {
        debug!("Creating in-memory cache store");

        let conn = Connection::open_in_memory().context("Failed to create in-memory database")?;
        conn.execute(CREATE_TABLE, []).context("Failed to create kv_store table")?;

        Ok(Self {
            db_path: PathBuf::from(":memory:"),
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    /// Default database path under the user's local data directory
    pub fn default_database_path() -> Result<PathBuf> {
        let base_dir = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

        Ok(base_dir.join(DEFAULT_DB_DIRNAME).join(DEFAULT_DB_FILENAME))
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Run `f` against the connection on the blocking pool
    async fn execute_async<F, T>(&self, f: F) -> Result<T, CacheIoError>
    where
        F: FnOnce(&Connection) -> Result<T, CacheIoError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.connection.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| CacheIoError::Store(format!("Failed to acquire database lock: {}", e)))?;
            f(&conn)
        })
        .await
        .map_err(|e| CacheIoError::Store(format!("Database task panicked: {}", e)))?
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn load(&self, namespace: &str) -> Result<Option<Value>, CacheIoError> {
        let namespace = namespace.to_string();
        let raw: Option<String> = self
            .execute_async(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT value FROM kv_store WHERE namespace = ?1",
                        params![namespace],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, namespace: &str, value: Value) -> Result<(), CacheIoError> {
        let namespace = namespace.to_string();
        let raw = serde_json::to_string(&value)?;
        let updated_at = chrono::Utc::now().to_rfc3339();

        self.execute_async(move |conn| {
            conn.execute(
                "INSERT INTO kv_store (namespace, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(namespace) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![namespace, raw, updated_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, namespace: &str) -> Result<(), CacheIoError> {
        let namespace = namespace.to_string();
        self.execute_async(move |conn| {
            conn.execute("DELETE FROM kv_store WHERE namespace = ?1", params![namespace])?;
            Ok(())
        })
        .await
    }
}
