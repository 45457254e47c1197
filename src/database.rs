//! # Key-Value Persistence
//!
//! Durable string storage for the reminder queue and acknowledgment records.
//! `Database` keeps a single SQLite table; `MemoryStore` is the in-process
//! variant used by tests and ephemeral runs.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Added delete and prefix listing for acknowledgment pruning
//! - 1.0.0: Initial SQLite key-value table

use crate::core::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, info};
use sqlite::{Connection, State};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Minimal durable key-value contract the reminder stores rely on
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// SQLite-backed key-value store
#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path`; `":memory:"` is accepted
    pub async fn new(path: &str) -> Result<Self> {
        let connection = sqlite::open(path)?;
        connection.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )?;
        info!("Opened reminder database at {path}");

        Ok(Database {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn read_value(connection: &Connection, key: &str) -> Result<Option<String>> {
        let mut statement = connection.prepare("SELECT value FROM kv_store WHERE key = ?")?;
        statement.bind((1, key))?;
        if let State::Row = statement.next()? {
            Ok(Some(statement.read::<String, _>(0)?))
        } else {
            Ok(None)
        }
    }

    fn write_value(connection: &Connection, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut statement = connection.prepare(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )?;
        statement.bind((1, key))?;
        statement.bind((2, value))?;
        statement.bind((3, now.as_str()))?;
        while statement.next()? != State::Done {}
        Ok(())
    }

    fn delete_value(connection: &Connection, key: &str) -> Result<()> {
        let mut statement = connection.prepare("DELETE FROM kv_store WHERE key = ?")?;
        statement.bind((1, key))?;
        while statement.next()? != State::Done {}
        Ok(())
    }

    fn list_keys(connection: &Connection, prefix: &str) -> Result<Vec<String>> {
        let mut statement =
            connection.prepare("SELECT key FROM kv_store WHERE substr(key, 1, ?) = ? ORDER BY key")?;
        statement.bind((1, prefix.len() as i64))?;
        statement.bind((2, prefix))?;

        let mut keys = Vec::new();
        while let State::Row = statement.next()? {
            keys.push(statement.read::<String, _>(0)?);
        }
        Ok(keys)
    }
}

#[async_trait]
impl KeyValueStore for Database {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let connection = self.connection.lock().await;
        Self::read_value(&connection, key)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let connection = self.connection.lock().await;
        Self::write_value(&connection, key, value)?;
        debug!("Stored {} bytes under {key}", value.len());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let connection = self.connection.lock().await;
        Self::delete_value(&connection, key)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let connection = self.connection.lock().await;
        Self::list_keys(&connection, prefix)
    }
}

/// Non-durable store backed by a concurrent map
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
