//! Browser-style key-value storage.
//!
//! Values are opaque strings (JSON in practice). `compare_and_swap` is the
//! only primitive that has to be atomic across processes sharing one store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::Database;
use crate::error::Result;
use crate::util::unix_millis_now;

/// Trait for durable string key-value storage
pub trait KeyValueStore: Clone + Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, durably, before returning
    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Replace the value only if it currently equals `expected`
    /// (`None` = key absent). `new = None` removes the key.
    /// Returns whether the swap happened.
    fn compare_and_swap(&self, key: &str, expected: Option<&str>, new: Option<&str>)
        -> Result<bool>;
}

/// `SQLite` implementation of `KeyValueStore`
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKeyValueStore {
    /// Open (or create) the store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_database(Database::open(path)?))
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    pub fn from_database(database: Database) -> Self {
        Self {
            conn: Arc::new(Mutex::new(database.into_connection())),
        }
    }

    fn read(conn: &Connection, key: &str) -> Result<Option<String>> {
        Ok(conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn write(conn: &Connection, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => {
                conn.execute(
                    "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)",
                    params![key, value, unix_millis_now()],
                )?;
            }
            None => {
                conn.execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
            }
        }
        Ok(())
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        Self::read(&conn, key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        Self::write(&conn, key, Some(value))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        Self::write(&conn, key, None)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        // IMMEDIATE takes the write lock up front so another process cannot
        // interleave between the read and the write.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = Self::read(&tx, key)?;
        if current.as_deref() != expected {
            return Ok(false);
        }
        Self::write(&tx, key, new)?;
        tx.commit()?;
        Ok(true)
    }
}

/// In-memory implementation of `KeyValueStore`
#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.get(key).map(String::as_str) != expected {
            return Ok(false);
        }
        match new {
            Some(value) => entries.insert(key.to_string(), value.to_string()),
            None => entries.remove(key),
        };
        Ok(true)
    }
}
