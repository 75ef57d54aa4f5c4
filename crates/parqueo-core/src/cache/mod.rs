//! Local cache store.
//!
//! Holds the last known snapshot of remote records, the cached owning units,
//! and the raw deferred-operation queue, all as JSON values in a
//! [`KeyValueStore`]. Snapshot reads never fail: missing or unreadable data
//! comes back as an empty list.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::KeyValueStore;
use crate::error::Result;
use crate::models::{OwningUnit, PendingOperation, RecordView};

/// Snapshot of remote records
pub const SNAPSHOT_KEY: &str = "registros_offline";
/// Deferred operation queue
pub const QUEUE_KEY: &str = "syncQueue";
/// Cached owning units
pub const UNITS_KEY: &str = "copropietarios_offline";

/// Typed view over the key-value store
#[derive(Clone)]
pub struct LocalCache<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> LocalCache<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Overwrite the cached record list
    pub fn save_snapshot(&self, records: &[RecordView]) -> Result<()> {
        self.write_list(SNAPSHOT_KEY, records)?;
        tracing::debug!(count = records.len(), "Saved record snapshot");
        Ok(())
    }

    /// Last saved record list, or empty if none exists
    pub fn load_snapshot(&self) -> Vec<RecordView> {
        self.read_list(SNAPSHOT_KEY)
    }

    /// Append one record so it shows up in offline listings
    pub fn append_to_snapshot(&self, record: RecordView) -> Result<()> {
        let mut records = self.load_snapshot();
        records.push(record);
        self.save_snapshot(&records)
    }

    pub fn save_units(&self, units: &[OwningUnit]) -> Result<()> {
        self.write_list(UNITS_KEY, units)
    }

    pub fn load_units(&self) -> Vec<OwningUnit> {
        self.read_list(UNITS_KEY)
    }

    /// Raw stored queue text, used for compare-and-swap updates
    pub(crate) fn queue_raw(&self) -> Result<Option<String>> {
        self.store.get(QUEUE_KEY)
    }

    /// Parse stored queue text. Unlike the snapshot, a corrupt queue is an
    /// error: silently dropping deferred writes would lose data.
    pub(crate) fn parse_queue(raw: Option<&str>) -> Result<Vec<PendingOperation>> {
        match raw {
            None => Ok(Vec::new()),
            Some(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Some(raw) => Ok(serde_json::from_str(raw)?),
        }
    }

    pub(crate) fn swap_queue(
        &self,
        expected: Option<&str>,
        queue: &[PendingOperation],
    ) -> Result<bool> {
        let raw = serde_json::to_string(queue)?;
        self.store.compare_and_swap(QUEUE_KEY, expected, Some(&raw))
    }

    /// Pending operations in FIFO order
    pub fn load_queue(&self) -> Result<Vec<PendingOperation>> {
        Self::parse_queue(self.queue_raw()?.as_deref())
    }

    fn write_list<T: Serialize>(&self, key: &str, items: &[T]) -> Result<()> {
        let raw = serde_json::to_string(items)?;
        self.store.set(key, &raw)
    }

    fn read_list<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(error) => {
                tracing::warn!("Failed to read {key} from local cache: {error}");
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|error| {
            tracing::warn!("Discarding unreadable {key} cache entry: {error}");
            Vec::new()
        })
    }
}
