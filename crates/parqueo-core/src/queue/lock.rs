//! Cooperative drain lock shared through the key-value store.
//!
//! Several processes (or browser tabs) may share one store. Only the holder
//! of a fresh lock drains the queue; a lock older than the staleness timeout
//! is assumed abandoned and taken over.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::KeyValueStore;
use crate::error::{Error, Result};
use crate::util::unix_millis_now;

pub const LOCK_KEY: &str = "syncQueue.lock";

#[derive(Debug, Serialize, Deserialize)]
struct LockRecord {
    owner: String,
    acquired_at: i64,
}

impl LockRecord {
    fn is_fresh(&self, now_ms: i64, stale_after: Duration) -> bool {
        let stale_ms = i64::try_from(stale_after.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.acquired_at) < stale_ms
    }
}

/// Held drain lock; released on drop
pub struct DrainLock<S: KeyValueStore> {
    store: S,
    raw: String,
    owner: String,
}

impl<S: KeyValueStore> DrainLock<S> {
    /// Take the lock, or fail with [`Error::QueueLocked`] if another drainer
    /// holds a fresh one.
    pub fn acquire(store: &S, stale_after: Duration) -> Result<Self> {
        let now = unix_millis_now();
        let current = store.get(LOCK_KEY)?;

        if let Some(raw) = current.as_deref() {
            match serde_json::from_str::<LockRecord>(raw) {
                Ok(held) if held.is_fresh(now, stale_after) => return Err(Error::QueueLocked),
                Ok(held) => tracing::warn!(
                    owner = %held.owner,
                    "Taking over stale sync queue lock acquired at {}",
                    held.acquired_at
                ),
                Err(error) => tracing::warn!("Replacing unreadable sync queue lock: {error}"),
            }
        }

        let owner = Uuid::new_v4().to_string();
        let raw = serde_json::to_string(&LockRecord {
            owner: owner.clone(),
            acquired_at: now,
        })?;
        if !store.compare_and_swap(LOCK_KEY, current.as_deref(), Some(&raw))? {
            return Err(Error::QueueLocked);
        }

        tracing::debug!(%owner, "Acquired sync queue lock");
        Ok(Self {
            store: store.clone(),
            raw,
            owner,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Push `acquired_at` forward so a long drain is not mistaken for an
    /// abandoned one. Returns `false` if another drainer took the lock over.
    pub fn renew(&mut self) -> Result<bool> {
        let raw = serde_json::to_string(&LockRecord {
            owner: self.owner.clone(),
            acquired_at: unix_millis_now(),
        })?;
        if !self
            .store
            .compare_and_swap(LOCK_KEY, Some(&self.raw), Some(&raw))?
        {
            tracing::warn!(owner = %self.owner, "Sync queue lock was taken over mid-drain");
            return Ok(false);
        }
        self.raw = raw;
        Ok(true)
    }
}

impl<S: KeyValueStore> Drop for DrainLock<S> {
    fn drop(&mut self) {
        match self.store.compare_and_swap(LOCK_KEY, Some(&self.raw), None) {
            Ok(true) => tracing::debug!(owner = %self.owner, "Released sync queue lock"),
            Ok(false) => tracing::warn!(owner = %self.owner, "Sync queue lock was taken over before release"),
            Err(error) => tracing::warn!("Failed to release sync queue lock: {error}"),
        }
    }
}
