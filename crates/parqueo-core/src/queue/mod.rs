//! Deferred operation queue.
//!
//! An ordered log of mutations that could not be applied remotely when they
//! were created. Entries are replayed strictly in FIFO order: an entry is
//! removed only after its replay succeeded, and the first failure stops the
//! drain with the failed entry and everything after it left in place.

mod lock;

use std::time::Duration;

use crate::cache::LocalCache;
use crate::db::KeyValueStore;
use crate::error::{Error, Result};
use crate::models::{OperationKind, PendingOperation};
use crate::remote::RemoteStore;

pub use lock::{DrainLock, LOCK_KEY};

/// Default age after which another drainer's lock is considered abandoned
pub const DEFAULT_LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

/// Failed replay that stopped a drain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayFailure {
    /// 1-based position of the failed entry at the time of the drain
    pub position: usize,
    pub message: String,
}

/// Outcome of one drain attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries replayed and removed
    pub replayed: usize,
    /// Entries still queued afterwards
    pub remaining: usize,
    pub failure: Option<ReplayFailure>,
}

impl DrainReport {
    pub const fn is_complete(&self) -> bool {
        self.failure.is_none() && self.remaining == 0
    }

    /// Turn a halted drain into [`Error::QueueReplay`]
    pub fn into_result(self) -> Result<Self> {
        match self.failure {
            Some(failure) => Err(Error::QueueReplay {
                position: failure.position,
                message: failure.message,
            }),
            None => Ok(self),
        }
    }
}

/// Durable FIFO of pending operations
#[derive(Clone)]
pub struct SyncQueue<S: KeyValueStore> {
    cache: LocalCache<S>,
    lock_stale_after: Duration,
}

impl<S: KeyValueStore> SyncQueue<S> {
    pub const fn new(cache: LocalCache<S>) -> Self {
        Self {
            cache,
            lock_stale_after: DEFAULT_LOCK_STALE_AFTER,
        }
    }

    #[must_use]
    pub const fn with_lock_stale_after(mut self, stale_after: Duration) -> Self {
        self.lock_stale_after = stale_after;
        self
    }

    pub const fn cache(&self) -> &LocalCache<S> {
        &self.cache
    }

    /// Append an operation; it is durably stored when this returns
    pub fn enqueue(&self, operation: PendingOperation) -> Result<()> {
        loop {
            let raw = self.cache.queue_raw()?;
            let mut queue = LocalCache::<S>::parse_queue(raw.as_deref())?;
            queue.push(operation.clone());
            if self.cache.swap_queue(raw.as_deref(), &queue)? {
                tracing::info!(
                    table = %operation.table,
                    method = ?operation.method,
                    queued = queue.len(),
                    "Queued operation for later sync"
                );
                return Ok(());
            }
        }
    }

    /// Pending operations in replay order
    pub fn pending(&self) -> Result<Vec<PendingOperation>> {
        self.cache.load_queue()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.pending()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Replay queued operations against the remote store in FIFO order.
    ///
    /// Fails with [`Error::QueueLocked`] when another drainer holds the lock.
    /// A replay failure is not an `Err`: it is reported in
    /// [`DrainReport::failure`] and the queue keeps that entry at its head.
    pub async fn drain<R: RemoteStore>(&self, remote: &R) -> Result<DrainReport> {
        let mut lock = DrainLock::acquire(self.cache.store(), self.lock_stale_after)?;
        let mut report = DrainReport::default();

        loop {
            let queue = self.cache.load_queue()?;
            let Some(head) = queue.into_iter().next() else {
                break;
            };

            let position = report.replayed + 1;
            match replay(remote, &head).await {
                Ok(()) => {
                    if !self.remove_head(&head)? {
                        break;
                    }
                    report.replayed += 1;
                    tracing::debug!(position, "Replayed queued operation");
                    if !lock.renew()? {
                        break;
                    }
                }
                Err(message) => {
                    tracing::warn!(position, "Queue replay halted: {message}");
                    report.failure = Some(ReplayFailure { position, message });
                    break;
                }
            }
        }

        report.remaining = self.len()?;
        tracing::info!(
            replayed = report.replayed,
            remaining = report.remaining,
            "Sync queue drain finished"
        );
        Ok(report)
    }

    /// Remove `head` if it is still the first entry. Entries appended while
    /// the replay was in flight are preserved. Returns `false` when another
    /// drainer already removed it.
    fn remove_head(&self, head: &PendingOperation) -> Result<bool> {
        loop {
            let raw = self.cache.queue_raw()?;
            let mut queue = LocalCache::<S>::parse_queue(raw.as_deref())?;
            if queue.first() != Some(head) {
                tracing::warn!("Queue head changed during replay; leaving queue untouched");
                return Ok(false);
            }
            queue.remove(0);
            if self.cache.swap_queue(raw.as_deref(), &queue)? {
                return Ok(true);
            }
        }
    }
}

async fn replay<R: RemoteStore>(
    remote: &R,
    operation: &PendingOperation,
) -> std::result::Result<(), String> {
    if operation.table != remote.records_table() {
        return Err(format!("unknown table '{}'", operation.table));
    }

    match operation.method {
        OperationKind::Insert => {
            for mut record in operation.insert_rows()? {
                record.client_id = Some(record.idempotency_key());
                record.id = None;
                record.recompute_fee();
                remote
                    .insert_record(&record)
                    .await
                    .map_err(|error| error.to_string())?;
            }
            Ok(())
        }
        OperationKind::Update => {
            let id = operation.target_id()?;
            remote
                .update_record(&id, operation.patch()?)
                .await
                .map_err(|error| error.to_string())
        }
        OperationKind::Delete => {
            let id = operation.target_id()?;
            remote
                .delete_record(&id)
                .await
                .map_err(|error| error.to_string())
        }
    }
}
