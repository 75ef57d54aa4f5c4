//! Storage-agnostic record repository.
//!
//! Capture and listing depend on [`RecordRepository`]; the connectivity
//! monitor picks the implementation. Online, reads come from the remote store
//! and are mirrored into the local cache. Offline, reads come from the cache
//! and inserts are deferred to the sync queue.

use crate::connectivity::Connectivity;
use crate::db::KeyValueStore;
use crate::error::Result;
use crate::models::{
    sort_units, OwningUnit, ParkingRecord, PendingOperation, RecordView, RemoteId, UnitSummary,
};
use crate::queue::SyncQueue;
use crate::remote::{RecordQuery, RemoteStore};

/// Where a set of rows came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSource {
    Remote,
    Cache,
}

/// Result of persisting a new record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persisted {
    /// Stored remotely under this identifier
    Remote(RemoteId),
    /// Stored locally and queued for replay
    Deferred,
}

#[allow(async_fn_in_trait)]
pub trait RecordRepository {
    fn source(&self) -> RecordSource;

    /// Read the full record set without side effects
    async fn fetch(&self) -> Result<Vec<RecordView>>;

    /// Record a fetched set as the latest known state
    fn remember(&self, rows: &[RecordView]) -> Result<()>;

    /// Fetch and remember in one step
    async fn list(&self) -> Result<Vec<RecordView>> {
        let rows = self.fetch().await?;
        self.remember(&rows)?;
        Ok(rows)
    }

    /// Persist a new record. `unit` is the display summary of its owning
    /// unit, kept with locally stored copies.
    async fn insert(&self, record: &ParkingRecord, unit: Option<UnitSummary>)
        -> Result<Persisted>;

    /// Known owning units in display order
    async fn units(&self) -> Result<Vec<OwningUnit>>;
}

/// Repository backed by the remote store
pub struct RemoteRecordRepository<'a, R: RemoteStore, S: KeyValueStore> {
    remote: &'a R,
    queue: &'a SyncQueue<S>,
}

impl<'a, R: RemoteStore, S: KeyValueStore> RemoteRecordRepository<'a, R, S> {
    pub const fn new(remote: &'a R, queue: &'a SyncQueue<S>) -> Self {
        Self { remote, queue }
    }
}

impl<R: RemoteStore, S: KeyValueStore> RecordRepository for RemoteRecordRepository<'_, R, S> {
    fn source(&self) -> RecordSource {
        RecordSource::Remote
    }

    async fn fetch(&self) -> Result<Vec<RecordView>> {
        self.remote.query_records(&RecordQuery::default()).await
    }

    fn remember(&self, rows: &[RecordView]) -> Result<()> {
        self.queue.cache().save_snapshot(rows)
    }

    async fn insert(
        &self,
        record: &ParkingRecord,
        _unit: Option<UnitSummary>,
    ) -> Result<Persisted> {
        let id = self.remote.insert_record(record).await?;
        Ok(Persisted::Remote(id))
    }

    async fn units(&self) -> Result<Vec<OwningUnit>> {
        let mut units = self.remote.list_units().await?;
        sort_units(&mut units);
        self.queue.cache().save_units(&units)?;
        tracing::debug!(count = units.len(), "Refreshed owning units");
        Ok(units)
    }
}

/// Repository backed by the local cache and the sync queue
pub struct CachedRecordRepository<'a, S: KeyValueStore> {
    queue: &'a SyncQueue<S>,
    table: String,
}

impl<'a, S: KeyValueStore> CachedRecordRepository<'a, S> {
    /// `table` names the remote table queued inserts target
    pub fn new(queue: &'a SyncQueue<S>, table: impl Into<String>) -> Self {
        Self {
            queue,
            table: table.into(),
        }
    }
}

impl<S: KeyValueStore> RecordRepository for CachedRecordRepository<'_, S> {
    fn source(&self) -> RecordSource {
        RecordSource::Cache
    }

    async fn fetch(&self) -> Result<Vec<RecordView>> {
        Ok(self.queue.cache().load_snapshot())
    }

    fn remember(&self, _rows: &[RecordView]) -> Result<()> {
        Ok(())
    }

    async fn insert(
        &self,
        record: &ParkingRecord,
        unit: Option<UnitSummary>,
    ) -> Result<Persisted> {
        let operation = PendingOperation::insert(self.table.as_str(), record)?;
        let mut view = RecordView::new(record.clone());
        view.unit = unit;

        // Refuse before touching the snapshot if the queue is unreadable.
        self.queue.pending()?;
        let previous = self.queue.cache().load_snapshot();
        self.queue.cache().append_to_snapshot(view)?;
        if let Err(error) = self.queue.enqueue(operation) {
            if let Err(restore) = self.queue.cache().save_snapshot(&previous) {
                tracing::warn!("Failed to roll back record snapshot: {restore}");
            }
            return Err(error);
        }
        Ok(Persisted::Deferred)
    }

    async fn units(&self) -> Result<Vec<OwningUnit>> {
        let mut units = self.queue.cache().load_units();
        sort_units(&mut units);
        Ok(units)
    }
}

/// Repository chosen from the current connectivity state
pub enum ActiveRepository<'a, R: RemoteStore, S: KeyValueStore> {
    Remote(RemoteRecordRepository<'a, R, S>),
    Cached(CachedRecordRepository<'a, S>),
}

impl<'a, R: RemoteStore, S: KeyValueStore> ActiveRepository<'a, R, S> {
    pub fn select(connectivity: &Connectivity, remote: &'a R, queue: &'a SyncQueue<S>) -> Self {
        if connectivity.is_online() {
            Self::Remote(RemoteRecordRepository::new(remote, queue))
        } else {
            Self::Cached(CachedRecordRepository::new(queue, remote.records_table()))
        }
    }
}

impl<R: RemoteStore, S: KeyValueStore> RecordRepository for ActiveRepository<'_, R, S> {
    fn source(&self) -> RecordSource {
        match self {
            Self::Remote(repo) => repo.source(),
            Self::Cached(repo) => repo.source(),
        }
    }

    async fn fetch(&self) -> Result<Vec<RecordView>> {
        match self {
            Self::Remote(repo) => repo.fetch().await,
            Self::Cached(repo) => repo.fetch().await,
        }
    }

    fn remember(&self, rows: &[RecordView]) -> Result<()> {
        match self {
            Self::Remote(repo) => repo.remember(rows),
            Self::Cached(repo) => repo.remember(rows),
        }
    }

    async fn insert(
        &self,
        record: &ParkingRecord,
        unit: Option<UnitSummary>,
    ) -> Result<Persisted> {
        match self {
            Self::Remote(repo) => repo.insert(record, unit).await,
            Self::Cached(repo) => repo.insert(record, unit).await,
        }
    }

    async fn units(&self) -> Result<Vec<OwningUnit>> {
        match self {
            Self::Remote(repo) => repo.units().await,
            Self::Cached(repo) => repo.units().await,
        }
    }
}
