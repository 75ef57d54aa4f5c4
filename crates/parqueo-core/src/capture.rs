//! Record capture workflow.
//!
//! One submission moves through `Validating`, `ResolvingMedia` and
//! `Persisting` before ending in `Completed` or `Failed`. Online, media is
//! uploaded and the record inserted remotely; a rejection is surfaced and
//! nothing is queued. Offline, media is marked as pending upload and the
//! record is appended to the local snapshot and queued for replay.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::connectivity::Connectivity;
use crate::db::KeyValueStore;
use crate::error::{Error, Result};
use crate::models::{
    compute_fee, normalize_plate, resolve_unit, IdempotencyKey, OwningUnit, ParkingRecord,
    RemoteId, VehicleType, PENDING_UPLOAD,
};
use crate::queue::SyncQueue;
use crate::remote::RemoteStore;
use crate::repository::{
    ActiveRepository, CachedRecordRepository, Persisted, RecordRepository, RemoteRecordRepository,
};
use crate::util::{normalize_text_option, unix_millis_now};

pub const SAVED_MESSAGE: &str = "Record saved.";
pub const SAVED_OFFLINE_MESSAGE: &str =
    "Record saved offline. It will sync when the connection returns.";

const AUDIO_CONTENT_TYPE: &str = "audio/webm";
const DEFAULT_PHOTO_EXTENSION: &str = "jpg";

/// Binary attachment picked by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    fn extension(&self) -> String {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .unwrap_or(DEFAULT_PHOTO_EXTENSION)
            .to_string()
    }
}

/// Raw form input for a new record
#[derive(Debug, Clone, Default)]
pub struct CaptureForm {
    pub plate: String,
    pub vehicle_type: VehicleType,
    pub property: String,
    pub unit: String,
    pub note: Option<String>,
    /// Entry time; defaults to now
    pub entered_at: Option<DateTime<Utc>>,
    pub free: bool,
    pub photo: Option<Attachment>,
    pub audio: Option<Attachment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    Idle,
    Validating,
    ResolvingMedia,
    Persisting,
    Completed,
    Failed,
}

/// Successful end of a submission
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Inserted remotely
    Saved { id: RemoteId, record: ParkingRecord },
    /// Stored locally and queued
    SavedOffline { record: ParkingRecord },
}

impl CaptureOutcome {
    pub const fn record(&self) -> &ParkingRecord {
        match self {
            Self::Saved { record, .. } | Self::SavedOffline { record } => record,
        }
    }

    /// User-facing confirmation
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Saved { .. } => SAVED_MESSAGE,
            Self::SavedOffline { .. } => SAVED_OFFLINE_MESSAGE,
        }
    }
}

type SavedCallback<'a> = Box<dyn FnMut(&RemoteId, &ParkingRecord) + Send + 'a>;

/// Drives record submissions
pub struct CaptureWorkflow<'a, R: RemoteStore, S: KeyValueStore> {
    remote: &'a R,
    queue: &'a SyncQueue<S>,
    connectivity: &'a Connectivity,
    user_id: Option<RemoteId>,
    units: Vec<OwningUnit>,
    stage: CaptureStage,
    on_saved: Option<SavedCallback<'a>>,
}

impl<'a, R: RemoteStore, S: KeyValueStore> CaptureWorkflow<'a, R, S> {
    pub const fn new(remote: &'a R, queue: &'a SyncQueue<S>, connectivity: &'a Connectivity) -> Self {
        Self {
            remote,
            queue,
            connectivity,
            user_id: None,
            units: Vec::new(),
            stage: CaptureStage::Idle,
            on_saved: None,
        }
    }

    /// Submitting user recorded on every new record
    #[must_use]
    pub fn with_user(mut self, user_id: Option<RemoteId>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Called once per successful remote insert
    #[must_use]
    pub fn on_saved(mut self, callback: impl FnMut(&RemoteId, &ParkingRecord) + Send + 'a) -> Self {
        self.on_saved = Some(Box::new(callback));
        self
    }

    pub const fn stage(&self) -> CaptureStage {
        self.stage
    }

    /// Units the last submission was validated against
    pub fn units(&self) -> &[OwningUnit] {
        &self.units
    }

    /// Reload the owning units from the active source
    pub async fn refresh_units(&mut self) -> Result<&[OwningUnit]> {
        let repository = ActiveRepository::select(self.connectivity, self.remote, self.queue);
        self.units = repository.units().await?;
        Ok(&self.units)
    }

    /// Run one submission to completion
    pub async fn submit(&mut self, form: CaptureForm) -> Result<CaptureOutcome> {
        let result = self.run(form).await;
        match &result {
            Ok(outcome) => {
                self.enter(CaptureStage::Completed);
                if let CaptureOutcome::Saved { id, record } = outcome {
                    if let Some(callback) = self.on_saved.as_mut() {
                        callback(id, record);
                    }
                }
            }
            Err(error) => {
                self.enter(CaptureStage::Failed);
                tracing::warn!("Record capture failed: {error}");
            }
        }
        result
    }

    async fn run(&mut self, form: CaptureForm) -> Result<CaptureOutcome> {
        self.enter(CaptureStage::Validating);
        let plate = normalize_plate(&form.plate);
        if plate.is_empty() {
            return Err(Error::Validation("Plate is required".to_string()));
        }
        if self.units.is_empty() {
            self.refresh_units().await?;
        } else if self.connectivity.is_online() {
            if let Err(error) = self.refresh_units().await {
                tracing::warn!("Keeping previously loaded units: {error}");
            }
        }
        let unit = resolve_unit(&self.units, &form.property, &form.unit)
            .cloned()
            .ok_or_else(|| {
                Error::Validation("Select a valid property and assigned unit".to_string())
            })?;

        self.enter(CaptureStage::ResolvingMedia);
        // Fixed once so every remote decision of this submission agrees.
        let online = self.connectivity.is_online();
        let photo_url = match &form.photo {
            Some(photo) => {
                let name = format!("{plate}_{}.{}", unix_millis_now(), photo.extension());
                Some(self.resolve_media(online, &name, photo, "photo").await?)
            }
            None => None,
        };
        let audio_url = match &form.audio {
            Some(audio) => {
                let name = format!("audio_obs_{plate}_{}.webm", unix_millis_now());
                Some(self.resolve_media(online, &name, audio, "audio").await?)
            }
            None => None,
        };

        let record = ParkingRecord {
            id: None,
            client_id: Some(IdempotencyKey::new()),
            plate,
            vehicle_type: form.vehicle_type,
            unit_id: Some(unit.id.clone()),
            user_id: self.user_id.clone(),
            note: normalize_text_option(form.note),
            entered_at: form.entered_at.unwrap_or_else(Utc::now),
            photo_url,
            free: form.free,
            fee: compute_fee(form.free, form.vehicle_type),
            audio_url,
            collected: false,
            collected_on: None,
        };

        self.enter(CaptureStage::Persisting);
        let repository = if online {
            ActiveRepository::Remote(RemoteRecordRepository::new(self.remote, self.queue))
        } else {
            ActiveRepository::Cached(CachedRecordRepository::new(
                self.queue,
                self.remote.records_table(),
            ))
        };
        match repository.insert(&record, Some(unit.summary())).await? {
            Persisted::Remote(id) => {
                tracing::info!(%id, plate = %record.plate, "Registered parking record");
                Ok(CaptureOutcome::Saved { id, record })
            }
            Persisted::Deferred => {
                tracing::info!(plate = %record.plate, "Registered parking record offline");
                Ok(CaptureOutcome::SavedOffline { record })
            }
        }
    }

    async fn resolve_media(
        &self,
        online: bool,
        name: &str,
        attachment: &Attachment,
        kind: &str,
    ) -> Result<String> {
        if !online {
            return Ok(PENDING_UPLOAD.to_string());
        }
        let content_type = if kind == "audio" {
            AUDIO_CONTENT_TYPE
        } else {
            attachment.content_type.as_str()
        };
        self.remote
            .upload_object(name, content_type, attachment.bytes.clone())
            .await
            .map_err(|error| Error::RemoteWrite(format!("Failed to upload {kind}: {error}")))
    }

    fn enter(&mut self, stage: CaptureStage) {
        tracing::debug!(from = ?self.stage, to = ?stage, "Capture stage");
        self.stage = stage;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use crate::db::MemoryKeyValueStore;
    use crate::models::Fee;
    use crate::remote::InMemoryRemoteStore;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn units() -> Vec<OwningUnit> {
        vec![
            OwningUnit {
                id: RemoteId::Int(12),
                owner_name: Some("Ana".to_string()),
                property: Some("Casa".to_string()),
                unit: Some("12".to_string()),
            },
            OwningUnit {
                id: RemoteId::Int(31),
                owner_name: Some("Luis".to_string()),
                property: Some("Depto".to_string()),
                unit: Some("3B".to_string()),
            },
        ]
    }

    fn queue() -> SyncQueue<MemoryKeyValueStore> {
        SyncQueue::new(LocalCache::new(MemoryKeyValueStore::new()))
    }

    fn form(plate: &str) -> CaptureForm {
        CaptureForm {
            plate: plate.to_string(),
            vehicle_type: VehicleType::Car,
            property: "Casa".to_string(),
            unit: "12".to_string(),
            ..CaptureForm::default()
        }
    }

    #[tokio::test]
    async fn offline_submission_is_cached_and_queued() {
        let remote = InMemoryRemoteStore::new();
        let queue = queue();
        queue.cache().save_units(&units()).unwrap();
        let connectivity = Connectivity::new(false);
        let mut workflow = CaptureWorkflow::new(&remote, &queue, &connectivity);

        let outcome = workflow.submit(form("ab-123!")).await.unwrap();

        assert_eq!(outcome.message(), SAVED_OFFLINE_MESSAGE);
        assert_eq!(workflow.stage(), CaptureStage::Completed);
        let snapshot = queue.cache().load_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].record.plate, "AB123");
        assert_eq!(snapshot[0].record.photo_url, None);
        assert_eq!(snapshot[0].record.fee, Fee::from_cents(100));
        assert_eq!(snapshot[0].unit_label(), Some("12"));

        let pending = queue.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].insert_rows().unwrap(), vec![outcome.record().clone()]);
        assert_eq!(remote.insert_calls(), 0);
    }

    #[tokio::test]
    async fn online_submission_fires_callback_once() {
        let remote = InMemoryRemoteStore::new().with_units(units());
        let queue = queue();
        let connectivity = Connectivity::new(true);
        let saved = AtomicUsize::new(0);
        let mut workflow = CaptureWorkflow::new(&remote, &queue, &connectivity)
            .with_user(Some(RemoteId::Text("user-1".to_string())))
            .on_saved(|_, _| {
                saved.fetch_add(1, Ordering::SeqCst);
            });

        let outcome = workflow.submit(form("ab-123!")).await.unwrap();
        drop(workflow);

        assert!(matches!(outcome, CaptureOutcome::Saved { .. }));
        assert_eq!(saved.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty().unwrap());
        let stored = remote.records();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].plate, "AB123");
        assert_eq!(stored[0].unit_id, Some(RemoteId::Int(12)));
        assert_eq!(stored[0].user_id, Some(RemoteId::Text("user-1".to_string())));
    }

    #[tokio::test]
    async fn online_submission_sees_units_added_later() {
        let remote = InMemoryRemoteStore::new().with_units(units());
        let queue = queue();
        let connectivity = Connectivity::new(true);
        let mut workflow = CaptureWorkflow::new(&remote, &queue, &connectivity);
        workflow.submit(form("AB123")).await.unwrap();

        remote.add_unit(OwningUnit {
            id: RemoteId::Int(40),
            owner_name: Some("Marta".to_string()),
            property: Some("Casa".to_string()),
            unit: Some("40".to_string()),
        });
        let mut input = form("CD456");
        input.unit = "40".to_string();
        let outcome = workflow.submit(input).await.unwrap();

        assert_eq!(outcome.record().unit_id, Some(RemoteId::Int(40)));
        assert_eq!(workflow.units().len(), 3);
    }

    #[tokio::test]
    async fn offline_submission_with_unreadable_queue_leaves_no_trace() {
        let remote = InMemoryRemoteStore::new();
        let queue = queue();
        queue.cache().save_units(&units()).unwrap();
        queue
            .cache()
            .store()
            .set(crate::cache::QUEUE_KEY, "{not json")
            .unwrap();
        let connectivity = Connectivity::new(false);
        let mut workflow = CaptureWorkflow::new(&remote, &queue, &connectivity);

        assert!(workflow.submit(form("AB123")).await.is_err());
        assert_eq!(workflow.stage(), CaptureStage::Failed);
        assert!(queue.cache().load_snapshot().is_empty());
    }

    #[tokio::test]
    async fn empty_plate_is_rejected_without_side_effects() {
        let remote = InMemoryRemoteStore::new().with_units(units());
        let queue = queue();
        let connectivity = Connectivity::new(false);
        let mut workflow = CaptureWorkflow::new(&remote, &queue, &connectivity);

        let error = workflow.submit(form(" -!- ")).await.unwrap_err();

        assert!(matches!(error, Error::Validation(_)));
        assert_eq!(workflow.stage(), CaptureStage::Failed);
        assert!(queue.cache().load_snapshot().is_empty());
        assert!(queue.is_empty().unwrap());
    }

    #[tokio::test]
    async fn unknown_unit_is_rejected() {
        let remote = InMemoryRemoteStore::new().with_units(units());
        let queue = queue();
        let connectivity = Connectivity::new(true);
        let mut workflow = CaptureWorkflow::new(&remote, &queue, &connectivity);

        let mut input = form("AB123");
        input.unit = "99".to_string();
        let error = workflow.submit(input).await.unwrap_err();

        assert!(matches!(error, Error::Validation(_)));
        assert!(remote.records().is_empty());
    }

    #[tokio::test]
    async fn remote_rejection_is_surfaced_and_not_queued() {
        let remote = InMemoryRemoteStore::new().with_units(units());
        remote.reject_plate("AB123", "duplicate key value violates unique constraint");
        let queue = queue();
        let connectivity = Connectivity::new(true);
        let saved = AtomicUsize::new(0);
        let mut workflow = CaptureWorkflow::new(&remote, &queue, &connectivity).on_saved(|_, _| {
            saved.fetch_add(1, Ordering::SeqCst);
        });

        let error = workflow.submit(form("AB123")).await.unwrap_err();
        drop(workflow);

        assert_eq!(
            error.to_string(),
            "duplicate key value violates unique constraint"
        );
        assert_eq!(saved.load(Ordering::SeqCst), 0);
        assert!(queue.is_empty().unwrap());
        assert!(queue.cache().load_snapshot().is_empty());
    }

    #[tokio::test]
    async fn offline_media_is_marked_pending() {
        let remote = InMemoryRemoteStore::new();
        let queue = queue();
        queue.cache().save_units(&units()).unwrap();
        let connectivity = Connectivity::new(false);
        let mut workflow = CaptureWorkflow::new(&remote, &queue, &connectivity);

        let mut input = form("XYZ9");
        input.vehicle_type = VehicleType::Motorcycle;
        input.photo = Some(Attachment::new("frente.png", "image/png", vec![1, 2, 3]));
        input.audio = Some(Attachment::new("nota.webm", "audio/webm", vec![4, 5]));
        let outcome = workflow.submit(input).await.unwrap();

        let record = outcome.record();
        assert_eq!(record.photo_url.as_deref(), Some(PENDING_UPLOAD));
        assert_eq!(record.audio_url.as_deref(), Some(PENDING_UPLOAD));
        assert_eq!(record.fee, Fee::from_cents(50));
        assert!(remote.object_names().is_empty());
    }

    #[tokio::test]
    async fn online_media_is_uploaded_with_generated_names() {
        let remote = InMemoryRemoteStore::new().with_units(units());
        let queue = queue();
        let connectivity = Connectivity::new(true);
        let mut workflow = CaptureWorkflow::new(&remote, &queue, &connectivity);

        let mut input = form("ab 123");
        input.free = true;
        input.photo = Some(Attachment::new("frente.png", "image/png", vec![1, 2, 3]));
        let outcome = workflow.submit(input).await.unwrap();

        let names = remote.object_names();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("AB123_"));
        assert!(names[0].ends_with(".png"));
        let record = outcome.record();
        assert_eq!(
            record.photo_url,
            Some(InMemoryRemoteStore::public_url(&names[0]))
        );
        assert_eq!(record.fee, Fee::ZERO);
    }

    #[tokio::test]
    async fn failed_upload_stops_before_insert() {
        let remote = InMemoryRemoteStore::new().with_units(units());
        let queue = queue();
        let connectivity = Connectivity::new(true);
        let mut workflow = CaptureWorkflow::new(&remote, &queue, &connectivity);
        workflow.refresh_units().await.unwrap();
        remote.fail_with("Payload too large");

        let mut input = form("AB123");
        input.photo = Some(Attachment::new("frente.jpg", "image/jpeg", vec![0; 8]));
        let error = workflow.submit(input).await.unwrap_err();

        assert!(error.is_remote());
        assert!(error.to_string().contains("Payload too large"));
        assert_eq!(remote.insert_calls(), 0);
        assert!(queue.is_empty().unwrap());
    }
}
