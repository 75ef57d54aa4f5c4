//! Record listing.
//!
//! Loads rows from the source the connectivity monitor selects and keeps the
//! local snapshot current. Each load carries an epoch; a result that arrives
//! after a newer load or an [`RecordListing::invalidate`] call is dropped
//! without touching the cache.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};

use crate::capture::Attachment;
use crate::connectivity::Connectivity;
use crate::db::KeyValueStore;
use crate::error::{Error, Result};
use crate::models::{
    compute_fee, is_pending_upload, normalize_plate, Fee, ParkingRecord, RecordView, RemoteId,
    VehicleType,
};
use crate::queue::SyncQueue;
use crate::remote::{object_name_from_url, RemoteStore};
use crate::repository::{ActiveRepository, RecordRepository, RecordSource};
use crate::util::{normalize_text_option, unix_millis_now};

const AUDIO_CONTENT_TYPE: &str = "audio/webm";

/// Columns an edit may change
const EDITABLE_COLUMNS: &[&str] = &[
    "placa_vehiculo",
    "tipo_vehiculo",
    "fecha_hora_ingreso",
    "observaciones",
    "dependencia_id",
    "gratis",
    "monto",
    "recaudado",
    "fecha_recaudo",
    "observacion_audio_url",
];

/// Result of one listing load
#[derive(Debug, Clone, PartialEq)]
pub enum ListingLoad {
    Fresh {
        rows: Vec<RecordView>,
        source: RecordSource,
    },
    /// Superseded while in flight; discard
    Stale,
}

/// Client-side property/unit filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub property: Option<String>,
    pub unit: Option<String>,
}

impl RecordFilter {
    pub fn new(property: Option<String>, unit: Option<String>) -> Self {
        Self {
            property: normalize_text_option(property),
            unit: normalize_text_option(unit),
        }
    }

    /// Rows with no joined unit never match a non-empty filter.
    pub fn matches(&self, row: &RecordView) -> bool {
        let property_ok = self
            .property
            .as_deref()
            .is_none_or(|wanted| row.property() == Some(wanted));
        let unit_ok = self
            .unit
            .as_deref()
            .is_none_or(|wanted| row.unit_label() == Some(wanted));
        property_ok && unit_ok
    }

    pub fn apply<'r>(&self, rows: &'r [RecordView]) -> Vec<&'r RecordView> {
        rows.iter().filter(|row| self.matches(row)).collect()
    }
}

/// Sum of fees
pub fn total_fee<'r>(rows: impl IntoIterator<Item = &'r RecordView>) -> Fee {
    rows.into_iter().map(|row| row.record.fee).sum()
}

/// What happens to a record's audio note on edit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AudioChange {
    #[default]
    Keep,
    Replace(Attachment),
    Remove,
}

/// Edited field values for an existing record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEdit {
    pub plate: String,
    pub vehicle_type: VehicleType,
    pub entered_at: DateTime<Utc>,
    pub note: Option<String>,
    pub unit_id: Option<RemoteId>,
    pub free: bool,
    pub collected: bool,
    pub collected_on: Option<NaiveDate>,
    pub audio: AudioChange,
}

impl RecordEdit {
    /// Start from the current values of a record
    pub fn from_record(record: &ParkingRecord) -> Self {
        Self {
            plate: record.plate.clone(),
            vehicle_type: record.vehicle_type,
            entered_at: record.entered_at,
            note: record.note.clone(),
            unit_id: record.unit_id.clone(),
            free: record.free,
            collected: record.collected,
            collected_on: record.collected_on,
            audio: AudioChange::Keep,
        }
    }
}

/// Listing over the active record source
pub struct RecordListing<'a, R: RemoteStore, S: KeyValueStore> {
    remote: &'a R,
    queue: &'a SyncQueue<S>,
    connectivity: &'a Connectivity,
    epoch: AtomicU64,
}

impl<'a, R: RemoteStore, S: KeyValueStore> RecordListing<'a, R, S> {
    pub const fn new(remote: &'a R, queue: &'a SyncQueue<S>, connectivity: &'a Connectivity) -> Self {
        Self {
            remote,
            queue,
            connectivity,
            epoch: AtomicU64::new(0),
        }
    }

    /// Fetch rows newest first. Online results overwrite the local snapshot;
    /// offline the snapshot is returned unmodified.
    pub async fn load(&self) -> Result<ListingLoad> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let repository = ActiveRepository::select(self.connectivity, self.remote, self.queue);
        let mut rows = repository.fetch().await?;

        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!(epoch, "Discarding stale listing result");
            return Ok(ListingLoad::Stale);
        }

        rows.sort_by(|left, right| right.record.entered_at.cmp(&left.record.entered_at));
        repository.remember(&rows)?;
        tracing::debug!(count = rows.len(), source = ?repository.source(), "Loaded records");
        Ok(ListingLoad::Fresh {
            rows,
            source: repository.source(),
        })
    }

    /// Make every in-flight load stale
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Apply an edit to a remote record and return the stored values.
    /// Rejected while offline.
    pub async fn update_record(
        &self,
        current: &ParkingRecord,
        edit: RecordEdit,
    ) -> Result<ParkingRecord> {
        let id = self.editable_id(current)?;
        let plate = normalize_plate(&edit.plate);
        if plate.is_empty() {
            return Err(Error::Validation("Plate is required".to_string()));
        }

        let audio_url = match edit.audio {
            AudioChange::Keep => current.audio_url.clone(),
            AudioChange::Replace(audio) => {
                let name = format!("audio_obs_edit_{plate}_{}.webm", unix_millis_now());
                let url = self
                    .remote
                    .upload_object(&name, AUDIO_CONTENT_TYPE, audio.bytes)
                    .await
                    .map_err(|error| {
                        Error::RemoteWrite(format!("Failed to upload audio: {error}"))
                    })?;
                Some(url)
            }
            AudioChange::Remove => {
                self.remove_audio_object(current).await?;
                None
            }
        };

        let mut updated = current.clone();
        updated.plate = plate;
        updated.vehicle_type = edit.vehicle_type;
        updated.entered_at = edit.entered_at;
        updated.note = normalize_text_option(edit.note);
        updated.unit_id = edit.unit_id;
        updated.free = edit.free;
        updated.fee = compute_fee(edit.free, edit.vehicle_type);
        updated.collected = edit.collected;
        updated.collected_on = if edit.collected { edit.collected_on } else { None };
        updated.audio_url = audio_url;

        let fields = editable_fields(&updated)?;
        self.remote.update_record(&id, &fields).await?;
        tracing::info!(%id, "Updated parking record");
        Ok(updated)
    }

    /// Delete a remote record. Rejected while offline.
    pub async fn delete_record(&self, current: &ParkingRecord) -> Result<()> {
        let id = self.editable_id(current)?;
        self.remote.delete_record(&id).await?;
        tracing::info!(%id, "Deleted parking record");
        Ok(())
    }

    fn editable_id(&self, current: &ParkingRecord) -> Result<RemoteId> {
        if !self.connectivity.is_online() {
            return Err(Error::OfflineEditRejected);
        }
        current.id.clone().ok_or_else(|| {
            Error::NotFound(format!("record {} has not been synced yet", current.plate))
        })
    }

    async fn remove_audio_object(&self, current: &ParkingRecord) -> Result<()> {
        let Some(url) = current.audio_url.as_deref() else {
            return Ok(());
        };
        if is_pending_upload(Some(url)) {
            return Ok(());
        }
        if let Some(name) = object_name_from_url(url) {
            self.remote
                .remove_object(name)
                .await
                .map_err(|error| Error::RemoteWrite(format!("Failed to remove audio: {error}")))?;
        }
        Ok(())
    }
}

fn editable_fields(record: &ParkingRecord) -> Result<Map<String, Value>> {
    let Value::Object(mut row) = serde_json::to_value(record)? else {
        return Ok(Map::new());
    };
    row.retain(|column, _| EDITABLE_COLUMNS.contains(&column.as_str()));
    // Cleared optional values must be sent as explicit nulls.
    for column in EDITABLE_COLUMNS {
        row.entry(*column).or_insert(Value::Null);
    }
    Ok(row)
}
