//! In-process remote store used by tests and offline demos.
//!
//! Behaves like the hosted store for the operations the sync layer uses,
//! including `client_id` deduplication on insert, and supports failure
//! injection.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use super::{RecordQuery, RemoteStore, RECORDS_TABLE};
use crate::error::{Error, Result};
use crate::models::{OwningUnit, ParkingRecord, RecordView, RemoteId, UserSummary};

#[derive(Default)]
struct State {
    next_id: i64,
    records: Vec<ParkingRecord>,
    units: Vec<OwningUnit>,
    user_names: HashMap<RemoteId, String>,
    objects: BTreeMap<String, (String, Vec<u8>)>,
    rejected_plates: HashMap<String, String>,
    outage: Option<String>,
    insert_calls: usize,
}

/// Shared in-memory remote store; clones observe the same data
#[derive(Clone, Default)]
pub struct InMemoryRemoteStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_units(self, units: Vec<OwningUnit>) -> Self {
        self.lock().units = units;
        self
    }

    /// Make another owning unit visible to later unit listings
    pub fn add_unit(&self, unit: OwningUnit) {
        self.lock().units.push(unit);
    }

    pub fn set_user_name(&self, id: RemoteId, name: impl Into<String>) {
        self.lock().user_names.insert(id, name.into());
    }

    /// Reject every insert of this plate with `message`
    pub fn reject_plate(&self, plate: &str, message: impl Into<String>) {
        self.lock()
            .rejected_plates
            .insert(plate.to_string(), message.into());
    }

    pub fn accept_all_plates(&self) {
        self.lock().rejected_plates.clear();
    }

    /// Fail every call with `message` until [`Self::recover`]
    pub fn fail_with(&self, message: impl Into<String>) {
        self.lock().outage = Some(message.into());
    }

    pub fn recover(&self) {
        self.lock().outage = None;
    }

    /// Stored rows in insertion order
    pub fn records(&self) -> Vec<ParkingRecord> {
        self.lock().records.clone()
    }

    /// Number of insert requests received, including deduplicated ones
    pub fn insert_calls(&self) -> usize {
        self.lock().insert_calls
    }

    pub fn object_names(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    pub fn public_url(name: &str) -> String {
        format!("memory://objects/{name}")
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_outage(state: &State) -> Result<()> {
        match &state.outage {
            Some(message) => Err(Error::RemoteWrite(message.clone())),
            None => Ok(()),
        }
    }

    fn join(state: &State, record: &ParkingRecord) -> RecordView {
        let unit = record
            .unit_id
            .as_ref()
            .and_then(|id| state.units.iter().find(|unit| &unit.id == id))
            .map(OwningUnit::summary);
        let submitted_by = record.user_id.as_ref().map(|id| UserSummary {
            id: Some(id.clone()),
            name: state.user_names.get(id).cloned(),
        });
        RecordView {
            record: record.clone(),
            unit,
            submitted_by,
        }
    }
}

impl RemoteStore for InMemoryRemoteStore {
    fn records_table(&self) -> &str {
        RECORDS_TABLE
    }

    async fn insert_record(&self, record: &ParkingRecord) -> Result<RemoteId> {
        let mut state = self.lock();
        state.insert_calls += 1;
        Self::check_outage(&state)?;

        if let Some(message) = state.rejected_plates.get(&record.plate) {
            return Err(Error::RemoteWrite(message.clone()));
        }

        if let Some(key) = record.client_id {
            if let Some(existing) = state
                .records
                .iter()
                .find(|row| row.client_id == Some(key))
            {
                return existing
                    .id
                    .clone()
                    .ok_or_else(|| Error::RemoteWrite("stored row has no id".to_string()));
            }
        }

        state.next_id += 1;
        let id = RemoteId::Int(state.next_id);
        let mut stored = record.clone();
        stored.id = Some(id.clone());
        state.records.push(stored);
        Ok(id)
    }

    async fn query_records(&self, query: &RecordQuery) -> Result<Vec<RecordView>> {
        let state = self.lock();
        Self::check_outage(&state)?;

        let mut rows = state
            .records
            .iter()
            .filter(|record| {
                query
                    .submitted_by
                    .as_ref()
                    .is_none_or(|user| record.user_id.as_ref() == Some(user))
            })
            .map(|record| Self::join(&state, record))
            .collect::<Vec<_>>();

        rows.sort_by_key(|row| row.record.entered_at);
        if query.newest_first {
            rows.reverse();
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn update_record(&self, id: &RemoteId, fields: &Map<String, Value>) -> Result<()> {
        let mut state = self.lock();
        Self::check_outage(&state)?;

        let row = state
            .records
            .iter_mut()
            .find(|row| row.id.as_ref() == Some(id))
            .ok_or_else(|| Error::RemoteWrite(format!("record {id} does not exist")))?;

        let mut merged = serde_json::to_value(&*row)?;
        if let Value::Object(target) = &mut merged {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        *row = serde_json::from_value(merged)
            .map_err(|error| Error::RemoteWrite(format!("invalid update: {error}")))?;
        Ok(())
    }

    async fn delete_record(&self, id: &RemoteId) -> Result<()> {
        let mut state = self.lock();
        Self::check_outage(&state)?;
        state.records.retain(|row| row.id.as_ref() != Some(id));
        Ok(())
    }

    async fn upload_object(
        &self,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        let mut state = self.lock();
        Self::check_outage(&state)?;
        if state.objects.contains_key(name) {
            return Err(Error::RemoteWrite(format!("The resource already exists: {name}")));
        }
        state
            .objects
            .insert(name.to_string(), (content_type.to_string(), bytes));
        Ok(Self::public_url(name))
    }

    async fn remove_object(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check_outage(&state)?;
        state.objects.remove(name);
        Ok(())
    }

    async fn list_units(&self) -> Result<Vec<OwningUnit>> {
        let state = self.lock();
        Self::check_outage(&state)?;
        Ok(state.units.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fee, IdempotencyKey, VehicleType};

    fn record(plate: &str) -> ParkingRecord {
        ParkingRecord {
            id: None,
            client_id: Some(IdempotencyKey::new()),
            plate: plate.to_string(),
            vehicle_type: VehicleType::Car,
            unit_id: Some(RemoteId::Int(1)),
            user_id: Some(RemoteId::Text("u-1".to_string())),
            note: None,
            entered_at: chrono::Utc::now(),
            photo_url: None,
            free: false,
            fee: Fee::from_cents(100),
            audio_url: None,
            collected: false,
            collected_on: None,
        }
    }

    #[tokio::test]
    async fn insert_deduplicates_on_client_id() {
        let remote = InMemoryRemoteStore::new();
        let row = record("AB123");

        let first = remote.insert_record(&row).await.unwrap();
        let second = remote.insert_record(&row).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(remote.records().len(), 1);
        assert_eq!(remote.insert_calls(), 2);
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let remote = InMemoryRemoteStore::new();
        let id = remote.insert_record(&record("AB123")).await.unwrap();

        let mut fields = Map::new();
        fields.insert("gratis".to_string(), Value::Bool(true));
        fields.insert("monto".to_string(), serde_json::json!(0));
        remote.update_record(&id, &fields).await.unwrap();

        let stored = &remote.records()[0];
        assert!(stored.free);
        assert_eq!(stored.fee, Fee::ZERO);
    }

    #[tokio::test]
    async fn outage_fails_every_call() {
        let remote = InMemoryRemoteStore::new();
        remote.fail_with("connection reset");
        let error = remote.list_units().await.unwrap_err();
        assert_eq!(error.to_string(), "connection reset");

        remote.recover();
        assert!(remote.list_units().await.is_ok());
    }
}
