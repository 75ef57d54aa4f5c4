//! Deferred mutation awaiting remote application

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::record::{ParkingRecord, RemoteId};
use super::serde_helpers;
use crate::error::Result;

/// Mutation kind of a queued operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

/// One entry of the `syncQueue`: `{ table, method, params, timestamp }`.
///
/// Parameter layout per method:
/// - `insert`: `[[record, ...]]`
/// - `update`: `[id, patch]`
/// - `delete`: `[id]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub table: String,
    pub method: OperationKind,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(deserialize_with = "serde_helpers::timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl PendingOperation {
    /// Queue entry inserting one record
    pub fn insert(table: impl Into<String>, record: &ParkingRecord) -> Result<Self> {
        let row = serde_json::to_value(record)?;
        Ok(Self {
            table: table.into(),
            method: OperationKind::Insert,
            params: vec![Value::Array(vec![row])],
            timestamp: Utc::now(),
        })
    }

    /// Queue entry applying a partial update
    pub fn update(table: impl Into<String>, id: &RemoteId, patch: Value) -> Result<Self> {
        Ok(Self {
            table: table.into(),
            method: OperationKind::Update,
            params: vec![serde_json::to_value(id)?, patch],
            timestamp: Utc::now(),
        })
    }

    /// Queue entry deleting one record
    pub fn delete(table: impl Into<String>, id: &RemoteId) -> Result<Self> {
        Ok(Self {
            table: table.into(),
            method: OperationKind::Delete,
            params: vec![serde_json::to_value(id)?],
            timestamp: Utc::now(),
        })
    }

    /// Records carried by an insert
    pub fn insert_rows(&self) -> std::result::Result<Vec<ParkingRecord>, String> {
        match self.params.first() {
            Some(Value::Array(rows)) => rows
                .iter()
                .map(|row| {
                    serde_json::from_value::<ParkingRecord>(row.clone())
                        .map_err(|error| format!("malformed insert row: {error}"))
                })
                .collect(),
            Some(row @ Value::Object(_)) => serde_json::from_value::<ParkingRecord>(row.clone())
                .map(|record| vec![record])
                .map_err(|error| format!("malformed insert row: {error}")),
            _ => Err("insert operation has no rows".to_string()),
        }
    }

    /// Target identifier of an update or delete
    pub fn target_id(&self) -> std::result::Result<RemoteId, String> {
        let raw = self
            .params
            .first()
            .ok_or_else(|| format!("{:?} operation has no target id", self.method))?;
        serde_json::from_value::<RemoteId>(raw.clone())
            .map_err(|error| format!("malformed target id: {error}"))
    }

    /// Field mapping of an update
    pub fn patch(&self) -> std::result::Result<&serde_json::Map<String, Value>, String> {
        match self.params.get(1) {
            Some(Value::Object(fields)) => Ok(fields),
            _ => Err("update operation has no field mapping".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fee, IdempotencyKey, VehicleType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record() -> ParkingRecord {
        ParkingRecord {
            id: None,
            client_id: Some(IdempotencyKey::new()),
            plate: "AB123".to_string(),
            vehicle_type: VehicleType::Car,
            unit_id: Some(RemoteId::Int(3)),
            user_id: None,
            note: None,
            entered_at: "2024-05-01T10:30:00Z".parse().unwrap(),
            photo_url: None,
            free: false,
            fee: Fee::from_cents(100),
            audio_url: None,
            collected: false,
            collected_on: None,
        }
    }

    #[test]
    fn insert_wraps_row_in_nested_array() {
        let row = record();
        let op = PendingOperation::insert("registros_parqueadero", &row).unwrap();
        let value = serde_json::to_value(&op).unwrap();

        assert_eq!(value["table"], json!("registros_parqueadero"));
        assert_eq!(value["method"], json!("insert"));
        assert_eq!(value["params"][0][0]["placa_vehiculo"], json!("AB123"));
        assert!(value["timestamp"].is_string());
        assert_eq!(op.insert_rows().unwrap(), vec![row]);
    }

    #[test]
    fn legacy_entry_parses() {
        let op: PendingOperation = serde_json::from_value(json!({
            "table": "registros_parqueadero",
            "method": "insert",
            "params": [[{
                "placa_vehiculo": "XYZ9",
                "tipo_vehiculo": "moto",
                "dependencia_id": 4,
                "fecha_hora_ingreso": "2024-05-01T10:30:00.000Z",
                "foto_url": "pendiente-sync",
                "gratis": false,
                "monto": 0.5
            }]],
            "timestamp": "2024-05-01T10:31:00.000Z"
        }))
        .unwrap();

        let rows = op.insert_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fee.cents(), 50);
        assert!(rows[0].has_pending_media());
    }

    #[test]
    fn update_and_delete_expose_target() {
        let update =
            PendingOperation::update("registros_parqueadero", &RemoteId::Int(9), json!({"gratis": true}))
                .unwrap();
        assert_eq!(update.target_id().unwrap(), RemoteId::Int(9));
        assert_eq!(update.patch().unwrap().get("gratis"), Some(&json!(true)));

        let delete = PendingOperation::delete("registros_parqueadero", &RemoteId::Int(9)).unwrap();
        assert_eq!(delete.target_id().unwrap(), RemoteId::Int(9));
        assert!(delete.patch().is_err());
    }

    #[test]
    fn empty_insert_is_reported() {
        let op = PendingOperation {
            table: "registros_parqueadero".to_string(),
            method: OperationKind::Insert,
            params: vec![],
            timestamp: Utc::now(),
        };
        assert!(op.insert_rows().is_err());
    }
}
