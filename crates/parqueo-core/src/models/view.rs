//! Listing row: a record joined with its owning unit and submitting user

use serde::{Deserialize, Serialize};

use super::record::{ParkingRecord, RemoteId};
use super::serde_helpers;
use super::unit::UnitSummary;

/// Submitting user display fields (`usuario`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    #[serde(default)]
    pub id: Option<RemoteId>,
    #[serde(rename = "nombre", default, deserialize_with = "serde_helpers::optional_text")]
    pub name: Option<String>,
}

/// One row of the record listing and of the cached snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
    #[serde(flatten)]
    pub record: ParkingRecord,
    #[serde(rename = "copropietarios", default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitSummary>,
    #[serde(rename = "usuario", default, skip_serializing_if = "Option::is_none")]
    pub submitted_by: Option<UserSummary>,
}

impl RecordView {
    pub const fn new(record: ParkingRecord) -> Self {
        Self {
            record,
            unit: None,
            submitted_by: None,
        }
    }

    #[must_use]
    pub fn with_unit(mut self, unit: UnitSummary) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Property of the joined unit, if known
    pub fn property(&self) -> Option<&str> {
        self.unit.as_ref().and_then(|unit| unit.property.as_deref())
    }

    /// Unit label of the joined unit, if known
    pub fn unit_label(&self) -> Option<&str> {
        self.unit.as_ref().and_then(|unit| unit.unit.as_deref())
    }

    /// Whether this row exists only locally
    pub const fn is_local_only(&self) -> bool {
        self.record.id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joined_row_deserializes() {
        let row: RecordView = serde_json::from_value(json!({
            "id": 5,
            "placa_vehiculo": "AB123",
            "tipo_vehiculo": "carro",
            "fecha_hora_ingreso": "2024-05-01T10:30:00+00:00",
            "gratis": false,
            "monto": 1,
            "recaudado": false,
            "fecha_recaudo": null,
            "dependencia_id": 3,
            "foto_url": null,
            "observacion_audio_url": null,
            "observaciones": null,
            "copropietarios": { "nombre": "Ana", "propiedad": "Casa", "unidad_asignada": "12" },
            "usuario": { "id": "u-1", "nombre": "Guardia" }
        }))
        .unwrap();

        assert_eq!(row.property(), Some("Casa"));
        assert_eq!(row.unit_label(), Some("12"));
        assert_eq!(row.record.fee.cents(), 100);
        assert_eq!(
            row.submitted_by.as_ref().and_then(|user| user.name.as_deref()),
            Some("Guardia")
        );
        assert!(!row.is_local_only());
    }

    #[test]
    fn row_without_join_has_no_property() {
        let row: RecordView = serde_json::from_value(json!({
            "placa_vehiculo": "AB123",
            "fecha_hora_ingreso": "2024-05-01T10:30:00Z",
            "copropietarios": null
        }))
        .unwrap();
        assert_eq!(row.property(), None);
        assert!(row.is_local_only());
    }
}
