//! Parking record model

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use super::serde_helpers;

/// Value stored in a media URL field when the upload was skipped offline.
pub const PENDING_UPLOAD: &str = "pendiente-sync";

/// Namespace for idempotency keys derived from a record's natural key.
const NATURAL_KEY_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_2c3a_8b4e_4f5a_9c7d_0e1f_2a3b_4c5d);

static PLATE_STRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^A-Z0-9]").expect("Invalid regex"));

/// Identifier assigned by the remote store. Rows may use numeric or textual
/// keys; both are preserved as received.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl FromStr for RemoteId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(s.parse::<i64>()
            .map_or_else(|_| Self::Text(s.to_string()), Self::Int))
    }
}

/// Client-minted key that makes a replayed insert converge on one remote row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(Uuid);

impl IdempotencyKey {
    /// Mint a fresh key (UUID v7, time-sortable)
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Deterministic key for records captured without one: plate, entry
    /// timestamp, and owning unit.
    pub fn from_natural_key(plate: &str, entered_at: DateTime<Utc>, unit: Option<&RemoteId>) -> Self {
        let unit = unit.map(ToString::to_string).unwrap_or_default();
        let name = format!("{}|{}|{}", plate, entered_at.timestamp_millis(), unit);
        Self(Uuid::new_v5(&NATURAL_KEY_NAMESPACE, name.as_bytes()))
    }
}

impl Default for IdempotencyKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IdempotencyKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of vehicle, which decides the fee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VehicleType {
    #[default]
    #[serde(rename = "carro", alias = "Carro", alias = "car")]
    Car,
    #[serde(rename = "moto", alias = "Moto", alias = "motorcycle")]
    Motorcycle,
}

impl VehicleType {
    /// Per-entry rate for a paying vehicle
    pub const fn rate(self) -> Fee {
        match self {
            Self::Car => Fee::from_cents(100),
            Self::Motorcycle => Fee::from_cents(50),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Car => "carro",
            Self::Motorcycle => "moto",
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "car" | "carro" => Ok(Self::Car),
            "motorcycle" | "moto" => Ok(Self::Motorcycle),
            other => Err(format!("Unknown vehicle type: {other}")),
        }
    }
}

/// Money amount with two-decimal semantics, held as integer cents.
///
/// Serialized as a JSON number (`1.0`, `0.5`) to stay compatible with the
/// remote `monto` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fee(u32);

impl Fee {
    pub const ZERO: Self = Self(0);

    pub const fn from_cents(cents: u32) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> u32 {
        self.0
    }

    pub fn as_decimal(self) -> f64 {
        f64::from(self.0) / 100.0
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_decimal(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let cents = (value * 100.0).round();
        if cents > f64::from(u32::MAX) {
            return None;
        }
        Some(Self(cents as u32))
    }
}

impl std::ops::Add for Fee {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl std::iter::Sum for Fee {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, fee| acc + fee)
    }
}

impl fmt::Display for Fee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Fee {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_decimal())
    }
}

impl<'de> Deserialize<'de> for Fee {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        let value = match Option::<Raw>::deserialize(deserializer)? {
            None => return Ok(Self::ZERO),
            Some(Raw::Number(value)) => value,
            Some(Raw::Text(text)) => text
                .trim()
                .parse::<f64>()
                .map_err(|error| serde::de::Error::custom(format!("invalid amount {text}: {error}")))?,
        };
        Self::from_decimal(value)
            .ok_or_else(|| serde::de::Error::custom(format!("amount out of range: {value}")))
    }
}

/// Fee owed for one entry. Free entries cost nothing; otherwise the
/// vehicle's fixed rate applies.
pub const fn compute_fee(free: bool, vehicle_type: VehicleType) -> Fee {
    if free {
        Fee::ZERO
    } else {
        vehicle_type.rate()
    }
}

/// Uppercase the plate and drop everything outside `[A-Z0-9]`.
///
/// # Examples
///
/// ```
/// use parqueo_core::models::normalize_plate;
///
/// assert_eq!(normalize_plate("ab-123!"), "AB123");
/// ```
pub fn normalize_plate(raw: &str) -> String {
    PLATE_STRIP
        .replace_all(&raw.to_uppercase(), "")
        .into_owned()
}

/// Whether a media URL field holds the offline placeholder
pub fn is_pending_upload(url: Option<&str>) -> bool {
    url == Some(PENDING_UPLOAD)
}

/// One observed vehicle-parking event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingRecord {
    /// Server-assigned identifier, absent until synced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RemoteId>,
    /// Idempotency key carried through to the remote insert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<IdempotencyKey>,
    #[serde(rename = "placa_vehiculo")]
    pub plate: String,
    #[serde(rename = "tipo_vehiculo", default)]
    pub vehicle_type: VehicleType,
    #[serde(rename = "dependencia_id", default)]
    pub unit_id: Option<RemoteId>,
    #[serde(rename = "usuario_id", default)]
    pub user_id: Option<RemoteId>,
    #[serde(rename = "observaciones", default)]
    pub note: Option<String>,
    #[serde(rename = "fecha_hora_ingreso", deserialize_with = "serde_helpers::timestamp")]
    pub entered_at: DateTime<Utc>,
    #[serde(rename = "foto_url", default)]
    pub photo_url: Option<String>,
    #[serde(rename = "gratis", default, deserialize_with = "serde_helpers::flag")]
    pub free: bool,
    #[serde(rename = "monto", default)]
    pub fee: Fee,
    #[serde(rename = "observacion_audio_url", default)]
    pub audio_url: Option<String>,
    #[serde(rename = "recaudado", default, deserialize_with = "serde_helpers::flag")]
    pub collected: bool,
    #[serde(rename = "fecha_recaudo", default, deserialize_with = "serde_helpers::optional_date")]
    pub collected_on: Option<NaiveDate>,
}

impl ParkingRecord {
    /// Recompute the fee from the free flag and vehicle type
    pub fn recompute_fee(&mut self) {
        self.fee = compute_fee(self.free, self.vehicle_type);
    }

    /// Key used to deduplicate a replayed insert. Records captured by this
    /// client carry a minted key; older entries fall back to the natural key.
    pub fn idempotency_key(&self) -> IdempotencyKey {
        self.client_id.unwrap_or_else(|| {
            IdempotencyKey::from_natural_key(&self.plate, self.entered_at, self.unit_id.as_ref())
        })
    }

    /// Whether a photo or audio note still waits for upload
    pub fn has_pending_media(&self) -> bool {
        is_pending_upload(self.photo_url.as_deref()) || is_pending_upload(self.audio_url.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_record() -> ParkingRecord {
        ParkingRecord {
            id: None,
            client_id: Some(IdempotencyKey::new()),
            plate: "AB123".to_string(),
            vehicle_type: VehicleType::Motorcycle,
            unit_id: Some(RemoteId::Int(7)),
            user_id: Some(RemoteId::Text("user-1".to_string())),
            note: Some("visita".to_string()),
            entered_at: "2024-05-01T10:30:00Z".parse().unwrap(),
            photo_url: None,
            free: false,
            fee: Fee::from_cents(50),
            audio_url: Some(PENDING_UPLOAD.to_string()),
            collected: true,
            collected_on: NaiveDate::from_ymd_opt(2024, 5, 2),
        }
    }

    #[test]
    fn fee_is_zero_when_free() {
        for vehicle in [VehicleType::Car, VehicleType::Motorcycle] {
            assert_eq!(compute_fee(true, vehicle), Fee::ZERO);
        }
    }

    #[test]
    fn fee_uses_vehicle_rate() {
        assert_eq!(compute_fee(false, VehicleType::Car).as_decimal(), 1.00);
        assert_eq!(compute_fee(false, VehicleType::Motorcycle).as_decimal(), 0.50);
    }

    #[test]
    fn normalize_plate_strips_and_uppercases() {
        assert_eq!(normalize_plate("ab-123!"), "AB123");
        assert_eq!(normalize_plate("  x y z 9 "), "XYZ9");
        assert_eq!(normalize_plate("--!!"), "");
    }

    #[test]
    fn normalize_plate_is_idempotent() {
        for raw in ["ab-123!", "pbx 4521", "ñandú-7", "", "ABC123"] {
            let once = normalize_plate(raw);
            assert_eq!(normalize_plate(&once), once);
            assert!(once.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn fee_display_has_two_decimals() {
        assert_eq!(Fee::from_cents(50).to_string(), "$0.50");
        assert_eq!(Fee::from_cents(1234).to_string(), "$12.34");
    }

    #[test]
    fn fee_deserializes_numbers_strings_and_null() {
        let fee: Fee = serde_json::from_value(json!(0.5)).unwrap();
        assert_eq!(fee.cents(), 50);
        let fee: Fee = serde_json::from_value(json!("1.00")).unwrap();
        assert_eq!(fee.cents(), 100);
        let fee: Fee = serde_json::from_value(json!(null)).unwrap();
        assert_eq!(fee, Fee::ZERO);
        assert!(serde_json::from_value::<Fee>(json!(-1)).is_err());
    }

    #[test]
    fn record_serializes_with_remote_column_names() {
        let record = sample_record();
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["placa_vehiculo"], json!("AB123"));
        assert_eq!(value["tipo_vehiculo"], json!("moto"));
        assert_eq!(value["dependencia_id"], json!(7));
        assert_eq!(value["monto"], json!(0.5));
        assert_eq!(value["foto_url"], json!(null));
        assert_eq!(value["fecha_recaudo"], json!("2024-05-02"));
        assert!(value.get("id").is_none());
    }

    #[test]
    fn record_survives_storage_round_trip() {
        let record = sample_record();
        let raw = serde_json::to_string(&record).unwrap();
        let restored: ParkingRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn record_reads_legacy_rows() {
        let row = json!({
            "id": 42,
            "placa_vehiculo": "PBX4521",
            "tipo_vehiculo": "carro",
            "dependencia_id": "9f7c",
            "fecha_hora_ingreso": "2024-05-01",
            "gratis": null,
            "monto": null,
            "fecha_recaudo": ""
        });
        let record: ParkingRecord = serde_json::from_value(row).unwrap();

        assert_eq!(record.id, Some(RemoteId::Int(42)));
        assert_eq!(record.unit_id, Some(RemoteId::Text("9f7c".to_string())));
        assert!(!record.free);
        assert_eq!(record.fee, Fee::ZERO);
        assert_eq!(record.collected_on, None);
        assert_eq!(record.client_id, None);
    }

    #[test]
    fn natural_key_is_deterministic() {
        let mut record = sample_record();
        record.client_id = None;
        assert_eq!(record.idempotency_key(), record.idempotency_key());

        let mut other = record.clone();
        other.plate = "ZZ999".to_string();
        assert_ne!(record.idempotency_key(), other.idempotency_key());
    }

    #[test]
    fn minted_key_wins_over_natural_key() {
        let record = sample_record();
        assert_eq!(Some(record.idempotency_key()), record.client_id);
    }

    #[test]
    fn vehicle_type_parses_both_vocabularies() {
        assert_eq!("car".parse::<VehicleType>().unwrap(), VehicleType::Car);
        assert_eq!("Moto".parse::<VehicleType>().unwrap(), VehicleType::Motorcycle);
        assert!("truck".parse::<VehicleType>().is_err());
    }

    #[test]
    fn remote_id_parses_numbers_and_text() {
        assert_eq!("12".parse::<RemoteId>().unwrap(), RemoteId::Int(12));
        assert_eq!(
            "a1b2".parse::<RemoteId>().unwrap(),
            RemoteId::Text("a1b2".to_string())
        );
    }
}
