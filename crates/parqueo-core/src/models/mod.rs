//! Data models for Parqueo

mod pending;
mod record;
mod serde_helpers;
mod unit;
mod view;

pub use pending::{OperationKind, PendingOperation};
pub use record::{
    compute_fee, is_pending_upload, normalize_plate, Fee, IdempotencyKey, ParkingRecord, RemoteId,
    VehicleType, PENDING_UPLOAD,
};
pub use serde_helpers::parse_timestamp;
pub use unit::{properties, resolve_unit, sort_units, OwningUnit, UnitSummary};
pub use view::{RecordView, UserSummary};
