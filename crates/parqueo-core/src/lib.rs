//! parqueo-core - Core library for Parqueo
//!
//! Offline-first capture and synchronization of visitor parking records:
//! connectivity monitor, local cache, deferred operation queue, remote store
//! access, capture workflow, and record listing. Used by the CLI and any other
//! host that supplies a connectivity signal and a key-value store.

pub mod cache;
pub mod capture;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod listing;
pub mod models;
pub mod queue;
pub mod remote;
pub mod repository;
pub mod sync;
pub mod util;

pub use cache::LocalCache;
pub use capture::{Attachment, CaptureForm, CaptureOutcome, CaptureStage, CaptureWorkflow};
pub use config::ParqueoConfig;
pub use connectivity::Connectivity;
pub use error::{Error, Result};
pub use listing::{AudioChange, ListingLoad, RecordEdit, RecordFilter, RecordListing};
pub use models::{Fee, OwningUnit, ParkingRecord, PendingOperation, RecordView, RemoteId, VehicleType};
pub use queue::{DrainReport, SyncQueue};
pub use remote::{InMemoryRemoteStore, RemoteStore, SupabaseRemoteStore};
pub use repository::RecordSource;
pub use sync::{SyncCoordinator, SyncState};
