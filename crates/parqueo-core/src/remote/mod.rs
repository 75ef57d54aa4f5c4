//! Remote store interface.
//!
//! The hosted database/storage service is an external collaborator; this
//! trait is the narrow surface the sync layer consumes. Every failure of a
//! remote call is reported as [`crate::Error::RemoteWrite`] carrying the
//! store's message, including timeouts.

mod memory;
mod supabase;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::models::{OwningUnit, ParkingRecord, RecordView, RemoteId};

pub use memory::InMemoryRemoteStore;
pub use supabase::{SupabaseRemoteStore, SupabaseSettings};

/// Default table holding parking records
pub const RECORDS_TABLE: &str = "registros_parqueadero";
/// Default table holding owning units
pub const UNITS_TABLE: &str = "copropietarios";
/// Default bucket for photos and audio notes
pub const MEDIA_BUCKET: &str = "evidencias-parqueadero";

/// Ordering and filters for a record query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    /// Newest entry first when true
    pub newest_first: bool,
    /// Restrict to records submitted by this user
    pub submitted_by: Option<RemoteId>,
    pub limit: Option<usize>,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            newest_first: true,
            submitted_by: None,
            limit: None,
        }
    }
}

/// Operations consumed from the remote store
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// Table holding parking records; queued operations name it
    fn records_table(&self) -> &str;

    /// Insert one record (identifier omitted) and return the assigned
    /// identifier. Inserting a record whose `client_id` already exists
    /// returns the existing row's identifier instead of a second row.
    async fn insert_record(&self, record: &ParkingRecord) -> Result<RemoteId>;

    /// Records joined with owning-unit and submitting-user display fields
    async fn query_records(&self, query: &RecordQuery) -> Result<Vec<RecordView>>;

    /// Apply a partial field mapping to one record
    async fn update_record(&self, id: &RemoteId, fields: &Map<String, Value>) -> Result<()>;

    async fn delete_record(&self, id: &RemoteId) -> Result<()>;

    /// Upload a binary object and return its public URL
    async fn upload_object(&self, name: &str, content_type: &str, bytes: Vec<u8>)
        -> Result<String>;

    /// Remove a previously uploaded object
    async fn remove_object(&self, name: &str) -> Result<()>;

    /// All known owning units
    async fn list_units(&self) -> Result<Vec<OwningUnit>>;
}

/// Object name at the end of a public URL
pub fn object_name_from_url(url: &str) -> Option<&str> {
    url.rsplit('/')
        .next()
        .map(|name| name.split(['?', '#']).next().unwrap_or(name))
        .filter(|name| !name.is_empty())
}
