use std::env;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use parqueo_core::db::SqliteKeyValueStore;
use parqueo_core::models::{parse_timestamp, OperationKind};
use parqueo_core::{
    Attachment, Connectivity, LocalCache, ParqueoConfig, PendingOperation, RecordView,
    SupabaseRemoteStore, SyncQueue,
};
use serde::Serialize;

use crate::error::CliError;

const APP_DIR: &str = "parqueo";
const CONFIG_FILE_NAME: &str = "config.json";
const DB_FILE_NAME: &str = "parqueo.db";

/// Paths and flags shared by every command
#[derive(Debug, Clone)]
pub struct Context {
    pub offline: bool,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
}

/// Opened collaborators for commands that touch records
pub struct Session {
    pub config: ParqueoConfig,
    pub remote: SupabaseRemoteStore,
    pub queue: SyncQueue<SqliteKeyValueStore>,
    pub connectivity: Connectivity,
}

impl Session {
    pub fn open(context: &Context) -> Result<Self, CliError> {
        let config = load_config(&context.config_path)?;
        let remote = SupabaseRemoteStore::new(config.supabase_settings()?)?;
        let store = SqliteKeyValueStore::open(&context.db_path)?;
        let queue = SyncQueue::new(LocalCache::new(store))
            .with_lock_stale_after(config.lock_stale_after());
        let connectivity = Connectivity::new(!context.offline);
        if context.offline {
            tracing::info!("Running offline; writes are queued locally");
        }

        Ok(Self {
            config,
            remote,
            queue,
            connectivity,
        })
    }

    /// Replay operations queued by earlier offline runs. Failures are
    /// logged and leave the queue for the next run.
    pub async fn catch_up(&self) -> Result<(), CliError> {
        if !self.connectivity.is_online() || self.queue.is_empty()? {
            return Ok(());
        }

        match self.queue.drain(&self.remote).await {
            Ok(report) => {
                if let Some(failure) = &report.failure {
                    tracing::warn!(
                        remaining = report.remaining,
                        "Queued operation #{} failed to sync: {}",
                        failure.position,
                        failure.message
                    );
                } else {
                    tracing::info!(replayed = report.replayed, "Synced queued operations");
                }
            }
            Err(parqueo_core::Error::QueueLocked) => {
                tracing::info!("Sync queue is locked by another session");
            }
            Err(error) => return Err(error.into()),
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    pub id: Option<String>,
    pub plate: String,
    pub vehicle_type: String,
    pub property: Option<String>,
    pub unit: Option<String>,
    pub owner: Option<String>,
    pub entered_at: String,
    pub fee: f64,
    pub free: bool,
    pub collected: bool,
    pub note: Option<String>,
    pub pending_sync: bool,
}

#[derive(Debug, Serialize)]
pub struct QueueItem {
    pub position: usize,
    pub table: String,
    pub method: String,
    pub target: Option<String>,
    pub plates: Vec<String>,
    pub queued_at: String,
}

pub fn load_config(path: &Path) -> Result<ParqueoConfig, CliError> {
    let config = ParqueoConfig::load_from_path(path)?.with_env_overrides();
    config.validate()?;
    Ok(config)
}

pub fn resolve_config_path(cli_config_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    match cli_config_path.or_else(|| env::var_os("PARQUEO_CONFIG").map(PathBuf::from)) {
        Some(path) => Ok(path),
        None => default_config_path(),
    }
}

pub fn default_config_path() -> Result<PathBuf, CliError> {
    Ok(dirs::config_dir()
        .ok_or(CliError::MissingDirectory("config"))?
        .join(APP_DIR)
        .join(CONFIG_FILE_NAME))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    match cli_db_path.or_else(|| env::var_os("PARQUEO_DB_PATH").map(PathBuf::from)) {
        Some(path) => Ok(path),
        None => default_db_path(),
    }
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    Ok(dirs::data_dir()
        .ok_or(CliError::MissingDirectory("data"))?
        .join(APP_DIR)
        .join(DB_FILE_NAME))
}

pub fn normalize_record_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyRecordId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Row whose remote identifier renders as `id`
pub fn find_record<'r>(rows: &'r [RecordView], id: &str) -> Result<&'r RecordView, CliError> {
    rows.iter()
        .find(|row| {
            row.record
                .id
                .as_ref()
                .is_some_and(|candidate| candidate.to_string() == id)
        })
        .ok_or_else(|| CliError::RecordNotFound(id.to_string()))
}

pub fn parse_entry_time(raw: &str) -> Result<DateTime<Utc>, CliError> {
    parse_timestamp(raw).ok_or_else(|| CliError::InvalidTimestamp(raw.trim().to_string()))
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| CliError::InvalidDate(raw.trim().to_string()))
}

pub fn read_attachment(path: &Path) -> Result<Attachment, CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::Attachment {
        path: path.display().to_string(),
        source,
    })?;
    let file_name = path
        .file_name()
        .map_or_else(String::new, |name| name.to_string_lossy().into_owned());
    Ok(Attachment::new(file_name, content_type_for(path), bytes))
}

pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("webm") => "audio/webm",
        Some("ogg") => "audio/ogg",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

pub fn format_entry_time(entered_at: DateTime<Utc>) -> String {
    entered_at.format("%Y-%m-%d %H:%M UTC").to_string()
}

pub fn format_record_lines(rows: &[&RecordView]) -> Vec<String> {
    rows.iter()
        .map(|row| {
            let record = &row.record;
            let id = record
                .id
                .as_ref()
                .map_or_else(|| "pending".to_string(), ToString::to_string);
            let unit = match (row.property(), row.unit_label()) {
                (Some(property), Some(unit)) => format!("{property} {unit}"),
                _ => "-".to_string(),
            };
            let fee = if record.free {
                "free".to_string()
            } else {
                record.fee.to_string()
            };
            let mut line = format!(
                "{id:<8}  {:<8}  {:<5}  {unit:<12}  {}  {fee:>7}",
                record.plate,
                record.vehicle_type.as_str(),
                format_entry_time(record.entered_at),
            );
            if record.collected {
                line.push_str("  collected");
            }
            if record.has_pending_media() {
                line.push_str("  media pending");
            }
            line
        })
        .collect()
}

pub fn record_to_list_item(row: &RecordView) -> RecordListItem {
    let record = &row.record;
    RecordListItem {
        id: record.id.as_ref().map(ToString::to_string),
        plate: record.plate.clone(),
        vehicle_type: record.vehicle_type.to_string(),
        property: row.property().map(ToString::to_string),
        unit: row.unit_label().map(ToString::to_string),
        owner: row.unit.as_ref().and_then(|unit| unit.owner_name.clone()),
        entered_at: record.entered_at.to_rfc3339(),
        fee: record.fee.as_decimal(),
        free: record.free,
        collected: record.collected,
        note: record.note.clone(),
        pending_sync: row.is_local_only(),
    }
}

pub fn queue_item(position: usize, operation: &PendingOperation) -> QueueItem {
    let (target, plates) = match operation.method {
        OperationKind::Insert => (
            None,
            operation
                .insert_rows()
                .map(|rows| rows.into_iter().map(|row| row.plate).collect())
                .unwrap_or_default(),
        ),
        OperationKind::Update | OperationKind::Delete => (
            operation.target_id().ok().map(|id| id.to_string()),
            Vec::new(),
        ),
    };

    QueueItem {
        position,
        table: operation.table.clone(),
        method: format!("{:?}", operation.method).to_lowercase(),
        target,
        plates,
        queued_at: operation.timestamp.to_rfc3339(),
    }
}

pub fn format_queue_lines(items: &[QueueItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let subject = item
                .target
                .clone()
                .unwrap_or_else(|| item.plates.join(", "));
            format!(
                "#{:<3}  {:<6}  {}  {subject}  queued {}",
                item.position, item.method, item.table, item.queued_at
            )
        })
        .collect()
}
