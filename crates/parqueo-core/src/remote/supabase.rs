//! Supabase-backed remote store (PostgREST + Storage).

use std::fmt;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{RecordQuery, RemoteStore, MEDIA_BUCKET, RECORDS_TABLE, UNITS_TABLE};
use crate::error::{Error, Result};
use crate::models::{OwningUnit, ParkingRecord, RecordView, RemoteId};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const RECORD_SELECT: &str =
    "*,copropietarios:dependencia_id(nombre,propiedad,unidad_asignada),usuario:usuario_id(id,nombre)";
const UNIT_SELECT: &str = "id,nombre,propiedad,unidad_asignada";

/// Connection settings for a Supabase project
#[derive(Clone, PartialEq, Eq)]
pub struct SupabaseSettings {
    pub url: String,
    pub anon_key: String,
    /// Signed-in user's token; the anon key is used when absent
    pub access_token: Option<String>,
    pub records_table: String,
    pub units_table: String,
    pub media_bucket: String,
    pub timeout: Duration,
}

impl SupabaseSettings {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            access_token: None,
            records_table: RECORDS_TABLE.to_string(),
            units_table: UNITS_TABLE.to_string(),
            media_bucket: MEDIA_BUCKET.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl fmt::Debug for SupabaseSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SupabaseSettings")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("records_table", &self.records_table)
            .field("units_table", &self.units_table)
            .field("media_bucket", &self.media_bucket)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Remote store speaking the Supabase REST and Storage APIs
#[derive(Clone)]
pub struct SupabaseRemoteStore {
    base_url: String,
    anon_key: String,
    bearer: String,
    records_table: String,
    units_table: String,
    media_bucket: String,
    client: Client,
}

impl SupabaseRemoteStore {
    pub fn new(settings: SupabaseSettings) -> Result<Self> {
        let base_url = normalize_base_url(&settings.url)?;
        let anon_key = normalize_text_option(Some(settings.anon_key))
            .ok_or_else(|| Error::Config("Supabase anon key must not be empty".to_string()))?;
        let bearer = normalize_text_option(settings.access_token).unwrap_or_else(|| anon_key.clone());
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            base_url,
            anon_key,
            bearer,
            records_table: settings.records_table,
            units_table: settings.units_table,
            media_bucket: settings.media_bucket,
            client,
        })
    }

    /// Public URL of an object in the media bucket
    pub fn public_url(&self, name: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.media_bucket,
            urlencoding::encode(name)
        )
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn object_url(&self, name: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.media_bucket,
            urlencoding::encode(name)
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.bearer)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = parse_api_error(status, &body);
            tracing::warn!(status = status.as_u16(), "Remote store rejected request: {message}");
            return Err(Error::RemoteWrite(message));
        }
        Ok(response)
    }

    async fn lookup_client_id(&self, record: &ParkingRecord) -> Result<RemoteId> {
        let key = record.idempotency_key();
        let request = self
            .client
            .get(self.rest_url(&self.records_table))
            .query(&[("client_id", format!("eq.{key}")), ("select", "id".to_string())]);
        let rows = self
            .send(request)
            .await?
            .json::<Vec<IdRow>>()
            .await
            .map_err(transport_error)?;
        rows.into_iter()
            .next()
            .map(|row| row.id)
            .ok_or_else(|| Error::RemoteWrite(format!("insert of {key} returned no row")))
    }
}

impl RemoteStore for SupabaseRemoteStore {
    fn records_table(&self) -> &str {
        &self.records_table
    }

    async fn insert_record(&self, record: &ParkingRecord) -> Result<RemoteId> {
        let mut row = record.clone();
        row.id = None;
        row.client_id = Some(record.idempotency_key());

        let request = self
            .client
            .post(self.rest_url(&self.records_table))
            .query(&[("on_conflict", "client_id")])
            .header(
                "Prefer",
                "resolution=ignore-duplicates,return=representation",
            )
            .json(&[&row]);
        let inserted = self
            .send(request)
            .await?
            .json::<Vec<IdRow>>()
            .await
            .map_err(transport_error)?;

        match inserted.into_iter().next() {
            Some(created) => {
                tracing::debug!(id = %created.id, plate = %row.plate, "Inserted parking record");
                Ok(created.id)
            }
            // An ignored duplicate comes back empty; resolve the existing row.
            None => {
                tracing::debug!(plate = %row.plate, "Insert matched an existing client_id");
                self.lookup_client_id(&row).await
            }
        }
    }

    async fn query_records(&self, query: &RecordQuery) -> Result<Vec<RecordView>> {
        let direction = if query.newest_first { "desc" } else { "asc" };
        let mut params = vec![
            ("select", RECORD_SELECT.to_string()),
            ("order", format!("fecha_hora_ingreso.{direction}")),
        ];
        if let Some(user) = &query.submitted_by {
            params.push(("usuario_id", format!("eq.{user}")));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }

        let request = self
            .client
            .get(self.rest_url(&self.records_table))
            .query(&params);
        let body = self.send(request).await?.text().await.map_err(transport_error)?;
        serde_json::from_str(&body)
            .map_err(|error| Error::RemoteWrite(format!("unexpected record payload: {error}")))
    }

    async fn update_record(&self, id: &RemoteId, fields: &Map<String, Value>) -> Result<()> {
        let request = self
            .client
            .patch(self.rest_url(&self.records_table))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(fields);
        self.send(request).await?;
        tracing::debug!(%id, "Updated parking record");
        Ok(())
    }

    async fn delete_record(&self, id: &RemoteId) -> Result<()> {
        let request = self
            .client
            .delete(self.rest_url(&self.records_table))
            .query(&[("id", format!("eq.{id}"))]);
        self.send(request).await?;
        tracing::debug!(%id, "Deleted parking record");
        Ok(())
    }

    async fn upload_object(
        &self,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        let size = bytes.len();
        let request = self
            .client
            .post(self.object_url(name))
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes);
        self.send(request).await?;
        tracing::debug!(name, size, "Uploaded media object");
        Ok(self.public_url(name))
    }

    async fn remove_object(&self, name: &str) -> Result<()> {
        let request = self
            .client
            .delete(format!(
                "{}/storage/v1/object/{}",
                self.base_url, self.media_bucket
            ))
            .json(&serde_json::json!({ "prefixes": [name] }));
        self.send(request).await?;
        Ok(())
    }

    async fn list_units(&self) -> Result<Vec<OwningUnit>> {
        let request = self
            .client
            .get(self.rest_url(&self.units_table))
            .query(&[("select", UNIT_SELECT)]);
        let body = self.send(request).await?.text().await.map_err(transport_error)?;
        serde_json::from_str(&body)
            .map_err(|error| Error::RemoteWrite(format!("unexpected unit payload: {error}")))
    }
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: RemoteId,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload
            .message
            .or(payload.error_description)
            .or(payload.error)
        {
            return message;
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed.to_string()
    }
}

fn transport_error(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::RemoteWrite("request timed out".to_string())
    } else {
        Error::RemoteWrite(format!("request failed: {error}"))
    }
}

fn normalize_base_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::Config("Supabase URL must not be empty".to_string()));
    }
    if !is_http_url(trimmed) {
        return Err(Error::Config(
            "Supabase URL must include http:// or https://".to_string(),
        ));
    }
    Ok(trimmed
        .strip_suffix("/rest/v1")
        .unwrap_or(trimmed)
        .to_string())
}
