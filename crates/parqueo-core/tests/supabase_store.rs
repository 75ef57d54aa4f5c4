//! Supabase remote store tests.
//!
//! A wiremock server stands in for the PostgREST and Storage endpoints so
//! request shapes and error handling are checked without network access.

use std::time::Duration;

use parqueo_core::db::MemoryKeyValueStore;
use parqueo_core::models::{IdempotencyKey, PENDING_UPLOAD};
use parqueo_core::remote::{RecordQuery, SupabaseSettings};
use parqueo_core::{
    Error, Fee, LocalCache, ParkingRecord, PendingOperation, RemoteId, RemoteStore,
    SupabaseRemoteStore, SyncQueue, VehicleType,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(server: &MockServer) -> SupabaseSettings {
    let mut settings = SupabaseSettings::new(server.uri(), "anon-key");
    settings.access_token = Some("user-token".to_string());
    settings
}

fn store(server: &MockServer) -> SupabaseRemoteStore {
    SupabaseRemoteStore::new(settings(server)).unwrap()
}

fn record(plate: &str) -> ParkingRecord {
    ParkingRecord {
        id: None,
        client_id: Some(IdempotencyKey::new()),
        plate: plate.to_string(),
        vehicle_type: VehicleType::Motorcycle,
        unit_id: Some(RemoteId::Int(7)),
        user_id: Some(RemoteId::Text("3f2c".to_string())),
        note: Some("visita".to_string()),
        entered_at: "2024-05-01T10:30:00Z".parse().unwrap(),
        photo_url: Some(PENDING_UPLOAD.to_string()),
        free: false,
        fee: Fee::from_cents(50),
        audio_url: None,
        collected: false,
        collected_on: None,
    }
}

// ============================================================================
// Records
// ============================================================================

#[tokio::test]
async fn insert_sends_idempotent_upsert() {
    let server = MockServer::start().await;
    let row = record("AB123");
    let key = row.client_id.unwrap().to_string();

    Mock::given(method("POST"))
        .and(path("/rest/v1/registros_parqueadero"))
        .and(query_param("on_conflict", "client_id"))
        .and(header("apikey", "anon-key"))
        .and(header("authorization", "Bearer user-token"))
        .and(header_exists("prefer"))
        .and(body_partial_json(json!([{
            "client_id": key,
            "placa_vehiculo": "AB123",
            "tipo_vehiculo": "moto",
            "dependencia_id": 7,
            "monto": 0.5,
            "foto_url": "pendiente-sync"
        }])))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{ "id": 41 }])))
        .expect(1)
        .mount(&server)
        .await;

    let id = store(&server).insert_record(&row).await.unwrap();
    assert_eq!(id, RemoteId::Int(41));
}

#[tokio::test]
async fn ignored_duplicate_resolves_existing_row() {
    let server = MockServer::start().await;
    let row = record("AB123");
    let key = row.client_id.unwrap().to_string();

    Mock::given(method("POST"))
        .and(path("/rest/v1/registros_parqueadero"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/registros_parqueadero"))
        .and(query_param("client_id", format!("eq.{key}")))
        .and(query_param("select", "id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 41 }])))
        .expect(1)
        .mount(&server)
        .await;

    let id = store(&server).insert_record(&row).await.unwrap();
    assert_eq!(id, RemoteId::Int(41));
}

#[tokio::test]
async fn rejected_insert_surfaces_store_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/registros_parqueadero"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": "42501",
            "message": "new row violates row-level security policy"
        })))
        .mount(&server)
        .await;

    let error = store(&server).insert_record(&record("AB123")).await.unwrap_err();
    assert!(error.is_remote());
    assert_eq!(error.to_string(), "new row violates row-level security policy");
}

#[tokio::test]
async fn long_store_message_is_not_shortened() {
    let server = MockServer::start().await;
    let message = format!(
        "new row violates row-level security policy for table \"registros_parqueadero\": {}",
        "x".repeat(180)
    );

    Mock::given(method("POST"))
        .and(path("/rest/v1/registros_parqueadero"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": "42501",
            "message": message
        })))
        .mount(&server)
        .await;

    let error = store(&server).insert_record(&record("AB123")).await.unwrap_err();
    assert!(error.is_remote());
    assert_eq!(error.to_string(), message);
}

#[tokio::test]
async fn timeout_is_a_remote_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/copropietarios"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let mut settings = settings(&server);
    settings.timeout = Duration::from_millis(100);
    let store = SupabaseRemoteStore::new(settings).unwrap();

    let error = store.list_units().await.unwrap_err();
    assert!(matches!(error, Error::RemoteWrite(ref message) if message == "request timed out"));
}

#[tokio::test]
async fn query_parses_joined_rows() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/registros_parqueadero"))
        .and(query_param("order", "fecha_hora_ingreso.desc"))
        .and(query_param("usuario_id", "eq.3f2c"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 41,
            "client_id": null,
            "placa_vehiculo": "AB123",
            "tipo_vehiculo": "carro",
            "dependencia_id": 7,
            "usuario_id": "3f2c",
            "observaciones": null,
            "fecha_hora_ingreso": "2024-05-01T10:30:00+00:00",
            "foto_url": null,
            "gratis": null,
            "monto": 1,
            "observacion_audio_url": null,
            "recaudado": true,
            "fecha_recaudo": "2024-05-03",
            "copropietarios": { "nombre": "Ana", "propiedad": "Casa", "unidad_asignada": 12 },
            "usuario": { "id": "3f2c", "nombre": "Guardia" }
        }])))
        .mount(&server)
        .await;

    let query = RecordQuery {
        newest_first: true,
        submitted_by: Some(RemoteId::Text("3f2c".to_string())),
        limit: Some(10),
    };
    let rows = store(&server).query_records(&query).await.unwrap();

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.record.id, Some(RemoteId::Int(41)));
    assert_eq!(row.record.fee, Fee::from_cents(100));
    assert!(!row.record.free);
    assert!(row.record.collected);
    assert_eq!(row.property(), Some("Casa"));
    assert_eq!(row.unit_label(), Some("12"));
    assert_eq!(
        row.submitted_by.as_ref().and_then(|user| user.name.as_deref()),
        Some("Guardia")
    );
}

#[tokio::test]
async fn update_and_delete_target_one_id() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/registros_parqueadero"))
        .and(query_param("id", "eq.41"))
        .and(body_partial_json(json!({ "gratis": true, "monto": 0 })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/registros_parqueadero"))
        .and(query_param("id", "eq.41"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = store(&server);
    let fields = json!({ "gratis": true, "monto": 0 });
    store
        .update_record(&RemoteId::Int(41), fields.as_object().unwrap())
        .await
        .unwrap();
    store.delete_record(&RemoteId::Int(41)).await.unwrap();
}

// ============================================================================
// Storage and units
// ============================================================================

#[tokio::test]
async fn upload_returns_public_url() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(
            "/storage/v1/object/evidencias-parqueadero/audio_obs_AB123_1.webm",
        ))
        .and(header("content-type", "audio/webm"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Key": "evidencias-parqueadero/audio_obs_AB123_1.webm"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let url = store(&server)
        .upload_object("audio_obs_AB123_1.webm", "audio/webm", vec![1, 2, 3])
        .await
        .unwrap();
    assert_eq!(
        url,
        format!(
            "{}/storage/v1/object/public/evidencias-parqueadero/audio_obs_AB123_1.webm",
            server.uri()
        )
    );
}

#[tokio::test]
async fn duplicate_upload_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/storage/v1/object/evidencias-parqueadero/AB123_1.jpg"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "statusCode": "409",
            "error": "Duplicate",
            "message": "The resource already exists"
        })))
        .mount(&server)
        .await;

    let error = store(&server)
        .upload_object("AB123_1.jpg", "image/jpeg", vec![0])
        .await
        .unwrap_err();
    assert_eq!(error.to_string(), "The resource already exists");
}

#[tokio::test]
async fn remove_object_sends_prefixes() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/storage/v1/object/evidencias-parqueadero"))
        .and(body_partial_json(json!({ "prefixes": ["audio_obs_AB123_1.webm"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    store(&server)
        .remove_object("audio_obs_AB123_1.webm")
        .await
        .unwrap();
}

#[tokio::test]
async fn units_are_listed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/copropietarios"))
        .and(query_param("select", "id,nombre,propiedad,unidad_asignada"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 7, "nombre": "Ana", "propiedad": "Casa", "unidad_asignada": "12" },
            { "id": 8, "nombre": null, "propiedad": "Depto", "unidad_asignada": 3 }
        ])))
        .mount(&server)
        .await;

    let units = store(&server).list_units().await.unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].label(), "Casa 12");
    assert_eq!(units[1].unit.as_deref(), Some("3"));
}

// ============================================================================
// Queue drain against the HTTP store
// ============================================================================

#[tokio::test]
async fn drain_halts_on_server_error_and_keeps_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/registros_parqueadero"))
        .and(body_partial_json(json!([{ "placa_vehiculo": "FAIL1" }])))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "message": "canceling statement due to statement timeout"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/registros_parqueadero"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{ "id": 1 }])))
        .mount(&server)
        .await;

    let queue = SyncQueue::new(LocalCache::new(MemoryKeyValueStore::new()));
    for plate in ["OK1", "FAIL1", "OK2"] {
        queue
            .enqueue(PendingOperation::insert("registros_parqueadero", &record(plate)).unwrap())
            .unwrap();
    }

    let report = queue.drain(&store(&server)).await.unwrap();

    assert_eq!(report.replayed, 1);
    assert_eq!(report.remaining, 2);
    let failure = report.failure.unwrap();
    assert_eq!(failure.position, 2);
    assert_eq!(
        failure.message,
        "canceling statement due to statement timeout (500)"
    );
    let remaining = queue
        .pending()
        .unwrap()
        .iter()
        .flat_map(|op| op.insert_rows().unwrap())
        .map(|row| row.plate)
        .collect::<Vec<_>>();
    assert_eq!(remaining, vec!["FAIL1", "OK2"]);
}
