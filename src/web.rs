//
// web.rs
// Dicom-Worklist-rs
//
// Axum-based HTTP server exposing worklist and instance creation, storage housekeeping, validation and PACS APIs.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    batch::{self, BatchKind, BatchReport},
    config::AppConfig,
    error::Error,
    file::{encode_instance, encode_worklist, Encoded},
    models::{ApiResponse, CreatedFile, FindResponse, PacsStatus, ValidationReport},
    records::{InstanceInput, WorklistInput},
    scu::{self, FindQuery},
    storage::{FileInfo, FileStore, StoreStats},
    validate,
};

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    worklists: FileStore,
    instances: FileStore,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            worklists: FileStore::worklists(&config.storage)?,
            instances: FileStore::instances(&config.storage)?,
            config: Arc::new(config),
        })
    }
}

/// Error half of every handler, rendered as a `{success: false, message, data: null}` envelope.
#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ApiResponse::<()>::error(self.1))).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if err.is_input_error() {
            bad_request(err)
        } else {
            internal_error(err)
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/worklist", post(create_worklist).get(list_worklists))
        .route("/api/worklist/batch", post(create_worklist_batch))
        .route("/api/worklist/stats", get(worklist_stats))
        .route("/api/worklist/sample", get(sample_worklist))
        .route("/api/worklist/:filename", delete(delete_worklist))
        .route("/api/worklist/cleanup/:days", delete(cleanup_worklists))
        .route("/api/worklist/download/:filename", get(download_worklist))
        .route("/api/instances", post(create_instance).get(list_instances))
        .route("/api/instances/batch", post(create_instance_batch))
        .route("/api/instances/:filename", delete(delete_instance))
        .route("/api/instances/:filename/validate", get(validate_instance))
        .route("/api/instances/:filename/send", post(send_instance))
        .route("/api/echo", get(echo_handler))
        .route("/api/pacs/status", get(pacs_status))
        .route("/api/pacs/worklists", get(find_worklists))
        .route("/api/pacs/patients", get(find_patients))
        .route("/api/pacs/studies/:patient_id", get(find_studies))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bootstraps the Axum HTTP server and wires up API routes.
pub async fn start_server(config: AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port).parse()?;
    let app = router(AppState::new(config)?);

    let listener = TcpListener::bind(addr).await?;
    info!("Server running at http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// Deserialize a request body ourselves so malformed input gets the same envelope as other 400s.
fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(bad_request)
}

fn created(encoded: &Encoded, store: &FileStore) -> Result<CreatedFile, ApiError> {
    let stored = store
        .save(encoded.template.accession_number(), &encoded.bytes)
        .map_err(internal_error)?;
    Ok(CreatedFile {
        filename: stored.filename,
        size: stored.size,
        accession_number: encoded.template.accession_number().to_string(),
        study_instance_uid: encoded.template.study_instance_uid().to_string(),
        sop_instance_uid: encoded.template.sop_instance_uid().map(str::to_string),
    })
}

async fn create_worklist(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedFile>>), ApiError> {
    let input: WorklistInput = parse_body(body)?;
    let encoded = encode_worklist(&input, &state.config.encoder)?;
    let file = created(&encoded, &state.worklists)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Worklist created successfully", file)),
    ))
}

async fn create_instance(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedFile>>), ApiError> {
    let input: InstanceInput = parse_body(body)?;
    let encoded = encode_instance(&input, &state.config.encoder)?;
    let file = created(&encoded, &state.instances)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("DICOM instance created successfully", file)),
    ))
}

#[derive(Debug, Deserialize)]
struct WorklistBatchBody {
    worklists: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct InstanceBatchBody {
    instances: Vec<Value>,
}

async fn run_batch(state: AppState, kind: BatchKind, items: Vec<Value>) -> ApiResult<BatchReport> {
    if items.is_empty() {
        return Err(bad_request("Batch must contain at least one record"));
    }
    let report = tokio::task::spawn_blocking(move || {
        let store = match kind {
            BatchKind::Worklist => &state.worklists,
            BatchKind::Instance => &state.instances,
        };
        batch::run_batch(kind, &items, &state.config.encoder, store)
    })
    .await
    .map_err(internal_error)?;

    let message = format!("Processed {} record(s): {} succeeded, {} failed", report.total, report.succeeded, report.failed);
    Ok(Json(ApiResponse {
        success: report.failed == 0,
        message,
        data: Some(report),
    }))
}

async fn create_worklist_batch(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<BatchReport> {
    let body: WorklistBatchBody = parse_body(body)?;
    run_batch(state, BatchKind::Worklist, body.worklists).await
}

async fn create_instance_batch(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<BatchReport> {
    let body: InstanceBatchBody = parse_body(body)?;
    run_batch(state, BatchKind::Instance, body.instances).await
}

async fn list_worklists(State(state): State<AppState>) -> ApiResult<Vec<FileInfo>> {
    let files = state.worklists.list().map_err(internal_error)?;
    Ok(Json(ApiResponse::ok(format!("Found {} worklist(s)", files.len()), files)))
}

async fn list_instances(State(state): State<AppState>) -> ApiResult<Vec<FileInfo>> {
    let files = state.instances.list().map_err(internal_error)?;
    Ok(Json(ApiResponse::ok(format!("Found {} instance(s)", files.len()), files)))
}

async fn worklist_stats(State(state): State<AppState>) -> ApiResult<StoreStats> {
    let stats = state.worklists.stats().map_err(internal_error)?;
    Ok(Json(ApiResponse::ok("Worklist statistics", stats)))
}

async fn sample_worklist() -> ApiResult<WorklistInput> {
    Ok(Json(ApiResponse::ok("Sample worklist data", WorklistInput::sample())))
}

async fn delete_worklist(State(state): State<AppState>, Path(filename): Path<String>) -> ApiResult<String> {
    state.worklists.delete(&filename).map_err(not_found)?;
    Ok(Json(ApiResponse::ok("Worklist deleted successfully", filename)))
}

async fn delete_instance(State(state): State<AppState>, Path(filename): Path<String>) -> ApiResult<String> {
    state.instances.delete(&filename).map_err(not_found)?;
    Ok(Json(ApiResponse::ok("DICOM instance deleted successfully", filename)))
}

async fn cleanup_worklists(State(state): State<AppState>, Path(days): Path<u32>) -> ApiResult<Vec<String>> {
    let deleted = state.worklists.cleanup(days).map_err(internal_error)?;
    Ok(Json(ApiResponse::ok(
        format!("Deleted {} worklist(s) older than {} day(s)", deleted.len(), days),
        deleted,
    )))
}

async fn download_worklist(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let path = state.worklists.resolve(&filename).map_err(not_found)?;
    let bytes = tokio::fs::read(&path).await.map_err(internal_error)?;
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .map_err(bad_request)?;
    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/dicom"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

async fn validate_instance(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<ValidationReport> {
    let path = state.instances.resolve(&filename).map_err(not_found)?;
    let report = validate::validate_file(&path).map_err(internal_error)?;
    let message = if report.valid {
        "DICOM instance is valid".to_string()
    } else {
        format!("DICOM instance has {} problem(s)", report.errors.len())
    };
    Ok(Json(ApiResponse {
        success: report.valid,
        message,
        data: Some(report),
    }))
}

async fn send_instance(State(state): State<AppState>, Path(filename): Path<String>) -> ApiResult<scu::DimseOutcome> {
    let path = state.instances.resolve(&filename).map_err(not_found)?;
    let pacs = state.config.pacs.clone();
    let outcome = tokio::task::spawn_blocking(move || scu::push(&pacs, &path))
        .await
        .map_err(internal_error)?
        .map_err(|e| bad_gateway(format!("{e:#}")))?;
    Ok(Json(ApiResponse::ok(
        format!("Sent {} to {}", filename, state.config.pacs.called_ae_title),
        outcome,
    )))
}

async fn echo_handler(State(state): State<AppState>) -> ApiResult<scu::DimseOutcome> {
    let pacs = state.config.pacs.clone();
    let outcome = tokio::task::spawn_blocking(move || scu::echo(&pacs))
        .await
        .map_err(internal_error)?
        .map_err(|e| bad_gateway(format!("{e:#}")))?;
    Ok(Json(ApiResponse::ok(
        format!("C-ECHO to {} succeeded", state.config.pacs.called_ae_title),
        outcome,
    )))
}

/// Reports the configured PACS and echo reachability; an unreachable PACS is not an API error.
async fn pacs_status(State(state): State<AppState>) -> ApiResult<PacsStatus> {
    let pacs = state.config.pacs.clone();
    let echoed = tokio::task::spawn_blocking(move || scu::echo(&pacs))
        .await
        .map_err(internal_error)?;
    let (connected, detail) = match echoed {
        Ok(outcome) => (true, format!("C-ECHO status 0x{:04X}", outcome.status)),
        Err(e) => (false, format!("{e:#}")),
    };
    let pacs = &state.config.pacs;
    Ok(Json(ApiResponse::ok(
        format!("PACS {} is {}", pacs.called_ae_title, if connected { "reachable" } else { "unreachable" }),
        PacsStatus {
            address: pacs.address.clone(),
            calling_ae_title: pacs.calling_ae_title.clone(),
            called_ae_title: pacs.called_ae_title.clone(),
            connected,
            detail,
        },
    )))
}

async fn run_find(state: AppState, query: FindQuery) -> ApiResult<FindResponse> {
    let pacs = state.config.pacs.clone();
    let matches = tokio::task::spawn_blocking(move || scu::find(&pacs, &query))
        .await
        .map_err(internal_error)?
        .map_err(|e| bad_gateway(format!("{e:#}")))?;
    Ok(Json(ApiResponse::ok(
        format!("Found {} match(es)", matches.len()),
        FindResponse::new(matches),
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatientSearch {
    patient_name: Option<String>,
}

async fn find_worklists(State(state): State<AppState>) -> ApiResult<FindResponse> {
    run_find(state, FindQuery::Worklists).await
}

async fn find_patients(State(state): State<AppState>, Query(search): Query<PatientSearch>) -> ApiResult<FindResponse> {
    let patient_name = search
        .patient_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "*".to_string());
    run_find(state, FindQuery::Patients { patient_name }).await
}

async fn find_studies(State(state): State<AppState>, Path(patient_id): Path<String>) -> ApiResult<FindResponse> {
    if patient_id.trim().is_empty() {
        return Err(bad_request("patientId is required"));
    }
    run_find(state, FindQuery::Studies { patient_id }).await
}

fn bad_request<E: Display>(err: E) -> ApiError {
    ApiError(StatusCode::BAD_REQUEST, err.to_string())
}

fn internal_error<E: Display>(err: E) -> ApiError {
    ApiError(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

fn not_found<E: Display>(err: E) -> ApiError {
    ApiError(StatusCode::NOT_FOUND, err.to_string())
}

fn bad_gateway<E: Display>(err: E) -> ApiError {
    ApiError(StatusCode::BAD_GATEWAY, err.to_string())
}
