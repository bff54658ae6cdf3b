//! HTTP routes. Every response uses the `{ "data", "error_message" }` envelope.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;

use chainsign_core::{Device, Page, SignatureRecord, SigningEngine, SigningError};

#[derive(Clone)]
pub struct AppState {
    engine: Arc<SigningEngine>,
}

pub fn router(engine: Arc<SigningEngine>) -> Router {
    Router::new()
        .route("/api/v0/health", get(health))
        .route("/api/v0/device", post(create_device))
        .route("/api/v0/device/:id", get(get_device))
        .route("/api/v0/device/:id/verify-chain", get(verify_chain))
        .route("/api/v0/devices", get(list_devices))
        .route("/api/v0/sign", post(create_signature))
        .route("/api/v0/signings", get(list_signatures))
        .with_state(AppState { engine })
}

#[derive(Serialize)]
struct Envelope<T> {
    data: Option<T>,
    error_message: Option<String>,
}

fn respond<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(Envelope { data: Some(data), error_message: None })).into_response()
}

/// Error side of a handler; maps the core taxonomy onto HTTP status codes.
struct ApiError(SigningError);

impl From<SigningError> for ApiError {
    fn from(e: SigningError) -> Self { ApiError(e) }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self { ApiError(SigningError::InvalidArgument(format!("invalid request payload: {e}"))) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            SigningError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            SigningError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            SigningError::Conflict(_) => (StatusCode::CONFLICT, self.0.to_string()),
            e => {
                error!(error = %e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };
        (status, Json(Envelope::<()> { data: None, error_message: Some(message) })).into_response()
    }
}

/// Run CPU-bound key work off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, SigningError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError(SigningError::Internal(format!("worker task: {e}"))))?
        .map_err(ApiError)
}

fn page_params(params: &HashMap<String, String>) -> Result<(i64, i64), SigningError> {
    let parse = |name: &str| {
        params
            .get(name)
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(|| SigningError::InvalidArgument(format!("invalid or missing {name}")))
    };
    Ok((parse("pageNr")?, parse("pageSize")?))
}

#[derive(Serialize)]
struct PageDto<T> {
    page_number: usize,
    page_size: usize,
    total: usize,
    items: Vec<T>,
}

impl<T> From<Page<T>> for PageDto<T> {
    fn from(p: Page<T>) -> Self {
        PageDto { page_number: p.page_nr, page_size: p.page_size, total: p.total, items: p.items }
    }
}

#[derive(Serialize)]
struct DeviceDto {
    id: String,
    algorithm: String,
    label: Option<String>,
    counter: u64,
    public_key: String,
    created_at: i64,
}

impl From<Device> for DeviceDto {
    fn from(d: Device) -> Self {
        DeviceDto {
            id: d.id,
            algorithm: d.algorithm.to_string(),
            label: d.label,
            counter: d.counter,
            public_key: String::from_utf8_lossy(&d.public_key).into_owned(),
            created_at: d.created_at,
        }
    }
}

#[derive(Serialize)]
struct SignatureDto {
    id: String,
    counter: u64,
    signature: String,
    signed_data: String,
    created_at: i64,
}

impl From<SignatureRecord> for SignatureDto {
    fn from(r: SignatureRecord) -> Self {
        SignatureDto {
            id: r.id,
            counter: r.counter,
            signature: r.signature,
            signed_data: r.signed_payload,
            created_at: r.created_at,
        }
    }
}

#[derive(Deserialize)]
struct CreateDeviceRequest {
    #[serde(default)]
    id: String,
    #[serde(default)]
    algorithm: String,
    label: Option<String>,
}

#[derive(Deserialize)]
struct SignRequest {
    #[serde(default)]
    device_id: String,
    #[serde(default)]
    data: String,
}

async fn health() -> Response {
    respond(StatusCode::OK, serde_json::json!({ "status": "pass", "version": chainsign_core::version() }))
}

async fn create_device(
    State(state): State<AppState>,
    body: Result<Json<CreateDeviceRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    let engine = state.engine.clone();
    let device = blocking(move || engine.registry().register(&req.id, &req.algorithm, req.label)).await?;
    Ok(respond(StatusCode::CREATED, DeviceDto::from(device)))
}

async fn get_device(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let device = state.engine.registry().get_by_id(&id)?;
    Ok(respond(StatusCode::OK, DeviceDto::from(device)))
}

async fn list_devices(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let (page_nr, page_size) = page_params(&params)?;
    let page = state.engine.registry().list_page(page_nr, page_size)?;
    Ok(respond(StatusCode::OK, PageDto::from(page.map(DeviceDto::from))))
}

async fn create_signature(
    State(state): State<AppState>,
    body: Result<Json<SignRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    let engine = state.engine.clone();
    let result = blocking(move || engine.sign(&req.device_id, &req.data)).await?;
    Ok(respond(StatusCode::CREATED, result))
}

async fn list_signatures(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let device_id = params.get("deviceId").cloned().unwrap_or_default();
    let (page_nr, page_size) = page_params(&params)?;
    let page = state.engine.list_signatures(&device_id, page_nr, page_size)?;
    Ok(respond(StatusCode::OK, PageDto::from(page.map(SignatureDto::from))))
}

async fn verify_chain(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let engine = state.engine.clone();
    let device_id = id.clone();
    let length = blocking(move || engine.verify_chain(&device_id)).await?;
    Ok(respond(StatusCode::OK, serde_json::json!({ "device_id": id, "length": length })))
}
