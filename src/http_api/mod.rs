use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::{Local, NaiveDate, Utc};
use log::{error, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::persistence::{
    ExportRange, ImportMode, ImportPreview, ImportResult, PersistenceError, ReadingExport,
    ReadingStore,
};
use crate::psalm::{PlannedReading, Psalm, ReadingRecord};
use crate::scheduler::ScheduleError;
use crate::service::{ReadingService, ServiceError, validate_months};
use crate::stats::{ReadingStats, StatsRange};

pub type SharedService = ReadingService<Box<dyn ReadingStore>>;

#[derive(Clone)]
pub struct AppState {
    service: Arc<RwLock<SharedService>>,
}

impl AppState {
    pub fn new(service: SharedService) -> Self {
        Self {
            service: Arc::new(RwLock::new(service)),
        }
    }

    pub fn with_shared(service: Arc<RwLock<SharedService>>) -> Self {
        Self { service }
    }

    fn service(&self) -> Arc<RwLock<SharedService>> {
        self.service.clone()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    Conflict(String),
    Invalid(String),
    Internal(String),
}

impl ApiError {
    fn invalid(message: impl Into<String>) -> Self {
        ApiError::Invalid(message.into())
    }
}

impl From<PersistenceError> for ApiError {
    fn from(value: PersistenceError) -> Self {
        match value {
            PersistenceError::NotFound => ApiError::NotFound(value.to_string()),
            PersistenceError::Conflict(message) => ApiError::Conflict(message),
            PersistenceError::InvalidData(_)
            | PersistenceError::Csv(_)
            | PersistenceError::Serialization(_) => ApiError::Invalid(value.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::Schedule(ScheduleError::Source(err)) | ServiceError::Persistence(err) => {
                err.into()
            }
            ServiceError::Schedule(err) => ApiError::Invalid(err.to_string()),
            ServiceError::Validation(err) => ApiError::Invalid(err.to_string()),
            ServiceError::InvalidArgument(message) => ApiError::Invalid(message),
            ServiceError::NotFound(message) => ApiError::NotFound(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, "conflict", message),
            ApiError::Invalid(message) => (StatusCode::BAD_REQUEST, "invalid_request", message),
            ApiError::Internal(message) => {
                error!("request failed: {message}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
            }
        };
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct ReadingPayload {
    psalm_id: i32,
    date_read: NaiveDate,
    #[serde(default)]
    rule_applied: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SchedulePayload {
    start_date: NaiveDate,
    months: i32,
    #[serde(default)]
    seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DateRangeQuery {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportQuery {
    range: Option<String>,
    year: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct ImportQuery {
    mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatsQuery {
    range: Option<String>,
    year: Option<i32>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/psalms", get(list_psalms))
        .route("/psalms/import", post(import_psalms))
        .route("/psalms/:id", get(get_psalm))
        .route("/readings", get(list_readings).post(create_reading))
        .route("/readings/export", get(export_readings))
        .route("/readings/import", post(import_readings))
        .route("/readings/import/preview", post(preview_import))
        .route("/readings/:id", put(update_reading).delete(delete_reading))
        .route("/schedule", post(commit_schedule))
        .route("/schedule/preview", post(preview_schedule))
        .route("/schedule/ics", post(schedule_ics))
        .route("/stats", get(stats))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, service: SharedService) -> std::io::Result<()> {
    let state = AppState::new(service);
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{addr}");
    axum::serve(listener, app).await
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_psalms(State(state): State<AppState>) -> Result<Json<Vec<Psalm>>, ApiError> {
    let service = state.service();
    let psalms = service.read().psalms()?;
    Ok(Json(psalms))
}

async fn get_psalm(
    State(state): State<AppState>,
    Path(psalm_id): Path<i32>,
) -> Result<Json<Psalm>, ApiError> {
    let service = state.service();
    let psalm = service.read().psalm(psalm_id)?;
    Ok(Json(psalm))
}

async fn import_psalms(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.trim().is_empty() {
        return Err(ApiError::invalid("CSV body is required"));
    }
    let service = state.service();
    let imported = service.read().import_catalog_csv(body.as_bytes())?;
    Ok(Json(json!({ "imported": imported })))
}

async fn list_readings(
    State(state): State<AppState>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<Vec<ReadingRecord>>, ApiError> {
    let service = state.service();
    let readings = service.read().readings(query.from, query.to)?;
    Ok(Json(readings))
}

async fn create_reading(
    State(state): State<AppState>,
    Json(payload): Json<ReadingPayload>,
) -> Result<(StatusCode, Json<ReadingRecord>), ApiError> {
    let service = state.service();
    let created = service.read().add_reading(
        payload.psalm_id,
        payload.date_read,
        payload.rule_applied.as_deref(),
    )?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_reading(
    State(state): State<AppState>,
    Path(reading_id): Path<Uuid>,
    Json(payload): Json<ReadingPayload>,
) -> Result<Json<ReadingRecord>, ApiError> {
    let service = state.service();
    let updated = service.read().update_reading(
        reading_id,
        payload.psalm_id,
        payload.date_read,
        payload.rule_applied.as_deref(),
    )?;
    Ok(Json(updated))
}

async fn delete_reading(
    State(state): State<AppState>,
    Path(reading_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let service = state.service();
    service.read().delete_reading(reading_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn commit_schedule(
    State(state): State<AppState>,
    Json(payload): Json<SchedulePayload>,
) -> Result<Json<Vec<PlannedReading>>, ApiError> {
    validate_months(payload.months)?;
    let service = state.service();
    let plan = service
        .write()
        .commit_schedule(payload.start_date, payload.months, payload.seed)?;
    Ok(Json(plan))
}

async fn preview_schedule(
    State(state): State<AppState>,
    Json(payload): Json<SchedulePayload>,
) -> Result<Json<Vec<PlannedReading>>, ApiError> {
    validate_months(payload.months)?;
    let service = state.service();
    let plan = service
        .read()
        .preview_schedule(payload.start_date, payload.months, payload.seed)?;
    Ok(Json(plan))
}

async fn schedule_ics(
    State(state): State<AppState>,
    Json(payload): Json<SchedulePayload>,
) -> Result<Response, ApiError> {
    validate_months(payload.months)?;
    let service = state.service();
    let ics = service.read().schedule_ics(
        payload.start_date,
        payload.months,
        payload.seed,
        Utc::now(),
    )?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"salmos.ics\""),
        ],
        ics,
    )
        .into_response())
}

async fn export_readings(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Json<ReadingExport>, ApiError> {
    let range = ExportRange::parse(query.range.as_deref(), query.year)?;
    let service = state.service();
    let export = service.read().export(range, Utc::now())?;
    Ok(Json(export))
}

async fn preview_import(
    State(state): State<AppState>,
    Json(export): Json<ReadingExport>,
) -> Result<Json<ImportPreview>, ApiError> {
    let service = state.service();
    let preview = service.read().preview_import(&export)?;
    Ok(Json(preview))
}

async fn import_readings(
    State(state): State<AppState>,
    Query(query): Query<ImportQuery>,
    Json(export): Json<ReadingExport>,
) -> Result<Json<ImportResult>, ApiError> {
    let mode = match query.mode.as_deref() {
        None => ImportMode::ReplaceConflicts,
        Some(value) => ImportMode::parse(value)
            .ok_or_else(|| ApiError::invalid(format!("unknown import mode '{value}'")))?,
    };
    let service = state.service();
    let result = service.write().import(&export, mode)?;
    Ok(Json(result))
}

async fn stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<ReadingStats>, ApiError> {
    let range = StatsRange::parse(query.range.as_deref(), query.year, query.from, query.to)?;
    let service = state.service();
    let stats = service.read().stats(range, Local::now().date_naive())?;
    Ok(Json(stats))
}
