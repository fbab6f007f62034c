//! HTTP API for scan submission, history, and exception management.
//!
//! All routes are versioned under `/api/v1`. Handlers delegate to the
//! shared [`ScanCoordinator`] and translate domain errors into HTTP
//! status codes:
//!
//! | Domain error                  | Status |
//! |-------------------------------|--------|
//! | `ScanError::InvalidImage`     | 400    |
//! | `GateError::InvalidException` | 400    |
//! | `ScanError::NotFound`         | 404    |
//! | `GateError::ExceptionNotFound`| 404    |
//! | `ScanError::InFlight`         | 409    |
//! | `ScanError::Unavailable`      | 503    |
//! | anything else                 | 500    |
//!
//! A scan that ends in `FAILED` or `TIMEOUT` is not an HTTP error:
//! the request succeeded, and the response carries the terminal status
//! together with the (failing) gate decision.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use imagegate_core::error::{GateError, ImagegateError, ScanError};
use imagegate_core::pipeline::{HealthStatus, Pipeline};
use imagegate_core::types::{
    Exception, GateDecision, GateThreshold, ScanRequest, ScanStatus, SeverityCounts, Vulnerability,
};
use imagegate_coordinator::{ScanCoordinator, ScanStatistics};
use imagegate_gate::store::NewException;
use imagegate_scanner::AnyBackend;

/// Default number of entries returned by the history endpoint.
const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Default statistics window in days.
const DEFAULT_STATISTICS_DAYS: u64 = 7;

/// Shared state for all API handlers.
pub struct AppState {
    /// Scan coordinator shared with the orchestrator.
    pub coordinator: Arc<ScanCoordinator<AnyBackend>>,
    /// Daemon start time, for uptime reporting.
    pub start_time: Instant,
}

/// Build the API router with all routes registered.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/scan", post(submit_scan))
        .route("/api/v1/scan/:scan_id", get(get_scan))
        .route(
            "/api/v1/scan/:scan_id/vulnerabilities",
            get(get_scan_vulnerabilities),
        )
        .route("/api/v1/history", get(get_history))
        .route("/api/v1/statistics", get(get_statistics))
        .route(
            "/api/v1/exceptions",
            get(list_exceptions).post(create_exception),
        )
        .route("/api/v1/exceptions/:exception_id", delete(revoke_exception))
        .route("/api/v1/status", get(get_status))
        .with_state(state)
}

// --- error translation ---

/// Wrapper that turns [`ImagegateError`] into an HTTP response.
#[derive(Debug)]
pub struct ApiError(ImagegateError);

impl From<ImagegateError> for ApiError {
    fn from(err: ImagegateError) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ImagegateError::Scan(ScanError::InvalidImage { .. }) => StatusCode::BAD_REQUEST,
            ImagegateError::Scan(ScanError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ImagegateError::Scan(ScanError::InFlight { .. }) => StatusCode::CONFLICT,
            ImagegateError::Scan(ScanError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ImagegateError::Gate(GateError::ExceptionNotFound { .. }) => StatusCode::NOT_FOUND,
            ImagegateError::Gate(GateError::InvalidException(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "internal error in API handler");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// --- request / response bodies ---

/// POST /api/v1/scan request body.
#[derive(Debug, Deserialize)]
pub struct ScanRequestBody {
    /// Image name, e.g. `nginx` or `registry.example.com/app`.
    pub image_name: String,
    /// Image tag. Defaults to `latest` when omitted.
    pub image_tag: Option<String>,
}

/// Scan summary returned by the scan endpoints.
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub scan_id: String,
    pub image: String,
    pub status: ScanStatus,
    pub scanner_backend: String,
    pub scanner_version: String,
    pub duration_secs: Option<f64>,
    pub severity_counts: SeverityCounts,
    pub vulnerability_count: usize,
    pub error: Option<String>,
    pub gate: GateDecision,
}

/// GET /api/v1/history query parameters.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub image_name: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/v1/statistics query parameters.
#[derive(Debug, Deserialize)]
pub struct StatisticsQuery {
    pub days: Option<u64>,
}

/// GET /api/v1/exceptions query parameters.
#[derive(Debug, Deserialize)]
pub struct ExceptionsQuery {
    pub active_only: Option<bool>,
}

/// GET /api/v1/status response body.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: &'static str,
    pub health: HealthStatus,
    pub backend: &'static str,
    pub threshold: GateThreshold,
    pub uptime_secs: u64,
    pub scans_completed: u64,
    pub scans_failed: u64,
    pub scans_in_flight: usize,
    pub active_exceptions: usize,
}

fn scan_response(
    scan: imagegate_core::types::ScanResult,
    gate: GateDecision,
) -> ScanResponse {
    ScanResponse {
        scan_id: scan.id.clone(),
        image: scan.image_ref(),
        status: scan.status,
        scanner_backend: scan.scanner_backend.clone(),
        scanner_version: scan.scanner_version.clone(),
        duration_secs: scan.duration_secs,
        severity_counts: scan.severity_counts(),
        vulnerability_count: scan.vulnerabilities.len(),
        error: scan.error,
        gate,
    }
}

// --- handlers ---

/// POST /api/v1/scan — run a scan and return the gate decision.
pub async fn submit_scan(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ScanRequestBody>,
) -> Result<Json<ScanResponse>, ApiError> {
    let request = ScanRequest::new(body.image_name, body.image_tag);
    let outcome = state.coordinator.submit(request).await?;
    Ok(Json(scan_response(outcome.scan, outcome.decision)))
}

/// GET /api/v1/scan/{scan_id} — stored scan with a fresh gate decision.
pub async fn get_scan(
    State(state): State<Arc<AppState>>,
    Path(scan_id): Path<String>,
) -> Result<Json<ScanResponse>, ApiError> {
    let scan = state
        .coordinator
        .store()
        .get(&scan_id)
        .await
        .ok_or(ImagegateError::Scan(ScanError::NotFound {
            scan_id: scan_id.clone(),
        }))?;
    // 저장된 스캔을 현재 예외 집합으로 재판정
    let decision = state.coordinator.re_evaluate(&scan_id).await?;
    Ok(Json(scan_response(scan, decision)))
}

/// GET /api/v1/scan/{scan_id}/vulnerabilities — normalized findings.
pub async fn get_scan_vulnerabilities(
    State(state): State<Arc<AppState>>,
    Path(scan_id): Path<String>,
) -> Result<Json<Vec<Vulnerability>>, ApiError> {
    let scan = state
        .coordinator
        .store()
        .get(&scan_id)
        .await
        .ok_or(ImagegateError::Scan(ScanError::NotFound { scan_id }))?;
    Ok(Json(scan.vulnerabilities))
}

/// GET /api/v1/history — recent scans, newest first.
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<ScanResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let scans = state
        .coordinator
        .store()
        .history(query.image_name.as_deref(), limit)
        .await;

    let exceptions = state.coordinator.exceptions().snapshot().await;
    let threshold = state.coordinator.threshold();
    let now = SystemTime::now();
    let entries = scans
        .into_iter()
        .map(|scan| {
            let decision = imagegate_gate::evaluate(&scan, &exceptions, threshold, now);
            scan_response(scan, decision)
        })
        .collect();
    Json(entries)
}

/// GET /api/v1/statistics — aggregate counts over a recent window.
pub async fn get_statistics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatisticsQuery>,
) -> Json<ScanStatistics> {
    let days = query.days.unwrap_or(DEFAULT_STATISTICS_DAYS);
    let stats = state
        .coordinator
        .store()
        .statistics(days, SystemTime::now())
        .await;
    Json(stats)
}

/// GET /api/v1/exceptions — all exceptions, including revoked ones.
/// With `?active_only=true`, only exceptions valid at the current time.
pub async fn list_exceptions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExceptionsQuery>,
) -> Json<Vec<Exception>> {
    let mut exceptions = state.coordinator.exceptions().snapshot().await;
    if query.active_only.unwrap_or(false) {
        let now = SystemTime::now();
        exceptions.retain(|e| e.is_valid_at(now));
    }
    Json(exceptions)
}

/// POST /api/v1/exceptions — approve a new exception.
pub async fn create_exception(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewException>,
) -> Result<(StatusCode, Json<Exception>), ApiError> {
    let exception = state.coordinator.exceptions().approve(body).await?;
    Ok((StatusCode::CREATED, Json(exception)))
}

/// DELETE /api/v1/exceptions/{exception_id} — revoke an exception.
///
/// The record is kept with `is_active = false` for audit purposes.
pub async fn revoke_exception(
    State(state): State<Arc<AppState>>,
    Path(exception_id): Path<String>,
) -> Result<Json<Exception>, ApiError> {
    let revoked = state.coordinator.exceptions().revoke(&exception_id).await?;
    Ok(Json(revoked))
}

/// GET /api/v1/status — daemon and coordinator status.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let coordinator = &state.coordinator;
    Json(StatusResponse {
        state: coordinator.state_name().await,
        health: coordinator.health_check().await,
        backend: coordinator.backend_kind(),
        threshold: coordinator.threshold(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        scans_completed: coordinator.completed_count(),
        scans_failed: coordinator.failed_count(),
        scans_in_flight: coordinator.in_flight_count().await,
        active_exceptions: coordinator
            .exceptions()
            .active_count(SystemTime::now())
            .await,
    })
}
