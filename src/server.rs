//! Web server - Axum routes over the scan service, with SSE progress streaming

use crate::compare::ScanComparison;
use crate::config::AppConfig;
use crate::progress::ProgressEvent;
use crate::registry::InMemoryScanStore;
use crate::repository::{JsonScanRepository, PruneReport, ScanSummary, StoredScan};
use crate::salesforce::SalesforceAuth;
use crate::security::SecurityOverview;
use crate::service::ScanService;
use crate::types::OrgInfo;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};

/// Header carrying the org's base URL next to the bearer token.
pub const INSTANCE_URL_HEADER: &str = "x-instance-url";

/// Application state
pub struct AppState {
    pub service: ScanService,
}

/// Run the web server
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let addr = config.bind_addr;
    let repository = JsonScanRepository::new(config.data_dir.join("scans"));
    tracing::info!(dir = %repository.dir().display(), "Scan repository ready");

    let service = ScanService::new(Arc::new(InMemoryScanStore::new()), Arc::new(repository), config);
    let app = router(Arc::new(AppState { service }));

    tracing::info!("Server running at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/scan", post(start_scan_handler))
        .route("/api/scan/progress", get(progress_handler))
        .route("/api/scan/stop", post(stop_scan_handler))
        .route("/api/scans", get(list_scans_handler))
        .route("/api/scans/latest", get(latest_scan_handler))
        .route("/api/scans/cleanup", delete(cleanup_handler))
        .route("/api/compare", get(compare_handler))
        .route("/api/security", get(security_handler))
        .route("/api/org", get(org_info_handler))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

// ============================================
// REQUEST / RESPONSE TYPES
// ============================================

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn fail(status: StatusCode, error: &str) -> HandlerError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            details: None,
        }),
    )
}

fn fail_with(status: StatusCode, error: &str, details: impl ToString) -> HandlerError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            details: Some(details.to_string()),
        }),
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartScanResponse {
    scan_id: String,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressQuery {
    scan_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopScanRequest {
    scan_id: Option<String>,
}

#[derive(Serialize)]
struct StopScanResponse {
    success: bool,
    message: String,
}

#[derive(Serialize)]
struct LatestScanResponse {
    scan: Option<StoredScan>,
}

#[derive(Serialize)]
struct ScanListResponse {
    scans: Vec<ScanSummary>,
}

#[derive(Serialize)]
struct SecurityResponse {
    security: Option<SecurityOverview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OrgInfoResponse {
    org_info: OrgInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompareQuery {
    scan_id1: Option<String>,
    scan_id2: Option<String>,
}

#[derive(Serialize)]
struct CleanupResponse {
    message: String,
    #[serde(flatten)]
    report: PruneReport,
}

/// Session credentials from `Authorization: Bearer` and the instance URL header.
fn auth_from_headers(headers: &HeaderMap) -> Result<SalesforceAuth, HandlerError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let instance_url = headers
        .get(INSTANCE_URL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|u| !u.is_empty());

    match (token, instance_url) {
        (Some(token), Some(instance_url)) => Ok(SalesforceAuth::new(token, instance_url)),
        _ => Err(fail(StatusCode::UNAUTHORIZED, "Not authenticated")),
    }
}

// ============================================
// HANDLERS
// ============================================

async fn health_check() -> &'static str {
    "OK"
}

async fn start_scan_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StartScanResponse>, HandlerError> {
    let auth = auth_from_headers(&headers)?;
    let scan_id = state.service.start(auth);

    Ok(Json(StartScanResponse {
        scan_id,
        message: "Scan started".into(),
    }))
}

/// SSE stream of one scan's progress. Reconnecting clients resume after
/// `Last-Event-ID`.
async fn progress_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ProgressQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    auth_from_headers(&headers)?;
    let scan_id = query
        .scan_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| fail(StatusCode::BAD_REQUEST, "Scan ID is required"))?;

    let resume_from = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .map_or(0, |last_seen| last_seen.saturating_add(1));

    let events = state
        .service
        .subscribe(&scan_id, resume_from)
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "Scan not found"))?;

    let stream = events.map(|event| sse_event(&event));
    let no_buffering = [
        (header::CACHE_CONTROL, "no-cache"),
        (header::HeaderName::from_static("x-accel-buffering"), "no"),
    ];
    Ok((no_buffering, Sse::new(stream).keep_alive(KeepAlive::default())))
}

fn sse_event(event: &ProgressEvent) -> Result<Event, axum::Error> {
    let sse = match event.index() {
        Some(index) => Event::default().id(index.to_string()),
        None => Event::default(),
    };
    sse.json_data(event)
}

async fn stop_scan_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<StopScanRequest>,
) -> Result<Json<StopScanResponse>, HandlerError> {
    auth_from_headers(&headers)?;
    let scan_id = req
        .scan_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| fail(StatusCode::BAD_REQUEST, "Scan ID is required"))?;

    if !state.service.stop(&scan_id).await {
        return Err(fail(StatusCode::NOT_FOUND, "Scan not found or already completed"));
    }

    Ok(Json(StopScanResponse {
        success: true,
        message: "Scan stopped successfully".into(),
    }))
}

async fn latest_scan_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<LatestScanResponse>, HandlerError> {
    auth_from_headers(&headers)?;
    let scan = state.service.latest().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to fetch latest scan");
        fail_with(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch latest scan", e)
    })?;
    Ok(Json(LatestScanResponse { scan }))
}

async fn list_scans_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HandlerError> {
    auth_from_headers(&headers)?;
    let scans = state.service.history().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to list scans");
        fail_with(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch scans", e)
    })?;
    Ok(([(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")], Json(ScanListResponse { scans })))
}

async fn security_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SecurityResponse>, HandlerError> {
    auth_from_headers(&headers)?;
    let security = state.service.security().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to load security data");
        fail_with(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch security data", e)
    })?;
    let message = security
        .is_none()
        .then(|| "No scan data available. Please run a scan first.".to_string());
    Ok(Json(SecurityResponse { security, message }))
}

async fn org_info_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<OrgInfoResponse>, HandlerError> {
    let auth = auth_from_headers(&headers)?;
    let org_info = state.service.org_info(auth).await.map_err(|e| {
        tracing::error!(error = %e, "Org info fetch failed");
        fail_with(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch org information", e)
    })?;
    if org_info.id.is_empty() {
        tracing::warn!("Org info missing ID");
    }
    Ok(Json(OrgInfoResponse { org_info }))
}

async fn compare_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CompareQuery>,
) -> Result<Json<ScanComparison>, HandlerError> {
    let (Some(first), Some(second)) = (query.scan_id1, query.scan_id2) else {
        return Err(fail(StatusCode::BAD_REQUEST, "Both scanId1 and scanId2 parameters required"));
    };

    let comparison = state.service.compare(&first, &second).await.map_err(|e| {
        tracing::error!(error = %e, "Compare failed");
        fail_with(StatusCode::INTERNAL_SERVER_ERROR, "Failed to compare scans", e)
    })?;
    comparison
        .map(Json)
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "One or both scans not found"))
}

async fn cleanup_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CleanupResponse>, HandlerError> {
    auth_from_headers(&headers)?;
    let report = state.service.cleanup().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to cleanup scans");
        fail_with(StatusCode::INTERNAL_SERVER_ERROR, "Failed to cleanup scans", e)
    })?;

    let message = if report.deleted == 0 {
        format!("No scans to delete. Only {} or fewer scans exist.", state.service.config().scan_retention)
    } else {
        format!(
            "Successfully deleted {} scan(s). Kept the {} most recent scans.",
            report.deleted, report.kept
        )
    };
    Ok(Json(CleanupResponse { message, report }))
}
