// HTTP API - axum routes over the availability service
//
// Response shapes match what the web frontend already consumes:
// bare arrays for queries, {status, message} objects for writes and errors.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{debug, warn};

use crate::aggregator::{AvailabilityService, ServiceError, DEFAULT_WITHDRAWAL_AMOUNT};
use crate::ingest::{IngestError, ReportSubmission};
use crate::report::{AnnotatedLocation, Report};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: AvailabilityService,
}

/// Status object returned by writes and errors
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SimpleStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SimpleStatus {
    fn ok(status: &str) -> Self {
        Self {
            status: status.to_string(),
            message: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(SimpleStatus::error(self.message))).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::Discovery(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Ingest(IngestError::MissingField(_)) => StatusCode::BAD_REQUEST,
            ServiceError::Store(_)
            | ServiceError::Ingest(IngestError::Store(_))
            | ServiceError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection, "rejected request body");
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        warn!(error = %rejection, "rejected query string");
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

// ============================================================================
// API Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
struct AtmQuery {
    #[serde(default)]
    pincode: String,
}

#[derive(Debug, Deserialize)]
struct AvailableQuery {
    #[serde(default)]
    pincode: String,
    #[serde(default)]
    amount: Option<String>,
}

impl AvailableQuery {
    /// Unparseable or missing amounts fall back to the default; the amount
    /// does not filter anything
    fn amount(&self) -> f64 {
        match self.amount.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw.parse().unwrap_or_else(|_| {
                debug!(amount = raw, "unparseable withdrawal amount, using default");
                DEFAULT_WITHDRAWAL_AMOUNT
            }),
            _ => DEFAULT_WITHDRAWAL_AMOUNT,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    name: String,
    address: String,
}

#[derive(Debug, Deserialize)]
struct GenerateBody {
    prompt: String,
}

#[derive(Debug, Serialize)]
struct GenerateReply {
    text: String,
}

/// GET /api/test - Health check
async fn health_check() -> impl IntoResponse {
    Json(SimpleStatus::ok("ok"))
}

/// GET /api/atms?pincode= - Discovered locations with their current report
async fn find_atms(
    State(state): State<AppState>,
    query: Result<Query<AtmQuery>, QueryRejection>,
) -> Result<Json<Vec<AnnotatedLocation>>, ApiError> {
    let Query(query) = query?;
    let locations = state.service.find_near(&query.pincode).await?;
    Ok(Json(locations))
}

/// GET /api/atms/available?pincode=&amount= - Direct search display rows
async fn find_available(
    State(state): State<AppState>,
    query: Result<Query<AvailableQuery>, QueryRejection>,
) -> Result<Json<Vec<String>>, ApiError> {
    let Query(query) = query?;
    let rows = state
        .service
        .find_available(&query.pincode, query.amount())
        .await?;
    Ok(Json(rows.iter().map(ToString::to_string).collect()))
}

/// POST /api/report - Submit a crowd report
async fn submit_report(
    State(state): State<AppState>,
    body: Result<Json<ReportSubmission>, JsonRejection>,
) -> Result<Json<SimpleStatus>, ApiError> {
    let Json(submission) = body?;
    state.service.submit_report(submission).await?;
    Ok(Json(SimpleStatus::ok("success")))
}

/// GET /api/reports?name=&address= - Report history for one location
async fn report_history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<Report>>, ApiError> {
    let Query(query) = query?;
    let reports = state
        .service
        .report_history(&query.name, &query.address)
        .await?;
    Ok(Json(reports))
}

/// POST /api/generate - Forward a prompt to the generation service
async fn generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Json<GenerateReply>, ApiError> {
    let Json(request) = body?;
    let text = state.service.generate(&request.prompt).await?;
    Ok(Json(GenerateReply { text }))
}

/// Build the application router: API under /api, static files elsewhere
pub fn router(state: AppState, static_dir: &Path) -> Router {
    let api_routes = Router::new()
        .route("/test", get(health_check))
        .route("/atms", get(find_atms))
        .route("/atms/available", get(find_available))
        .route("/report", post(submit_report))
        .route("/reports", get(report_history))
        .route("/generate", post(generate))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::tests::FakeGenerator;
    use crate::report::{Location, NewReport};
    use crate::store::ReportStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(generator: FakeGenerator) -> (Router, ReportStore) {
        let store = ReportStore::open_in_memory().unwrap();
        let service = AvailabilityService::new(store.clone(), Arc::new(generator));
        let router = router(AppState { service }, Path::new("does-not-exist"));
        (router, store)
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _) = app(FakeGenerator::replying(""));
        let response = app.oneshot(get_req("/api/test")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_find_atms_returns_annotated_locations() {
        let (app, store) = app(FakeGenerator::replying("A :: 1 Main St\nB :: 2 Main St"));
        store
            .append(&NewReport::new(Location::new("A", "1 Main St")).with_cash("Available"))
            .unwrap();

        let response = app.oneshot(get_req("/api/atms?pincode=600001")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body[0]["name"], "A");
        assert_eq!(body[0]["latestReport"]["cashStatus"], "Available");
        assert_eq!(body[1]["name"], "B");
        assert!(body[1]["latestReport"].is_null());
    }

    #[tokio::test]
    async fn test_find_atms_discovery_failure_is_bad_gateway() {
        let (app, _) = app(FakeGenerator::failing(500));
        let response = app.oneshot(get_req("/api/atms?pincode=600001")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(
            body["message"],
            "location discovery failed: generation service returned HTTP 500"
        );
    }

    #[tokio::test]
    async fn test_find_atms_store_fault_is_server_error() {
        let (app, store) = app(FakeGenerator::replying("A :: 1 Main St\nB :: 2 Main St"));
        store
            .connect()
            .unwrap()
            .execute(
                "INSERT INTO atm_reports (location_name, location_address, report_timestamp)
                 VALUES ('A', '1 Main St', 'garbled')",
                [],
            )
            .unwrap();

        let response = app.oneshot(get_req("/api/atms?pincode=600001")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert!(body.get("name").is_none());
    }

    #[tokio::test]
    async fn test_find_available_returns_display_rows() {
        let (app, store) = app(FakeGenerator::replying(""));
        store
            .append(&NewReport::new(Location::new("SBI ATM", "12 MG Road, 600001")).with_cash("Available"))
            .unwrap();

        let response = app
            .oneshot(get_req("/api/atms/available?pincode=600001&amount=2500"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(
            body,
            serde_json::json!([
                "SBI ATM - 12 MG Road, 600001 | Cash: Available | Deposit: No | Passbook: No"
            ])
        );
    }

    #[tokio::test]
    async fn test_find_available_unparseable_amount_uses_default() {
        let (app, store) = app(FakeGenerator::replying(""));
        store
            .append(&NewReport::new(Location::new("SBI ATM", "12 MG Road, 600001")).with_cash("yes"))
            .unwrap();

        let response = app
            .oneshot(get_req("/api/atms/available?pincode=600001&amount=abc"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_report_success() {
        let (app, store) = app(FakeGenerator::replying(""));
        let response = app
            .oneshot(post_json(
                "/api/report",
                r#"{"name":"A","address":"1 Main St","cashStatus":"Low","depositStatus":"yes","passbookStatus":""}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({"status": "success"}));

        let latest = store.latest_report("A", "1 Main St").unwrap().unwrap();
        assert_eq!(latest.cash_status.as_deref(), Some("Low"));
        assert_eq!(latest.passbook_status.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_submit_report_missing_address_is_client_error() {
        let (app, store) = app(FakeGenerator::replying(""));
        let response = app
            .oneshot(post_json("/api/report", r#"{"name":"A","cashStatus":"Low"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "missing address");
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_submit_report_invalid_json_is_client_error() {
        let (app, store) = app(FakeGenerator::replying(""));
        let response = app.oneshot(post_json("/api/report", "not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_report_history() {
        let (app, store) = app(FakeGenerator::replying(""));
        store
            .append(&NewReport::new(Location::new("A", "1 Main St")).with_cash("Low"))
            .unwrap();
        store
            .append(&NewReport::new(Location::new("A", "1 Main St")).with_cash("Available"))
            .unwrap();

        let response = app
            .oneshot(get_req("/api/reports?name=A&address=1%20Main%20St"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["cashStatus"], "Available");
    }

    #[tokio::test]
    async fn test_report_history_missing_address_is_json_client_error() {
        let (app, _) = app(FakeGenerator::replying(""));
        let response = app.oneshot(get_req("/api/reports?name=A")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("address"));
    }

    #[tokio::test]
    async fn test_generate_forwards_prompt() {
        let (app, _) = app(FakeGenerator::replying("hello"));
        let response = app
            .oneshot(post_json("/api/generate", r#"{"prompt":"say hello"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({"text": "hello"}));
    }
}
