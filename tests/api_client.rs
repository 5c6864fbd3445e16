//! ComplianceApiClient against an in-process stub of the compliance service

use axum::{
    body::Bytes,
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use billboard_compliance::{
    analysis_coordinator::{AnalysisCoordinator, AnalysisState},
    compliance_api::ComplianceApiClient,
    models::{ComplianceStatus, FeedEndpoint, ImagePayload, ImageSource, ReportId, ReportStatus},
    report_feed::{EndpointOutcome, ReportFeedPoller},
    Error,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;

async fn spawn_stub(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn report_json(id: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "is_compliant": false,
        "status": status,
        "violation_count": 1,
        "violations_found": ["alcohol"],
        "extracted_text": "COLD BEER",
        "image_url": format!("/uploads/{}.jpg", id),
        "created_at": "2025-05-01T08:00:00"
    })
}

async fn analyze_handler(body: Bytes) -> impl IntoResponse {
    let text = String::from_utf8_lossy(&body);
    if !text.contains("name=\"file\"") {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"detail": "file field missing"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "analysis": {
                "is_compliant": false,
                "extracted_text": "SALE NOW",
                "violations_found": ["prohibited_language"],
                "violation_count": 1,
                "status": "Unauthorized"
            },
            "report_id": "r1"
        })),
    )
}

async fn reports_handler(Query(query): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
    assert_eq!(query.get("limit").map(String::as_str), Some("2"));
    Json(json!({
        "success": true,
        "count": 3,
        "reports": [
            report_json("r3", "pending"),
            report_json("r2", "approved"),
            report_json("r1", "resolved")
        ]
    }))
}

async fn report_handler(Path(id): Path<String>) -> impl IntoResponse {
    if id == "r1" {
        (StatusCode::OK, Json(json!({"report": report_json("r1", "pending")})))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Report not found"})),
        )
    }
}

async fn status_handler(
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let status = query.get("status").cloned().unwrap_or_default();
    Json(json!({"success": true, "report": report_json(&id, &status)}))
}

fn stub_router() -> Router {
    Router::new()
        .route("/api/health", get(|| async { Json(json!({"status": "healthy"})) }))
        .route("/api/analyze", post(analyze_handler))
        .route(
            "/api/statistics",
            get(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"detail": "database unavailable"})),
                )
            }),
        )
        .route("/api/reports", get(reports_handler))
        .route("/api/reports/:id", get(report_handler))
        .route("/api/reports/:id/status", patch(status_handler))
}

fn jpeg() -> ImagePayload {
    ImagePayload::new(vec![0xFF, 0xD8, 0xFF, 0xE0], "image/jpeg", ImageSource::Upload)
}

#[tokio::test]
async fn test_analyze_reports_unauthorized_verdict() {
    let base = spawn_stub(stub_router()).await;
    let client = Arc::new(ComplianceApiClient::new(base).unwrap());
    let coordinator = AnalysisCoordinator::new(client.clone());

    assert!(client.health_check().await.unwrap());

    let result = coordinator.analyze(jpeg()).await.unwrap();
    assert_eq!(result.compliance_status(), ComplianceStatus::Unauthorized);
    assert_eq!(result.violation_count, 1);
    assert_eq!(result.violations_found, vec!["prohibited_language"]);
    assert_eq!(result.report_id, Some(ReportId::new("r1")));
    assert_eq!(result.status_label.as_deref(), Some("Unauthorized"));
    assert!(matches!(
        coordinator.state(),
        AnalysisState::Completed { generation: 1, .. }
    ));
}

#[tokio::test]
async fn test_analyze_rejection_uses_detail() {
    let router = Router::new().route(
        "/api/analyze",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"detail": "File must be an image"})),
            )
        }),
    );
    let base = spawn_stub(router).await;
    let client = ComplianceApiClient::new(base).unwrap();

    match client.analyze_image(&jpeg()).await {
        Err(Error::AnalysisRejected { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "File must be an image");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_statistics_failure_keeps_reports() {
    let base = spawn_stub(stub_router()).await;
    let client = Arc::new(ComplianceApiClient::new(base).unwrap());
    let poller = ReportFeedPoller::new(client, 2);
    let mut notices = poller.notices();

    let outcome = poller.refresh_now().await;
    assert!(matches!(outcome.statistics, EndpointOutcome::Failed(_)));
    assert_eq!(outcome.reports, EndpointOutcome::Applied);

    let snapshot = poller.snapshot();
    assert!(snapshot.statistics.is_none());
    assert!(!snapshot.is_loading());
    let ids: Vec<&str> = snapshot.reports().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["r3", "r2"]);
    assert!(snapshot.reports()[0].created_at.is_some());

    let notice = notices.try_recv().unwrap();
    assert_eq!(notice.failures.len(), 1);
    assert_eq!(notice.failures[0].endpoint, FeedEndpoint::Statistics);
    assert!(notice.failures[0].message.contains("database unavailable"));
    assert!(matches!(notice.to_error(), Error::FetchDegraded(_)));
}

#[tokio::test]
async fn test_reports_data_shape() {
    let router = Router::new().route(
        "/api/reports",
        get(|| async {
            Json(json!({
                "data": [report_json("d1", "flagged_by_citizens")],
                "reports": [report_json("r1", "pending")]
            }))
        }),
    );
    let base = spawn_stub(router).await;
    let client = ComplianceApiClient::new(base).unwrap();

    let reports = client.list_reports(10).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].id, ReportId::new("d1"));
    assert_eq!(reports[0].status, ReportStatus::FlaggedByCitizens);
}

#[tokio::test]
async fn test_report_lookup_and_status_update() {
    let base = spawn_stub(stub_router()).await;
    let client = ComplianceApiClient::new(format!("{}/", base)).unwrap();

    let report = client.get_report(&ReportId::new("r1")).await.unwrap();
    assert_eq!(report.status, ReportStatus::Pending);
    assert_eq!(report.extracted_text.as_deref(), Some("COLD BEER"));

    let missing = client.get_report(&ReportId::new("nope")).await;
    assert!(matches!(missing, Err(Error::NotFound(_))));

    let updated = client
        .update_report_status(&ReportId::new("r2"), &ReportStatus::Approved)
        .await
        .unwrap();
    assert_eq!(updated.id, ReportId::new("r2"));
    assert_eq!(updated.status, ReportStatus::Approved);
}

#[tokio::test]
async fn test_unreachable_service_is_unhealthy() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ComplianceApiClient::new(format!("http://{}", addr)).unwrap();
    assert!(!client.health_check().await.unwrap());
}

#[tokio::test]
async fn test_non_success_health_is_unhealthy() {
    let router = Router::new().route(
        "/api/health",
        get(|| async {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"detail": "warming up"})),
            )
        }),
    );
    let base = spawn_stub(router).await;
    let client = ComplianceApiClient::new(base).unwrap();

    assert!(!client.health_check().await.unwrap());
}
