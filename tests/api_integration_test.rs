// API integration tests that drive the Axum router with real HTTP requests
// over the in-memory store.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use dam_safety_service::api::{create_router, AppState};
use http_body_util::BodyExt; // For `.collect()`
use serde_json::{json, Value};
use tower::ServiceExt; // For `oneshot`

fn app() -> Router {
    create_router(AppState {
        services: common::test_services(),
    })
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create_dam(app: &Router, name: &str) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/dams",
        Some(json!({ "name": name, "state": "Gujarat", "river": "Narmada" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_dam_endpoints() {
    let app = app();
    let id = create_dam(&app, "Sardar Sarovar").await;

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/dams/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Sardar Sarovar");

    let (status, body) = send(&app, Method::GET, "/api/v1/dams", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/dams/{id}/basin"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["damsInBasin"], 1);

    let (status, body) = send(&app, Method::GET, "/api/v1/dams/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("999"));

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/dams",
        Some(json!({ "name": "", "state": "Gujarat", "river": "Narmada" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_telemetry_write_and_read() {
    let app = app();
    let id = create_dam(&app, "Koyna").await;
    let uri = format!("/api/v1/dams/{id}/telemetry/predictive-simulation");

    let (status, body) = send(
        &app,
        Method::PUT,
        &uri,
        Some(json!({ "currentWaterLevel": 100.0, "inflowRate": 300.0, "outflowRate": 200.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["snapshot"]["inputRevision"], 1);
    assert_eq!(body["snapshot"]["category"], "PredictiveSimulation");
    assert!(common::approx(&body["snapshot"]["derived"]["netInflowRate"], 100.0));

    let (status, body) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["computedRevision"], 1);

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/dams/{id}/telemetry"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_telemetry_write_errors() {
    let app = app();
    let id = create_dam(&app, "Tehri").await;

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/dams/{id}/telemetry/bogus"),
        Some(json!({ "inflowRate": 1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("bogus"));

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/dams/{id}/telemetry/SafetyAlert"),
        Some(json!({ "floodRiskScore": 99.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/v1/dams/999/telemetry/SafetyAlert",
        Some(json!({ "inflowRate": 1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_views_alerts_and_recompute() {
    let app = app();
    let id = create_dam(&app, "Bhakra").await;
    let quiet = create_dam(&app, "Quiet").await;

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/dams/{id}/telemetry/safety-alert"),
        Some(common::scenario_safety_inputs()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/dams/{id}/views/rescue"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["audience"], "rescue");
    assert_eq!(body["alertLevel"], "Move To Safer Area");
    assert_eq!(body["downstreamWarningRequired"], true);

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/dams/{id}/views/Public"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["audience"], "public");
    assert!(!body["advisory"].as_str().unwrap().is_empty());

    let (status, _) = send(&app, Method::GET, &format!("/api/v1/dams/{id}/views/press"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, Method::GET, &format!("/api/v1/dams/{quiet}/views/public"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, Method::GET, "/api/v1/alerts/active", None).await;
    assert_eq!(status, StatusCode::OK);
    let alerts = body.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["damId"], id);
    assert_eq!(alerts[0]["emergencyLevel"], "Warning");

    let (status, body) = send(&app, Method::GET, "/api/v1/alerts/active?min_score=70&include_flagged=false", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    // Flagged dams stay listed below the score unless excluded.
    let (status, body) = send(&app, Method::GET, "/api/v1/alerts/active?min_score=99", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(&app, Method::POST, &format!("/api/v1/dams/{id}/recompute"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["changed"], false);

    let (status, body) = send(&app, Method::POST, "/api/v1/telemetry/safety-alert/recompute", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["damsProcessed"], 1);

    let (status, body) = send(&app, Method::POST, &format!("/api/v1/dams/{id}/recompute-stale"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_classify_endpoint() {
    let app = app();

    let (status, body) = send(&app, Method::GET, "/api/v1/classify?score=75&axis=riskZone", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "Red");
    assert_eq!(body["axis"], "riskZone");

    let (status, body) = send(&app, Method::GET, "/api/v1/classify?score=10&axis=alertLevel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "Safe");
    assert_eq!(body["severity"], 0);

    let (status, _) = send(&app, Method::GET, "/api/v1/classify?score=10&axis=mood", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
