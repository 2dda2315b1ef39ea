use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use slotserver::core::urls::ApiUrls;
use slotserver::scheduling::MemoryStore;
use slotserver::{build_router, AppConfig, AppState};

fn app() -> Router {
    build_router(AppState::new(Arc::new(MemoryStore::new()), AppConfig::default()))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send_as(app, method, uri, body, None).await
}

async fn send_as(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    role: Option<&str>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(role) = role {
        request = request.header("X-Caller-Role", role);
    }
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
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Creates a closer with Tuesday 14:00 availability and returns its id.
async fn seed_closer(app: &Router, capacity: u32) -> String {
    let (status, closer) = send(
        app,
        "POST",
        ApiUrls::CLOSERS,
        Some(json!({ "name": "Carla", "meeting_type": "r1", "max_leads_per_slot": capacity })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = closer["id"].as_str().unwrap().to_string();

    let (status, change) = send(
        app,
        "POST",
        &ApiUrls::with_id(ApiUrls::CLOSER_AVAILABILITY, &id),
        Some(json!({ "weekday": 2, "time_of_day": "14:00:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["changed"], true);
    id
}

async fn book(app: &Router, closer_id: &str, name: &str) -> (StatusCode, Value) {
    send(app, "POST", ApiUrls::BOOKINGS, Some(book_body(closer_id, name))).await
}

fn book_body(closer_id: &str, name: &str) -> Value {
    json!({
        "closer_id": closer_id,
        "scheduled_at": "2025-06-10T14:00:00",
        "attendee": { "name": name },
        "booked_by": "sdr"
    })
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = send(&app, "GET", ApiUrls::HEALTH, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_booking_until_full_returns_conflict() {
    let app = app();
    let closer_id = seed_closer(&app, 1).await;

    let (status, receipt) = book(&app, &closer_id, "A").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["created_meeting"], true);

    let (status, error) = book(&app, &closer_id, "B").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "capacity_exceeded");

    let grid_uri = format!(
        "{}?date=2025-06-10&meeting_type=r1&closer_ids={closer_id}",
        ApiUrls::SLOT_GRID
    );
    let (status, grid) = send(&app, "GET", &grid_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(grid["cells"][0]["state"]["state"], "full");
    assert_eq!(grid["cells"][0]["occupancy"], 1);
}

#[tokio::test]
async fn test_booking_points_at_created_meeting() {
    let app = app();
    let closer_id = seed_closer(&app, 2).await;
    let request = Request::builder()
        .method("POST")
        .uri(ApiUrls::BOOKINGS)
        .header("content-type", "application/json")
        .body(Body::from(book_body(&closer_id, "A").to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let location = response.headers()["location"].to_str().unwrap().to_string();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let receipt: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        location,
        ApiUrls::with_id(ApiUrls::MEETING_BY_ID, receipt["meeting_id"].as_str().unwrap())
    );

    let (status, meeting) = send(&app, "GET", &location, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(meeting["occupancy"], 1);
}

#[tokio::test]
async fn test_unconfigured_time_is_unprocessable() {
    let app = app();
    let closer_id = seed_closer(&app, 2).await;
    let mut body = book_body(&closer_id, "A");
    body["scheduled_at"] = json!("2025-06-10T09:00:00");

    let (status, error) = send(&app, "POST", ApiUrls::BOOKINGS, Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["error"], "invalid_slot");
}

#[tokio::test]
async fn test_cancel_then_meeting_is_orphan() {
    let app = app();
    let closer_id = seed_closer(&app, 2).await;
    let (_, receipt) = book(&app, &closer_id, "A").await;
    let meeting_id = receipt["meeting_id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        "POST",
        ApiUrls::CANCEL,
        Some(json!({ "kind": "meeting", "id": meeting_id })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, meeting) = send(
        &app,
        "GET",
        &ApiUrls::with_id(ApiUrls::MEETING_BY_ID, meeting_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(meeting["orphan"], true);
    assert_eq!(meeting["status"], "canceled");
}

#[tokio::test]
async fn test_status_update_respects_caller_role() {
    let app = app();
    let closer_id = seed_closer(&app, 2).await;
    let (_, receipt) = book(&app, &closer_id, "A").await;
    let attendee_id = receipt["attendee_id"].as_str().unwrap();
    let status_uri = ApiUrls::with_id(ApiUrls::ATTENDEE_STATUS, attendee_id);

    let (status, view) = send(&app, "PUT", &status_uri, Some(json!({ "status": "no_show" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["effective_status"], "no_show");

    let (status, error) = send_as(
        &app,
        "PUT",
        &status_uri,
        Some(json!({ "status": "invited" })),
        Some("sync"),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["error"], "invalid_transition");

    let (status, _) = send_as(
        &app,
        "PUT",
        &status_uri,
        Some(json!({ "status": "invited" })),
        Some("bogus"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_payment_and_metrics() {
    let app = app();
    let closer_id = seed_closer(&app, 2).await;
    let (_, receipt) = book(&app, &closer_id, "A").await;
    let attendee_id = receipt["attendee_id"].as_str().unwrap();

    let (status, view) = send(
        &app,
        "POST",
        &ApiUrls::with_id(ApiUrls::ATTENDEE_PAYMENT, attendee_id),
        Some(json!({ "paid_at": "2025-06-11T10:00:00Z" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["effective_status"], "contract_paid");
    assert_eq!(view["status"], "invited");

    let metrics_uri = format!(
        "{}?start=2025-06-01&end=2025-06-30&meeting_type=r1",
        ApiUrls::CLOSER_METRICS
    );
    let (status, report) = send(&app, "GET", &metrics_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["rows"][0]["contract_paid"], 1);
    assert_eq!(report["rows"][0]["ranks"]["realized"], 1);
    assert_eq!(report["team_meta"], 18 * 30);
}

#[tokio::test]
async fn test_inverted_metrics_range_is_bad_request() {
    let app = app();
    let uri = format!(
        "{}?start=2025-06-30&end=2025-06-01&meeting_type=r1",
        ApiUrls::CLOSER_METRICS
    );
    let (status, error) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "invalid_input");
}

#[tokio::test]
async fn test_unknown_meeting_is_not_found() {
    let app = app();
    let uri = ApiUrls::with_id(ApiUrls::MEETING_BY_ID, &uuid::Uuid::new_v4().to_string());
    let (status, error) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"], "not_found");
}

#[tokio::test]
async fn test_blocked_date_routes() {
    let app = app();
    let closer_id = seed_closer(&app, 2).await;
    let (status, block) = send(
        &app,
        "POST",
        &ApiUrls::with_id(ApiUrls::CLOSER_BLOCKED_DATES, &closer_id),
        Some(json!({ "date": "2025-06-10", "reason": "holiday" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, error) = book(&app, &closer_id, "A").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["error"], "blocked_slot");

    let block_uri = ApiUrls::with_id(ApiUrls::BLOCKED_DATE_BY_ID, block["id"].as_str().unwrap());
    let (status, _) = send(&app, "DELETE", &block_uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", &block_uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
