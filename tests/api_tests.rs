//! API integration tests, served in-process over the in-memory backend

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use circulation_server::{
    api,
    config::{AppConfig, LoansConfig},
    models::MemberStatus,
    repository::{memory::InMemoryStore, Repository},
    services::Services,
    AppState,
};

const BASE_URL: &str = "/api/v1";

/// Router over a store holding members 1 (active) and 2 (suspended), copies 10 and 11 of book 7
async fn test_app() -> Router {
    let store = InMemoryStore::new();
    store.add_member(1, MemberStatus::Active).await;
    store.add_member(2, MemberStatus::Suspended).await;
    store.add_copy(10, 7).await;
    store.add_copy(11, 7).await;

    let state = AppState {
        config: Arc::new(AppConfig::default()),
        services: Arc::new(Services::new(
            Repository::in_memory(store),
            LoansConfig::default(),
        )),
    };
    api::create_router(state)
}

async fn send(app: &Router, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(format!("{}{}", BASE_URL, path));
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn checkout(app: &Router, member_id: i64, copy_id: i64) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/loans",
        Some(json!({ "member_id": member_id, "copy_id": copy_id })),
    )
    .await
}

#[tokio::test]
async fn test_health_check() {
    let app = test_app().await;

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app, Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_checkout_and_return() {
    let app = test_app().await;

    let (status, loan) = checkout(&app, 1, 10).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(loan["status"], "active");
    assert!(loan["returned_at"].is_null());
    let id = loan["id"].as_i64().unwrap();

    let (status, copy) = send(&app, Method::GET, "/copies/10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(copy["status"], "borrowed");

    let (status, returned) = send(&app, Method::POST, &format!("/loans/{}/return", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["status"], "returned");
    assert!(returned["returned_at"].is_string());

    let (status, body) = send(&app, Method::POST, &format!("/loans/{}/return", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 22);
}

#[tokio::test]
async fn test_checkout_errors() {
    let app = test_app().await;
    checkout(&app, 1, 10).await;

    let (status, body) = checkout(&app, 1, 10).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 7);
    assert_eq!(body["error"], "CopyNotAvailable");

    let (status, body) = checkout(&app, 2, 11).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 12);

    let (status, body) = checkout(&app, 99, 11).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 4);

    let (status, body) = checkout(&app, 1, 99).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 5);

    let (status, body) = send(
        &app,
        Method::POST,
        "/loans",
        Some(json!({ "member_id": 1, "copy_id": 11, "loan_period_days": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 18);
}

#[tokio::test]
async fn test_return_by_copy() {
    let app = test_app().await;

    let (status, body) = send(&app, Method::POST, "/copies/11/return", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 24);

    checkout(&app, 1, 11).await;
    let (status, body) = send(&app, Method::POST, "/copies/11/return", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "returned");
    assert_eq!(body["copy_id"], 11);
}

#[tokio::test]
async fn test_copy_status_update() {
    let app = test_app().await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/copies/10/status",
        Some(json!({ "status": "maintenance" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "maintenance");

    let (status, _) = checkout(&app, 1, 10).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/copies/10/status",
        Some(json!({ "status": "borrowed" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 23);
}

#[tokio::test]
async fn test_borrowers_and_member_loans() {
    let app = test_app().await;
    checkout(&app, 1, 10).await;

    let (status, borrowers) = send(&app, Method::GET, "/books/7/borrowers", None).await;
    assert_eq!(status, StatusCode::OK);
    let borrowers = borrowers.as_array().unwrap();
    assert_eq!(borrowers.len(), 1);
    assert_eq!(borrowers[0]["member_id"], 1);
    assert_eq!(borrowers[0]["overdue"], false);

    let (status, loans) = send(&app, Method::GET, "/members/1/loans", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loans.as_array().unwrap().len(), 1);
    assert_eq!(loans[0]["book_id"], 7);
    assert_eq!(loans[0]["copy_id"], 10);
}

#[tokio::test]
async fn test_history_and_popularity() {
    let app = test_app().await;
    let (_, loan) = checkout(&app, 1, 10).await;
    let id = loan["id"].as_i64().unwrap();
    send(&app, Method::POST, &format!("/loans/{}/return", id), None).await;
    checkout(&app, 1, 11).await;

    let (status, history) = send(&app, Method::GET, "/members/1/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 2);

    let (status, history) =
        send(&app, Method::GET, "/books/7/history?status=returned", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["id"], id);

    let (status, body) = send(
        &app,
        Method::GET,
        "/members/1/history?from=2030-01-01T00:00:00Z&to=2020-01-01T00:00:00Z",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 18);

    let (status, ranking) = send(&app, Method::GET, "/stats/popularity", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ranking[0]["book_id"], 7);
    assert_eq!(ranking[0]["borrow_count"], 2);
}

#[tokio::test]
async fn test_sweep_and_summary() {
    let app = test_app().await;
    let (_, loan) = checkout(&app, 1, 10).await;
    let id = loan["id"].as_i64().unwrap();

    let (status, summary) = send(&app, Method::GET, "/loans/summary", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["open"], 1);
    assert_eq!(summary["overdue"], 0);

    let (status, overdue) = send(&app, Method::GET, "/loans/overdue", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(overdue.as_array().unwrap().is_empty());

    let sweep = json!({ "now": "2100-01-01T00:00:00Z" });
    let (status, body) = send(&app, Method::POST, "/loans/sweep", Some(sweep.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["marked"], 1);

    let (status, body) = send(&app, Method::POST, "/loans/sweep", Some(sweep)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["marked"], 0);

    let (status, swept) = send(&app, Method::GET, &format!("/loans/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(swept["status"], "overdue");
    assert_eq!(swept["due_at"], loan["due_at"]);

    let (status, borrowers) = send(&app, Method::GET, "/books/7/borrowers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(borrowers[0]["overdue"], true);
}

#[tokio::test]
async fn test_unknown_loan() {
    let app = test_app().await;

    let (status, body) = send(&app, Method::GET, "/loans/404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 20);
}
