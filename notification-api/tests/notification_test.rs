mod common;

use axum::body::Body;
use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{json_body, TestApp};
use notification_api::models::{Notification, User};
use service_core::config::Environment;

fn provider(id: i32) -> User {
    User::new(id, "Dr. Silva", "silva@example.com", true)
}

fn customer(id: i32) -> User {
    User::new(id, "Ana", "ana@example.com", false)
}

fn notification(user: i32, content: &str, minutes_ago: i64) -> Notification {
    let mut n = Notification::new(user, content);
    n.created_at = Utc::now() - Duration::minutes(minutes_ago);
    n.updated_at = n.created_at;
    n
}

// =============================================================================
// Listing
// =============================================================================

#[tokio::test]
async fn provider_lists_own_notifications_newest_first() {
    let app = TestApp::new(Environment::Test);
    app.users.insert(provider(1));
    let older = notification(1, "older", 30);
    let newer = notification(1, "newer", 5);
    app.notifications.insert(older.clone());
    app.notifications.insert(newer.clone());
    app.notifications.insert(notification(2, "someone else", 1));

    let response = app.get_notifications(1).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let listed = body["notifications"].as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["_id"], newer.id.to_hex().as_str());
    assert_eq!(listed[0]["content"], "newer");
    assert_eq!(listed[0]["user"], 1);
    assert_eq!(listed[0]["read"], false);
    assert!(listed[0].get("createdAt").is_some());
    assert!(listed[0].get("updatedAt").is_some());
    assert_eq!(listed[1]["_id"], older.id.to_hex().as_str());
}

#[tokio::test]
async fn listing_is_capped_at_twenty() {
    let app = TestApp::new(Environment::Test);
    app.users.insert(provider(1));
    for minutes in 0..25 {
        app.notifications
            .insert(notification(1, &format!("n{}", minutes), minutes));
    }

    let body = json_body(app.get_notifications(1).await).await;
    let listed = body["notifications"].as_array().unwrap();
    assert_eq!(listed.len(), 20);

    let contents: Vec<&str> = listed.iter().map(|n| n["content"].as_str().unwrap()).collect();
    let expected: Vec<String> = (0..20).map(|m| format!("n{}", m)).collect();
    assert_eq!(contents, expected);
}

#[tokio::test]
async fn provider_without_notifications_gets_empty_list() {
    let app = TestApp::new(Environment::Test);
    app.users.insert(provider(1));

    let response = app.get_notifications(1).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "notifications": [] })
    );
}

#[tokio::test]
async fn non_provider_is_rejected_without_touching_notifications() {
    let app = TestApp::new(Environment::Test);
    app.users.insert(customer(2));
    app.notifications.insert(notification(2, "hidden", 1));

    let response = app.get_notifications(2).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "error": "User is not a provider" })
    );
    assert_eq!(app.notifications.list_calls(), 0);
}

#[tokio::test]
async fn unknown_user_is_rejected_as_non_provider() {
    let app = TestApp::new(Environment::Test);

    let response = app.get_notifications(99).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.notifications.list_calls(), 0);
}

#[tokio::test]
async fn missing_user_header_is_unauthorized() {
    let app = TestApp::new(Environment::Test);

    let response = app
        .send(
            TestApp::request(Method::GET, "/notifications")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.reporter.events().is_empty());
}

// =============================================================================
// Acknowledging
// =============================================================================

#[tokio::test]
async fn acknowledge_marks_notification_read() {
    let app = TestApp::new(Environment::Test);
    let n = notification(1, "New appointment", 10);
    let id = n.id.to_hex();
    app.notifications.insert(n);

    let response = app.acknowledge(&id).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["notification"]["_id"], id.as_str());
    assert_eq!(body["notification"]["read"], true);
    assert_eq!(body["notification"]["content"], "New appointment");
}

#[tokio::test]
async fn acknowledge_is_idempotent() {
    let app = TestApp::new(Environment::Test);
    let n = notification(1, "New appointment", 10);
    let id = n.id.to_hex();
    app.notifications.insert(n);

    let first = json_body(app.acknowledge(&id).await).await;
    let response = app.acknowledge(&id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let second = json_body(response).await;

    assert_eq!(first["notification"]["read"], true);
    assert_eq!(second["notification"]["read"], true);
    assert_eq!(first["notification"]["_id"], second["notification"]["_id"]);
}

#[tokio::test]
async fn acknowledge_unknown_id_is_not_found() {
    let app = TestApp::new(Environment::Test);

    let response = app.acknowledge("5f8d0d55b54764421b7156c9").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "error": "Notification not found" })
    );
}

#[tokio::test]
async fn acknowledge_malformed_id_is_bad_request() {
    let app = TestApp::new(Environment::Test);

    let response = app.acknowledge("not-an-object-id").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "error": "Invalid notification id" })
    );
}

// =============================================================================
// End to end
// =============================================================================

#[tokio::test]
async fn provider_reads_then_acknowledges_latest_notification() {
    let app = TestApp::new(Environment::Test);
    app.users.insert(provider(1));
    let n1 = notification(1, "n1", 1);
    let n2 = notification(1, "n2", 60);
    app.notifications.insert(n2.clone());
    app.notifications.insert(n1.clone());

    let body = json_body(app.get_notifications(1).await).await;
    let ids: Vec<&str> = body["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![n1.id.to_hex(), n2.id.to_hex()]);

    let body = json_body(app.acknowledge(&n1.id.to_hex()).await).await;
    assert_eq!(body["notification"]["_id"], n1.id.to_hex().as_str());
    assert_eq!(body["notification"]["read"], true);

    let body = json_body(app.get_notifications(1).await).await;
    assert_eq!(body["notifications"][0]["read"], true);
    assert_eq!(body["notifications"][1]["read"], false);
}

// =============================================================================
// Operational endpoints
// =============================================================================

#[tokio::test]
async fn health_reports_each_store() {
    let app = TestApp::new(Environment::Test);

    // Health checks carry no Origin header
    let response = app
        .send(
            axum::http::Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "notification-api");
    assert_eq!(body["checks"]["postgres"]["status"], "ok");
    assert_eq!(body["checks"]["mongodb"]["status"], "ok");
    assert_eq!(body["checks"]["redis"]["status"], "ok");
}

#[tokio::test]
async fn readiness_fails_when_document_store_is_down() {
    let app = TestApp::new(Environment::Test);
    app.notifications.set_unavailable(true);

    let response = app
        .send(
            axum::http::Request::builder()
                .uri("/ready")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
