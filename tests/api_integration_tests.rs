//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each endpoint.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use hiercache::{api::create_router, AppState, Config};
use serde_json::{json, Value};
use std::thread::sleep;
use std::time::Duration;
use tower::ServiceExt;

// == Helper Functions ==

fn create_test_app() -> Router {
    create_router(AppState::from_config(&Config::default()))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

async fn put_item(app: &Router, body: Value) -> Value {
    let (status, json) = send(app, "PUT", "/items", Some(body)).await;
    assert_eq!(status, StatusCode::OK, "put failed: {}", json);
    json
}

// == PUT Endpoint Tests ==

#[tokio::test]
async fn test_put_endpoint_success() {
    let app = create_test_app();

    let json = put_item(&app, json!({"key": "test_key", "value": "test_value"})).await;
    assert_eq!(json["identity"], "test_key");
    assert!(json["message"].as_str().unwrap().contains("test_key"));
}

#[tokio::test]
async fn test_put_endpoint_empty_key() {
    let app = create_test_app();

    let (status, json) = send(&app, "PUT", "/items", Some(json!({"key": "", "value": 1}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json.get("error").is_some());
}

#[tokio::test]
async fn test_put_endpoint_invalid_json() {
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/items")
                .header("content-type", "application/json")
                .body(Body::from("not valid json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_put_endpoint_id_conflict() {
    let app = create_test_app();
    put_item(&app, json!({"key": "a", "id": 1, "value": 1})).await;

    let (status, _) = send(&app, "PUT", "/items", Some(json!({"key": "b", "id": 1, "value": 2}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_put_endpoint_extreme_ttl() {
    let app = create_test_app();
    put_item(
        &app,
        json!({"key": "forever", "value": 1, "ttl_ms": i64::MIN}),
    )
    .await;

    let (status, json) = send(&app, "GET", "/items/forever", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"], 1);
}

// == GET Endpoint Tests ==

#[tokio::test]
async fn test_get_by_every_handle() {
    let app = create_test_app();
    put_item(
        &app,
        json!({"key": "user", "id": 42, "value": {"name": "alice"}}),
    )
    .await;

    for uri in ["/items/user", "/items/user/42", "/ids/42"] {
        let (status, json) = send(&app, "GET", uri, None).await;
        assert_eq!(status, StatusCode::OK, "GET {}", uri);
        assert_eq!(json["value"]["name"], "alice");
        assert_eq!(json["key"], "user");
        assert_eq!(json["id"], 42);
    }
}

#[tokio::test]
async fn test_get_endpoint_not_found() {
    let app = create_test_app();

    let (status, json) = send(&app, "GET", "/items/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_get_endpoint_expired_item() {
    let app = create_test_app();
    put_item(&app, json!({"key": "short", "value": 1, "ttl_ms": 50})).await;

    sleep(Duration::from_millis(100));

    let (status, _) = send(&app, "GET", "/items/short", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// == Search Endpoint Tests ==

#[tokio::test]
async fn test_search_prefix_and_mismatch() {
    let app = create_test_app();
    put_item(
        &app,
        json!({
            "key": "acct",
            "value": "gold-us",
            "parameters": [
                {"name": "region", "value": "us", "level": 0},
                {"name": "tier", "value": "gold", "level": 1}
            ]
        }),
    )
    .await;

    let (status, json) = send(
        &app,
        "POST",
        "/search",
        Some(json!({"parameters": [{"name": "region", "value": "us", "level": 0}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 1);
    assert_eq!(json["items"][0]["value"], "gold-us");

    let (_, json) = send(
        &app,
        "POST",
        "/search",
        Some(json!({"parameters": [{"name": "tier", "value": "platinum", "level": 1}]})),
    )
    .await;
    assert_eq!(json["count"], 0);
}

#[tokio::test]
async fn test_search_with_degradation() {
    let app = create_test_app();
    put_item(
        &app,
        json!({
            "key": "acct",
            "value": 1,
            "parameters": [{"name": "region", "value": "us", "level": 0}]
        }),
    )
    .await;

    let (status, json) = send(
        &app,
        "POST",
        "/search",
        Some(json!({
            "degrade": true,
            "parameters": [
                {"name": "region", "value": "us", "level": 0},
                {"name": "tier", "value": "gold", "level": 1},
                {"name": "zone", "value": "a", "level": 2}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 1);
    assert_eq!(json["matched"].as_array().unwrap().len(), 1);
    assert_eq!(json["matched"][0]["name"], "region");
}

// == Link Endpoint Tests ==

#[tokio::test]
async fn test_link_id_then_get_by_id() {
    let app = create_test_app();
    put_item(&app, json!({"key": "order", "value": "pending"})).await;

    let (status, json) = send(&app, "POST", "/link/id", Some(json!({"key": "order", "id": 9}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["identity"], "order:9");

    let (status, json) = send(&app, "GET", "/ids/9", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"], "pending");

    let (status, _) = send(&app, "POST", "/link/id", Some(json!({"key": "order", "id": 10}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_link_parameters_then_search() {
    let app = create_test_app();
    put_item(&app, json!({"key": "doc", "value": "v"})).await;

    let body = json!({
        "key": "doc",
        "parameters": [{"name": "team", "value": "core", "level": 0}]
    });
    let (status, json) = send(&app, "POST", "/link/parameters", Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["changed"], true);

    let (_, json) = send(&app, "POST", "/link/parameters", Some(body)).await;
    assert_eq!(json["changed"], false);

    let (_, json) = send(
        &app,
        "POST",
        "/search",
        Some(json!({"parameters": [{"name": "team", "value": "core", "level": 0}]})),
    )
    .await;
    assert_eq!(json["count"], 1);
}

#[tokio::test]
async fn test_link_parameters_requires_target() {
    let app = create_test_app();

    let (status, _) = send(
        &app,
        "POST",
        "/link/parameters",
        Some(json!({"parameters": [{"name": "a", "value": "b", "level": 0}]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// == DELETE Endpoint Tests ==

#[tokio::test]
async fn test_delete_forms() {
    let app = create_test_app();
    put_item(&app, json!({"key": "a", "value": 1})).await;
    put_item(&app, json!({"key": "b", "id": 2, "value": 2})).await;
    put_item(&app, json!({"key": "c", "id": 3, "value": 3})).await;

    let (status, json) = send(&app, "DELETE", "/items/a", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], json!(["a"]));

    let (_, json) = send(&app, "DELETE", "/items/b/2", None).await;
    assert_eq!(json["removed"], json!(["b:2"]));

    let (_, json) = send(&app, "DELETE", "/ids/3", None).await;
    assert_eq!(json["removed"], json!(["c:3"]));

    for uri in ["/items/a", "/items/b/2", "/ids/3"] {
        let (status, _) = send(&app, "GET", uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "GET {}", uri);
    }
}

#[tokio::test]
async fn test_delete_missing_key_is_ok() {
    let app = create_test_app();

    let (status, json) = send(&app, "DELETE", "/items/ghost", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], json!([]));
}

#[tokio::test]
async fn test_invalidate_all_resets_stats() {
    let app = create_test_app();
    put_item(&app, json!({"key": "a", "id": 1, "value": 1})).await;
    send(&app, "GET", "/items/a", None).await;

    let (status, _) = send(&app, "DELETE", "/items", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, stats) = send(&app, "GET", "/stats", None).await;
    assert_eq!(stats["total_keys"], 0);
    assert_eq!(stats["total_values"], 0);
    assert_eq!(stats["hits"], 0);
    assert_eq!(stats["l1_entries"], 0);
}

// == Stats Endpoint Tests ==

#[tokio::test]
async fn test_stats_track_hits_and_misses() {
    let app = create_test_app();
    put_item(&app, json!({"key": "k", "id": 5, "value": 1})).await;

    send(&app, "GET", "/items/k", None).await;
    send(&app, "GET", "/items/missing", None).await;

    let (status, stats) = send(&app, "GET", "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["hits"], 1);
    assert_eq!(stats["misses"], 1);
    assert_eq!(stats["requests"], 2);
    assert_eq!(stats["total_values"], 1);
    assert_eq!(stats["total_keys"], 2);
    assert_eq!(stats["keys_to_values_ratio"], 2.0);
    assert_eq!(stats["hit_rate"], 0.5);
}

#[tokio::test]
async fn test_stats_reset_keeps_items() {
    let app = create_test_app();
    put_item(&app, json!({"key": "k", "value": 1})).await;
    send(&app, "GET", "/items/k", None).await;

    let (status, stats) = send(&app, "POST", "/stats/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["hits"], 0);

    let (status, _) = send(&app, "GET", "/items/k", None).await;
    assert_eq!(status, StatusCode::OK);
}

// == Health Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();

    let (status, json) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert!(json.get("timestamp").is_some());
}
