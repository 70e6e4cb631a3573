//! Router dispatch tests driven through the axum service in-process.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use cipherlog_core::SERVER_ERROR_KEY;
use cipherlog_server::{router, AppState};
use cipherlog_store::{Store, StoreOptions};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

fn test_app() -> (Router, Arc<Store>) {
    let store = Arc::new(Store::open_in_memory("router-test", StoreOptions::default()).unwrap());
    (router(AppState::new(Arc::clone(&store))), store)
}

async fn send(app: &Router, method: Method, body: &str) -> (StatusCode, String, Option<String>) {
    let request = Request::builder()
        .method(method)
        .uri("/")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap(), content_type)
}

fn message(body: &str) -> String {
    let value: Value = serde_json::from_str(body).unwrap();
    value["message"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn put_single_pair() {
    let (app, store) = test_app();

    let (status, body, content_type) = send(&app, Method::PUT, "{\"test\":\"SGVsbG8=\"}").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message(&body), "persisted 1 key-value pair");
    assert_eq!(
        content_type.as_deref(),
        Some("application/json; charset=utf-8")
    );
    assert_eq!(store.len().unwrap(), 1);
}

#[tokio::test]
async fn put_three_objects() {
    let (app, store) = test_app();

    let body = "{\"key1\":\"YQ==\"}{\"key2\":\"Yg==\"}{\"key3\":\"Yw==\"}";
    let (status, body, _) = send(&app, Method::PUT, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message(&body), "persisted 3 key-value pairs");
    assert_eq!(store.len().unwrap(), 3);
}

#[tokio::test]
async fn put_empty_body_is_a_noop_success() {
    let (app, store) = test_app();

    let (status, body, _) = send(&app, Method::PUT, "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message(&body), "no key-value pairs persisted");
    assert_eq!(store.len().unwrap(), 0);
}

#[tokio::test]
async fn put_malformed_body_is_rejected_and_nothing_persists() {
    let (app, store) = test_app();

    let (status, body, _) = send(&app, Method::PUT, "{\"a\":\"YQ==\"}{nope").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(message(&body).starts_with("Error: unable to store key-value pairs"));
    assert_eq!(store.len().unwrap(), 0);
}

#[tokio::test]
async fn get_returns_one_line_per_record() {
    let (app, _store) = test_app();

    send(&app, Method::PUT, "{\"test\":\"SGVsbG8=\"}").await;
    send(&app, Method::PUT, "{\"other\":\"V29ybGQ=\"}").await;

    let (status, body, content_type) = send(&app, Method::GET, "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        content_type.as_deref(),
        Some("application/json; charset=utf-8")
    );

    let lines: Vec<HashMap<String, String>> = body
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);

    let mut keys: Vec<String> = lines
        .iter()
        .flat_map(|line| line.keys().cloned())
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["other", "test"]);
}

#[tokio::test]
async fn get_on_empty_store_returns_empty_body() {
    let (app, _store) = test_app();

    let (status, body, _) = send(&app, Method::GET, "").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
}

#[tokio::test]
async fn get_failure_appends_sentinel_with_status_200() {
    let (app, store) = test_app();

    send(&app, Method::PUT, "{\"k\":\"YQ==\"}").await;
    store.close();

    let (status, body, _) = send(&app, Method::GET, "").await;
    // Transport status has committed to success; the error travels as data.
    assert_eq!(status, StatusCode::OK);

    let line: HashMap<String, String> = serde_json::from_str(body.trim_end()).unwrap();
    assert!(line.contains_key(SERVER_ERROR_KEY));
}

#[tokio::test]
async fn reserved_verbs_are_not_implemented() {
    let (app, _store) = test_app();

    for method in [Method::POST, Method::DELETE] {
        let (status, body, _) = send(&app, method, "").await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(message(&body), "Method not implemented yet.");
    }
}

#[tokio::test]
async fn other_verbs_are_bad_requests() {
    let (app, _store) = test_app();

    for method in [Method::PATCH, Method::HEAD, Method::OPTIONS] {
        let (status, _body, _) = send(&app, method.clone(), "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "verb {method}");
    }
}

#[tokio::test]
async fn any_path_is_served() {
    let (app, store) = test_app();

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/some/nested/path")
        .body(Body::from("{\"k\":\"YQ==\"}"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.len().unwrap(), 1);
}

#[tokio::test]
async fn put_failure_after_cap_rolls_back() {
    let store = Arc::new(
        Store::open_in_memory("router-test", StoreOptions::default().with_max_entries(1))
            .unwrap(),
    );
    let app = router(AppState::new(Arc::clone(&store)));

    let (status, body, _) = send(&app, Method::PUT, "{\"a\":\"YQ==\"}{\"b\":\"Yg==\"}").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(message(&body).contains("rolled back"));
    assert_eq!(store.len().unwrap(), 0);
}
