use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tower::ServiceExt;

use pushmon_common::signing;
use pushmon_common::types::{Metric, MetricValue};
use pushmon_server::app::build_router;
use pushmon_server::state::AppState;
use pushmon_storage::memory::MemoryStore;
use pushmon_storage::sqlite::SqliteStore;
use pushmon_storage::MetricStore;

fn test_app(key: Option<&str>) -> Router {
    let store = MemoryStore::new(HashMap::new(), false, None).unwrap();
    test_app_with_store(Arc::new(store), key)
}

fn test_app_with_store(store: Arc<dyn MetricStore>, key: Option<&str>) -> Router {
    let state = AppState {
        store,
        hash_key: key.map(|key| Arc::new(key.to_string())),
    };
    build_router(state)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: &[u8],
    headers: &[(&str, &str)],
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::from(body.to_vec())).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut decoded = Vec::new();
    GzDecoder::new(data).read_to_end(&mut decoded).unwrap();
    decoded
}

#[tokio::test]
async fn gauge_update_then_plain_read() {
    let app = test_app(None);

    let (status, _) = send(&app, "POST", "/update/gauge/temp/36.6", b"", &[]).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "GET", "/value/gauge/temp", b"", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"36.6");
}

#[tokio::test]
async fn counter_accumulates_across_updates() {
    let app = test_app(None);

    send(&app, "POST", "/update/counter/hits/5", b"", &[]).await;
    send(&app, "POST", "/update/counter/hits/3", b"", &[]).await;

    let (status, body) = send(&app, "GET", "/value/counter/hits", b"", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"8");
}

#[tokio::test]
async fn bogus_kind_in_json_update_is_rejected() {
    let app = test_app(None);

    let (status, _) = send(
        &app,
        "POST",
        "/update",
        br#"{"id":"x","type":"bogus"}"#,
        &[("content-type", "application/json")],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing reached the store.
    let (status, _) = send(&app, "GET", "/value/gauge/x", b"", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_metric_reads_404() {
    let app = test_app(None);

    let (status, _) = send(&app, "GET", "/value/gauge/missing", b"", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_path_values_read_400() {
    let app = test_app(None);

    let (status, _) = send(&app, "POST", "/update/gauge/temp/not-a-number", b"", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/update/histogram/temp/1.0", b"", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/value/histogram/temp", b"", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn json_update_echoes_the_merged_metric() {
    let app = test_app(None);

    send(
        &app,
        "POST",
        "/update",
        br#"{"id":"hits","type":"counter","delta":5}"#,
        &[("content-type", "application/json")],
    )
    .await;
    let (status, body) = send(
        &app,
        "POST",
        "/update",
        br#"{"id":"hits","type":"counter","delta":3}"#,
        &[("content-type", "application/json")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let echoed: Metric = serde_json::from_slice(&body).unwrap();
    assert_eq!(echoed.value, MetricValue::Counter(8));

    // The wire shape carries exactly one payload field.
    let raw: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(raw["type"], "counter");
    assert!(raw.get("value").is_none());
}

#[tokio::test]
async fn batch_update_merges_every_entry() {
    let app = test_app(None);

    let batch = serde_json::to_vec(&vec![
        Metric::gauge("temp", 20.5),
        Metric::counter("hits", 3),
        Metric::counter("hits", 4),
    ])
    .unwrap();
    let (status, _) = send(
        &app,
        "POST",
        "/updates/",
        &batch,
        &[("content-type", "application/json")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, "GET", "/value/counter/hits", b"", &[]).await;
    assert_eq!(body, b"7");
    let (_, body) = send(&app, "GET", "/value/gauge/temp", b"", &[]).await;
    assert_eq!(body, b"20.5");
}

#[tokio::test]
async fn batch_with_unknown_kind_is_rejected_whole() {
    let app = test_app(None);

    let (status, _) = send(
        &app,
        "POST",
        "/updates/",
        br#"[{"id":"ok","type":"counter","delta":1},{"id":"bad","type":"bogus"}]"#,
        &[("content-type", "application/json")],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/value/counter/ok", b"", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn value_json_reads_the_stored_metric() {
    let app = test_app(None);

    send(&app, "POST", "/update/gauge/temp/36.6", b"", &[]).await;

    let (status, body) = send(
        &app,
        "POST",
        "/value",
        br#"{"id":"temp","type":"gauge"}"#,
        &[("content-type", "application/json")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let metric: Metric = serde_json::from_slice(&body).unwrap();
    assert_eq!(metric, Metric::gauge("temp", 36.6));

    let (status, _) = send(
        &app,
        "POST",
        "/value",
        br#"{"id":"absent","type":"gauge"}"#,
        &[("content-type", "application/json")],
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        "/value",
        br#"{"id":"temp","type":"bogus"}"#,
        &[("content-type", "application/json")],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn gzip_request_bodies_are_decompressed() {
    let app = test_app(None);

    let batch = serde_json::to_vec(&vec![Metric::counter("hits", 5)]).unwrap();
    let (status, _) = send(
        &app,
        "POST",
        "/updates/",
        &gzip(&batch),
        &[
            ("content-type", "application/json"),
            ("content-encoding", "gzip"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, "GET", "/value/counter/hits", b"", &[]).await;
    assert_eq!(body, b"5");
}

#[tokio::test]
async fn responses_compress_when_the_client_accepts_gzip() {
    let app = test_app(None);

    send(&app, "POST", "/update/gauge/temp/36.6", b"", &[]).await;

    let request = Request::builder()
        .method("POST")
        .uri("/value")
        .header("content-type", "application/json")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::from(r#"{"id":"temp","type":"gauge"}"#))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_ENCODING)
            .and_then(|value| value.to_str().ok()),
        Some("gzip")
    );

    let compressed = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let metric: Metric = serde_json::from_slice(&gunzip(&compressed)).unwrap();
    assert_eq!(metric, Metric::gauge("temp", 36.6));
}

#[tokio::test]
async fn signature_mismatch_is_rejected_before_the_store() {
    let app = test_app(Some("secret"));

    let body = br#"[{"id":"hits","type":"counter","delta":5}]"#;
    let digest = signing::sign("wrong-key", body);
    let (status, _) = send(
        &app,
        "POST",
        "/updates/",
        body,
        &[
            ("content-type", "application/json"),
            ("HashSHA256", &digest),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/value/counter/hits", b"", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn signed_request_over_gzip_verifies_against_the_uncompressed_body() {
    let app = test_app(Some("secret"));

    let body = serde_json::to_vec(&vec![Metric::counter("hits", 5)]).unwrap();
    let digest = signing::sign("secret", &body);
    let (status, _) = send(
        &app,
        "POST",
        "/updates/",
        &gzip(&body),
        &[
            ("content-type", "application/json"),
            ("content-encoding", "gzip"),
            ("HashSHA256", &digest),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, "GET", "/value/counter/hits", b"", &[]).await;
    assert_eq!(body, b"5");
}

#[tokio::test]
async fn responses_are_signed_when_a_key_is_configured() {
    let app = test_app(Some("secret"));

    send(&app, "POST", "/update/gauge/temp/1.5", b"", &[]).await;
    let request = Request::builder()
        .method("GET")
        .uri("/value/gauge/temp")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    let digest = response
        .headers()
        .get("HashSHA256")
        .and_then(|value| value.to_str().ok())
        .unwrap()
        .to_string();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(signing::verify("secret", &body, &digest));
}

#[tokio::test]
async fn index_lists_gauges_then_counters_sorted_by_id() {
    let app = test_app(None);

    send(&app, "POST", "/update/gauge/zeta/1.5", b"", &[]).await;
    send(&app, "POST", "/update/gauge/alpha/2.5", b"", &[]).await;
    send(&app, "POST", "/update/counter/hits/5", b"", &[]).await;

    let (status, body) = send(&app, "GET", "/", b"", &[]).await;
    assert_eq!(status, StatusCode::OK);
    let page = String::from_utf8(body).unwrap();

    let alpha = page.find("<p>alpha: 2.5</p>").unwrap();
    let zeta = page.find("<p>zeta: 1.5</p>").unwrap();
    let counters = page.find("<h2>Counter:</h2>").unwrap();
    let hits = page.find("<p>hits: 5</p>").unwrap();
    assert!(alpha < zeta);
    assert!(zeta < counters);
    assert!(counters < hits);
}

#[tokio::test]
async fn ping_reports_backend_liveness() {
    let app = test_app(None);
    let (status, _) = send(&app, "GET", "/ping", b"", &[]).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn wrong_method_is_405_and_unknown_path_is_400() {
    let app = test_app(None);

    let (status, _) = send(&app, "GET", "/update/gauge/temp/1.0", b"", &[]).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = send(&app, "GET", "/no/such/route/here", b"", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sqlite_backend_serves_the_same_contract() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.db");
    let store = SqliteStore::open(path.to_str().unwrap()).unwrap();
    let app = test_app_with_store(Arc::new(store), None);

    send(&app, "POST", "/update/counter/hits/5", b"", &[]).await;
    send(&app, "POST", "/update/counter/hits/3", b"", &[]).await;

    let (_, body) = send(&app, "GET", "/value/counter/hits", b"", &[]).await;
    assert_eq!(body, b"8");

    let (status, _) = send(&app, "GET", "/ping", b"", &[]).await;
    assert_eq!(status, StatusCode::OK);
}
