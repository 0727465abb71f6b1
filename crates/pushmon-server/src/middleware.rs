use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use pushmon_common::signing;

use crate::state::AppState;

/// Header carrying the HMAC-SHA256 hex digest of the uncompressed body.
pub static HASH_SHA256_HEADER: HeaderName = HeaderName::from_static("hashsha256");

/// Request bodies above this size are rejected rather than buffered.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Verifies `HashSHA256` on signed requests and signs every response body
/// when a shared key is configured.
///
/// This layer runs inside the gzip layers, so digests always cover
/// uncompressed bytes on both sides. A request without the header passes
/// through unverified; a mismatching digest is rejected before any handler
/// touches the store.
pub async fn verify_signature(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(key) = state.hash_key.clone() else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!(error = %err, "reading request body");
            return (StatusCode::INTERNAL_SERVER_ERROR, "cannot read request body\n")
                .into_response();
        }
    };

    if let Some(received) = parts.headers.get(&HASH_SHA256_HEADER) {
        let valid = received
            .to_str()
            .map(|digest| signing::verify(&key, &bytes, digest))
            .unwrap_or(false);
        if !valid {
            tracing::warn!(path = %parts.uri.path(), "request signature mismatch");
            return (StatusCode::BAD_REQUEST, "signature mismatch\n").into_response();
        }
        tracing::debug!(path = %parts.uri.path(), "request signature verified");
    }

    let req = Request::from_parts(parts, Body::from(bytes));
    let response = next.run(req).await;

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!(error = %err, "reading response body for signing");
            return (StatusCode::INTERNAL_SERVER_ERROR, "cannot sign response\n").into_response();
        }
    };
    let digest = signing::sign(&key, &bytes);
    if let Ok(value) = HeaderValue::from_str(&digest) {
        parts.headers.insert(HASH_SHA256_HEADER.clone(), value);
    }
    Response::from_parts(parts, Body::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use axum::body::Bytes;
    use axum::routing::post;
    use axum::Router;
    use pushmon_storage::memory::MemoryStore;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn build_test_app(key: Option<&str>) -> Router {
        let store = MemoryStore::new(HashMap::new(), false, None).unwrap();
        let state = AppState {
            store: Arc::new(store),
            hash_key: key.map(|key| Arc::new(key.to_string())),
        };
        Router::new()
            .route("/echo", post(|body: Bytes| async move { body }))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                verify_signature,
            ))
            .with_state(state)
    }

    fn echo_request(digest: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/echo");
        if let Some(digest) = digest {
            builder = builder.header(&HASH_SHA256_HEADER, digest);
        }
        builder.body(Body::from("payload")).unwrap()
    }

    #[tokio::test]
    async fn passes_through_without_a_key() {
        let app = build_test_app(None);
        let resp = app.oneshot(echo_request(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get(&HASH_SHA256_HEADER).is_none());
    }

    #[tokio::test]
    async fn accepts_a_valid_signature_and_signs_the_response() {
        let app = build_test_app(Some("secret"));
        let digest = signing::sign("secret", b"payload");
        let resp = app.oneshot(echo_request(Some(&digest))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let response_digest = resp
            .headers()
            .get(&HASH_SHA256_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap()
            .to_string();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"payload");
        assert!(signing::verify("secret", &body, &response_digest));
    }

    #[tokio::test]
    async fn rejects_a_mismatching_signature() {
        let app = build_test_app(Some("secret"));
        let digest = signing::sign("other-key", b"payload");
        let resp = app.oneshot(echo_request(Some(&digest))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unsigned_request_still_passes_with_a_key() {
        let app = build_test_app(Some("secret"));
        let resp = app.oneshot(echo_request(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get(&HASH_SHA256_HEADER).is_some());
    }
}
