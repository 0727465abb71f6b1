use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;

use crate::state::AppState;
use crate::{api, logging};

/// Assembles the protocol surface with its middleware stack.
///
/// Layer order, outermost first: request logging → response compression →
/// request decompression → signature verification. The signature layer sits
/// inside both gzip layers so digests always cover uncompressed bytes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(api::index))
        .route("/ping", get(api::ping))
        .route("/update", post(api::update_json))
        .route("/update/{kind}/{id}/{value}", post(api::update_path))
        .route("/updates/", post(api::update_batch))
        .route("/value", post(api::value_json))
        .route("/value/{kind}/{id}", get(api::value_path))
        .fallback(api::unknown_route)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::verify_signature,
        ))
        .layer(RequestDecompressionLayer::new())
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(logging::request_logging))
        .with_state(state)
}
