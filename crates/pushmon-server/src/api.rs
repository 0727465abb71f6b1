use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;

use pushmon_common::types::{Metric, MetricKey, MetricKind, MetricValue};

use crate::state::AppState;

/// `POST /update/{kind}/{id}/{value}` — path-encoded single metric update.
pub async fn update_path(
    State(state): State<AppState>,
    Path((kind, id, value)): Path<(String, String, String)>,
) -> Response {
    let Ok(kind) = kind.parse::<MetricKind>() else {
        return (StatusCode::BAD_REQUEST, "unknown metric kind\n").into_response();
    };
    let metric = match kind {
        MetricKind::Gauge => match value.parse::<f64>() {
            Ok(value) => Metric::gauge(id, value),
            Err(_) => {
                return (StatusCode::BAD_REQUEST, "malformed gauge value\n").into_response();
            }
        },
        MetricKind::Counter => match value.parse::<i64>() {
            Ok(delta) => Metric::counter(id, delta),
            Err(_) => {
                return (StatusCode::BAD_REQUEST, "malformed counter delta\n").into_response();
            }
        },
    };
    match state.store.set(metric) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => {
            tracing::error!(error = %err, "storing metric");
            (StatusCode::BAD_REQUEST, "metric was not stored\n").into_response()
        }
    }
}

/// `POST /update` — JSON single metric; echoes the stored (merged) metric.
pub async fn update_json(State(state): State<AppState>, body: Bytes) -> Response {
    let metric: Metric = match serde_json::from_slice(&body) {
        Ok(metric) => metric,
        Err(err) => {
            tracing::warn!(error = %err, "rejecting metric update");
            return (StatusCode::BAD_REQUEST, "malformed metric\n").into_response();
        }
    };

    let id = metric.id.clone();
    if let Err(err) = state.store.set(metric) {
        tracing::error!(error = %err, "storing metric");
        return (StatusCode::BAD_REQUEST, "metric was not stored\n").into_response();
    }

    match state.store.get(&id) {
        Some(stored) => Json(stored).into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// `POST /updates/` — JSON metric batch.
pub async fn update_batch(State(state): State<AppState>, body: Bytes) -> Response {
    let batch: Vec<Metric> = match serde_json::from_slice(&body) {
        Ok(batch) => batch,
        Err(err) => {
            tracing::warn!(error = %err, "rejecting metric batch");
            return (StatusCode::BAD_REQUEST, "malformed batch\n").into_response();
        }
    };

    match state.store.set_all(&batch) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => {
            tracing::error!(error = %err, "storing batch");
            (StatusCode::BAD_REQUEST, "batch was not stored\n").into_response()
        }
    }
}

/// `POST /value` — JSON read of one metric by id and kind.
pub async fn value_json(State(state): State<AppState>, body: Bytes) -> Response {
    let key: MetricKey = match serde_json::from_slice(&body) {
        Ok(key) => key,
        Err(err) => {
            tracing::warn!(error = %err, "rejecting value request");
            return (StatusCode::BAD_REQUEST, "malformed request\n").into_response();
        }
    };

    match state.store.get(&key.id) {
        Some(metric) => Json(metric).into_response(),
        None => (StatusCode::NOT_FOUND, format!("{} not found\n", key.id)).into_response(),
    }
}

/// `GET /value/{kind}/{id}` — plain-text payload of one metric.
pub async fn value_path(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Response {
    if kind.parse::<MetricKind>().is_err() {
        return (StatusCode::BAD_REQUEST, "unknown metric kind\n").into_response();
    }

    match state.store.get(&id) {
        Some(metric) => (
            [(header::CONTENT_TYPE, "text/plain")],
            metric.value.to_string(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, format!("{id} not found\n")).into_response(),
    }
}

/// `GET /` — all gauges then all counters, each alphabetically by id.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let all: HashMap<String, Metric> = state.store.get_all();
    let mut gauges = Vec::new();
    let mut counters = Vec::new();
    for (id, metric) in &all {
        match metric.value {
            MetricValue::Gauge(value) => gauges.push((id.clone(), value.to_string())),
            MetricValue::Counter(delta) => counters.push((id.clone(), delta.to_string())),
        }
    }
    gauges.sort();
    counters.sort();

    let mut page = String::from("<html><body><h2>Gauge:</h2>");
    for (id, value) in &gauges {
        page.push_str(&format!("<p>{id}: {value}</p>"));
    }
    page.push_str("<h2>Counter:</h2>");
    for (id, delta) in &counters {
        page.push_str(&format!("<p>{id}: {delta}</p>"));
    }
    page.push_str("</body></html>");
    Html(page)
}

/// `GET /ping` — liveness of the durability backend.
pub async fn ping(State(state): State<AppState>) -> Response {
    match state.store.ping() {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => {
            tracing::error!(error = %err, "storage ping failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "storage unreachable\n").into_response()
        }
    }
}

/// Catch-all for paths outside the protocol surface.
pub async fn unknown_route() -> Response {
    (StatusCode::BAD_REQUEST, "unknown request\n").into_response()
}
