//! HTTP surface of the collector.
//!
//! Requests pass through a decoding layer first: the raw body is buffered,
//! gunzipped when `Content-Encoding: gzip` is set, and checked by the
//! [`IntegrityGuard`] before any handler deserializes it. Handlers then
//! merge into the [`MetricStore`] and, in sync-flush mode, notify the
//! persistence backend.

use crate::core::{Batch, MetricKind, MetricRecord, MetricSample, MetricaError};
use crate::server::integrity::{IntegrityGuard, DIGEST_HEADER};
use crate::storage::{MetricStore, PersistenceBackend};
use axum::{
    body::{Body, Bytes},
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use flate2::read::GzDecoder;
use std::io::Read;
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

/// Decoded request bodies are capped to keep a hostile peer from ballooning
/// memory.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MetricStore>,
    pub backend: Arc<dyn PersistenceBackend>,
    pub guard: Arc<IntegrityGuard>,
    pub sync_flush: bool,
}

impl AppState {
    pub fn new(
        store: Arc<MetricStore>,
        backend: Arc<dyn PersistenceBackend>,
        guard: IntegrityGuard,
        sync_flush: bool,
    ) -> Self {
        Self {
            store,
            backend,
            guard: Arc::new(guard),
            sync_flush,
        }
    }

    /// Synchronous persistence after a mutating request. Failures are
    /// logged; the in-memory merge stands regardless.
    async fn persist(&self, batch: &Batch) {
        if !self.sync_flush {
            return;
        }
        if let Err(error) = self.backend.notify_merge(batch, &self.store).await {
            tracing::error!(
                %error,
                backend = self.backend.name(),
                "persistence failed, in-memory store remains authoritative"
            );
        }
    }
}

/// Error wrapper mapping the taxonomy onto HTTP statuses.
pub struct ApiError(MetricaError);

impl From<MetricaError> for ApiError {
    fn from(error: MetricaError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MetricaError::NotFound { .. } => StatusCode::NOT_FOUND,
            MetricaError::InvalidMetric(_)
            | MetricaError::Parse { .. }
            | MetricaError::Serialization(_)
            | MetricaError::Auth(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, category = self.0.category(), "request failed");
        }
        (status, self.0.to_string()).into_response()
    }
}

/// Builds the collector router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/update/:kind/:name/:value", post(update_from_path))
        .route("/update/", post(update_from_json))
        .route("/updates/", post(update_batch))
        .route("/value/:kind/:name", get(value_from_path))
        .route("/value/", post(value_from_json))
        .route("/", get(index))
        .route("/ping", get(ping))
        .layer(middleware::from_fn_with_state(state.clone(), decode_request))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .with_state(state)
}

/// Buffers, gunzips and integrity-checks the body before handlers run.
async fn decode_request(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();
    let raw = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| MetricaError::parse(format!("cannot read request body: {e}")))?;

    let gzipped = parts
        .headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));

    let plain = if gzipped {
        let mut decoder = GzDecoder::new(raw.as_ref());
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| MetricaError::parse(format!("invalid gzip body: {e}")))?;
        parts.headers.remove(header::CONTENT_ENCODING);
        Bytes::from(out)
    } else {
        raw
    };

    // The digest covers the plaintext; verify before deserialization.
    let digest = parts
        .headers
        .get(DIGEST_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    state.guard.verify(&plain, digest.as_deref())?;

    let request = Request::from_parts(parts, Body::from(plain));
    Ok(next.run(request).await)
}

/// `POST /update/{type}/{name}/{value}` — merge from path segments.
async fn update_from_path(
    State(state): State<AppState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let sample = match MetricKind::parse(&kind)? {
        MetricKind::Gauge => {
            let value: f64 = value
                .parse()
                .map_err(|_| MetricaError::InvalidMetric(format!("bad gauge value: {value}")))?;
            MetricSample::gauge(name, value)
        },
        MetricKind::Counter => {
            let delta: i64 = value
                .parse()
                .map_err(|_| MetricaError::InvalidMetric(format!("bad counter delta: {value}")))?;
            MetricSample::counter(name, delta)
        },
    };

    state.store.merge_sample(&sample)?;
    state.persist(&vec![sample]).await;
    Ok(StatusCode::OK)
}

/// `POST /update/` — merge a single sample from the JSON body; echoes the
/// record after the merge.
async fn update_from_json(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MetricSample>, ApiError> {
    let sample: MetricSample = serde_json::from_slice(&body)
        .map_err(|e| MetricaError::parse(format!("invalid metric JSON: {e}")))?;
    let record = state.store.merge_sample(&sample)?;
    state.persist(&vec![sample]).await;
    Ok(Json(MetricSample::from_record(&record)))
}

/// `POST /updates/` — merge a JSON array as one batch.
async fn update_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let batch: Batch = serde_json::from_slice(&body)
        .map_err(|e| MetricaError::parse(format!("invalid batch JSON: {e}")))?;
    let result = state.store.merge_batch(&batch);
    // One persistence notification per batch, covering whatever merged.
    state.persist(&batch).await;
    result?;
    Ok(StatusCode::OK)
}

/// `GET /value/{type}/{name}` — plain-text current value.
async fn value_from_path(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<String, ApiError> {
    let kind = MetricKind::parse(&kind)?;
    let record = state.store.get(&name, kind)?;
    Ok(record.value.to_string())
}

/// `POST /value/` — JSON lookup by `{id, type}`.
async fn value_from_json(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MetricSample>, ApiError> {
    let query: MetricSample = serde_json::from_slice(&body)
        .map_err(|e| MetricaError::parse(format!("invalid lookup JSON: {e}")))?;
    let record = state.store.get(&query.id, query.kind)?;
    Ok(Json(MetricSample::from_record(&record)))
}

/// `GET /` — human-readable listing of all records.
async fn index(State(state): State<AppState>) -> Html<String> {
    let records = state.store.list_all();
    let mut page = String::with_capacity(64 + records.len() * 48);
    page.push_str("<html><head><title>metrica</title></head><body><pre>\n");
    for record in &records {
        render_record(&mut page, record);
    }
    page.push_str("</pre></body></html>");
    Html(page)
}

fn render_record(out: &mut String, record: &MetricRecord) {
    use std::fmt::Write;
    let _ = writeln!(out, "{} ({}) = {}", record.name, record.kind(), record.value);
}

/// `GET /ping` — persistence backend liveness.
async fn ping(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.backend.ping().await?;
    Ok(StatusCode::OK)
}
