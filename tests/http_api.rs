//! Endpoint-level tests for the collector router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use flate2::{write::GzEncoder, Compression};
use metrica::core::{MetricSample, ServerConfig};
use metrica::server::{create_router, keyed_digest, AppState, IntegrityGuard, DIGEST_HEADER};
use metrica::storage::{FileBackend, MemoryBackend, MetricStore, PersistenceBackend};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::sync::Arc;
use tower::ServiceExt;

fn collector(key: Option<&str>) -> Router {
    let state = AppState::new(
        Arc::new(MetricStore::new()),
        Arc::new(MemoryBackend),
        IntegrityGuard::new(key.map(str::to_owned)),
        false,
    );
    create_router(state)
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn gzip(payload: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn update_and_read_via_path_segments() {
    let app = collector(None);

    let response = app
        .clone()
        .oneshot(
            Request::post("/update/gauge/Alloc/150.5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::get("/value/gauge/Alloc").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "150.5");
}

#[tokio::test]
async fn update_via_json_echoes_merged_record() {
    let app = collector(None);

    // counter merges accumulate; the echo carries the running total
    for (delta, expected) in [(3i64, 3i64), (4, 7)] {
        let sample = MetricSample::counter("PollCount", delta);
        let response = app
            .clone()
            .oneshot(
                Request::post("/update/")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&sample).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let echoed: MetricSample = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(echoed.delta, Some(expected));
    }
}

#[tokio::test]
async fn batch_update_merges_every_sample() {
    let app = collector(None);

    let batch = vec![
        MetricSample::gauge("Alloc", 100.0),
        MetricSample::gauge("Alloc", 150.0),
        MetricSample::counter("PollCount", 5),
    ];
    let response = app
        .clone()
        .oneshot(
            Request::post("/updates/")
                .body(Body::from(serde_json::to_vec(&batch).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(Request::get("/value/gauge/Alloc").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_string(response).await, "150");

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let page = body_string(response).await;
    assert!(page.contains("Alloc (gauge) = 150"));
    assert!(page.contains("PollCount (counter) = 5"));
}

#[tokio::test]
async fn lookup_via_json_body() {
    let app = collector(None);

    app.clone()
        .oneshot(
            Request::post("/update/counter/PollCount/9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let query = serde_json::json!({"id": "PollCount", "type": "counter"});
    let response = app
        .clone()
        .oneshot(
            Request::post("/value/")
                .body(Body::from(query.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record: MetricSample = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(record.delta, Some(9));

    let missing = serde_json::json!({"id": "Nope", "type": "gauge"});
    let response = app
        .oneshot(
            Request::post("/value/")
                .body(Body::from(missing.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_input_is_a_client_error() {
    let app = collector(None);

    // unknown kind in the path
    let response = app
        .clone()
        .oneshot(
            Request::post("/update/histogram/x/1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // non-numeric value
    let response = app
        .clone()
        .oneshot(
            Request::post("/update/gauge/x/abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // broken JSON body
    let response = app
        .clone()
        .oneshot(
            Request::post("/update/")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // a malformed sample fails the batch but not its neighbors
    let batch = serde_json::json!([
        {"id": "Alloc", "type": "gauge", "value": 1.0},
        {"id": "broken", "type": "counter"}
    ]);
    let response = app
        .clone()
        .oneshot(
            Request::post("/updates/")
                .body(Body::from(batch.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(Request::get("/value/gauge/Alloc").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_metric_is_not_found() {
    let app = collector(None);
    let response = app
        .oneshot(Request::get("/value/gauge/Absent").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn gzipped_request_bodies_are_decoded() {
    let app = collector(None);

    let sample = MetricSample::gauge("Alloc", 2.5);
    let plaintext = serde_json::to_vec(&sample).unwrap();
    let response = app
        .clone()
        .oneshot(
            Request::post("/update/")
                .header("content-encoding", "gzip")
                .body(Body::from(gzip(&plaintext)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::get("/value/gauge/Alloc").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_string(response).await, "2.5");
}

#[tokio::test]
async fn integrity_digest_checked_over_plaintext() {
    let app = collector(Some("s3cret"));

    let sample = MetricSample::counter("PollCount", 1);
    let plaintext = serde_json::to_vec(&sample).unwrap();
    let digest = keyed_digest("s3cret", &plaintext);

    // signed and gzipped: accepted
    let response = app
        .clone()
        .oneshot(
            Request::post("/update/")
                .header("content-encoding", "gzip")
                .header(DIGEST_HEADER, &digest)
                .body(Body::from(gzip(&plaintext)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // tampered body under the old digest: rejected before the store
    let tampered = serde_json::to_vec(&MetricSample::counter("PollCount", 100)).unwrap();
    let response = app
        .clone()
        .oneshot(
            Request::post("/update/")
                .header(DIGEST_HEADER, &digest)
                .body(Body::from(tampered.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(Request::get("/value/counter/PollCount").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_string(response).await, "1");

    // same payload with a recomputed digest: accepted
    let recomputed = keyed_digest("s3cret", &tampered);
    let response = app
        .oneshot(
            Request::post("/update/")
                .header(DIGEST_HEADER, recomputed)
                .body(Body::from(tampered))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn ping_reports_backend_liveness() {
    let app = collector(None);
    let response = app
        .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    // memory backend has no database to probe
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn sync_flush_persists_every_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FileBackend::new(dir.path().join("snap.json")));
    let store = Arc::new(MetricStore::new());
    let state = AppState::new(
        Arc::clone(&store),
        backend.clone(),
        IntegrityGuard::new(None),
        true,
    );
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::post("/update/counter/PollCount/5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // the snapshot is already on disk; a fresh store restores the value
    let snapshot = backend.load().await.unwrap().expect("snapshot written");
    let restored = MetricStore::new();
    restored.restore(&snapshot).unwrap();
    assert_eq!(restored.list_all(), store.list_all());
}

#[tokio::test]
async fn default_config_selects_file_backend() {
    let config = ServerConfig::default();
    let backend = metrica::storage::select_backend(&config).await.unwrap();
    assert_eq!(backend.name(), "file");
}
