//! End-to-end HTTP tests over in-memory stores and mock model adapters.
//!
//! Each test binds the real router to an ephemeral port and talks to it with
//! reqwest, so extractor rejections, the error body shape and the middleware
//! stack are exercised as a client would see them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;

use journal_api::config::AppConfig;
use journal_api::services::ingestion::NO_MATCHES_ANSWER;
use journal_api::services::{
    AudioConcatenator, AudioMerger, IngestionDeps, IngestionOrchestrator, MergeMode,
};
use journal_api::{build_router, AppState};
use journal_core::{DefaultUserProvider, EntryAnalysis, Result, VectorIndex};
use journal_db::test_fixtures::{
    InMemoryEntryRepository, InMemoryUserRepository, InMemoryVectorIndex,
};
use journal_db::{FilesystemBackend, FixedWindowChunker, StorageBackend, UrlSigner};
use journal_inference::mock::{MockAnalysisBackend, MockInferenceBackend};

/// Appends inputs byte-for-byte in place of ffmpeg.
struct ByteMerger;

#[async_trait]
impl AudioMerger for ByteMerger {
    async fn merge(&self, inputs: &[PathBuf], output: &Path, _mode: MergeMode) -> Result<()> {
        let mut out = Vec::new();
        for path in inputs {
            out.extend(tokio::fs::read(path).await?);
        }
        tokio::fs::write(output, out).await?;
        Ok(())
    }
}

struct TestApp {
    base: String,
    client: reqwest::Client,
    blobs: Arc<FilesystemBackend>,
    inference: MockInferenceBackend,
    _blob_dir: TempDir,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post_json(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("request")
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.expect("request")
    }

    async fn record_chunk(&self, entry_id: &str, filename: &str, data: &[u8]) -> reqwest::Response {
        let part = Part::bytes(data.to_vec())
            .file_name(filename.to_string())
            .mime_str("audio/m4a")
            .expect("mime");
        self.client
            .post(self.url(&format!("/entries/{}/record-chunk", entry_id)))
            .multipart(Form::new().part("audio", part))
            .send()
            .await
            .expect("request")
    }
}

async fn spawn_app_with(inference: MockInferenceBackend) -> TestApp {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("addr"));

    let blob_dir = tempfile::tempdir().expect("tempdir");
    let blobs = Arc::new(FilesystemBackend::new(
        blob_dir.path(),
        UrlSigner::new(b"test-secret".to_vec(), base.clone(), Duration::from_secs(600)),
    ));

    let index = Arc::new(InMemoryVectorIndex::new(Arc::new(inference.clone())));
    index.init().await.expect("init index");

    let analysis = EntryAnalysis {
        sentiment: 2.0,
        emotions: vec!["happy".into()],
        topics: vec!["outdoors".into()],
        entities: vec!["Sam".into()],
        key_points: vec!["Went to the lake".into()],
    };

    let config = AppConfig::default();
    let orchestrator = IngestionOrchestrator::new(
        IngestionDeps {
            users: Arc::new(DefaultUserProvider::new(Arc::new(
                InMemoryUserRepository::new(),
            ))),
            entries: Arc::new(InMemoryEntryRepository::new()),
            index,
            analyzer: Arc::new(MockAnalysisBackend::new(analysis)),
            transcriber: Arc::new(inference.clone()),
            generator: Arc::new(inference.clone()),
            blobs: blobs.clone(),
            chunker: Arc::new(FixedWindowChunker::default()),
        },
        Duration::from_secs(5),
    );
    let concatenator = AudioConcatenator::new(
        blobs.clone(),
        Arc::new(ByteMerger),
        None,
        Duration::from_secs(5),
    );

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        concatenator: Arc::new(concatenator),
        blobs: blobs.clone(),
    };
    let app = build_router(state, &config);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server");
    });

    TestApp {
        base,
        client: reqwest::Client::new(),
        blobs,
        inference,
        _blob_dir: blob_dir,
    }
}

async fn spawn_app() -> TestApp {
    spawn_app_with(MockInferenceBackend::new().with_fixed_response("You went to the lake.")).await
}

fn assert_error_shape(body: &Value) {
    assert!(body["error"].is_string(), "missing error: {}", body);
    assert!(body["details"].is_string(), "missing details: {}", body);
}

#[tokio::test]
async fn test_health_reports_version_and_request_id() {
    let app = spawn_app().await;
    let resp = app.get("/health").await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_record_chunks_build_entry_in_order() {
    let app = spawn_app().await;

    let resp = app
        .record_chunk("2025-01-05", "memo.m4a", b"Walked to the lake.")
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let first: Value = resp.json().await.unwrap();
    assert_eq!(first["chunkOrder"], 0);
    assert_eq!(first["transcript"], "Walked to the lake.");
    assert!(first["audioChunkId"].is_string());
    assert!(first["audioKey"]
        .as_str()
        .unwrap()
        .starts_with("entries/2025-01-05/originals/"));

    let second: Value = app
        .record_chunk("2025-01-05", "memo2.m4a", b"Sam came too.")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(second["chunkOrder"], 1);
    assert_eq!(
        second["entry"]["content"],
        "Walked to the lake. Sam came too."
    );
    assert_eq!(second["entry"]["topicTags"], json!(["outdoors"]));

    let detail: Value = app.get("/entries/2025-01-05").await.json().await.unwrap();
    assert_eq!(detail["id"], "2025-01-05");
    let chunks = detail["audioChunks"].as_array().unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0]["chunkOrder"], 0);

    // The signed URL serves the original upload
    let audio_url = chunks[0]["audioUrl"].as_str().unwrap();
    let audio = app.client.get(audio_url).send().await.unwrap();
    assert_eq!(audio.status(), StatusCode::OK);
    assert_eq!(audio.bytes().await.unwrap().as_ref(), b"Walked to the lake.");
}

#[tokio::test]
async fn test_record_chunk_without_audio_is_400() {
    let app = spawn_app().await;
    let resp = app
        .client
        .post(app.url("/entries/2025-01-05/record-chunk"))
        .multipart(Form::new().text("title", "Morning"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_error_shape(&resp.json().await.unwrap());
    assert_eq!(app.inference.transcribe_call_count(), 0);
}

#[tokio::test]
async fn test_record_chunk_rejects_unsupported_file() {
    let app = spawn_app().await;
    let resp = app.record_chunk("2025-01-05", "notes.txt", b"hello").await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.get("/entries/2025-01-05").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_then_get_entry() {
    let app = spawn_app().await;

    let resp = app
        .post_json(
            "/entries/2025-02-01",
            json!({"content": "Quiet day reading.", "title": "Reading"}),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["entry"]["content"], "Quiet day reading.");
    assert_eq!(body["entry"]["title"], "Reading");
    assert_eq!(body["entry"]["sentiment"], 2.0);

    let detail: Value = app.get("/entries/2025-02-01").await.json().await.unwrap();
    assert_eq!(detail["keyPoints"], json!(["Went to the lake"]));
    assert_eq!(detail["audioChunks"], json!([]));
}

#[tokio::test]
async fn test_update_with_malformed_body_is_400() {
    let app = spawn_app().await;
    let resp = app
        .client
        .post(app.url("/entries/2025-02-01"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_error_shape(&resp.json().await.unwrap());
}

#[tokio::test]
async fn test_unknown_entry_is_404() {
    let app = spawn_app().await;
    let resp = app.get("/entries/1999-01-01").await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_error_shape(&body);
    assert!(body["details"].as_str().unwrap().contains("1999-01-01"));
}

#[tokio::test]
async fn test_summarize_empty_entry_is_400() {
    let app = spawn_app().await;
    let resp = app.post_json("/entries/2025-03-01/summarize", json!({})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_error_shape(&resp.json().await.unwrap());
}

#[tokio::test]
async fn test_summarize_refreshes_key_points() {
    let app = spawn_app().await;
    app.post_json("/entries/2025-03-02", json!({"content": "Went to the lake."}))
        .await;

    let resp = app.post_json("/entries/2025-03-02/summarize", json!({})).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["entry"]["keyPoints"], json!(["Went to the lake"]));
}

#[tokio::test]
async fn test_qna_without_entries_returns_fallback() {
    let app = spawn_app().await;
    let resp = app
        .post_json("/entries/search/qna", json!({"question": "Where did I go?"}))
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["answer"], NO_MATCHES_ANSWER);
    assert_eq!(body["context"], json!([]));
    assert_eq!(app.inference.generate_call_count(), 0);
}

#[tokio::test]
async fn test_qna_answers_from_context() {
    let app = spawn_app().await;
    app.post_json("/entries/2025-04-01", json!({"content": "Swam in the lake."}))
        .await;

    let body: Value = app
        .post_json("/entries/search/qna", json!({"question": "Where did I swim?"}))
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(body["answer"], "You went to the lake.");
    let context = body["context"].as_array().unwrap();
    assert_eq!(context.len(), 1);
    assert_eq!(context[0]["id"], "2025-04-01-chunk-0");
    assert_eq!(context[0]["metadata"]["entryId"], "2025-04-01");
}

#[tokio::test]
async fn test_qna_missing_question_is_400() {
    let app = spawn_app().await;
    let resp = app.post_json("/entries/search/qna", json!({})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_concatenate_empty_list_is_noop() {
    let app = spawn_app().await;
    let resp = app
        .post_json("/entries/2025-05-01/concatenate", json!({"fileKeys": []}))
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["mergedFileKey"], Value::Null);
}

#[tokio::test]
async fn test_concatenate_non_array_is_400() {
    let app = spawn_app().await;
    let resp = app
        .post_json("/entries/2025-05-01/concatenate", json!({"fileKeys": "a.m4a"}))
        .await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert!(body["details"].as_str().unwrap().contains("array"));
}

#[tokio::test]
async fn test_concatenate_merges_recorded_chunks() {
    let app = spawn_app().await;
    let a: Value = app
        .record_chunk("2025-05-02", "a.m4a", b"first ")
        .await
        .json()
        .await
        .unwrap();
    let b: Value = app
        .record_chunk("2025-05-02", "b.m4a", b"second")
        .await
        .json()
        .await
        .unwrap();

    let resp = app
        .post_json(
            "/entries/2025-05-02/concatenate",
            json!({"fileKeys": [a["audioKey"], b["audioKey"]]}),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["mergedFileKey"], "entries/2025-05-02/merged/final.m4a");

    let merged = app
        .blobs
        .get("entries/2025-05-02/merged/final.m4a")
        .await
        .unwrap();
    assert_eq!(merged, b"first second");

    let audio: Value = app
        .get("/entries/2025-05-02/audio")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(audio["chunks"].as_array().unwrap().len(), 2);
    assert_eq!(audio["merged"]["key"], "entries/2025-05-02/merged/final.m4a");
    assert!(audio["merged"]["url"].as_str().unwrap().contains("signature="));
}

#[tokio::test]
async fn test_concatenate_missing_blob_is_404() {
    let app = spawn_app().await;
    let resp = app
        .post_json(
            "/entries/2025-05-03/concatenate",
            json!({"fileKeys": ["entries/2025-05-03/originals/1-missing.m4a"]}),
        )
        .await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_error_shape(&resp.json().await.unwrap());
}

#[tokio::test]
async fn test_list_pagination() {
    let app = spawn_app().await;
    for day in 1..=25 {
        let resp = app
            .post_json(
                &format!("/entries/2025-06-{:02}", day),
                json!({"content": format!("Day {}", day)}),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let first: Value = app.get("/entries/list?limit=20").await.json().await.unwrap();
    let items = first["items"].as_array().unwrap();
    assert_eq!(items.len(), 20);
    assert_eq!(first["hasMore"], true);
    assert_eq!(items[0]["id"], "2025-06-25");
    assert_eq!(first["nextCursor"], items[19]["createdAt"]);

    let cursor = first["nextCursor"].as_str().unwrap();
    let second: Value = app
        .client
        .get(app.url("/entries/list"))
        .query(&[("limit", "20"), ("cursor", cursor)])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["items"].as_array().unwrap().len(), 5);
    assert_eq!(second["hasMore"], false);
    assert_eq!(second["nextCursor"], Value::Null);
}

#[tokio::test]
async fn test_list_bad_cursor_is_400() {
    let app = spawn_app().await;
    let resp = app.get("/entries/list?cursor=yesterday").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_blob_with_bad_signature_is_403() {
    let app = spawn_app().await;
    app.blobs
        .put("entries/x/originals/1-a.m4a", b"data")
        .await
        .unwrap();

    let signed = app.blobs.signed_url("entries/x/originals/1-a.m4a").unwrap();
    let tampered = signed.url.replace("signature=", "signature=00");
    let resp = app.client.get(&tampered).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app.get("/blobs/entries/x/originals/1-a.m4a").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app.client.get(&signed.url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
