//! Pipeline integration tests
//!
//! End-to-end tests driving `ProtectPipeline` with the in-memory store and a
//! scripted CDR client. Covers success and placeholder artifacts, busy
//! retries, skipped events, storage and transport failures, destination
//! rules, cancellation, and the filesystem store.

use a3s_cdr::{
    adapter_for, Backend, CdrClient, CdrConfig, CdrError, DestinationPolicy, FileCreatedEvent,
    FsObjectStore, HttpOutcome, MemoryObjectStore, ObjectStore, PipelineState, ProtectPipeline,
    ProtectRequest, Result, StoreStats, TransportFailureMode, Trigger,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Store that stalls downloads or uploads until cancelled
struct StallingStore {
    inner: Arc<MemoryObjectStore>,
    stall_downloads: bool,
    stall_uploads: bool,
}

impl StallingStore {
    fn new(inner: Arc<MemoryObjectStore>, stall_downloads: bool, stall_uploads: bool) -> Arc<Self> {
        Arc::new(Self {
            inner,
            stall_downloads,
            stall_uploads,
        })
    }
}

#[async_trait]
impl ObjectStore for StallingStore {
    async fn download(&self, location: &str, key: &str) -> Result<Bytes> {
        if self.stall_downloads {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.inner.download(location, key).await
    }

    async fn upload(&self, location: &str, key: &str, content: Bytes) -> Result<()> {
        if self.stall_uploads {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.inner.upload(location, key, content).await
    }

    async fn ensure_destination_exists(&self, location: &str) -> Result<()> {
        self.inner.ensure_destination_exists(location).await
    }

    fn name(&self) -> &str {
        "stalling"
    }
}

fn cancel_after(secs: u64) -> CancellationToken {
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        canceller.cancel();
    });
    cancel
}

/// CDR client replaying a fixed list of responses
#[derive(Default)]
struct ScriptedClient {
    responses: Mutex<VecDeque<Result<HttpOutcome>>>,
    received: Mutex<Vec<(String, Bytes)>>,
}

impl ScriptedClient {
    fn new(responses: Vec<Result<HttpOutcome>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            received: Mutex::new(Vec::new()),
        })
    }

    fn statuses(statuses: &[u16]) -> Arc<Self> {
        Self::new(statuses.iter().map(|s| Ok(HttpOutcome::new(*s))).collect())
    }

    fn calls(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    fn received(&self) -> Vec<(String, Bytes)> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl CdrClient for ScriptedClient {
    async fn submit(&self, request: &ProtectRequest) -> Result<HttpOutcome> {
        self.received
            .lock()
            .unwrap()
            .push((request.file_name().to_string(), request.content()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted response left")
    }
}

fn transport_error() -> CdrError {
    CdrError::Transport {
        file_name: "report.pdf".to_string(),
        reason: "connection refused".to_string(),
    }
}

async fn seeded_store() -> Arc<MemoryObjectStore> {
    let store = Arc::new(MemoryObjectStore::new());
    store.insert("uploads", "report.pdf", "%PDF-1.7 original").await;
    store
}

fn pipeline(store: &Arc<MemoryObjectStore>, client: &Arc<ScriptedClient>) -> ProtectPipeline {
    ProtectPipeline::new(store.clone(), store.clone(), client.clone())
}

fn created(key: &str) -> FileCreatedEvent {
    FileCreatedEvent::new("uploads", key, "ObjectCreated:Put")
}

fn text(bytes: Bytes) -> String {
    String::from_utf8(bytes.to_vec()).expect("placeholder is UTF-8")
}

// ─── Success & Placeholder Artifacts ─────────────────────────────

#[tokio::test]
async fn test_created_response_writes_sanitized_file() {
    let store = seeded_store().await;
    let client = ScriptedClient::new(vec![Ok(HttpOutcome::new(201).with_body("SANITIZED"))]);

    let report = pipeline(&store, &client)
        .process(created("report.pdf"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.succeeded);
    assert_eq!(report.status, 201);
    assert_eq!(report.output_name, "report.pdf");
    assert_eq!(report.destination_location, "uploads-protected");
    assert_eq!(report.final_state, PipelineState::Done);
    assert!(report.invocation_id.starts_with("inv-"));

    assert_eq!(
        store.get("uploads-protected", "report.pdf").await.unwrap(),
        "SANITIZED"
    );
    assert_eq!(store.keys("uploads-protected").await, vec!["report.pdf"]);
}

#[tokio::test]
async fn test_server_error_writes_placeholder() {
    let store = seeded_store().await;
    let client = ScriptedClient::statuses(&[500]);

    let report = pipeline(&store, &client)
        .process(created("report.pdf"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.succeeded);
    assert_eq!(report.output_name, "report.pdf.txt");
    assert_eq!(report.final_state, PipelineState::Done);

    let placeholder = text(store.get("uploads-protected", "report.pdf.txt").await.unwrap());
    assert!(placeholder.contains("500"));
    assert!(store.get("uploads-protected", "report.pdf").await.is_none());
}

#[tokio::test]
async fn test_rejection_message_reaches_placeholder() {
    let store = seeded_store().await;
    let client = ScriptedClient::new(vec![Ok(
        HttpOutcome::new(400).with_body("Unsupported file format")
    )]);

    pipeline(&store, &client)
        .process(created("report.pdf"), &CancellationToken::new())
        .await
        .unwrap();

    let placeholder = text(store.get("uploads-protected", "report.pdf.txt").await.unwrap());
    assert!(placeholder.contains("400"));
    assert!(placeholder.contains("Unsupported file format"));
}

// ─── Busy Retries ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_two_busy_responses_then_success() {
    let store = seeded_store().await;
    let client = ScriptedClient::new(vec![
        Ok(HttpOutcome::new(429).with_retry_after(Duration::from_secs(5))),
        Ok(HttpOutcome::new(429)),
        Ok(HttpOutcome::new(201).with_body("SANITIZED")),
    ]);

    let started = tokio::time::Instant::now();
    let report = pipeline(&store, &client)
        .process(created("report.pdf"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.succeeded);
    assert_eq!(report.attempts, 3);
    assert_eq!(client.calls(), 3);
    assert_eq!(started.elapsed(), Duration::from_secs(15));

    // Every attempt carried the whole file
    for (name, content) in client.received() {
        assert_eq!(name, "report.pdf");
        assert_eq!(content, "%PDF-1.7 original");
    }
}

#[tokio::test(start_paused = true)]
async fn test_busy_exhaustion_writes_placeholder() {
    let store = seeded_store().await;
    let client = ScriptedClient::statuses(&[429, 429, 429, 429]);

    let report = pipeline(&store, &client)
        .process(created("report.pdf"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.succeeded);
    assert_eq!(report.status, 429);
    assert_eq!(report.attempts, 4);
    assert_eq!(client.calls(), 4);

    let placeholder = text(store.get("uploads-protected", "report.pdf.txt").await.unwrap());
    assert!(placeholder.contains("429"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_busy_wait() {
    let store = seeded_store().await;
    let client = ScriptedClient::statuses(&[429, 201]);
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        canceller.cancel();
    });

    let err = pipeline(&store, &client)
        .process(created("report.pdf"), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, CdrError::Cancelled(_)));
    assert_eq!(client.calls(), 1);
    assert_eq!(store.stats().uploads, 0);
}

#[tokio::test]
async fn test_cancelled_before_start_does_nothing() {
    let store = seeded_store().await;
    let client = ScriptedClient::statuses(&[201]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline(&store, &client)
        .process(created("report.pdf"), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, CdrError::Cancelled(_)));
    assert_eq!(client.calls(), 0);
    assert_eq!(store.stats().uploads, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_download() {
    let inner = seeded_store().await;
    let store = StallingStore::new(inner.clone(), true, false);
    let client = ScriptedClient::statuses(&[201]);

    let started = tokio::time::Instant::now();
    let err = ProtectPipeline::new(store.clone(), store, client.clone())
        .process(created("report.pdf"), &cancel_after(2))
        .await
        .unwrap_err();

    assert!(matches!(err, CdrError::Cancelled(_)));
    assert_eq!(started.elapsed(), Duration::from_secs(2));
    assert_eq!(client.calls(), 0);
    assert_eq!(inner.stats().uploads, 0);
    assert_eq!(inner.stats().ensures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_upload() {
    let inner = seeded_store().await;
    let store = StallingStore::new(inner.clone(), false, true);
    let client = ScriptedClient::new(vec![Ok(HttpOutcome::new(201).with_body("SANITIZED"))]);

    let err = ProtectPipeline::new(store.clone(), store, client.clone())
        .process(created("report.pdf"), &cancel_after(2))
        .await
        .unwrap_err();

    assert!(matches!(err, CdrError::Cancelled(_)));
    assert_eq!(client.calls(), 1);
    assert_eq!(inner.stats().uploads, 0);
    assert!(inner.get("uploads-protected", "report.pdf").await.is_none());
    assert_eq!(inner.get("uploads", "report.pdf").await.unwrap(), "%PDF-1.7 original");
}

// ─── Event Filtering ─────────────────────────────────────────────

#[tokio::test]
async fn test_unsupported_event_does_nothing() {
    let store = seeded_store().await;
    let client = ScriptedClient::statuses(&[]);
    let adapter = adapter_for(Backend::Gcs);

    let payload = json!({
        "type": "google.cloud.storage.object.v1.deleted",
        "data": { "bucket": "uploads", "name": "report.pdf" }
    });
    let reports = pipeline(&store, &client)
        .handle(adapter.as_ref(), &payload, &CancellationToken::new())
        .await
        .unwrap();

    assert!(reports.is_empty());
    assert_eq!(client.calls(), 0);
    assert_eq!(store.stats(), StoreStats::default());
}

#[tokio::test]
async fn test_skip_trigger_returns_none() {
    let store = seeded_store().await;
    let client = ScriptedClient::statuses(&[]);

    let report = pipeline(&store, &client)
        .handle_trigger(
            Trigger::Skip {
                event_type: "Microsoft.Storage.BlobDeleted".to_string(),
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.is_none());
    assert_eq!(store.stats(), StoreStats::default());
}

#[tokio::test]
async fn test_malformed_payload_is_event_error() {
    let store = seeded_store().await;
    let client = ScriptedClient::statuses(&[]);
    let adapter = adapter_for(Backend::Azure);

    let err = pipeline(&store, &client)
        .handle(adapter.as_ref(), &json!({ "nope": true }), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CdrError::Event(_)));
    assert_eq!(store.stats().downloads, 0);
}

#[tokio::test]
async fn test_s3_notification_processes_each_record() {
    let store = seeded_store().await;
    store.insert("uploads", "budget 2024.xlsx", "XLSX").await;
    let client = ScriptedClient::new(vec![
        Ok(HttpOutcome::new(201).with_body("CLEAN PDF")),
        Ok(HttpOutcome::new(422)),
    ]);
    let adapter = adapter_for(Backend::S3);

    let record = |name: &str, key: &str| {
        json!({
            "eventName": name,
            "awsRegion": "us-east-1",
            "s3": { "bucket": { "name": "uploads" }, "object": { "key": key } }
        })
    };
    let payload = json!({
        "Records": [
            record("ObjectCreated:Put", "report.pdf"),
            record("ObjectRemoved:Delete", "old.pdf"),
            record("ObjectCreated:CompleteMultipartUpload", "budget+2024.xlsx")
        ]
    });

    let reports = pipeline(&store, &client)
        .handle(adapter.as_ref(), &payload, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].output_name, "report.pdf");
    assert_eq!(reports[1].output_name, "budget 2024.xlsx.txt");
    assert_eq!(
        store.keys("uploads-protected").await,
        vec!["budget 2024.xlsx.txt", "report.pdf"]
    );
}

// ─── Storage Failures ────────────────────────────────────────────

#[tokio::test]
async fn test_missing_source_object_fails_without_writing() {
    let store = seeded_store().await;
    let client = ScriptedClient::statuses(&[201]);

    let err = pipeline(&store, &client)
        .process(created("missing.pdf"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CdrError::Transfer { .. }));
    assert_eq!(client.calls(), 0);
    assert_eq!(store.stats().uploads, 0);
    assert!(!store.has_location("uploads-protected").await);
}

#[tokio::test]
async fn test_upload_failure_propagates() {
    let store = seeded_store().await;
    store.set_fail_writes(true);
    let client = ScriptedClient::new(vec![Ok(HttpOutcome::new(201).with_body("SANITIZED"))]);

    let err = pipeline(&store, &client)
        .process(created("report.pdf"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CdrError::Transfer { .. }));
    assert_eq!(client.calls(), 1);
    assert_eq!(store.stats().ensures, 1);
}

// ─── Transport Failures ──────────────────────────────────────────

#[tokio::test]
async fn test_transport_failure_propagates_by_default() {
    let store = seeded_store().await;
    let client = ScriptedClient::new(vec![Err(transport_error())]);

    let err = pipeline(&store, &client)
        .process(created("report.pdf"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CdrError::Transport { .. }));
    assert_eq!(client.calls(), 1);
    assert_eq!(store.stats().uploads, 0);
}

#[tokio::test]
async fn test_transport_failure_placeholder_mode() {
    let store = seeded_store().await;
    let client = ScriptedClient::new(vec![Err(transport_error())]);

    let report = pipeline(&store, &client)
        .with_transport_failure(TransportFailureMode::Placeholder)
        .process(created("report.pdf"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.succeeded);
    assert_eq!(report.status, 500);
    assert_eq!(report.attempts, 1);
    assert_eq!(client.calls(), 1);

    let placeholder = text(store.get("uploads-protected", "report.pdf.txt").await.unwrap());
    assert!(placeholder.contains("500"));
    assert!(placeholder.contains("connection refused"));
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_after_busy_reports_every_attempt() {
    let store = seeded_store().await;
    let client = ScriptedClient::new(vec![
        Ok(HttpOutcome::new(429)),
        Ok(HttpOutcome::new(429)),
        Err(transport_error()),
    ]);

    let report = pipeline(&store, &client)
        .with_transport_failure(TransportFailureMode::Placeholder)
        .process(created("report.pdf"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(client.calls(), 3);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.status, 500);
    assert!(store.get("uploads-protected", "report.pdf.txt").await.is_some());
}

// ─── Destinations ────────────────────────────────────────────────

#[tokio::test]
async fn test_fixed_destination_from_gcs_config() {
    let store = seeded_store().await;
    let client = ScriptedClient::new(vec![Ok(HttpOutcome::new(201).with_body("SANITIZED"))]);
    let config = CdrConfig::new(Backend::Gcs, "https://cdr.example.com", "u", "p").with_destination(
        DestinationPolicy::Fixed {
            location: "clean-files".to_string(),
        },
    );

    let report = ProtectPipeline::from_config(&config, store.clone(), store.clone(), client)
        .unwrap()
        .process(created("report.pdf"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.destination_location, "clean-files");
    assert_eq!(store.get("clean-files", "report.pdf").await.unwrap(), "SANITIZED");
}

#[tokio::test]
async fn test_gcs_config_without_bucket_is_rejected() {
    let store = seeded_store().await;
    let client = ScriptedClient::statuses(&[]);
    let config = CdrConfig::new(Backend::Gcs, "https://cdr.example.com", "u", "p");

    let result = ProtectPipeline::from_config(&config, store.clone(), store, client);
    assert!(matches!(result, Err(CdrError::Config(_))));
}

#[tokio::test]
async fn test_azure_writes_same_container_in_destination_store() {
    let source = Arc::new(MemoryObjectStore::new());
    source.insert("inbox", "report.pdf", "PDF").await;
    let destination = Arc::new(MemoryObjectStore::new());
    let client = ScriptedClient::new(vec![Ok(HttpOutcome::new(201).with_body("SANITIZED"))]);
    let config = CdrConfig::new(Backend::Azure, "https://cdr.example.com", "u", "p");

    let payload = json!({
        "eventType": "Microsoft.Storage.BlobCreated",
        "data": { "url": "https://acct.blob.core.windows.net/inbox/report.pdf" }
    });
    let reports = ProtectPipeline::from_config(&config, source.clone(), destination.clone(), client)
        .unwrap()
        .handle(
            adapter_for(config.backend).as_ref(),
            &payload,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(destination.get("inbox", "report.pdf").await.unwrap(), "SANITIZED");
    assert_eq!(source.get("inbox", "report.pdf").await.unwrap(), "PDF");
    assert_eq!(source.stats().uploads, 0);
    assert_eq!(destination.stats().downloads, 0);
}

#[tokio::test]
async fn test_azure_with_shared_store_is_rejected() {
    let store = Arc::new(MemoryObjectStore::new());
    store.insert("inbox", "report.pdf", "ORIGINAL").await;
    let client = ScriptedClient::statuses(&[]);
    let config = CdrConfig::new(Backend::Azure, "https://cdr.example.com", "u", "p");

    let result = ProtectPipeline::from_config(&config, store.clone(), store.clone(), client);

    assert!(matches!(result, Err(CdrError::Config(_))));
    assert_eq!(store.get("inbox", "report.pdf").await.unwrap(), "ORIGINAL");
}

#[tokio::test]
async fn test_same_location_in_shared_store_never_overwrites_source() {
    let store = seeded_store().await;
    let client = ScriptedClient::new(vec![
        Ok(HttpOutcome::new(201).with_body("SANITIZED")),
        Ok(HttpOutcome::new(201).with_body("SANITIZED")),
    ]);

    for policy in [
        DestinationPolicy::SameAsSource,
        DestinationPolicy::Fixed {
            location: "uploads".to_string(),
        },
    ] {
        let err = pipeline(&store, &client)
            .with_destination_policy(policy)
            .process(created("report.pdf"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CdrError::Config(_)));
    }

    assert_eq!(client.calls(), 0);
    assert_eq!(store.stats().downloads, 0);
    assert_eq!(store.get("uploads", "report.pdf").await.unwrap(), "%PDF-1.7 original");
}

// ─── Filesystem Store ────────────────────────────────────────────

#[tokio::test]
async fn test_filesystem_store_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsObjectStore::new(dir.path()));
    store.ensure_destination_exists("uploads").await.unwrap();
    store
        .upload("uploads", "docs/report.pdf", Bytes::from_static(b"%PDF"))
        .await
        .unwrap();

    let client = ScriptedClient::new(vec![Ok(HttpOutcome::new(500))]);
    let report = ProtectPipeline::new(store.clone(), store.clone(), client)
        .process(created("docs/report.pdf"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.output_name, "docs/report.pdf.txt");
    let written =
        std::fs::read_to_string(dir.path().join("uploads-protected/docs/report.pdf.txt")).unwrap();
    assert!(written.contains("StatusCode:500"));
}
