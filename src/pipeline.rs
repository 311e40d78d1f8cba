//! Protect pipeline: download → protect → upload for one event
//!
//! `ProtectPipeline` drives a single `FileCreatedEvent` through
//! `Idle → Downloading → Protecting → Uploading → Done`. Any unrecoverable
//! error moves it to `Failed` and is returned unchanged to the caller; the
//! hosting platform decides whether to redeliver. A CDR rejection is not an
//! error: it is uploaded as a `<name>.txt` placeholder.

use crate::adapter::EventAdapter;
use crate::classify::ResponseClassifier;
use crate::client::CdrClient;
use crate::config::{CdrConfig, DestinationPolicy, TransportFailureMode, DEFAULT_DESTINATION_SUFFIX};
use crate::error::{CdrError, Result};
use crate::retry::RetryPolicy;
use crate::store::ObjectStore;
use crate::types::{FileCreatedEvent, ProtectOutcome, ProtectRequest, Trigger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Processing state of one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineState {
    Idle,
    Downloading,
    Protecting,
    Uploading,
    Done,
    Failed,
}

impl PipelineState {
    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Downloading)
                | (Downloading, Protecting)
                | (Protecting, Uploading)
                | (Uploading, Done)
                | (Downloading, Failed)
                | (Protecting, Failed)
                | (Uploading, Failed)
        )
    }

    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Downloading => "downloading",
            PipelineState::Protecting => "protecting",
            PipelineState::Uploading => "uploading",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Summary of one processed event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    /// Per-invocation identifier (inv-<uuid>)
    pub invocation_id: String,
    pub source_location: String,
    pub destination_location: String,
    pub object_key: String,
    /// Name the artifact was written under
    pub output_name: String,
    /// Whether the CDR service rebuilt the file
    pub succeeded: bool,
    /// Terminal CDR status (500 for an absorbed transport failure)
    pub status: u16,
    /// CDR requests sent, including the first
    pub attempts: u32,
    pub final_state: PipelineState,
    pub completed_at: DateTime<Utc>,
}

/// State tracker for a single invocation
struct Run<'a> {
    invocation_id: &'a str,
    state: PipelineState,
}

impl Run<'_> {
    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(
            invocation_id = self.invocation_id,
            from = %self.state,
            to = %next,
            "Pipeline transition"
        );
        self.state = next;
    }

    fn fail(&mut self, error: CdrError) -> CdrError {
        tracing::error!(
            invocation_id = self.invocation_id,
            state = %self.state,
            error = %error,
            "Unable to process file"
        );
        self.advance(PipelineState::Failed);
        error
    }
}

/// Backend-agnostic protect pipeline
pub struct ProtectPipeline {
    source: Arc<dyn ObjectStore>,
    destination: Arc<dyn ObjectStore>,
    client: Arc<dyn CdrClient>,
    retry: RetryPolicy,
    classifier: ResponseClassifier,
    destination_policy: DestinationPolicy,
    transport_failure: TransportFailureMode,
}

impl ProtectPipeline {
    /// Pipeline with default retry and `<source>-protected` destinations
    pub fn new(
        source: Arc<dyn ObjectStore>,
        destination: Arc<dyn ObjectStore>,
        client: Arc<dyn CdrClient>,
    ) -> Self {
        Self {
            source,
            destination,
            client,
            retry: RetryPolicy::default(),
            classifier: ResponseClassifier::new(),
            destination_policy: DestinationPolicy::Suffixed {
                suffix: DEFAULT_DESTINATION_SUFFIX.to_string(),
            },
            transport_failure: TransportFailureMode::default(),
        }
    }

    /// Pipeline configured from a validated `CdrConfig`
    pub fn from_config(
        config: &CdrConfig,
        source: Arc<dyn ObjectStore>,
        destination: Arc<dyn ObjectStore>,
        client: Arc<dyn CdrClient>,
    ) -> Result<Self> {
        let pipeline = Self::new(source, destination, client)
            .with_retry_policy(config.retry_policy())
            .with_destination_policy(config.destination_policy()?)
            .with_transport_failure(config.transport_failure);
        pipeline.check_destination()?;
        Ok(pipeline)
    }

    /// Reject a setup that would write output over the source objects
    ///
    /// `SameAsSource` keeps the location name, so it needs a destination
    /// store distinct from the source store.
    pub fn check_destination(&self) -> Result<()> {
        if self.shares_store() && self.destination_policy == DestinationPolicy::SameAsSource {
            return Err(CdrError::Config(
                "destination resolves to the source location in the same store; \
                 use a separate destination store or another destination policy"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn shares_store(&self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.source), Arc::as_ptr(&self.destination))
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the destination rule
    pub fn with_destination_policy(mut self, policy: DestinationPolicy) -> Self {
        self.destination_policy = policy;
        self
    }

    /// Choose how transport failures are reported
    pub fn with_transport_failure(mut self, mode: TransportFailureMode) -> Self {
        self.transport_failure = mode;
        self
    }

    /// Normalize a delivered payload and process every supported trigger
    ///
    /// Triggers run one after another; the first error stops the batch.
    /// Skipped triggers produce no report.
    pub async fn handle(
        &self,
        adapter: &dyn EventAdapter,
        payload: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<Vec<PipelineReport>> {
        let mut reports = Vec::new();
        for raw in adapter.split(payload)? {
            let trigger = adapter.normalize(&raw)?;
            if let Some(report) = self.handle_trigger(trigger, cancel).await? {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// Process a normalized trigger; `Skip` does nothing
    pub async fn handle_trigger(
        &self,
        trigger: Trigger,
        cancel: &CancellationToken,
    ) -> Result<Option<PipelineReport>> {
        match trigger {
            Trigger::Created(event) => self.process(event, cancel).await.map(Some),
            Trigger::Skip { event_type } => {
                tracing::info!(event_type = %event_type, "Unsupported event type");
                Ok(None)
            }
        }
    }

    /// Run one event through download → protect → upload
    pub async fn process(
        &self,
        event: FileCreatedEvent,
        cancel: &CancellationToken,
    ) -> Result<PipelineReport> {
        self.check_destination()?;
        let destination_location = self.destination_policy.resolve(&event.source_location);
        if self.shares_store() && destination_location == event.source_location {
            return Err(CdrError::Config(format!(
                "destination '{}' is the source location of '{}'",
                destination_location, event.object_key
            )));
        }

        let invocation_id = format!("inv-{}", uuid::Uuid::new_v4());
        let mut run = Run {
            invocation_id: &invocation_id,
            state: PipelineState::Idle,
        };

        tracing::info!(
            invocation_id = %invocation_id,
            location = %event.source_location,
            key = %event.object_key,
            event_type = %event.event_type,
            "Protect pipeline started"
        );

        run.advance(PipelineState::Downloading);
        let content = match cancellable(
            cancel,
            "download",
            self.source.download(&event.source_location, &event.object_key),
        )
        .await
        {
            Ok(content) => content,
            Err(e) => return Err(run.fail(e)),
        };
        tracing::info!(
            store = self.source.name(),
            location = %event.source_location,
            key = %event.object_key,
            bytes = content.len(),
            "Downloaded object"
        );

        run.advance(PipelineState::Protecting);
        let request = ProtectRequest::new(content, event.object_key.clone());
        let (outcome, attempts) = match self.protect(&request, cancel).await {
            Ok(protected) => protected,
            Err(e) => return Err(run.fail(e)),
        };
        drop(request);

        if outcome.succeeded() {
            tracing::info!(key = %event.object_key, attempts, "File protected");
        } else {
            tracing::warn!(
                key = %event.object_key,
                status = outcome.status(),
                attempts,
                output_name = outcome.output_name(),
                "File could not be protected, writing placeholder"
            );
        }

        run.advance(PipelineState::Uploading);
        if let Err(e) = self.persist(&destination_location, &outcome, cancel).await {
            return Err(run.fail(e));
        }

        run.advance(PipelineState::Done);
        tracing::info!(
            invocation_id = %invocation_id,
            destination = %destination_location,
            output_name = outcome.output_name(),
            succeeded = outcome.succeeded(),
            "Protect pipeline finished"
        );

        Ok(PipelineReport {
            invocation_id: invocation_id.clone(),
            source_location: event.source_location,
            destination_location,
            object_key: event.object_key,
            output_name: outcome.output_name().to_string(),
            succeeded: outcome.succeeded(),
            status: outcome.status(),
            attempts,
            final_state: run.state,
            completed_at: Utc::now(),
        })
    }

    /// Submit under the retry policy and classify the terminal response
    async fn protect(
        &self,
        request: &ProtectRequest,
        cancel: &CancellationToken,
    ) -> Result<(ProtectOutcome, u32)> {
        let client = &self.client;
        let run = self
            .retry
            .execute(move || client.submit(request), cancel)
            .await;
        let attempts = run.state.attempts_made();

        match run.outcome {
            Ok(outcome) => Ok((self.classifier.classify(outcome, request.file_name()), attempts)),
            Err(CdrError::Transport { file_name, reason })
                if self.transport_failure == TransportFailureMode::Placeholder =>
            {
                tracing::warn!(
                    file_name = %file_name,
                    reason = %reason,
                    attempts,
                    "CDR transport failure recorded as placeholder"
                );
                Ok((
                    self.classifier.classify_transport_failure(&file_name, &reason),
                    attempts,
                ))
            }
            Err(e) => Err(e),
        }
    }

    async fn persist(
        &self,
        location: &str,
        outcome: &ProtectOutcome,
        cancel: &CancellationToken,
    ) -> Result<()> {
        cancellable(
            cancel,
            "destination check",
            self.destination.ensure_destination_exists(location),
        )
        .await?;

        cancellable(
            cancel,
            "upload",
            self.destination
                .upload(location, outcome.output_name(), outcome.content()),
        )
        .await?;

        tracing::info!(
            store = self.destination.name(),
            location,
            key = outcome.output_name(),
            "Uploaded object"
        );
        Ok(())
    }
}

/// Race a store operation against the invocation's cancellation token
async fn cancellable<T>(
    cancel: &CancellationToken,
    what: &str,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CdrError::Cancelled(what.to_string())),
        result = operation => result,
    }
}
