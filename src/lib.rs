//! # a3s-cdr
//!
//! Storage-event driven content disarm & reconstruction for the A3S ecosystem.
//!
//! ## Overview
//!
//! `a3s-cdr` reacts to "object created" notifications from a storage
//! backend, downloads the new object, submits it to an external CDR service
//! that strips active content, and writes the rebuilt file (or a diagnostic
//! `<name>.txt` placeholder when the service rejects it) to a destination.
//! The same pipeline runs against S3, Google Cloud Storage and Azure Blob
//! Storage; only the event adapter and object store change.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use a3s_cdr::{adapter_for, CdrConfig, HttpCdrClient, MemoryObjectStore, ProtectPipeline};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> a3s_cdr::Result<()> {
//! let config = CdrConfig::from_env()?;
//! let store = Arc::new(MemoryObjectStore::new());
//! let client = Arc::new(HttpCdrClient::new(&config)?);
//! let pipeline = ProtectPipeline::from_config(&config, store.clone(), store, client)?;
//!
//! let payload = serde_json::json!({
//!     "type": "google.cloud.storage.object.v1.finalized",
//!     "data": { "bucket": "uploads", "name": "report.pdf" }
//! });
//! let adapter = adapter_for(config.backend);
//! for report in pipeline.handle(adapter.as_ref(), &payload, &CancellationToken::new()).await? {
//!     println!("{} -> {}", report.object_key, report.output_name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **EventAdapter** trait: backend notification → `FileCreatedEvent` or skip
//! - **ObjectStore** trait: download / upload / ensure destination
//! - **CdrClient** trait: one multipart request to the CDR endpoint
//! - **RetryPolicy**: bounded retry on `429` honoring `Retry-After`
//! - **ResponseClassifier**: terminal response → immutable `ProtectOutcome`
//! - **ProtectPipeline**: sequences the above for one event

pub mod adapter;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod policy;
pub mod retry;
pub mod store;
pub mod types;

// Re-export core types
pub use adapter::{adapter_for, parse_payload, EventAdapter};
pub use classify::ResponseClassifier;
pub use client::{CdrClient, HttpCdrClient};
pub use config::{
    Backend, CdrConfig, CdrEndpointConfig, CdrRequestOptions, DestinationPolicy,
    TransportFailureMode,
};
pub use error::{CdrError, Result};
pub use pipeline::{PipelineReport, PipelineState, ProtectPipeline};
pub use policy::ContentManagementPolicy;
pub use retry::{RetryPolicy, RetryRun, RetryState};
pub use store::ObjectStore;
pub use types::{FileCreatedEvent, HttpOutcome, ProtectOutcome, ProtectRequest, Trigger};

// Re-export stores for convenience
pub use store::fs::FsObjectStore;
pub use store::memory::{MemoryObjectStore, StoreStats};
