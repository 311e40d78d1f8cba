//! Event adapters: native storage notifications → `FileCreatedEvent`
//!
//! Each backend delivers "object created" notifications in its own shape.
//! An `EventAdapter` recognizes the one event type its backend uses for a
//! finished upload and extracts location and key; every other event type is
//! a `Trigger::Skip`. Adapters do no I/O.

use crate::config::Backend;
use crate::error::{CdrError, Result};
use crate::types::Trigger;

pub mod azure;
pub mod gcs;
pub mod s3;

pub use azure::AzureBlobAdapter;
pub use gcs::GcsAdapter;
pub use s3::S3Adapter;

/// Core trait for backend notification parsers
pub trait EventAdapter: Send + Sync {
    /// Normalize one raw trigger
    fn normalize(&self, raw: &serde_json::Value) -> Result<Trigger>;

    /// Split a delivered payload into individual raw triggers
    ///
    /// Default implementation treats the payload as a single trigger.
    /// Backends that batch notifications should override this.
    fn split(&self, payload: &serde_json::Value) -> Result<Vec<serde_json::Value>> {
        Ok(vec![payload.clone()])
    }

    /// Backend this adapter parses
    fn backend(&self) -> Backend;
}

/// Adapter for a deployment backend
pub fn adapter_for(backend: Backend) -> Box<dyn EventAdapter> {
    match backend {
        Backend::S3 => Box::new(S3Adapter),
        Backend::Gcs => Box::new(GcsAdapter),
        Backend::Azure => Box::new(AzureBlobAdapter),
    }
}

/// Parse raw delivery bytes as JSON
pub fn parse_payload(raw: &[u8]) -> Result<serde_json::Value> {
    serde_json::from_slice(raw).map_err(|e| CdrError::Event(format!("payload is not JSON: {}", e)))
}

/// Deserialize a typed view of a trigger, reporting shape errors as `Event`
pub(crate) fn decode<'a, T>(raw: &'a serde_json::Value, what: &str) -> Result<T>
where
    T: serde::Deserialize<'a>,
{
    T::deserialize(raw).map_err(|e| CdrError::Event(format!("malformed {}: {}", what, e)))
}

/// Reject empty extracted fields
pub(crate) fn required<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    if value.trim().is_empty() {
        return Err(CdrError::Event(format!("{} is empty", field)));
    }
    Ok(value)
}
