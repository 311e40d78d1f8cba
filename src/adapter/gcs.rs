//! Google Cloud Storage CloudEvents

use super::{decode, required, EventAdapter};
use crate::config::Backend;
use crate::error::{CdrError, Result};
use crate::types::{FileCreatedEvent, Trigger};
use serde::Deserialize;

/// CloudEvent type for a finished object upload
pub const GCS_FINALIZED: &str = "google.cloud.storage.object.v1.finalized";

#[derive(Debug, Deserialize)]
struct CloudEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StorageObjectData {
    bucket: String,
    name: String,
    #[serde(default)]
    metageneration: Option<serde_json::Value>,
}

/// Adapter for structured-mode CloudEvents from Cloud Storage
#[derive(Debug, Clone, Copy, Default)]
pub struct GcsAdapter;

impl EventAdapter for GcsAdapter {
    fn normalize(&self, raw: &serde_json::Value) -> Result<Trigger> {
        let event: CloudEvent = decode(raw, "CloudEvent")?;

        if event.event_type != GCS_FINALIZED {
            return Ok(Trigger::Skip {
                event_type: event.event_type,
            });
        }

        let data: StorageObjectData = match &event.data {
            Some(data) => decode(data, "Cloud Storage object data")?,
            None => return Err(CdrError::Event("CloudEvent has no data".to_string())),
        };

        tracing::debug!(
            id = ?event.id,
            bucket = %data.bucket,
            name = %data.name,
            metageneration = ?data.metageneration,
            "Cloud Storage object finalized"
        );

        Ok(Trigger::Created(FileCreatedEvent::new(
            required(&data.bucket, "bucket")?,
            required(&data.name, "object name")?,
            event.event_type,
        )))
    }

    fn backend(&self) -> Backend {
        Backend::Gcs
    }
}
