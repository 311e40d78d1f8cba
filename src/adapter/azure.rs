//! Azure Blob Storage Event Grid events

use super::{decode, EventAdapter};
use crate::config::Backend;
use crate::error::{CdrError, Result};
use crate::types::{FileCreatedEvent, Trigger};
use reqwest::Url;
use serde::Deserialize;

/// Event Grid type for a new or replaced blob
pub const AZURE_BLOB_CREATED: &str = "Microsoft.Storage.BlobCreated";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventGridEvent {
    // CloudEvents-schema subscriptions use `type`
    #[serde(alias = "type")]
    event_type: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct BlobCreatedData {
    url: String,
}

/// Adapter for Event Grid blob notifications
#[derive(Debug, Clone, Copy, Default)]
pub struct AzureBlobAdapter;

impl EventAdapter for AzureBlobAdapter {
    fn normalize(&self, raw: &serde_json::Value) -> Result<Trigger> {
        let event: EventGridEvent = decode(raw, "Event Grid event")?;

        if event.event_type != AZURE_BLOB_CREATED {
            return Ok(Trigger::Skip {
                event_type: event.event_type,
            });
        }

        let data: BlobCreatedData = match &event.data {
            Some(data) => decode(data, "BlobCreated data")?,
            None => return Err(CdrError::Event("Event Grid event has no data".to_string())),
        };
        let (container, blob) = split_blob_url(&data.url)?;

        tracing::debug!(id = ?event.id, url = %data.url, "Blob created");

        Ok(Trigger::Created(FileCreatedEvent::new(
            container,
            blob,
            event.event_type,
        )))
    }

    fn backend(&self) -> Backend {
        Backend::Azure
    }
}

/// `https://<account>.blob.core.windows.net/<container>/<blob path>`
fn split_blob_url(raw: &str) -> Result<(String, String)> {
    let url = Url::parse(raw)
        .map_err(|e| CdrError::Event(format!("invalid blob url '{}': {}", raw, e)))?;

    let segments: Vec<String> = url
        .path_segments()
        .into_iter()
        .flatten()
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .map_err(|e| CdrError::Event(format!("blob url is not UTF-8: {}", e)))
        })
        .collect::<Result<_>>()?;

    match segments.split_first() {
        Some((container, blob)) if !container.is_empty() && blob.iter().any(|s| !s.is_empty()) => {
            Ok((container.clone(), blob.join("/")))
        }
        _ => Err(CdrError::Event(format!(
            "blob url '{}' has no container and blob name",
            raw
        ))),
    }
}
