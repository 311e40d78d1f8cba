//! Amazon S3 event notifications (delivered directly or through SQS)

use super::{decode, required, EventAdapter};
use crate::config::Backend;
use crate::error::{CdrError, Result};
use crate::types::{FileCreatedEvent, Trigger};
use serde::Deserialize;

/// Event name prefix shared by every S3 object-created variant
/// (`ObjectCreated:Put`, `:Post`, `:Copy`, `:CompleteMultipartUpload`)
pub const S3_OBJECT_CREATED: &str = "ObjectCreated:";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S3Record {
    event_name: String,
    #[serde(default)]
    aws_region: Option<String>,
    #[serde(default)]
    s3: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Debug, Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Debug, Deserialize)]
struct S3Object {
    key: String,
}

/// Adapter for S3 notification records
#[derive(Debug, Clone, Copy, Default)]
pub struct S3Adapter;

impl EventAdapter for S3Adapter {
    fn normalize(&self, raw: &serde_json::Value) -> Result<Trigger> {
        let record: S3Record = decode(raw, "S3 event record")?;

        if !record.event_name.starts_with(S3_OBJECT_CREATED) {
            return Ok(Trigger::Skip {
                event_type: record.event_name,
            });
        }

        let entity: S3Entity = match &record.s3 {
            Some(entity) => decode(entity, "S3 entity")?,
            None => return Err(CdrError::Event("S3 record has no s3 entity".to_string())),
        };
        let key = decode_object_key(required(&entity.object.key, "object key")?)?;

        tracing::debug!(
            region = ?record.aws_region,
            bucket = %entity.bucket.name,
            key = %key,
            "S3 object created"
        );

        Ok(Trigger::Created(FileCreatedEvent::new(
            required(&entity.bucket.name, "bucket name")?,
            key,
            record.event_name,
        )))
    }

    /// S3 batches records; SQS wraps each notification in a message body
    fn split(&self, payload: &serde_json::Value) -> Result<Vec<serde_json::Value>> {
        let records = match payload.get("Records") {
            None => return Ok(Vec::new()),
            Some(serde_json::Value::Array(records)) => records,
            Some(_) => return Err(CdrError::Event("Records is not an array".to_string())),
        };

        let mut triggers = Vec::new();
        for record in records {
            match record.get("body") {
                Some(serde_json::Value::String(body)) => {
                    let inner: serde_json::Value = serde_json::from_str(body).map_err(|e| {
                        CdrError::Event(format!("SQS message body is not JSON: {}", e))
                    })?;
                    triggers.extend(self.split(&inner)?);
                }
                _ => triggers.push(record.clone()),
            }
        }
        Ok(triggers)
    }

    fn backend(&self) -> Backend {
        Backend::S3
    }
}

/// S3 keys arrive form-encoded: `+` is a space, the rest percent-encoded
fn decode_object_key(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|key| key.into_owned())
        .map_err(|e| CdrError::Event(format!("object key '{}' is not UTF-8: {}", raw, e)))
}
