//! Core value types shared by the adapters, the CDR client and the pipeline
//!
//! All serializable types use camelCase JSON for wire compatibility.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP status the CDR service returns for a rebuilt file
pub const STATUS_CREATED: u16 = 201;

/// HTTP status the CDR service returns when it is busy
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Status used to describe a transport failure that produced no response
pub const STATUS_TRANSPORT_FAILURE: u16 = 500;

/// Suffix appended to the file name of a placeholder artifact
pub const PLACEHOLDER_SUFFIX: &str = ".txt";

/// Longest response message carried into a placeholder, in characters
const MAX_MESSAGE_CHARS: usize = 2048;

/// A normalized "object created" notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCreatedEvent {
    /// Bucket or container holding the new object
    pub source_location: String,

    /// Object key (decoded), also used as the file name sent to CDR
    pub object_key: String,

    /// Native event type tag the trigger carried
    pub event_type: String,
}

impl FileCreatedEvent {
    /// Create a new created-object event
    pub fn new(
        source_location: impl Into<String>,
        object_key: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            source_location: source_location.into(),
            object_key: object_key.into(),
            event_type: event_type.into(),
        }
    }
}

/// Result of normalizing one raw trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A supported object-created event
    Created(FileCreatedEvent),
    /// Any other event type; the invocation does nothing
    Skip { event_type: String },
}

/// A file to submit to the CDR service
///
/// `content` is a cheaply clonable buffer. Every send attempt takes a fresh
/// clone, so each retry transmits the file from its first byte.
#[derive(Debug, Clone)]
pub struct ProtectRequest {
    content: Bytes,
    file_name: String,
}

impl ProtectRequest {
    /// Create a request for `file_name` carrying `content`
    pub fn new(content: impl Into<Bytes>, file_name: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            file_name: file_name.into(),
        }
    }

    /// Content positioned at its start
    pub fn content(&self) -> Bytes {
        self.content.clone()
    }

    /// Name sent as the multipart file name
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Content length in bytes
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether the content is empty
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Raw HTTP result of one CDR submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOutcome {
    /// HTTP status code
    pub status: u16,

    /// Response body, if one was read
    pub body: Option<Bytes>,

    /// Server-directed wait from a `Retry-After` header
    pub retry_after: Option<Duration>,
}

impl HttpOutcome {
    /// Create an outcome with a status and nothing else
    pub fn new(status: u16) -> Self {
        Self {
            status,
            body: None,
            retry_after: None,
        }
    }

    /// Attach a response body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Attach a server-directed `Retry-After` wait
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// The service rebuilt the file
    pub fn is_created(&self) -> bool {
        self.status == STATUS_CREATED
    }

    /// The service asked the client to back off
    pub fn is_busy(&self) -> bool {
        self.status == STATUS_TOO_MANY_REQUESTS
    }

    /// Response body as text, trimmed and capped for diagnostics
    pub fn message(&self) -> Option<String> {
        let body = self.body.as_ref()?;
        let text = String::from_utf8_lossy(body);
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(text.chars().take(MAX_MESSAGE_CHARS).collect())
    }
}

/// Classified result of protecting one file
///
/// Built only by [`ResponseClassifier`](crate::classify::ResponseClassifier)
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectOutcome {
    succeeded: bool,
    status: u16,
    output_name: String,
    content: Bytes,
    diagnostic: Option<String>,
}

impl ProtectOutcome {
    /// Rebuilt file stored under its original name
    pub(crate) fn protected(file_name: &str, status: u16, content: Bytes) -> Self {
        Self {
            succeeded: true,
            status,
            output_name: file_name.to_string(),
            content,
            diagnostic: None,
        }
    }

    /// `<name>.txt` placeholder holding `diagnostic`
    pub(crate) fn rejected(file_name: &str, status: u16, diagnostic: String) -> Self {
        Self {
            succeeded: false,
            status,
            output_name: format!("{}{}", file_name, PLACEHOLDER_SUFFIX),
            content: Bytes::from(diagnostic.clone()),
            diagnostic: Some(diagnostic),
        }
    }

    /// Whether the CDR service rebuilt the file
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Terminal HTTP status the outcome was classified from
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Destination object name
    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    /// Sanitized file, or the UTF-8 diagnostic text
    pub fn content(&self) -> Bytes {
        self.content.clone()
    }

    /// Placeholder text, for rejected files only
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    /// Consume the outcome, yielding the bytes to persist
    pub fn into_content(self) -> Bytes {
        self.content
    }
}
