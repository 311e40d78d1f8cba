//! Terminal HTTP outcome → persisted artifact

use crate::types::{HttpOutcome, ProtectOutcome, STATUS_TRANSPORT_FAILURE};

/// Turns the last CDR response into a [`ProtectOutcome`]
///
/// `201` keeps the file name and the rebuilt body; everything else becomes a
/// `<name>.txt` placeholder describing the failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseClassifier;

impl ResponseClassifier {
    /// Create a new classifier
    pub fn new() -> Self {
        Self
    }

    /// Classify a terminal response for `file_name`
    pub fn classify(&self, outcome: HttpOutcome, file_name: &str) -> ProtectOutcome {
        if outcome.is_created() {
            let body = outcome.body.unwrap_or_default();
            return ProtectOutcome::protected(file_name, outcome.status, body);
        }

        let text = diagnostic_text(outcome.status, outcome.message().as_deref());
        ProtectOutcome::rejected(file_name, outcome.status, text)
    }

    /// Classify a request that never produced a status
    pub fn classify_transport_failure(&self, file_name: &str, reason: &str) -> ProtectOutcome {
        let text = diagnostic_text(STATUS_TRANSPORT_FAILURE, Some(reason));
        ProtectOutcome::rejected(file_name, STATUS_TRANSPORT_FAILURE, text)
    }
}

fn diagnostic_text(status: u16, message: Option<&str>) -> String {
    match message {
        Some(message) => format!(
            "File could not be protected StatusCode:{} ResponseMessage:{}",
            status, message
        ),
        None => format!("File could not be protected StatusCode:{}", status),
    }
}
