//! Content management policy sent alongside a file
//!
//! The policy is a static document: the default enables every managed flag
//! for every supported format. A deployment may swap it for its own JSON.

use crate::error::{CdrError, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;

/// Multipart field name the CDR service reads the policy from
pub const POLICY_FIELD: &str = "ContentManagementPolicy";

/// Opaque `ContentManagementPolicy` JSON document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentManagementPolicy(serde_json::Value);

impl ContentManagementPolicy {
    /// Wrap an existing policy document
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        if !value.is_object() {
            return Err(CdrError::Config(
                "content management policy must be a JSON object".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// Load a policy document from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CdrError::Config(format!(
                "Failed to read policy file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_value(serde_json::from_str(&raw)?)
    }

    /// Borrow the policy document
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Compact JSON body for the multipart part
    pub fn to_json(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ContentManagementPolicy {
    fn default() -> Self {
        let office = json!({
            "DynamicDataExchange": 1,
            "EmbeddedFiles": 1,
            "EmbeddedImages": 1,
            "ExternalHyperlinks": 1,
            "InternalHyperlinks": 1,
            "Macros": 1,
            "Metadata": 1,
            "ReviewComments": 1
        });

        Self(json!({
            "ContentManagementFlags": {
                "PdfContentManagement": {
                    "Acroform": 1,
                    "ActionsAll": 1,
                    "EmbeddedFiles": 1,
                    "EmbeddedImages": 1,
                    "ExternalHyperlinks": 1,
                    "InternalHyperlinks": 1,
                    "Javascript": 1,
                    "Metadata": 1,
                    "Watermark": "",
                    "DigitalSignatures": 1,
                    "ValueOutsideReasonableLimits": 1,
                    "RetainExportedStreams": 1
                },
                "WordContentManagement": office.clone(),
                "ExcelContentManagement": office.clone(),
                "PowerPointContentManagement": office,
                "ArchiveConfig": {
                    "bmp": 1, "doc": 1, "docx": 1, "emf": 1, "gif": 1, "jpg": 1,
                    "wav": 1, "elf": 1, "pe": 1, "mp4": 1, "mpg": 1, "pdf": 1,
                    "png": 1, "ppt": 1, "pptx": 1, "tif": 1, "wmf": 1, "xls": 1,
                    "xlsx": 1, "mp3": 1, "rtf": 1, "coff": 1, "macho": 1, "svg": 1,
                    "webp": 1, "unknown": 1
                },
                "SvgConfig": { "ForeignObjects": 1, "Hyperlinks": 1, "Scripts": 1 },
                "WebpConfig": { "Metadata": 1 },
                "TiffConfig": { "GeoTiff": 1 }
            }
        }))
    }
}
