//! Deployment configuration
//!
//! Built once at process start, either from a JSON file or from environment
//! variables, validated, and then passed by value into the components that
//! need it. A missing or empty required value is a fatal `Config` error.

use crate::error::{CdrError, Result};
use crate::policy::ContentManagementPolicy;
use crate::retry::{RetryPolicy, DEFAULT_FALLBACK_DELAY, DEFAULT_MAX_RETRIES};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Suffix S3 deployments append to the source bucket name
pub const DEFAULT_DESTINATION_SUFFIX: &str = "-protected";

/// Path GCS deployments append to the CDR base URL
pub const GCS_ENDPOINT_PATH: &str = "api/v3/cdr-file";

/// Storage/event backend a deployment runs against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Amazon S3 notifications delivered through SQS
    #[default]
    S3,
    /// Google Cloud Storage CloudEvents
    Gcs,
    /// Azure Blob Storage Event Grid events delivered through Service Bus
    Azure,
}

impl Backend {
    /// Lowercase backend name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Gcs => "gcs",
            Self::Azure => "azure",
        }
    }

    /// CDR request shape this backend's deployment has always used
    pub fn default_request_options(&self) -> CdrRequestOptions {
        match self {
            Self::Gcs => CdrRequestOptions {
                send_policy: true,
                hash_report: true,
                path: Some(GCS_ENDPOINT_PATH.to_string()),
            },
            Self::S3 | Self::Azure => CdrRequestOptions::default(),
        }
    }

    /// Destination rule used when none is configured
    pub fn default_destination(&self) -> Option<DestinationPolicy> {
        match self {
            Self::S3 => Some(DestinationPolicy::Suffixed {
                suffix: DEFAULT_DESTINATION_SUFFIX.to_string(),
            }),
            Self::Azure => Some(DestinationPolicy::SameAsSource),
            // GCS always names its output bucket explicitly
            Self::Gcs => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = CdrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" | "aws" => Ok(Self::S3),
            "gcs" | "gcp" => Ok(Self::Gcs),
            "azure" | "blob" => Ok(Self::Azure),
            other => Err(CdrError::Config(format!("unknown backend '{}'", other))),
        }
    }
}

/// Shape of the multipart request sent to the CDR endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CdrRequestOptions {
    /// Send the `ContentManagementPolicy` part
    pub send_policy: bool,
    /// Ask for a JSON response with SHA256/SHA1/MD5 hashes
    pub hash_report: bool,
    /// Path segments appended to the base URL
    pub path: Option<String>,
}

/// Where protected output is written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum DestinationPolicy {
    /// Always the same bucket/container
    Fixed { location: String },
    /// Source location name plus a suffix
    Suffixed { suffix: String },
    /// Same name as the source, in the destination store
    SameAsSource,
}

impl DestinationPolicy {
    /// Destination location for an object found in `source`
    pub fn resolve(&self, source: &str) -> String {
        match self {
            Self::Fixed { location } => location.clone(),
            Self::Suffixed { suffix } => format!("{}{}", source, suffix),
            Self::SameAsSource => source.to_string(),
        }
    }
}

/// What to do when the CDR request fails without an HTTP status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportFailureMode {
    /// Fail the invocation so the platform redelivers the event
    #[default]
    Propagate,
    /// Write a placeholder describing the failure as status 500
    Placeholder,
}

impl FromStr for TransportFailureMode {
    type Err = CdrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "propagate" => Ok(Self::Propagate),
            "placeholder" => Ok(Self::Placeholder),
            other => Err(CdrError::Config(format!(
                "unknown transport failure mode '{}'",
                other
            ))),
        }
    }
}

/// CDR endpoint and credentials
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdrEndpointConfig {
    /// Base URL of the protect endpoint
    pub url: String,

    pub username: String,

    pub password: String,

    /// Overrides the backend default for the policy part
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_policy: Option<bool>,

    /// Overrides the backend default for hash reporting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_report: Option<bool>,

    /// Overrides the backend default path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Replaces the default content management policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_file: Option<PathBuf>,

    /// Whole-request timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl fmt::Debug for CdrEndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdrEndpointConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("send_policy", &self.send_policy)
            .field("hash_report", &self.hash_report)
            .field("path", &self.path)
            .field("policy_file", &self.policy_file)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Complete configuration for one deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdrConfig {
    #[serde(default)]
    pub backend: Backend,

    pub endpoint: CdrEndpointConfig,

    /// Destination rule; falls back to the backend default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<DestinationPolicy>,

    #[serde(default)]
    pub transport_failure: TransportFailureMode,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_fallback_delay_secs")]
    pub fallback_delay_secs: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_fallback_delay_secs() -> u64 {
    DEFAULT_FALLBACK_DELAY.as_secs()
}

impl CdrConfig {
    /// Minimal configuration for a backend and endpoint
    pub fn new(
        backend: Backend,
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            endpoint: CdrEndpointConfig {
                url: url.into(),
                username: username.into(),
                password: password.into(),
                ..Default::default()
            },
            destination: None,
            transport_failure: TransportFailureMode::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            fallback_delay_secs: DEFAULT_FALLBACK_DELAY.as_secs(),
        }
    }

    /// Set an explicit destination rule
    pub fn with_destination(mut self, destination: DestinationPolicy) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Set the transport failure mode
    pub fn with_transport_failure(mut self, mode: TransportFailureMode) -> Self {
        self.transport_failure = mode;
        self
    }

    /// Load and validate configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load and validate configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .filter_map(|key| lookup(*key))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };
        let required = |keys: &[&str]| -> Result<String> {
            get(keys).ok_or_else(|| {
                CdrError::Config(format!("{} is not set", keys.join(" / ")))
            })
        };

        let backend = match get(&["CDR_BACKEND"]) {
            Some(raw) => raw.parse()?,
            None => Backend::default(),
        };

        let mut config = Self::new(
            backend,
            required(&["CDR_URL", "HALO_URL"])?,
            required(&["CDR_USERNAME", "HALO_USERNAME"])?,
            required(&["CDR_PASSWORD", "HALO_PASSWORD"])?,
        );

        if let Some(location) = get(&["OUTPUT_BUCKET", "OutputBucket"]) {
            config.destination = Some(DestinationPolicy::Fixed { location });
        } else if let Some(suffix) = get(&["CDR_DESTINATION_SUFFIX"]) {
            config.destination = Some(DestinationPolicy::Suffixed { suffix });
        }

        if let Some(raw) = get(&["CDR_TIMEOUT_SECS"]) {
            config.endpoint.timeout_secs = Some(parse_number(&raw, "CDR_TIMEOUT_SECS")?);
        }
        if let Some(raw) = get(&["CDR_TRANSPORT_FAILURE"]) {
            config.transport_failure = raw.parse()?;
        }
        if let Some(path) = get(&["CDR_POLICY_FILE"]) {
            config.endpoint.policy_file = Some(PathBuf::from(path));
        }

        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CdrError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| CdrError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check required values; call before accepting events
    pub fn validate(&self) -> Result<()> {
        let endpoint = &self.endpoint;
        if endpoint.url.trim().is_empty() {
            return Err(CdrError::Config("CDR url is empty".to_string()));
        }
        let url = reqwest::Url::parse(endpoint.url.trim())
            .map_err(|e| CdrError::Config(format!("invalid CDR url '{}': {}", endpoint.url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(CdrError::Config(format!(
                "CDR url must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if endpoint.username.trim().is_empty() {
            return Err(CdrError::Config("CDR username is empty".to_string()));
        }
        if endpoint.password.is_empty() {
            return Err(CdrError::Config("CDR password is empty".to_string()));
        }
        if endpoint.timeout_secs == Some(0) {
            return Err(CdrError::Config("CDR timeout must be positive".to_string()));
        }

        match self.destination_policy()? {
            DestinationPolicy::Fixed { location } if location.trim().is_empty() => {
                Err(CdrError::Config("destination location is empty".to_string()))
            }
            DestinationPolicy::Suffixed { suffix } if suffix.is_empty() => {
                Err(CdrError::Config("destination suffix is empty".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Configured destination rule, or the backend default
    pub fn destination_policy(&self) -> Result<DestinationPolicy> {
        self.destination
            .clone()
            .or_else(|| self.backend.default_destination())
            .ok_or_else(|| {
                CdrError::Config(format!(
                    "backend '{}' requires an output bucket (OUTPUT_BUCKET)",
                    self.backend
                ))
            })
    }

    /// Backend request defaults with configured overrides applied
    pub fn request_options(&self) -> CdrRequestOptions {
        let mut options = self.backend.default_request_options();
        if let Some(send_policy) = self.endpoint.send_policy {
            options.send_policy = send_policy;
        }
        if let Some(hash_report) = self.endpoint.hash_report {
            options.hash_report = hash_report;
        }
        if let Some(path) = &self.endpoint.path {
            options.path = Some(path.clone()).filter(|p| !p.trim().is_empty());
        }
        options
    }

    /// Policy document to send, when the request shape includes one
    pub fn policy(&self) -> Result<Option<ContentManagementPolicy>> {
        if !self.request_options().send_policy {
            return Ok(None);
        }
        match &self.endpoint.policy_file {
            Some(path) => ContentManagementPolicy::from_file(path).map(Some),
            None => Ok(Some(ContentManagementPolicy::default())),
        }
    }

    /// Retry policy built from the retry settings
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_secs(self.fallback_delay_secs))
    }

    /// HTTP request timeout, if one is configured
    pub fn timeout(&self) -> Option<Duration> {
        self.endpoint.timeout_secs.map(Duration::from_secs)
    }
}

fn parse_number(raw: &str, key: &str) -> Result<u64> {
    raw.parse()
        .map_err(|_| CdrError::Config(format!("{} must be a number, got '{}'", key, raw)))
}
