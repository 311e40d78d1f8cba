//! CDR client: submits one file to the protect endpoint
//!
//! `CdrClient` is the seam the pipeline talks to; `HttpCdrClient` is the
//! real implementation. The client sends exactly one request per call and
//! never waits or retries: that belongs to [`RetryPolicy`](crate::retry::RetryPolicy).

use crate::config::{CdrConfig, CdrRequestOptions};
use crate::error::{CdrError, Result};
use crate::policy::{ContentManagementPolicy, POLICY_FIELD};
use crate::types::{HttpOutcome, ProtectRequest, STATUS_CREATED};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use std::time::Duration;

/// Multipart field carrying the file
pub const FILE_FIELD: &str = "file";

/// Hash types requested when a hash report is enabled
pub const HASH_TYPES: &str = "SHA256,SHA1,MD5";

/// Core trait for CDR service clients
#[async_trait]
pub trait CdrClient: Send + Sync {
    /// Send one protect request and report the HTTP result
    ///
    /// Any HTTP status, including 4xx/5xx, is `Ok`. `Err` means no status
    /// was obtained (`CdrError::Transport`).
    async fn submit(&self, request: &ProtectRequest) -> Result<HttpOutcome>;
}

/// reqwest-backed CDR client
pub struct HttpCdrClient {
    http: reqwest::Client,
    url: Url,
    username: String,
    password: String,
    policy: Option<ContentManagementPolicy>,
}

impl HttpCdrClient {
    /// Build a client from validated configuration
    pub fn new(config: &CdrConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(concat!(
            "a3s-cdr/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| CdrError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let url = build_endpoint(&config.endpoint.url, &config.request_options())?;

        tracing::info!(
            endpoint = %url,
            backend = %config.backend,
            "CDR client ready"
        );

        Ok(Self {
            http,
            url,
            username: config.endpoint.username.clone(),
            password: config.endpoint.password.clone(),
            policy: config.policy()?,
        })
    }

    /// Full request URL, query string included
    pub fn endpoint(&self) -> &Url {
        &self.url
    }

    fn build_form(&self, request: &ProtectRequest) -> Result<Form> {
        let transport = |e: reqwest::Error| CdrError::Transport {
            file_name: request.file_name().to_string(),
            reason: e.to_string(),
        };

        let file = Part::stream_with_length(
            reqwest::Body::from(request.content()),
            request.len() as u64,
        )
        .file_name(request.file_name().to_string())
        .mime_str("application/octet-stream")
        .map_err(transport)?;

        let mut form = Form::new().part(FILE_FIELD, file);

        if let Some(policy) = &self.policy {
            let part = Part::text(policy.to_json())
                .mime_str("application/json")
                .map_err(transport)?;
            form = form.part(POLICY_FIELD, part);
        }

        Ok(form)
    }
}

#[async_trait]
impl CdrClient for HttpCdrClient {
    async fn submit(&self, request: &ProtectRequest) -> Result<HttpOutcome> {
        // A fresh form per call: the file part restarts at byte 0
        let form = self.build_form(request)?;

        let response = self
            .http
            .post(self.url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(
                    file_name = request.file_name(),
                    error = %e,
                    "Unable to reach CDR service"
                );
                CdrError::Transport {
                    file_name: request.file_name().to_string(),
                    reason: e.to_string(),
                }
            })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);

        tracing::info!(
            file_name = request.file_name(),
            status,
            "CDR API returned status code"
        );

        let body = match response.bytes().await {
            Ok(body) => Some(body),
            Err(e) if status == STATUS_CREATED => {
                return Err(CdrError::Transport {
                    file_name: request.file_name().to_string(),
                    reason: format!("failed to read rebuilt file: {}", e),
                });
            }
            Err(e) => {
                tracing::debug!(status, error = %e, "Discarding unreadable error body");
                None
            }
        };

        Ok(HttpOutcome {
            status,
            body,
            retry_after,
        })
    }
}

/// Base URL + backend path + query parameters
pub fn build_endpoint(base: &str, options: &CdrRequestOptions) -> Result<Url> {
    let mut url = Url::parse(base.trim())
        .map_err(|e| CdrError::Config(format!("invalid CDR url '{}': {}", base, e)))?;

    if let Some(path) = &options.path {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| CdrError::Config(format!("CDR url '{}' cannot take a path", base)))?;
        segments
            .pop_if_empty()
            .extend(path.split('/').filter(|s| !s.is_empty()));
    }

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("response-content", "noAnalysisReport");
        if options.hash_report {
            query.append_pair("format", "JSON");
            query.append_pair("generate-hash-types", HASH_TYPES);
        }
    }

    Ok(url)
}

/// Delay-seconds form of `Retry-After`; HTTP-dates are ignored
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
