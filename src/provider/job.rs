// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::JobError;
use crate::http::{HttpClient, HttpRequest, HttpResponse};

use super::ProviderConfig;

/// Substring the provider puts in its error message when an internal lock is held
pub const LOCK_CONTENTION_MARKER: &str = "Failed to grab locks";

/// A single "save remote URL to path" submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub access_token: String,
    /// Destination path inside the user's storage, e.g. `/Likes/a.jpg`
    pub path: String,
    /// Absolute URL the provider fetches the file from
    pub source_url: String,
    /// Number of retries already spent on this job
    pub retry_count: u32,
}

impl SyncJob {
    pub fn new(
        access_token: impl Into<String>,
        path: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            path: path.into(),
            source_url: source_url.into(),
            retry_count: 0,
        }
    }
}

/// Outcome of a job the provider accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    /// Queued for asynchronous processing on the provider side
    Pending { job_id: String },
}

impl JobResult {
    pub fn job_id(&self) -> &str {
        match self {
            JobResult::Pending { job_id } => job_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SaveUrlResponse {
    #[serde(default)]
    job: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Stateless client for the provider's save-url job endpoint
#[derive(Debug, Clone)]
pub struct JobClient<C> {
    http: C,
    config: ProviderConfig,
}

impl<C: HttpClient> JobClient<C> {
    pub fn new(http: C, config: ProviderConfig) -> Self {
        Self { http, config }
    }

    /// Submit one job and classify the provider's answer
    pub async fn submit(&self, job: &SyncJob) -> Result<JobResult, JobError> {
        validate(job)?;
        let url = self.job_url(job)?;

        debug!(path = %job.path, source = %job.source_url, "Submitting save-url job");

        let response = self
            .http
            .send(HttpRequest::post(url.clone()).bearer(job.access_token.as_str()))
            .await
            .map_err(|e| JobError::RequestFailed {
                url: url.to_string(),
                source: e,
            })?;

        classify(&response)
    }

    /// Build `{api_base}/save_url/auto/{path}?url={source}` with each path segment escaped
    fn job_url(&self, job: &SyncJob) -> Result<Url, JobError> {
        let mut url = self
            .config
            .endpoint("save_url/auto/")
            .map_err(|e| JobError::InvalidJob {
                reason: e.to_string(),
            })?;

        url.path_segments_mut()
            .map_err(|_| JobError::InvalidJob {
                reason: format!("API base {} cannot carry a path", self.config.api_base),
            })?
            .pop_if_empty()
            .extend(job.path.split('/').filter(|segment| !segment.is_empty()));

        url.query_pairs_mut().append_pair("url", &job.source_url);
        Ok(url)
    }
}

fn validate(job: &SyncJob) -> Result<(), JobError> {
    if job.access_token.trim().is_empty() {
        return Err(JobError::InvalidJob {
            reason: "access token is empty".to_string(),
        });
    }

    if job.path.split('/').all(|segment| segment.is_empty()) {
        return Err(JobError::InvalidJob {
            reason: "destination path is empty".to_string(),
        });
    }

    match Url::parse(&job.source_url) {
        Ok(url) if url.has_host() => Ok(()),
        Ok(_) => Err(JobError::InvalidJob {
            reason: format!("source url {} has no host", job.source_url),
        }),
        Err(e) => Err(JobError::InvalidJob {
            reason: format!("source url {} is not absolute: {e}", job.source_url),
        }),
    }
}

fn classify(response: &HttpResponse) -> Result<JobResult, JobError> {
    let parsed: SaveUrlResponse =
        serde_json::from_slice(&response.body).map_err(|e| JobError::MalformedResponse {
            status: response.status,
            reason: e.to_string(),
        })?;

    if let Some(error) = parsed.error {
        let message = match error {
            serde_json::Value::String(message) => message,
            other => other.to_string(),
        };

        return if message.contains(LOCK_CONTENTION_MARKER) {
            Err(JobError::TransientLock(message))
        } else {
            Err(JobError::Permanent(message))
        };
    }

    match parsed.job {
        Some(job_id) => Ok(JobResult::Pending { job_id }),
        None => Err(JobError::MalformedResponse {
            status: response.status,
            reason: "response has neither a job id nor an error".to_string(),
        }),
    }
}
