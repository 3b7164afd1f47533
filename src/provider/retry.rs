use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::JobError;
use crate::http::HttpClient;

use super::job::{JobClient, JobResult, SyncJob};

/// Capped, linearly increasing retry schedule for lock-contention rejections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retry count at which submission gives up
    pub max_retries: u32,
    /// Delay unit; the n-th retry waits `base_delay * n`
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before the retry numbered `retry_count` (1-based)
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        self.base_delay * retry_count
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(300),
        }
    }
}

/// Submit a job, retrying only while the provider reports lock contention
///
/// `job.retry_count` is carried forward across attempts so callers can see how many
/// retries were consumed. Every other failure is returned after a single attempt.
pub async fn submit_with_retry<C: HttpClient>(
    client: &JobClient<C>,
    job: &mut SyncJob,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<JobResult, JobError> {
    loop {
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled {
                retries: job.retry_count,
            });
        }

        match client.submit(job).await {
            Ok(result) => {
                if job.retry_count > 0 {
                    info!(
                        path = %job.path,
                        job_id = result.job_id(),
                        retries = job.retry_count,
                        "Job accepted after retries"
                    );
                }
                return Ok(result);
            }
            Err(e) if e.is_transient() => {
                job.retry_count += 1;

                if job.retry_count >= policy.max_retries {
                    warn!(
                        path = %job.path,
                        attempts = job.retry_count,
                        "Giving up on locked job"
                    );
                    return Err(JobError::RetriesExhausted {
                        attempts: job.retry_count,
                    });
                }

                let delay = policy.delay_for(job.retry_count);
                warn!(
                    path = %job.path,
                    retry = job.retry_count,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Provider locked, retrying"
                );

                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(JobError::Cancelled { retries: job.retry_count });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}
