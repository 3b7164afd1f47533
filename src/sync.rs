// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::credentials::CredentialStore;
use crate::error::{CredentialError, StoreError, SyncError};
use crate::http::HttpClient;
use crate::media::{MediaItem, destination_path};
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::provider::{JobClient, RetryPolicy, SyncJob, submit_with_retry};
use crate::store::{CounterStore, DedupCache, InsertMode};

/// Options for a liked-media sync
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Folder in the user's storage that receives the files
    pub folder: String,
    /// Maximum number of items to submit (None = all)
    pub limit: Option<usize>,
    /// Maximum number of concurrent submissions
    pub max_concurrent: usize,
    /// Keep submitting if individual items fail
    pub continue_on_error: bool,
    /// Lock-contention retry schedule
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            folder: "/Likes".to_string(),
            limit: None,
            max_concurrent: 3,
            continue_on_error: true,
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of a sync operation
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Number of items the provider accepted
    pub submitted: usize,
    /// Number of items skipped (already synced or repeated in the batch)
    pub skipped: usize,
    /// Number of items that failed to submit
    pub failed: usize,
    /// Details of failed items (media id, error message)
    pub failed_items: Vec<(String, String)>,
    /// The user's saved count after this run
    pub user_total: u64,
}

/// Collaborators a sync run needs
#[derive(Clone)]
pub struct SyncContext<C> {
    pub jobs: JobClient<C>,
    pub credentials: Arc<dyn CredentialStore>,
    pub cache: Arc<dyn DedupCache>,
    pub counters: Arc<dyn CounterStore>,
    pub reporter: SharedProgressReporter,
}

/// Mirror a user's liked media into their storage provider
///
/// This is the main entry point for the library. It:
/// 1. Resolves the user's provider access token
/// 2. Drops items already recorded in the dedup cache
/// 3. Submits new items in parallel through the retry policy
/// 4. Records each accepted item in the dedup cache and counters
///
/// A datastore failure stops the remaining submissions and is returned as an error;
/// provider failures are scoped to their item and collected in the report.
pub async fn sync_liked_media<C: HttpClient + Clone + 'static>(
    ctx: &SyncContext<C>,
    user_id: &str,
    items: Vec<MediaItem>,
    options: &SyncOptions,
    cancel: CancellationToken,
) -> Result<SyncReport, SyncError> {
    let user = ctx
        .credentials
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| CredentialError::UserNotFound(user_id.to_string()))?;
    let access_token = user.access_token()?.to_string();

    // Sync plan: keep only items the dedup cache has not seen, once per id
    let total_items = items.len();
    let mut seen = HashSet::new();
    let mut new_items = Vec::new();
    for item in items {
        if !seen.insert(item.id.clone()) {
            debug!(user_id, media_id = %item.id, "Duplicate id in batch");
            continue;
        }
        if !ctx.cache.contains(user_id, &item.id).await? {
            new_items.push(item);
        }
    }

    let new_count = new_items.len();
    let skipped = total_items - new_count;
    let to_submit: Vec<MediaItem> = match options.limit {
        Some(limit) => new_items.into_iter().take(limit).collect(),
        None => new_items,
    };

    info!(
        user_id,
        total = total_items,
        new = new_count,
        submitting = to_submit.len(),
        "Sync plan ready"
    );
    ctx.reporter.report(ProgressEvent::SyncPlanReady {
        user_id: user_id.to_string(),
        total_items,
        new_items: new_count,
        to_submit: to_submit.len(),
    });

    // Slot pool bounds concurrency and gives each running submission a stable id
    let max_concurrent = options.max_concurrent.max(1);
    let (slot_tx, mut slot_rx) = tokio::sync::mpsc::channel(max_concurrent);
    for slot in 0..max_concurrent {
        let _ = slot_tx.send(slot).await;
    }

    let run_cancel = cancel.child_token();
    let failed_items = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();

    for (item_index, item) in to_submit.into_iter().enumerate() {
        let Some(slot_id) = slot_rx.recv().await else {
            break;
        };

        let slot_tx = slot_tx.clone();
        let ctx = ctx.clone();
        let user_id = user_id.to_string();
        let access_token = access_token.clone();
        let path = destination_path(&options.folder, &item);
        let retry = options.retry;
        let continue_on_error = options.continue_on_error;
        let run_cancel = run_cancel.clone();
        let failed_items = failed_items.clone();
        let media_id = item.id.clone();

        let handle = tokio::spawn(async move {
            let _slot = SlotReturn { tx: slot_tx, slot_id };

            ctx.reporter.report(ProgressEvent::SubmissionStarting {
                slot_id,
                media_id: item.id.clone(),
                item_index,
                path: path.clone(),
                caption: item.caption.clone(),
            });

            let mut job = SyncJob::new(access_token, path, item.url.as_str());
            let result = submit_with_retry(&ctx.jobs, &mut job, &retry, &run_cancel).await;

            match result {
                Ok(accepted) => {
                    let recorded = record_saved(&ctx, &user_id, &item.id).await;
                    match recorded {
                        Ok(()) => {
                            ctx.reporter.report(ProgressEvent::SubmissionAccepted {
                                slot_id,
                                media_id: item.id.clone(),
                                job_id: accepted.job_id().to_string(),
                                retries: job.retry_count,
                            });
                            Ok(true)
                        }
                        Err(e) => {
                            error!(user_id = %user_id, media_id = %item.id, error = %e, "Failed to record synced item");
                            run_cancel.cancel();
                            Err(e)
                        }
                    }
                }
                Err(e) => {
                    ctx.reporter.report(ProgressEvent::SubmissionFailed {
                        slot_id,
                        media_id: item.id.clone(),
                        error: e.to_string(),
                    });
                    failed_items
                        .lock()
                        .await
                        .push((item.id.clone(), e.to_string()));

                    if !continue_on_error {
                        run_cancel.cancel();
                    }
                    Ok(false)
                }
            }
        });

        handles.push((media_id, handle));
    }

    let (media_ids, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    let outcomes = futures::future::join_all(handles).await;

    let mut submitted = 0;
    let mut store_error: Option<StoreError> = None;
    for (media_id, outcome) in media_ids.into_iter().zip(outcomes) {
        match outcome {
            Ok(Ok(true)) => submitted += 1,
            Ok(Ok(false)) => {}
            Ok(Err(e)) => {
                store_error.get_or_insert(e);
            }
            Err(e) => {
                error!(media_id = %media_id, error = %e, "Submission task failed");
                failed_items.lock().await.push((media_id, e.to_string()));
            }
        }
    }

    if let Some(e) = store_error {
        return Err(e.into());
    }

    let failed_items = failed_items.lock().await.clone();
    let failed = failed_items.len();

    ctx.reporter.report(ProgressEvent::SyncCompleted {
        submitted_count: submitted,
        skipped_count: skipped,
        failed_count: failed,
    });

    if submitted == 0 && failed > 0 && !options.continue_on_error {
        return Err(SyncError::AllSubmissionsFailed);
    }

    let user_total = ctx.counters.user_total(user_id).await?;
    info!(user_id, submitted, skipped, failed, user_total, "Sync finished");

    Ok(SyncReport {
        submitted,
        skipped,
        failed,
        failed_items,
        user_total,
    })
}

/// Returns a slot to the pool when its submission ends, even by panic
struct SlotReturn {
    tx: tokio::sync::mpsc::Sender<usize>,
    slot_id: usize,
}

impl Drop for SlotReturn {
    fn drop(&mut self) {
        // Capacity equals the slot count, so there is always room
        let _ = self.tx.try_send(self.slot_id);
    }
}

/// Mark an accepted item as synced, then bump the counters
async fn record_saved<C>(
    ctx: &SyncContext<C>,
    user_id: &str,
    media_id: &str,
) -> Result<(), StoreError> {
    ctx.cache
        .insert(user_id, &[media_id], InsertMode::Merge)
        .await?;
    ctx.counters.increment_user(user_id, 1).await?;
    ctx.counters.increment_total(1).await?;
    Ok(())
}

/// Forget a user's sync history after they revoke access to the source service
pub async fn unlink_user(cache: &dyn DedupCache, user_id: &str) -> Result<(), StoreError> {
    cache.clear(user_id).await?;
    info!(user_id, "Cleared sync history");
    Ok(())
}
