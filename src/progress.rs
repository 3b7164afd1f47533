use std::sync::Arc;

/// Events emitted during a liked-media sync for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// New items were separated from already-synced ones
    SyncPlanReady {
        user_id: String,
        total_items: usize,
        new_items: usize,
        /// Number that will be submitted after applying the limit
        to_submit: usize,
    },

    /// A save-url job is being submitted
    SubmissionStarting {
        /// Identifies the submission slot (0 to max_concurrent-1)
        slot_id: usize,
        media_id: String,
        /// Index of this item in the submission queue
        item_index: usize,
        path: String,
        caption: Option<String>,
    },

    /// The provider accepted a job
    SubmissionAccepted {
        slot_id: usize,
        media_id: String,
        job_id: String,
        /// Lock-contention retries consumed before acceptance
        retries: u32,
    },

    /// A job could not be submitted
    SubmissionFailed {
        slot_id: usize,
        media_id: String,
        error: String,
    },

    /// Sync operation completed
    SyncCompleted {
        submitted_count: usize,
        skipped_count: usize,
        failed_count: usize,
    },
}

/// Trait for reporting progress events during synchronization.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
