mod keys;
mod memory;
mod redis_store;

pub use keys::{CacheKeys, DEFAULT_KEY_PREFIX};
pub use memory::MemoryStore;
pub use redis_store::{RedisConnector, RedisStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// How an insert treats the user's existing set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InsertMode {
    /// Upsert each id, refreshing the timestamp of ids already present
    #[default]
    Merge,
    /// Atomically discard the existing set and keep exactly the given ids
    Replace,
}

/// Bound applied to a user's saved set after a merge insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetentionPolicy {
    #[default]
    Unbounded,
    /// Keep only the `n` most recently synced ids
    MostRecent(usize),
}

/// A media item recorded as synced for a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedMediaEntry {
    pub user_id: String,
    pub media_id: String,
    pub synced_at: DateTime<Utc>,
}

impl SavedMediaEntry {
    pub(crate) fn from_score(user_id: &str, media_id: String, score_ms: i64) -> Self {
        Self {
            user_id: user_id.to_string(),
            media_id,
            synced_at: DateTime::from_timestamp_millis(score_ms).unwrap_or_default(),
        }
    }
}

/// Per-user record of media already synced, ordered by sync time
#[async_trait]
pub trait DedupCache: Send + Sync {
    /// Whether `media_id` has been synced for `user_id`
    async fn contains(&self, user_id: &str, media_id: &str) -> Result<bool, StoreError>;

    /// Record `media_ids` as synced now
    async fn insert(
        &self,
        user_id: &str,
        media_ids: &[&str],
        mode: InsertMode,
    ) -> Result<(), StoreError>;

    /// Forget everything synced for `user_id`
    async fn clear(&self, user_id: &str) -> Result<(), StoreError>;

    /// List the user's saved entries, newest first
    async fn saved(&self, user_id: &str) -> Result<Vec<SavedMediaEntry>, StoreError>;
}

/// Running totals of synced items
///
/// Increments return the counter's value after the increment.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn increment_user(&self, user_id: &str, count: u64) -> Result<u64, StoreError>;

    async fn increment_total(&self, count: u64) -> Result<u64, StoreError>;

    /// System-wide total; zero when nothing was ever counted
    async fn total(&self) -> Result<u64, StoreError>;

    /// Total for one user; zero when nothing was ever counted
    async fn user_total(&self, user_id: &str) -> Result<u64, StoreError>;
}

/// Current time as a sorted-set score
pub(crate) fn now_score() -> i64 {
    Utc::now().timestamp_millis()
}
