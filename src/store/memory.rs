use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StoreError;

use super::{
    CounterStore, DedupCache, InsertMode, RetentionPolicy, SavedMediaEntry, now_score,
};

#[derive(Debug, Default)]
struct Counters {
    per_user: HashMap<String, u64>,
    total: u64,
}

/// In-process dedup cache and counter store
///
/// Orders ids the way a Redis sorted set does: by score, then by member.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sets: Mutex<HashMap<String, HashMap<String, i64>>>,
    counters: Mutex<Counters>,
    retention: RetentionPolicy,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: RetentionPolicy) -> Self {
        Self {
            retention,
            ..Default::default()
        }
    }
}

/// Entries of one set, newest first
fn newest_first(set: &HashMap<String, i64>) -> Vec<(&String, i64)> {
    let mut entries: Vec<(&String, i64)> = set.iter().map(|(id, score)| (id, *score)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(a.0)));
    entries
}

#[async_trait]
impl DedupCache for MemoryStore {
    async fn contains(&self, user_id: &str, media_id: &str) -> Result<bool, StoreError> {
        let found = self
            .sets
            .lock()
            .await
            .get(user_id)
            .is_some_and(|set| set.contains_key(media_id));

        debug!(user_id, media_id, hit = found, "Dedup lookup");
        Ok(found)
    }

    async fn insert(
        &self,
        user_id: &str,
        media_ids: &[&str],
        mode: InsertMode,
    ) -> Result<(), StoreError> {
        let mut sets = self.sets.lock().await;
        // Stamped under the lock: the last writer carries the latest score
        let score = now_score();

        if mode == InsertMode::Replace {
            let fresh: HashMap<String, i64> =
                media_ids.iter().map(|id| (id.to_string(), score)).collect();
            if fresh.is_empty() {
                sets.remove(user_id);
            } else {
                sets.insert(user_id.to_string(), fresh);
            }
            return Ok(());
        }

        if media_ids.is_empty() {
            return Ok(());
        }

        let set = sets.entry(user_id.to_string()).or_default();
        for id in media_ids {
            set.insert(id.to_string(), score);
        }

        if let RetentionPolicy::MostRecent(limit) = self.retention
            && set.len() > limit
        {
            let keep: Vec<String> = newest_first(set)
                .into_iter()
                .take(limit)
                .map(|(id, _)| id.clone())
                .collect();
            set.retain(|id, _| keep.contains(id));
        }

        Ok(())
    }

    async fn clear(&self, user_id: &str) -> Result<(), StoreError> {
        self.sets.lock().await.remove(user_id);
        Ok(())
    }

    async fn saved(&self, user_id: &str) -> Result<Vec<SavedMediaEntry>, StoreError> {
        let sets = self.sets.lock().await;
        Ok(sets
            .get(user_id)
            .map(|set| {
                newest_first(set)
                    .into_iter()
                    .map(|(id, score)| SavedMediaEntry::from_score(user_id, id.clone(), score))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment_user(&self, user_id: &str, count: u64) -> Result<u64, StoreError> {
        let mut counters = self.counters.lock().await;
        let value = counters.per_user.entry(user_id.to_string()).or_default();
        *value += count;
        Ok(*value)
    }

    async fn increment_total(&self, count: u64) -> Result<u64, StoreError> {
        let mut counters = self.counters.lock().await;
        counters.total += count;
        Ok(counters.total)
    }

    async fn total(&self) -> Result<u64, StoreError> {
        Ok(self.counters.lock().await.total)
    }

    async fn user_total(&self, user_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .counters
            .lock()
            .await
            .per_user
            .get(user_id)
            .copied()
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn unknown_ids_are_not_contained() {
        let store = MemoryStore::new();
        assert!(!store.contains("U1", "m1").await.unwrap());

        store.insert("U1", &["m1"], InsertMode::Merge).await.unwrap();
        assert!(!store.contains("U1", "m2").await.unwrap());
        assert!(!store.contains("U2", "m1").await.unwrap());
    }

    #[tokio::test]
    async fn insert_is_visible_immediately() {
        let store = MemoryStore::new();

        store.insert("U1", &["m1"], InsertMode::Merge).await.unwrap();

        assert!(store.contains("U1", "m1").await.unwrap());
    }

    #[tokio::test]
    async fn replace_discards_previous_ids() {
        let store = MemoryStore::new();

        store
            .insert("U1", &["m1", "m2"], InsertMode::Merge)
            .await
            .unwrap();
        store
            .insert("U1", &["m3"], InsertMode::Replace)
            .await
            .unwrap();

        assert!(!store.contains("U1", "m1").await.unwrap());
        assert!(!store.contains("U1", "m2").await.unwrap());
        assert!(store.contains("U1", "m3").await.unwrap());
    }

    #[tokio::test]
    async fn replace_with_nothing_empties_set() {
        let store = MemoryStore::new();
        store.insert("U1", &["m1"], InsertMode::Merge).await.unwrap();

        store.insert("U1", &[], InsertMode::Replace).await.unwrap();

        assert!(store.saved("U1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reinsert_is_idempotent() {
        let store = MemoryStore::new();

        store.insert("U1", &["m1"], InsertMode::Merge).await.unwrap();
        store.insert("U1", &["m1"], InsertMode::Merge).await.unwrap();

        let saved = store.saved("U1").await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].media_id, "m1");
        assert_eq!(saved[0].user_id, "U1");
    }

    #[tokio::test]
    async fn clear_removes_only_that_user() {
        let store = MemoryStore::new();
        store.insert("U1", &["m1"], InsertMode::Merge).await.unwrap();
        store.insert("U2", &["m1"], InsertMode::Merge).await.unwrap();

        store.clear("U1").await.unwrap();

        assert!(!store.contains("U1", "m1").await.unwrap());
        assert!(store.contains("U2", "m1").await.unwrap());
    }

    #[tokio::test]
    async fn unbounded_by_default() {
        let store = MemoryStore::new();
        let ids: Vec<String> = (0..50).map(|i| format!("m{i}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();

        store.insert("U1", &refs, InsertMode::Merge).await.unwrap();

        assert_eq!(store.saved("U1").await.unwrap().len(), 50);
    }

    #[tokio::test]
    async fn most_recent_retention_trims_oldest() {
        let store = MemoryStore::with_retention(RetentionPolicy::MostRecent(2));

        store.insert("U1", &["a"], InsertMode::Merge).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.insert("U1", &["b"], InsertMode::Merge).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.insert("U1", &["c"], InsertMode::Merge).await.unwrap();

        let saved: Vec<String> = store
            .saved("U1")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.media_id)
            .collect();
        assert_eq!(saved, vec!["c".to_string(), "b".to_string()]);
        assert!(!store.contains("U1", "a").await.unwrap());
    }

    #[tokio::test]
    async fn increments_return_new_totals() {
        let store = MemoryStore::new();

        assert_eq!(store.total().await.unwrap(), 0);
        assert_eq!(store.increment_user("U1", 3).await.unwrap(), 3);
        assert_eq!(store.increment_user("U1", 2).await.unwrap(), 5);
        assert_eq!(store.increment_total(5).await.unwrap(), 5);
        assert_eq!(store.increment_user("U1", 0).await.unwrap(), 5);

        assert_eq!(store.user_total("U1").await.unwrap(), 5);
        assert_eq!(store.user_total("U2").await.unwrap(), 0);
        assert_eq!(store.total().await.unwrap(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_sum_exactly() {
        let store = Arc::new(MemoryStore::new());

        let handles: Vec<_> = (1..=100u64)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.increment_user("U1", i).await.unwrap();
                    store.increment_total(i).await.unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.user_total("U1").await.unwrap(), 5050);
        assert_eq!(store.total().await.unwrap(), 5050);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reinserts_keep_one_entry_with_latest_time() {
        let store = Arc::new(MemoryStore::new());
        store.insert("U1", &["m1"], InsertMode::Merge).await.unwrap();
        let first = store.saved("U1").await.unwrap()[0].synced_at;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.insert("U1", &["m1"], InsertMode::Merge).await.unwrap();
                    now_score()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }

        let saved = store.saved("U1").await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].media_id, "m1");
        assert!(saved[0].synced_at > first);
        // No writer finished after the surviving stamp was taken
        let newest_finish = finished.into_iter().max().unwrap();
        assert!(saved[0].synced_at.timestamp_millis() <= newest_finish);
    }
}
