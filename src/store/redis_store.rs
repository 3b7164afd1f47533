use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError, RedisResult};
use tracing::{debug, info};
use url::Url;

use crate::connection::{ConnectionSupervisor, Connector, ReconnectPolicy};
use crate::error::StoreError;

use super::{
    CacheKeys, CounterStore, DedupCache, InsertMode, RetentionPolicy, SavedMediaEntry, now_score,
};

/// Opens multiplexed connections from a Redis client
pub struct RedisConnector {
    client: redis::Client,
}

impl RedisConnector {
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| StoreError::InvalidUrl {
            url: url.to_string(),
            source: e,
        })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Connection = MultiplexedConnection;

    async fn connect(&self) -> Result<MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection { source: e })
    }
}

/// Dedup cache and counter store backed by Redis sorted sets and integer keys
pub struct RedisStore {
    supervisor: ConnectionSupervisor<RedisConnector>,
    keys: CacheKeys,
    retention: RetentionPolicy,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("connection", &"ConnectionSupervisor")
            .field("keys", &self.keys)
            .field("retention", &self.retention)
            .finish()
    }
}

impl RedisStore {
    /// Connect to Redis, failing fast if the server cannot be reached
    pub async fn connect(
        url: &str,
        keys: CacheKeys,
        retention: RetentionPolicy,
        reconnect: ReconnectPolicy,
    ) -> Result<Self, StoreError> {
        info!("Connecting to Redis cache at {}", redact_url(url));

        let supervisor = ConnectionSupervisor::new(RedisConnector::open(url)?, reconnect);
        supervisor.get().await?;

        Ok(Self {
            supervisor,
            keys,
            retention,
        })
    }

    /// Run one command, dropping the connection if it failed at the transport level
    async fn run<T, F, Fut>(&self, command: &'static str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.supervisor.get().await?;

        match f(conn).await {
            Ok(value) => Ok(value),
            Err(e) => {
                if is_connection_error(&e) {
                    self.supervisor.mark_disconnected();
                }
                Err(StoreError::Command { command, source: e })
            }
        }
    }
}

fn is_connection_error(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal()
}

/// Strip credentials from a connection URL before it reaches the logs
fn redact_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}

/// Build the MULTI/EXEC batch for an insert, or None when there is nothing to write
fn insert_pipeline(
    key: &str,
    media_ids: &[&str],
    mode: InsertMode,
    retention: RetentionPolicy,
    score: i64,
) -> Option<redis::Pipeline> {
    if media_ids.is_empty() && mode == InsertMode::Merge {
        return None;
    }

    let mut pipe = redis::pipe();
    pipe.atomic();

    if mode == InsertMode::Replace {
        pipe.del(key).ignore();
    }

    if !media_ids.is_empty() {
        let members: Vec<(i64, &str)> = media_ids.iter().map(|id| (score, *id)).collect();
        pipe.zadd_multiple(key, &members[..]).ignore();

        if mode == InsertMode::Merge
            && let RetentionPolicy::MostRecent(limit) = retention
        {
            // Ranks ascend by score, so this drops everything below the newest `limit`
            let stop = -(limit as isize) - 1;
            pipe.zremrangebyrank(key, 0, stop).ignore();
        }
    }

    Some(pipe)
}

fn clamp(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[async_trait]
impl DedupCache for RedisStore {
    async fn contains(&self, user_id: &str, media_id: &str) -> Result<bool, StoreError> {
        let key = self.keys.saved_set(user_id);

        let score: Option<f64> = self
            .run("ZSCORE", |mut conn| async move { conn.zscore(&key, media_id).await })
            .await?;

        debug!(user_id, media_id, hit = score.is_some(), "Dedup lookup");
        Ok(score.is_some())
    }

    async fn insert(
        &self,
        user_id: &str,
        media_ids: &[&str],
        mode: InsertMode,
    ) -> Result<(), StoreError> {
        let key = self.keys.saved_set(user_id);
        let Some(pipe) = insert_pipeline(&key, media_ids, mode, self.retention, now_score())
        else {
            return Ok(());
        };

        debug!(user_id, count = media_ids.len(), ?mode, "Dedup insert");
        self.run("MULTI/EXEC", |mut conn| async move {
            pipe.query_async::<()>(&mut conn).await
        })
        .await
    }

    async fn clear(&self, user_id: &str) -> Result<(), StoreError> {
        let key = self.keys.saved_set(user_id);

        self.run("DEL", |mut conn| async move { conn.del::<_, ()>(&key).await })
            .await
    }

    async fn saved(&self, user_id: &str) -> Result<Vec<SavedMediaEntry>, StoreError> {
        let key = self.keys.saved_set(user_id);

        let entries: Vec<(String, f64)> = self
            .run("ZREVRANGE", |mut conn| async move {
                conn.zrevrange_withscores(&key, 0, -1).await
            })
            .await?;

        Ok(entries
            .into_iter()
            .map(|(id, score)| SavedMediaEntry::from_score(user_id, id, score as i64))
            .collect())
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment_user(&self, user_id: &str, count: u64) -> Result<u64, StoreError> {
        let key = self.keys.saved_count(user_id);

        let value: i64 = self
            .run("INCRBY", |mut conn| async move { conn.incr(&key, count).await })
            .await?;

        Ok(clamp(value))
    }

    async fn increment_total(&self, count: u64) -> Result<u64, StoreError> {
        let key = self.keys.total_saved();

        let value: i64 = self
            .run("INCRBY", |mut conn| async move { conn.incr(&key, count).await })
            .await?;

        Ok(clamp(value))
    }

    async fn total(&self) -> Result<u64, StoreError> {
        let key = self.keys.total_saved();

        let value: Option<i64> = self
            .run("GET", |mut conn| async move { conn.get(&key).await })
            .await?;

        Ok(value.map(clamp).unwrap_or(0))
    }

    async fn user_total(&self, user_id: &str) -> Result<u64, StoreError> {
        let key = self.keys.saved_count(user_id);

        let value: Option<i64> = self
            .run("GET", |mut conn| async move { conn.get(&key).await })
            .await?;

        Ok(value.map(clamp).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed(pipe: &redis::Pipeline) -> String {
        String::from_utf8_lossy(&pipe.get_packed_pipeline()).into_owned()
    }

    #[test]
    fn malformed_url_is_rejected() {
        let err = RedisConnector::open("not a redis url").err().unwrap();
        assert!(matches!(err, StoreError::InvalidUrl { .. }));
    }

    #[test]
    fn negative_counters_clamp_to_zero() {
        assert_eq!(clamp(-3), 0);
        assert_eq!(clamp(7), 7);
    }

    #[test]
    fn password_is_redacted_from_logged_url() {
        let redacted = redact_url("redis://:hunter2@cache.internal:6379/0");
        assert!(!redacted.contains("hunter2"));
        assert!(redacted.contains("cache.internal:6379"));

        assert_eq!(
            redact_url("redis://127.0.0.1:6379/"),
            "redis://127.0.0.1:6379/"
        );
    }

    #[test]
    fn empty_merge_writes_nothing() {
        let pipe = insert_pipeline("k", &[], InsertMode::Merge, RetentionPolicy::Unbounded, 1);
        assert!(pipe.is_none());
    }

    #[test]
    fn empty_replace_only_deletes() {
        let pipe = insert_pipeline("k", &[], InsertMode::Replace, RetentionPolicy::Unbounded, 1)
            .unwrap();
        let packed = packed(&pipe);

        assert!(packed.contains("MULTI"));
        assert!(packed.contains("DEL"));
        assert!(!packed.contains("ZADD"));
        assert!(packed.contains("EXEC"));
    }

    #[test]
    fn replace_deletes_before_adding() {
        let pipe = insert_pipeline(
            "likesync:saved:U1",
            &["m1", "m2"],
            InsertMode::Replace,
            RetentionPolicy::MostRecent(2),
            1_700_000_000_000,
        )
        .unwrap();
        let packed = packed(&pipe);

        let del = packed.find("DEL").unwrap();
        let zadd = packed.find("ZADD").unwrap();
        assert!(del < zadd);
        assert!(packed.contains("1700000000000"));
        assert!(packed.contains("m2"));
        // Replace already fixes the set exactly
        assert!(!packed.contains("ZREMRANGEBYRANK"));
    }

    #[test]
    fn bounded_merge_trims_below_newest() {
        let pipe = insert_pipeline(
            "likesync:saved:U1",
            &["m1"],
            InsertMode::Merge,
            RetentionPolicy::MostRecent(2),
            1,
        )
        .unwrap();
        let packed = packed(&pipe);

        assert!(!packed.contains("DEL"));
        assert!(packed.contains("ZREMRANGEBYRANK"));
        // Keeps ranks -2..-1, removes 0..-3
        assert!(packed.contains("$1\r\n0\r\n$2\r\n-3\r\n"));
    }

    #[test]
    fn unbounded_merge_never_trims() {
        let pipe = insert_pipeline("k", &["m1"], InsertMode::Merge, RetentionPolicy::Unbounded, 1)
            .unwrap();
        assert!(!packed(&pipe).contains("ZREMRANGEBYRANK"));
    }

    /// Runs against a live server, e.g.
    /// `LIKESYNC_TEST_REDIS_URL=redis://127.0.0.1/15 cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn round_trip_against_live_redis() {
        let url = std::env::var("LIKESYNC_TEST_REDIS_URL")
            .expect("LIKESYNC_TEST_REDIS_URL must point at a disposable Redis database");
        let prefix = format!("likesync-test-{}", now_score());
        let store = RedisStore::connect(
            &url,
            CacheKeys::new(prefix),
            RetentionPolicy::MostRecent(2),
            ReconnectPolicy::default(),
        )
        .await
        .unwrap();

        assert!(!store.contains("U1", "m1").await.unwrap());
        store.insert("U1", &[], InsertMode::Merge).await.unwrap();

        store
            .insert("U1", &["m1", "m2"], InsertMode::Merge)
            .await
            .unwrap();
        store
            .insert("U1", &["m3"], InsertMode::Replace)
            .await
            .unwrap();
        assert!(!store.contains("U1", "m1").await.unwrap());
        assert!(store.contains("U1", "m3").await.unwrap());

        // Later scores push m3 out under MostRecent(2)
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .insert("U1", &["m4", "m5"], InsertMode::Merge)
            .await
            .unwrap();
        let saved = store.saved("U1").await.unwrap();
        assert_eq!(saved.len(), 2);
        assert!(!store.contains("U1", "m3").await.unwrap());

        store.insert("U1", &[], InsertMode::Replace).await.unwrap();
        assert!(store.saved("U1").await.unwrap().is_empty());

        assert_eq!(store.increment_user("U1", 2).await.unwrap(), 2);
        assert_eq!(store.user_total("U1").await.unwrap(), 2);
        assert_eq!(store.increment_total(2).await.unwrap(), 2);
        assert_eq!(store.total().await.unwrap(), 2);

        store.insert("U1", &["m6"], InsertMode::Merge).await.unwrap();
        store.clear("U1").await.unwrap();
        assert!(store.saved("U1").await.unwrap().is_empty());
    }
}
