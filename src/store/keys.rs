/// Prefix shared by every key this application writes
pub const DEFAULT_KEY_PREFIX: &str = "likesync";

/// Key layout in the cache namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    prefix: String,
}

impl CacheKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Sorted set of media ids synced for a user, scored by sync time
    pub fn saved_set(&self, user_id: &str) -> String {
        format!("{}:saved:{user_id}", self.prefix)
    }

    /// Number of items synced for a user
    pub fn saved_count(&self, user_id: &str) -> String {
        format!("{}:saved_count:{user_id}", self.prefix)
    }

    /// Number of items synced across all users
    pub fn total_saved(&self) -> String {
        format!("{}:total_saved", self.prefix)
    }
}

impl Default for CacheKeys {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}
