pub mod connection;
pub mod credentials;
pub mod error;
pub mod http;
pub mod media;
pub mod progress;
pub mod provider;
pub mod store;
pub mod sync;

// Re-export main types for convenience
pub use connection::{ConnectionState, ConnectionSupervisor, Connector, ReconnectPolicy};
pub use credentials::{CredentialStore, MemoryCredentialStore, ProviderTokens, UserCredential};
pub use error::{CredentialError, JobError, MediaListError, ProviderError, StoreError, SyncError};
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient};
pub use media::{MediaItem, destination_path, parse_media_list, read_media_list};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use provider::{
    AccountInfo, JobClient, JobResult, ProviderConfig, RetryPolicy, SyncJob, exchange_code,
    fetch_account, submit_with_retry,
};
pub use store::{
    CacheKeys, CounterStore, DedupCache, InsertMode, MemoryStore, RedisStore, RetentionPolicy,
    SavedMediaEntry,
};
pub use sync::{SyncContext, SyncOptions, SyncReport, sync_liked_media, unlink_user};
