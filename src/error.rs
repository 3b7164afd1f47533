use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when submitting a save-url job to the storage provider
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Invalid job: {reason}")]
    InvalidJob { reason: String },

    #[error("Job request to {url} failed: {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Malformed provider response (HTTP {status}): {reason}")]
    MalformedResponse { status: u16, reason: String },

    #[error("Provider is busy: {0}")]
    TransientLock(String),

    #[error("Provider rejected job: {0}")]
    Permanent(String),

    #[error("Provider still locked after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Job submission cancelled after {retries} retries")]
    Cancelled { retries: u32 },
}

impl JobError {
    /// Whether the provider signalled a lock conflict that clears on its own
    pub fn is_transient(&self) -> bool {
        matches!(self, JobError::TransientLock(_))
    }
}

/// Errors raised by the dedup cache and counter store backends
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open Redis client for {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: redis::RedisError,
    },

    #[error("Redis connection failed: {source}")]
    Connection {
        #[source]
        source: redis::RedisError,
    },

    #[error("Redis {command} failed: {source}")]
    Command {
        command: &'static str,
        #[source]
        source: redis::RedisError,
    },

    #[error("Store unavailable after {attempts} reconnect attempts")]
    Unavailable { attempts: u32 },
}

/// Errors from the provider's account and OAuth endpoints
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Request to {url} failed: {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Unexpected provider response (HTTP {status})")]
    UnexpectedResponse { status: u16 },

    #[error("Invalid provider URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Errors from the durable credential store
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("No user with id {0}")]
    UserNotFound(String),

    #[error("User {0} has not linked a storage provider")]
    NotLinked(String),
}

/// Errors that can occur when loading a list of liked media
#[derive(Error, Debug)]
pub enum MediaListError {
    #[error("Failed to read media list {path}: {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse media list: {0}")]
    ParseFailed(#[from] serde_json::Error),

    #[error("Media item '{id}' has an invalid url: {source}")]
    InvalidUrl {
        id: String,
        #[source]
        source: url::ParseError,
    },
}

/// Top-level errors for sync operations
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("All submissions failed")]
    AllSubmissionsFailed,
}
