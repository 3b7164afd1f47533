use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::CredentialError;

/// OAuth tokens issued by the storage provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTokens {
    pub access_token: String,
    pub token_type: String,
    /// Provider-side account id
    pub uid: String,
}

/// A durable user record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredential {
    pub id: String,
    pub email: String,
    /// Opaque hash owned by the registration flow; never read here
    pub password_hash: String,
    pub provider_tokens: Option<ProviderTokens>,
}

impl UserCredential {
    /// Access token for the linked storage provider
    pub fn access_token(&self) -> Result<&str, CredentialError> {
        self.provider_tokens
            .as_ref()
            .map(|tokens| tokens.access_token.as_str())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| CredentialError::NotLinked(self.id.clone()))
    }
}

/// Read access to the durable identity store
///
/// Verifying password material is the registration layer's job; lookups here
/// only resolve records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look a user up by primary id
    async fn find_by_id(&self, id: &str) -> Result<Option<UserCredential>, CredentialError>;

    /// Look a user up by login email
    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredential>, CredentialError>;

    /// Store tokens after a successful authorization code exchange
    async fn save_provider_tokens(
        &self,
        id: &str,
        tokens: ProviderTokens,
    ) -> Result<(), CredentialError>;
}

/// In-process credential store for the CLI and tests
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    users: RwLock<HashMap<String, UserCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding the given users
    pub fn with_users(users: impl IntoIterator<Item = UserCredential>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().map(|u| (u.id.clone(), u)).collect()),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserCredential>, CredentialError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredential>, CredentialError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn save_provider_tokens(
        &self,
        id: &str,
        tokens: ProviderTokens,
    ) -> Result<(), CredentialError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(id)
            .ok_or_else(|| CredentialError::UserNotFound(id.to_string()))?;
        user.provider_tokens = Some(tokens);
        Ok(())
    }
}
