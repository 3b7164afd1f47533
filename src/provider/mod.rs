mod account;
mod job;
mod oauth;
mod retry;

pub use account::{AccountInfo, fetch_account};
pub use job::{JobClient, JobResult, LOCK_CONTENTION_MARKER, SyncJob};
pub use oauth::exchange_code;
pub use retry::{RetryPolicy, submit_with_retry};

use url::Url;

use crate::error::ProviderError;

/// Default base URL of the storage provider's versioned API
pub const DEFAULT_API_BASE: &str = "https://api.dropbox.com/1/";

/// Default page the user is sent to when authorizing this application
pub const DEFAULT_AUTHORIZE_URL: &str = "https://www.dropbox.com/1/oauth2/authorize";

/// Connection settings for the storage provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the versioned API, with trailing slash
    pub api_base: Url,
    /// Browser-facing authorization page
    pub authorize_url: Url,
    /// OAuth application key
    pub client_id: String,
    /// OAuth application secret
    pub client_secret: String,
    /// Redirect URI registered with the provider
    pub redirect_uri: String,
}

impl ProviderConfig {
    /// Create a config pointing at a custom API base
    ///
    /// A missing trailing slash is added so relative endpoint joins keep the version segment.
    pub fn with_api_base(api_base: &str) -> Result<Self, ProviderError> {
        let normalized = if api_base.ends_with('/') {
            api_base.to_string()
        } else {
            format!("{api_base}/")
        };

        Ok(Self {
            api_base: Url::parse(&normalized)?,
            ..Default::default()
        })
    }

    /// Resolve an endpoint relative to the API base
    pub fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        Ok(self.api_base.join(path)?)
    }

    /// Build the URL a user opens to grant this application access
    pub fn authorize_link(&self) -> Url {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri);
        url
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: Url::parse(DEFAULT_API_BASE).expect("valid default api base"),
            authorize_url: Url::parse(DEFAULT_AUTHORIZE_URL).expect("valid default authorize url"),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_base_gets_trailing_slash() {
        let config = ProviderConfig::with_api_base("http://localhost:8080/1").unwrap();
        assert_eq!(
            config.endpoint("account/info").unwrap().as_str(),
            "http://localhost:8080/1/account/info"
        );
    }

    #[test]
    fn default_endpoint_keeps_version_segment() {
        let config = ProviderConfig::default();
        assert_eq!(
            config.endpoint("oauth2/token").unwrap().as_str(),
            "https://api.dropbox.com/1/oauth2/token"
        );
    }

    #[test]
    fn authorize_link_carries_client_and_redirect() {
        let config = ProviderConfig {
            client_id: "app-key".to_string(),
            redirect_uri: "http://localhost/callback".to_string(),
            ..Default::default()
        };

        let link = config.authorize_link();
        let pairs: Vec<(String, String)> = link.query_pairs().into_owned().collect();

        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(pairs.contains(&("client_id".to_string(), "app-key".to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "http://localhost/callback".to_string()
        )));
    }
}
