use serde::Deserialize;
use tracing::debug;

use crate::error::ProviderError;
use crate::http::{HttpClient, HttpRequest};

use super::ProviderConfig;

/// Identity of the storage account behind an access token
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountInfo {
    #[serde(deserialize_with = "uid_as_string")]
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: serde_json::Value,
}

/// Check that a token is valid by fetching the account it belongs to
pub async fn fetch_account<C: HttpClient>(
    client: &C,
    config: &ProviderConfig,
    access_token: &str,
) -> Result<AccountInfo, ProviderError> {
    let url = config.endpoint("account/info")?;

    let response = client
        .send(HttpRequest::get(url.clone()).bearer(access_token))
        .await
        .map_err(|e| ProviderError::RequestFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status == 200
        && let Ok(account) = serde_json::from_slice::<AccountInfo>(&response.body)
    {
        debug!(uid = %account.uid, "Provider account verified");
        return Ok(account);
    }

    match serde_json::from_slice::<ErrorBody>(&response.body) {
        Ok(body) => Err(ProviderError::NotAuthorized(error_message(body.error))),
        Err(_) => Err(ProviderError::UnexpectedResponse {
            status: response.status,
        }),
    }
}

pub(super) fn error_message(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(message) => message,
        other => other.to_string(),
    }
}

/// The provider reports `uid` as a number; tokens and ids elsewhere are strings.
pub(super) fn uid_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(uid) => Ok(uid),
        serde_json::Value::Number(uid) => Ok(uid.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "uid must be a string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::http::testing::ScriptedClient;

    #[tokio::test]
    async fn returns_account_for_valid_token() {
        let http = ScriptedClient::ok(
            r#"{"uid": 12345, "display_name": "Ada", "email": "ada@example.com"}"#,
        );

        let account = fetch_account(&http, &ProviderConfig::default(), "tok")
            .await
            .unwrap();

        assert_eq!(account.uid, "12345");
        assert_eq!(account.display_name.as_deref(), Some("Ada"));

        let request = &http.requests()[0];
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.url.path(), "/1/account/info");
        assert_eq!(request.bearer.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn error_field_means_not_authorized() {
        let http = ScriptedClient::new(&[(401, r#"{"error": "Invalid OAuth token"}"#)]);

        let err = fetch_account(&http, &ProviderConfig::default(), "bad")
            .await
            .unwrap_err();

        match err {
            ProviderError::NotAuthorized(message) => assert_eq!(message, "Invalid OAuth token"),
            other => panic!("Expected NotAuthorized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ok_status_without_uid_is_rejected() {
        let http = ScriptedClient::ok(r#"{"error": "App not installed"}"#);

        let err = fetch_account(&http, &ProviderConfig::default(), "tok")
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::NotAuthorized(_)));
    }

    #[tokio::test]
    async fn garbage_body_is_unexpected() {
        let http = ScriptedClient::new(&[(502, "bad gateway")]);

        let err = fetch_account(&http, &ProviderConfig::default(), "tok")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProviderError::UnexpectedResponse { status: 502 }
        ));
    }
}
