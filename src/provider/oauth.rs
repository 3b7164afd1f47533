use serde::Deserialize;
use tracing::info;

use crate::credentials::ProviderTokens;
use crate::error::ProviderError;
use crate::http::{HttpClient, HttpRequest};

use super::ProviderConfig;
use super::account::{error_message, uid_as_string};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(deserialize_with = "uid_as_string")]
    uid: String,
}

#[derive(Debug, Deserialize)]
struct TokenError {
    error: serde_json::Value,
    #[serde(default)]
    error_description: Option<String>,
}

/// Trade an authorization code for an access token
pub async fn exchange_code<C: HttpClient>(
    client: &C,
    config: &ProviderConfig,
    code: &str,
) -> Result<ProviderTokens, ProviderError> {
    let url = config.endpoint("oauth2/token")?;

    let form = vec![
        ("client_id".to_string(), config.client_id.clone()),
        ("client_secret".to_string(), config.client_secret.clone()),
        ("grant_type".to_string(), "authorization_code".to_string()),
        ("redirect_uri".to_string(), config.redirect_uri.clone()),
        ("code".to_string(), code.to_string()),
    ];

    let response = client
        .send(HttpRequest::post(url.clone()).form(form))
        .await
        .map_err(|e| ProviderError::RequestFailed {
            url: url.to_string(),
            source: e,
        })?;

    if let Ok(token) = serde_json::from_slice::<TokenResponse>(&response.body) {
        info!(uid = %token.uid, "Authorization code exchanged");
        return Ok(ProviderTokens {
            access_token: token.access_token,
            token_type: token.token_type.unwrap_or_else(|| "bearer".to_string()),
            uid: token.uid,
        });
    }

    match serde_json::from_slice::<TokenError>(&response.body) {
        Ok(body) => Err(ProviderError::NotAuthorized(
            body.error_description
                .unwrap_or_else(|| error_message(body.error)),
        )),
        Err(_) => Err(ProviderError::UnexpectedResponse {
            status: response.status,
        }),
    }
}
