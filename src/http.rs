// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

/// HTTP method used by provider requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request to the storage provider
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    /// Bearer token sent in the `Authorization` header
    pub bearer: Option<String>,
    /// Body sent as `application/x-www-form-urlencoded`
    pub form: Option<Vec<(String, String)>>,
}

impl HttpRequest {
    /// Build a GET request
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            bearer: None,
            form: None,
        }
    }

    /// Build a POST request with an empty body
    pub fn post(url: Url) -> Self {
        Self {
            method: Method::Post,
            url,
            bearer: None,
            form: None,
        }
    }

    /// Attach a bearer token
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Attach a form-encoded body
    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.form = Some(fields);
        self
    }
}

/// HTTP response with status and fully buffered body
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Bytes,
}

/// HTTP client abstraction for testability
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send a request and buffer the whole response body
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, reqwest::Error>;
}

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a new ReqwestClient with default settings
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a new ReqwestClient with a custom reqwest::Client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, reqwest::Error> {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url),
            Method::Post => self.client.post(request.url),
        };

        if let Some(token) = request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(fields) = request.form {
            builder = builder.form(&fields);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Replays canned responses in order, repeating the last one once the script runs out
    #[derive(Clone, Default)]
    pub(crate) struct ScriptedClient {
        responses: Arc<Mutex<VecDeque<(u16, String)>>>,
        last: Arc<Mutex<Option<(u16, String)>>>,
        requests: Arc<Mutex<Vec<HttpRequest>>>,
    }

    impl ScriptedClient {
        pub(crate) fn new(script: &[(u16, &str)]) -> Self {
            let client = Self::default();
            client.responses.lock().unwrap().extend(
                script
                    .iter()
                    .map(|(status, body)| (*status, body.to_string())),
            );
            client
        }

        pub(crate) fn ok(body: &str) -> Self {
            Self::new(&[(200, body)])
        }

        pub(crate) fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub(crate) fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, reqwest::Error> {
            self.requests.lock().unwrap().push(request);

            let next = self.responses.lock().unwrap().pop_front();
            let (status, body) = match next {
                Some(response) => {
                    *self.last.lock().unwrap() = Some(response.clone());
                    response
                }
                None => self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or((500, String::new())),
            };

            Ok(HttpResponse {
                status,
                body: Bytes::from(body),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reqwest_client_can_be_created() {
        let _client = ReqwestClient::new();
        let _client_default = ReqwestClient::default();
    }

    #[test]
    fn request_builder_sets_bearer_and_form() {
        let url = Url::parse("https://api.example.com/token").unwrap();
        let request = HttpRequest::post(url)
            .bearer("secret")
            .form(vec![("code".to_string(), "abc".to_string())]);

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.bearer.as_deref(), Some("secret"));
        assert_eq!(request.form.unwrap().len(), 1);
    }
}
