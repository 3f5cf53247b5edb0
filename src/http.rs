//! Minimal JSON REST client
//!
//! Shared by the REST source connectors: JSON content type, optional
//! bearer-token authentication, and non-2xx responses mapped to a status
//! error carrying the response body.

use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Default timeout applied to every request
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// JSON REST client with optional bearer-token authentication
pub struct RestClient {
    client: reqwest::Client,
}

impl RestClient {
    /// Create an unauthenticated client
    pub fn new() -> Result<Self> {
        Self::with_bearer_token(None)
    }

    /// Create a client sending `Authorization: Bearer <token>` on every request
    pub fn with_bearer_token(token: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| Error::config("bearer token contains invalid header characters"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }

    /// Send a GET request and deserialize the JSON response
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.request(self.client.get(url)).await
    }

    /// Send a POST request with a JSON body and deserialize the JSON response
    pub async fn post_json<T: DeserializeOwned>(&self, url: &str, body: &Value) -> Result<T> {
        self.request(self.client.post(url).json(body)).await
    }

    async fn request<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::http_status(status.as_u16(), body));
        }
        Ok(response.json().await?)
    }
}
