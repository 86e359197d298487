//! HTTP client for the Guepard REST API

use super::error::ApiError;
use super::ResourceApi;
use crate::models::{ResourceKind, ResourceState};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

/// Default base URL of the Guepard API
pub const DEFAULT_API_URL: &str = "https://api.guepard.run";

/// Authenticated client for the Guepard platform.
///
/// Every call returns the decoded JSON body; non-2xx statuses become
/// `ApiError`s instead of error-shaped JSON.
#[derive(Clone)]
pub struct GuepardClient {
    client: Client,
    api_url: String,
    access_token: String,
}

impl GuepardClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `api_url` - Base URL, e.g. "https://api.guepard.run"
    /// * `access_token` - Bearer token sent with every request
    pub fn new(api_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Whether a token is configured at all.
    pub fn has_token(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// Token with everything past the first 20 characters elided, for display.
    pub fn masked_token(&self) -> String {
        let prefix: String = self.access_token.chars().take(20).collect();
        format!("{}...", prefix)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        let request = self.client.get(self.endpoint(path)).query(query);
        self.send(request).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        let request = self.client.post(self.endpoint(path)).json(body);
        self.send(request).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        let request = self.client.put(self.endpoint(path)).json(body);
        self.send(request).await
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, ApiError> {
        let response = request
            .bearer_auth(&self.access_token)
            .header("content-type", "application/json")
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }

        let text = response.text().await.unwrap_or_default();

        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(text));
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                code: status.as_u16(),
                message: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl ResourceApi for GuepardClient {
    async fn fetch(&self, kind: ResourceKind, id: &str) -> Result<ResourceState, ApiError> {
        let body = match kind {
            ResourceKind::Deployment => self.get(&format!("/deploy/{}", id), &[]).await?,
        };
        ResourceState::from_value(body).ok_or_else(|| {
            ApiError::InvalidResponse(format!("{} {} is not a JSON object", kind.as_str(), id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_slashes() {
        let client = GuepardClient::new("https://api.example.test/", "token");
        assert_eq!(client.api_url(), "https://api.example.test");
        assert_eq!(
            client.endpoint("/deploy/abc"),
            "https://api.example.test/deploy/abc"
        );
        assert_eq!(client.endpoint("deploy"), "https://api.example.test/deploy");
    }

    #[test]
    fn test_masked_token() {
        let client = GuepardClient::new(DEFAULT_API_URL, "abcdefghijklmnopqrstuvwxyz");
        assert_eq!(client.masked_token(), "abcdefghijklmnopqrst...");
        assert!(client.has_token());
        assert!(!GuepardClient::new(DEFAULT_API_URL, "").has_token());
    }
}
