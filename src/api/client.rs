//! HTTP client with bearer auth and client identification headers.
//!
//! All requests include `X-Client-Type: casalink-sync` and the configured
//! `X-Client-Id` so the backend can attribute replayed writes to a device.

use reqwest::{Client, Response};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const CLIENT_TYPE: &str = "casalink-sync";

/// HTTP client wrapper for the hosted document store.
///
/// Manages base URL and access token. The token itself comes from the hosted
/// auth provider; this client only attaches it.
pub struct ApiClient {
    client: Client,
    base_url: String,
    client_id: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    /// Create a new API client with the given base URL and device identifier.
    pub fn new(base_url: &str, client_id: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Store the access token for authenticated requests.
    pub async fn set_access_token(&self, token: String) {
        let mut guard = self.access_token.write().await;
        *guard = Some(token);
    }

    /// Send an authenticated POST request with a JSON body to a relative API path.
    pub async fn authenticated_post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, reqwest::Error> {
        let url = format!("{}{}", self.base_url, path);
        let token = self.access_token.read().await;

        let mut builder = self
            .client
            .post(&url)
            .header("X-Client-Type", CLIENT_TYPE)
            .header("X-Client-Id", &self.client_id)
            .json(body);

        if let Some(ref t) = *token {
            builder = builder.bearer_auth(t);
        }

        builder.send().await
    }

    /// Send an authenticated PATCH request with a JSON body to a relative API path.
    pub async fn authenticated_patch<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, reqwest::Error> {
        let url = format!("{}{}", self.base_url, path);
        let token = self.access_token.read().await;

        let mut builder = self
            .client
            .patch(&url)
            .header("X-Client-Type", CLIENT_TYPE)
            .header("X-Client-Id", &self.client_id)
            .json(body);

        if let Some(ref t) = *token {
            builder = builder.bearer_auth(t);
        }

        builder.send().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("https://store.example.com/", "laptop");
        assert_eq!(client.base_url(), "https://store.example.com");
    }
}
