//! Remote document store write interface.
//!
//! The hosted database is opaque: the sync layer only ever creates a record
//! under a client-chosen id or patches an existing one.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use super::client::ApiClient;
use super::error::RemoteError;
use super::types::CreateRecordResponse;

/// Trait abstracting the remote writes for testability.
///
/// In production, `HttpRemoteStore` implements this over the REST API.
/// In tests, mock implementations script success/failure per call.
pub trait RemoteStore: Send + Sync + 'static {
    /// Create `collection/{id}` with the given payload. Returns the stored id.
    ///
    /// Must fail with `RemoteError::AlreadyExists` if the id is taken, so a
    /// replayed create can be recognised as already applied.
    fn create_record(
        &self,
        collection: &str,
        id: &str,
        payload: &Value,
    ) -> impl Future<Output = Result<String, RemoteError>> + Send;

    /// Merge `patch` into `collection/{id}`.
    fn update_record(
        &self,
        collection: &str,
        id: &str,
        patch: &Value,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;
}

/// `RemoteStore` backed by the document REST API.
pub struct HttpRemoteStore {
    api: Arc<ApiClient>,
}

impl HttpRemoteStore {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

impl RemoteStore for HttpRemoteStore {
    /// POST /v1/{collection}?documentId={id}
    async fn create_record(
        &self,
        collection: &str,
        id: &str,
        payload: &Value,
    ) -> Result<String, RemoteError> {
        let path = format!(
            "/v1/{}?documentId={}",
            urlencoding::encode(collection),
            urlencoding::encode(id)
        );
        let resp = self.api.authenticated_post(&path, payload).await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(status, body));
        }

        let created: CreateRecordResponse = resp
            .json()
            .await
            .map_err(|e| RemoteError::Unexpected(format!("Failed to parse create response: {}", e)))?;
        log::debug!("Created {}/{}", collection, created.id);
        Ok(created.id)
    }

    /// PATCH /v1/{collection}/{id}
    async fn update_record(
        &self,
        collection: &str,
        id: &str,
        patch: &Value,
    ) -> Result<(), RemoteError> {
        let path = format!(
            "/v1/{}/{}",
            urlencoding::encode(collection),
            urlencoding::encode(id)
        );
        let resp = self.api.authenticated_patch(&path, patch).await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(status, body));
        }

        log::debug!("Updated {}/{}", collection, id);
        Ok(())
    }
}
