/// S3-compatible HTTP object store
///
/// Objects are written with a plain `PUT {endpoint}/{key}` and removed with
/// `DELETE {endpoint}/{key}`, which works against buckets that accept
/// unsigned writes (MinIO, local gateways, signing proxies).
use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, Client as HttpClient, StatusCode};

use crate::{
    error::{AppError, AppResult},
    storage::BlobStore,
};

#[derive(Clone)]
pub struct HttpBlobStore {
    http_client: HttpClient,
    endpoint: String,
    public_url: String,
}

impl HttpBlobStore {
    pub fn new(http_client: HttpClient, endpoint: &str, public_url: &str) -> Self {
        Self {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.endpoint, key)
    }
}

#[async_trait::async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> AppResult<String> {
        let size = bytes.len();
        let response = self
            .http_client
            .put(self.object_url(key))
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Blob store returned status {} for {}: {}",
                status, key, body
            )));
        }

        tracing::debug!(key = %key, bytes = size, "Stored object");

        Ok(format!("{}/{}", self.public_url, key))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let response = self
            .http_client
            .delete(self.object_url(key))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(AppError::ExternalApi(format!(
            "Blob store returned status {} deleting {}: {}",
            status, key, body
        )))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
