//! Blob storage port for KYC documents.

use async_trait::async_trait;

use super::{check_status, transport_error};
use crate::error::AppError;

const BLOB: &str = "blob_storage";

#[async_trait]
pub trait BlobStorage: Send + Sync + 'static {
    /// Store `bytes` under a fresh name in `container` and return the
    /// public URL (without credentials).
    async fn upload(
        &self,
        bytes: Vec<u8>,
        container: &str,
        content_type: &str,
    ) -> Result<String, AppError>;
}

/// Azure-style blob container reached with a SAS token.
pub struct HttpBlobStorage {
    client: reqwest::Client,
    base_url: String,
    sas_token: String,
}

impl HttpBlobStorage {
    pub fn new(client: reqwest::Client, base_url: String, sas_token: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            sas_token: sas_token.trim_start_matches('?').to_string(),
        }
    }
}

#[async_trait]
impl BlobStorage for HttpBlobStorage {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        container: &str,
        content_type: &str,
    ) -> Result<String, AppError> {
        let extension = match content_type {
            "application/pdf" => "pdf",
            _ => "bin",
        };
        let blob_url = format!("{}/{container}/{}.{extension}", self.base_url, uuid::Uuid::new_v4());

        let response = self
            .client
            .put(format!("{blob_url}?{}", self.sas_token))
            .header("x-ms-blob-type", "BlockBlob")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| transport_error(BLOB, e))?;
        check_status(BLOB, response).await?;

        tracing::info!(%blob_url, "document uploaded");
        Ok(blob_url)
    }
}
