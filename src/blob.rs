//! Blob storage access for document content
//!
//! Documents either carry their text inline or reference a storage path.
//! The worker resolves paths through this seam so tests can substitute an
//! in-memory store.

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Download a blob's bytes by storage path
    async fn download(&self, path: &str) -> Result<Vec<u8>>;
}

/// Blob store over HTTP: storage paths are resolved against a base URL
pub struct HttpBlobStore {
    client: Client,
    base_url: Url,
}

impl HttpBlobStore {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| Error::Blob(format!("Invalid storage path '{}': {}", path, e)))?;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Blob(format!(
                "Download of '{}' failed with status {}",
                path, status
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
