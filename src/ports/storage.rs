use async_trait::async_trait;
use serde::Serialize;
use std::error::Error;

/// One blob as reported by [`StoragePort::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
    pub url: String,
    /// Last modification, seconds since the Unix epoch.
    pub timestamp: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Store `bytes` under `key` and return the durable URL. The store may
    /// pick a different final key to avoid overwriting an existing blob.
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>>;

    /// Delete the blob behind a URL `put` returned. Locators the store did
    /// not issue are rejected with an error, never mapped onto a key.
    async fn delete(&self, url: &str) -> Result<(), Box<dyn Error + Send + Sync>>;

    async fn list(&self) -> Result<Vec<StoredObject>, Box<dyn Error + Send + Sync>>;
}
