//! Object storage abstraction for input/output/error file blobs.
//! Uses Apache Arrow's object_store crate so the same client code works
//! against S3 or a local in-memory/on-disk backend.

use async_trait::async_trait;
use object_store::{ObjectStore, path::Path as StoragePath};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Metadata returned after upload
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub key: String,
    pub etag: Option<String>,
    pub size: usize,
}

/// Storage client wrapping object_store
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    pub bucket: String,
}

impl StorageClient {
    /// Create new storage client with any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>, bucket: String) -> Self {
        Self { store, bucket }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(object_store::memory::InMemory::new()),
            bucket: "batchd-local".to_string(),
        }
    }

    /// Upload a JSONL file's bytes, appended to durably as the scheduler
    /// writes chunk results (spec §3.2 invariant 3, append-only output).
    pub async fn upload(&self, key: &str, data: Vec<u8>) -> Result<UploadMetadata> {
        let path = StoragePath::from(key);
        let size = data.len();

        let put_result = self.store
            .put(&path, data.into())
            .await?;

        tracing::debug!(key, size, "wrote blob to storage");

        Ok(UploadMetadata {
            key: key.to_string(),
            etag: put_result.e_tag.clone(),
            size,
        })
    }

    /// Download from storage
    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = StoragePath::from(key);

        let result = self.store
            .get(&path)
            .await?;

        let bytes = result.bytes().await?;

        tracing::info!(key, size = bytes.len(), "Downloaded from storage");

        Ok(bytes.to_vec())
    }

    /// Check if key exists
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = StoragePath::from(key);

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Append `lines` to the blob at `key`, creating it if absent. Used by
    /// the scheduler's chunk loop to grow the output/error file after each
    /// chunk commit without re-reading the whole file into the caller.
    pub async fn append_lines(&self, key: &str, lines: &[u8]) -> Result<usize> {
        let mut existing = match self.download(key).await {
            Ok(bytes) => bytes,
            Err(StorageError::ObjectStoreError(object_store::Error::NotFound { .. })) => {
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        existing.extend_from_slice(lines);
        let size = existing.len();
        self.upload(key, existing).await?;
        Ok(size)
    }

    /// Count `\n`-terminated lines currently stored at `key`; used to trust
    /// the output file as the source of truth for `checkpoint` on resume
    /// (spec §4.4 step 1).
    pub async fn line_count(&self, key: &str) -> Result<u64> {
        match self.download(key).await {
            Ok(bytes) => Ok(bytes.iter().filter(|&&b| b == b'\n').count() as u64),
            Err(StorageError::ObjectStoreError(object_store::Error::NotFound { .. })) => Ok(0),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_creates_then_grows_blob() {
        let client = StorageClient::in_memory();
        client.append_lines("out.jsonl", b"line1\n").await.unwrap();
        client.append_lines("out.jsonl", b"line2\n").await.unwrap();

        let bytes = client.download("out.jsonl").await.unwrap();
        assert_eq!(bytes, b"line1\nline2\n");
        assert_eq!(client.line_count("out.jsonl").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn line_count_of_missing_key_is_zero() {
        let client = StorageClient::in_memory();
        assert_eq!(client.line_count("missing").await.unwrap(), 0);
    }
}
