use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {bucket}/{object}")]
    NotFound { bucket: String, object: String },

    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Time-limited download link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Download `bucket/object` to `local_path`, creating parent directories.
    async fn fetch(&self, bucket: &str, object: &str, local_path: &Path) -> Result<(), StorageError>;

    /// Upload `local_path` as `bucket/object`, replacing any existing object.
    async fn put(&self, bucket: &str, object: &str, local_path: &Path) -> Result<(), StorageError>;

    async fn presigned_download_url(
        &self,
        bucket: &str,
        object: &str,
    ) -> Result<PresignedUrl, StorageError>;
}
