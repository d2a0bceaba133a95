//! In-memory object storage for testing.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::storage::{ObjectStorage, PresignedUrl, StorageError};

/// [`ObjectStorage`] over a map of `(bucket, object)` to bytes.
///
/// Presigned URLs take the form `mock://{bucket}/{object}`.
#[derive(Debug, Clone, Default)]
pub struct MockObjectStorage {
    objects: Arc<RwLock<HashMap<(String, String), Vec<u8>>>>,
    puts: Arc<RwLock<Vec<(String, String)>>>,
}

impl MockObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, bucket: &str, object: &str, bytes: Vec<u8>) {
        self.objects
            .write()
            .await
            .insert((bucket.to_string(), object.to_string()), bytes);
    }

    pub async fn object(&self, bucket: &str, object: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), object.to_string()))
            .cloned()
    }

    /// `(bucket, object)` of every upload, in order.
    pub async fn puts(&self) -> Vec<(String, String)> {
        self.puts.read().await.clone()
    }
}

#[async_trait]
impl ObjectStorage for MockObjectStorage {
    async fn fetch(&self, bucket: &str, object: &str, local_path: &Path) -> Result<(), StorageError> {
        let bytes = self
            .object(bucket, object)
            .await
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                object: object.to_string(),
            })?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, bytes).await?;
        Ok(())
    }

    async fn put(&self, bucket: &str, object: &str, local_path: &Path) -> Result<(), StorageError> {
        let bytes = tokio::fs::read(local_path).await?;
        self.insert(bucket, object, bytes).await;
        self.puts
            .write()
            .await
            .push((bucket.to_string(), object.to_string()));
        Ok(())
    }

    async fn presigned_download_url(
        &self,
        bucket: &str,
        object: &str,
    ) -> Result<PresignedUrl, StorageError> {
        Ok(PresignedUrl {
            url: format!("mock://{}/{}", bucket, object),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }
}
