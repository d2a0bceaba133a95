use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{ObjectStorage, PresignedUrl, StorageConfig, StorageError};

/// Buckets as directories under a root.
///
/// Download links point at the server's `/downloads/{bucket}/{object}` route
/// and carry an expiry plus a SHA-256 signature checked by
/// [`verify_download`](Self::verify_download).
#[derive(Debug, Clone)]
pub struct FsObjectStorage {
    root: PathBuf,
    public_base_url: String,
    signing_secret: String,
    url_ttl_secs: u64,
}

impl FsObjectStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.root.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            signing_secret: config.signing_secret.clone(),
            url_ttl_secs: config.url_ttl_secs,
        }
    }

    /// Filesystem location of an object. Rejects paths escaping the bucket.
    pub fn object_path(&self, bucket: &str, object: &str) -> Result<PathBuf, StorageError> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == ".." || bucket == "." {
            return Err(StorageError::InvalidPath(bucket.to_string()));
        }

        let mut path = self.root.join(bucket);
        let mut segments = 0;
        for segment in object.split('/') {
            match segment {
                "" => continue,
                "." | ".." => return Err(StorageError::InvalidPath(object.to_string())),
                s if s.contains('\\') => {
                    return Err(StorageError::InvalidPath(object.to_string()))
                }
                s => {
                    path.push(s);
                    segments += 1;
                }
            }
        }
        if segments == 0 {
            return Err(StorageError::InvalidPath(object.to_string()));
        }
        Ok(path)
    }

    fn signature(&self, bucket: &str, object: &str, expires: i64) -> String {
        let payload = format!(
            "{}\n{}\n{}\n{}",
            self.signing_secret, bucket, object, expires
        );
        format!("{:x}", Sha256::digest(payload.as_bytes()))
    }

    /// Check a download link's expiry and signature.
    pub fn verify_download(&self, bucket: &str, object: &str, expires: i64, signature: &str) -> bool {
        if expires < Utc::now().timestamp() {
            return false;
        }
        let expected = self.signature(bucket, object, expires);
        // Length is public; compare the rest without early exit.
        expected.len() == signature.len()
            && expected
                .bytes()
                .zip(signature.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }

    /// Link valid until `expires` (unix seconds).
    pub fn signed_url(&self, bucket: &str, object: &str, expires: i64) -> String {
        let encoded: Vec<String> = object
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        format!(
            "{}/downloads/{}/{}?expires={}&signature={}",
            self.public_base_url,
            urlencoding::encode(bucket),
            encoded.join("/"),
            expires,
            self.signature(bucket, object, expires)
        )
    }
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    async fn fetch(&self, bucket: &str, object: &str, local_path: &Path) -> Result<(), StorageError> {
        let source = self.object_path(bucket, object)?;
        if !tokio::fs::try_exists(&source).await? {
            return Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                object: object.to_string(),
            });
        }
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = tokio::fs::copy(&source, local_path).await?;
        debug!(bucket = %bucket, object = %object, bytes, "Fetched object");
        Ok(())
    }

    async fn put(&self, bucket: &str, object: &str, local_path: &Path) -> Result<(), StorageError> {
        let target = self.object_path(bucket, object)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = tokio::fs::copy(local_path, &target).await?;
        info!(bucket = %bucket, object = %object, bytes, "Stored object");
        Ok(())
    }

    async fn presigned_download_url(
        &self,
        bucket: &str,
        object: &str,
    ) -> Result<PresignedUrl, StorageError> {
        self.object_path(bucket, object)?;
        let expires = Utc::now().timestamp() + self.url_ttl_secs as i64;
        let expires_at = Utc
            .timestamp_opt(expires, 0)
            .single()
            .ok_or_else(|| StorageError::InvalidPath(format!("bad expiry {}", expires)))?;

        Ok(PresignedUrl {
            url: self.signed_url(bucket, object, expires),
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage(root: &Path) -> FsObjectStorage {
        FsObjectStorage::new(&StorageConfig {
            root: root.to_path_buf(),
            bucket: "outputexec-bots".to_string(),
            public_base_url: "https://docket.example.test/api/v1/".to_string(),
            signing_secret: "s3cret".to_string(),
            url_ttl_secs: 60,
        })
    }

    #[tokio::test]
    async fn test_put_then_fetch() {
        let dir = TempDir::new().unwrap();
        let store = storage(&dir.path().join("objects"));
        let local = dir.path().join("in.txt");
        std::fs::write(&local, b"payload").unwrap();

        store.put("bots", "42/in.txt", &local).await.unwrap();
        let out = dir.path().join("work/copy.txt");
        store.fetch("bots", "42/in.txt", &out).await.unwrap();

        assert_eq!(std::fs::read(&out).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_fetch_missing_object() {
        let dir = TempDir::new().unwrap();
        let store = storage(dir.path());
        let err = store
            .fetch("bots", "nope.xlsx", &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[test]
    fn test_object_path_rejects_traversal() {
        let store = storage(Path::new("/srv"));
        assert!(store.object_path("bots", "../etc/passwd").is_err());
        assert!(store.object_path("../x", "a").is_err());
        assert!(store.object_path("bots", "").is_err());
        assert_eq!(
            store.object_path("bots", "a//b.zip").unwrap(),
            PathBuf::from("/srv/bots/a/b.zip")
        );
    }

    #[tokio::test]
    async fn test_presigned_url_verifies() {
        let store = storage(Path::new("/srv"));
        let presigned = store
            .presigned_download_url("outputexec-bots", "42/42.zip")
            .await
            .unwrap();
        assert!(presigned
            .url
            .starts_with("https://docket.example.test/api/v1/downloads/outputexec-bots/42/42.zip?expires="));

        let query = presigned.url.split('?').nth(1).unwrap();
        let mut expires = 0;
        let mut signature = String::new();
        for pair in query.split('&') {
            let (k, v) = pair.split_once('=').unwrap();
            match k {
                "expires" => expires = v.parse().unwrap(),
                "signature" => signature = v.to_string(),
                _ => {}
            }
        }

        assert!(store.verify_download("outputexec-bots", "42/42.zip", expires, &signature));
        assert!(!store.verify_download("outputexec-bots", "43/43.zip", expires, &signature));
        assert!(!store.verify_download("outputexec-bots", "42/42.zip", expires + 1, &signature));
    }

    #[test]
    fn test_expired_link_rejected() {
        let store = storage(Path::new("/srv"));
        let past = Utc::now().timestamp() - 10;
        let url = store.signed_url("b", "o.zip", past);
        let signature = url.rsplit("signature=").next().unwrap();
        assert!(!store.verify_download("b", "o.zip", past, signature));
    }
}
