use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per bucket.
    pub root: PathBuf,
    /// Bucket for job inputs and output archives.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Externally reachable API base used in download links.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Secret mixed into download link signatures.
    pub signing_secret: String,
    /// Lifetime of a download link.
    #[serde(default = "default_url_ttl_secs")]
    pub url_ttl_secs: u64,
}

fn default_bucket() -> String {
    "outputexec-bots".to_string()
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:8080/api/v1".to_string()
}

fn default_url_ttl_secs() -> u64 {
    3600
}
