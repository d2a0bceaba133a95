use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::JobError;

/// `[runtime]` section: where jobs write and how wide they run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Holds `output/{pid}/` and `archives/{pid}.zip`.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Partition workers per job.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Pause before the telemetry queue is closed.
    #[serde(default = "default_flush_grace_ms")]
    pub flush_grace_ms: u64,
    /// IANA zone for timestamps in progress lines and file names.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            pool_size: default_pool_size(),
            flush_grace_ms: default_flush_grace_ms(),
            timezone: default_timezone(),
        }
    }
}

impl RuntimeConfig {
    /// Falls back to UTC for an unknown zone; validation rejects those.
    pub fn timezone(&self) -> Tz {
        self.timezone.parse().unwrap_or(Tz::UTC)
    }

    pub fn flush_grace(&self) -> Duration {
        Duration::from_millis(self.flush_grace_ms)
    }

    pub fn output_dir(&self, pid: &str) -> PathBuf {
        self.work_dir.join("output").join(pid)
    }

    pub fn archive_path(&self, pid: &str) -> PathBuf {
        self.work_dir.join("archives").join(format!("{}.zip", pid))
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("work")
}

fn default_pool_size() -> usize {
    1
}

fn default_flush_grace_ms() -> u64 {
    5000
}

fn default_timezone() -> String {
    "America/Sao_Paulo".to_string()
}

/// Inbound request to run a job.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DispatchRequest {
    pub category: String,
    pub system: String,
    pub pid: String,
    /// Key into the configured credential sets.
    #[serde(default)]
    pub credentials_ref: Option<String>,
    /// Input spreadsheet, relative to `storage_prefix`.
    #[serde(default)]
    pub input_file: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Object folder holding the input files.
    #[serde(default)]
    pub storage_prefix: Option<String>,
    /// Job-specific options.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Validated, immutable job parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobConfig {
    pub pid: String,
    pub category: String,
    pub system: String,
    pub credentials_ref: Option<String>,
    pub input_file: Option<String>,
    pub attachments: Vec<String>,
    pub storage_prefix: Option<String>,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JobConfig {
    /// The pid ends up in file and object names, so it is restricted to
    /// ASCII letters, digits, `-` and `_`.
    pub fn from_request(request: DispatchRequest) -> Result<Self, JobError> {
        let pid = request.pid.trim().to_string();
        if pid.is_empty() {
            return Err(JobError::InvalidRequest("pid cannot be empty".to_string()));
        }
        if !pid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(JobError::InvalidRequest(format!(
                "pid '{}' contains unsupported characters",
                pid
            )));
        }
        for name in request.input_file.iter().chain(request.attachments.iter()) {
            if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
                return Err(JobError::InvalidRequest(format!(
                    "'{}' is not a plain file name",
                    name
                )));
            }
        }

        Ok(Self {
            pid,
            category: request.category.trim().to_string(),
            system: request.system.trim().to_string(),
            credentials_ref: request.credentials_ref.filter(|r| !r.is_empty()),
            input_file: request.input_file,
            attachments: request.attachments,
            storage_prefix: request
                .storage_prefix
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
            extra: request.extra,
        })
    }

    /// Object name for a file under the request's storage prefix.
    pub fn object_name(&self, file_name: &str) -> String {
        match &self.storage_prefix {
            Some(prefix) => format!("{}/{}", prefix, file_name),
            None => file_name.to_string(),
        }
    }
}
