use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use docket_core::{Config, FsObjectStorage, JobController, JobError, JobSummary, SanitizedConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Completed,
    Failed,
}

/// What the server knows about one dispatched job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    pub pid: String,
    pub job: String,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<JobSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Shared application state
pub struct AppState {
    config: Config,
    controller: JobController,
    downloads: Arc<FsObjectStorage>,
    runs: RwLock<HashMap<String, JobRun>>,
}

impl AppState {
    pub fn new(config: Config, controller: JobController, downloads: Arc<FsObjectStorage>) -> Self {
        Self {
            config,
            controller,
            downloads,
            runs: RwLock::new(HashMap::new()),
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn controller(&self) -> &JobController {
        &self.controller
    }

    /// Object store whose links the download route serves.
    pub fn downloads(&self) -> &FsObjectStorage {
        self.downloads.as_ref()
    }

    /// Record a new run. `false` when a run with this pid is still going.
    pub async fn begin_run(&self, pid: &str, job: &str) -> bool {
        let mut runs = self.runs.write().await;
        if runs
            .get(pid)
            .is_some_and(|run| run.state == RunState::Running)
        {
            return false;
        }
        runs.insert(
            pid.to_string(),
            JobRun {
                pid: pid.to_string(),
                job: job.to_string(),
                state: RunState::Running,
                started_at: Utc::now(),
                finished_at: None,
                summary: None,
                error: None,
            },
        );
        true
    }

    pub async fn finish_run(&self, pid: &str, result: Result<JobSummary, JobError>) {
        let mut runs = self.runs.write().await;
        let Some(run) = runs.get_mut(pid) else {
            return;
        };
        run.finished_at = Some(Utc::now());
        match result {
            Ok(summary) => {
                run.state = RunState::Completed;
                run.summary = Some(summary);
            }
            Err(e) => {
                run.state = RunState::Failed;
                run.error = Some(e.to_string());
            }
        }
    }

    pub async fn run(&self, pid: &str) -> Option<JobRun> {
        self.runs.read().await.get(pid).cloned()
    }

    pub async fn running_count(&self) -> usize {
        self.runs
            .read()
            .await
            .values()
            .filter(|run| run.state == RunState::Running)
            .count()
    }
}
