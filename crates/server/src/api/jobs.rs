//! Job dispatch handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docket_core::{DispatchRequest, Job, JobConfig, JobError, JobSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::metrics::DISPATCHES_TOTAL;
use crate::state::{AppState, JobRun};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct DispatchParams {
    /// Run to completion before answering.
    #[serde(default)]
    pub wait: bool,
}

/// Response for an accepted dispatch
#[derive(Debug, Serialize)]
pub struct DispatchAccepted {
    pub pid: String,
    pub job: String,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(JobErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn status_for(error: &JobError) -> StatusCode {
    match error {
        JobError::NotRegistered { .. } => StatusCode::NOT_FOUND,
        JobError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Names of the registered jobs
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<ListJobsResponse> {
    Json(ListJobsResponse {
        jobs: state.controller().registry().names(),
    })
}

/// Resolve a dispatch request and start the job.
///
/// Answers 202 once the job is accepted; with `?wait=true` the job runs to
/// completion first and its summary is returned.
pub async fn dispatch_job(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DispatchParams>,
    Json(request): Json<DispatchRequest>,
) -> Response {
    let (job, config) = match state.controller().resolve(request) {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!(error = %e, "Rejected dispatch request");
            DISPATCHES_TOTAL.with_label_values(&["rejected"]).inc();
            return error_response(status_for(&e), e.to_string());
        }
    };

    let pid = config.pid.clone();
    let name = job.name().to_string();
    if !state.begin_run(&pid, &name).await {
        DISPATCHES_TOTAL.with_label_values(&["conflict"]).inc();
        return error_response(
            StatusCode::CONFLICT,
            format!("A job for pid '{}' is already running", pid),
        );
    }
    DISPATCHES_TOTAL.with_label_values(&["accepted"]).inc();
    info!(job = %name, pid = %pid, wait = params.wait, "Dispatch accepted");

    if params.wait {
        let result = run_supervised(Arc::clone(&state), &pid, job, config).await;
        let response = match &result {
            Ok(summary) => (StatusCode::OK, Json(summary.clone())).into_response(),
            Err(e) => error_response(status_for(e), e.to_string()),
        };
        state.finish_run(&pid, result).await;
        return response;
    }

    let task_state = Arc::clone(&state);
    let task_pid = pid.clone();
    tokio::spawn(async move {
        let result = run_supervised(Arc::clone(&task_state), &task_pid, job, config).await;
        task_state.finish_run(&task_pid, result).await;
    });

    (
        StatusCode::ACCEPTED,
        Json(DispatchAccepted { pid, job: name }),
    )
        .into_response()
}

/// Run the job on its own task so a panic surfaces as a failed run
/// instead of leaving the pid stuck in the running state.
async fn run_supervised(
    state: Arc<AppState>,
    pid: &str,
    job: Box<dyn Job>,
    config: JobConfig,
) -> Result<JobSummary, JobError> {
    let handle = tokio::spawn(async move { state.controller().run(job, config).await });
    match handle.await {
        Ok(result) => result,
        Err(e) => {
            error!(pid = %pid, "Job task aborted: {}", e);
            Err(JobError::Execution(format!("job task aborted: {}", e)))
        }
    }
}

/// State of the latest run for a pid
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<String>,
) -> Result<Json<JobRun>, Response> {
    state.run(&pid).await.map(Json).ok_or_else(|| {
        error_response(
            StatusCode::NOT_FOUND,
            format!("No job run for pid '{}'", pid),
        )
    })
}
