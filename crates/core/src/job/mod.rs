//! Job lifecycle: dispatch, setup, execution and the always-run finalize.
//!
//! A [`JobController`] resolves a [`DispatchRequest`] against the
//! [`JobRegistry`], builds a [`JobContext`] holding the job's queues and
//! resources, runs the job, and finalizes it whatever happened.

mod config;
mod context;
mod controller;
mod registry;
mod traits;

pub use config::*;
pub use context::*;
pub use controller::*;
pub use registry::*;
pub use traits::*;

use thiserror::Error;

use crate::auth::AuthError;
use crate::driver::DriverError;
use crate::executor::ExecutorError;
use crate::persistence::QueueError;
use crate::source::SourceError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("No job registered for category '{category}' and system '{system}'")]
    NotRegistered { category: String, system: String },

    #[error("Invalid dispatch request: {0}")]
    InvalidRequest(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Input error: {0}")]
    Source(#[from] SourceError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Execution failed: {0}")]
    Execution(String),
}

impl JobError {
    /// Label used for the finished-jobs metric.
    pub fn result_label(&self) -> &'static str {
        match self {
            JobError::AuthenticationFailed(_) | JobError::Auth(_) => "auth_failed",
            JobError::NotRegistered { .. } | JobError::InvalidRequest(_) => "rejected",
            _ => "aborted",
        }
    }
}
