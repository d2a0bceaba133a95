use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::{DispatchRequest, Job, JobConfig, JobContext, JobError, JobRegistry, JobServices};
use crate::metrics;
use crate::source::{SpreadsheetSource, WorkSource};
use crate::storage::build_archive;
use crate::telemetry::{MessageType, ProgressCounters, EXECUTION_FINISHED, JOB_STARTED};

/// Final state of one job run.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub pid: String,
    pub job: String,
    /// "completed", "cancelled", "auth_failed" or "aborted".
    pub result: String,
    pub counters: ProgressCounters,
    pub download_url: Option<String>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// Resolves dispatch requests and drives each job through setup, execution
/// and finalize.
#[derive(Clone)]
pub struct JobController {
    registry: Arc<JobRegistry>,
    services: Arc<JobServices>,
}

impl JobController {
    pub fn new(registry: Arc<JobRegistry>, services: Arc<JobServices>) -> Self {
        Self { registry, services }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn services(&self) -> &Arc<JobServices> {
        &self.services
    }

    /// Validate a request and pick its job implementation.
    pub fn resolve(&self, request: DispatchRequest) -> Result<(Box<dyn Job>, JobConfig), JobError> {
        let config = JobConfig::from_request(request)?;
        let job = self.registry.resolve(&config.category, &config.system)?;
        Ok((job, config))
    }

    /// Resolve and run to completion.
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<JobSummary, JobError> {
        let (job, config) = self.resolve(request)?;
        self.run(job, config).await
    }

    /// Run one job. Once the context exists, finalize always runs: queues
    /// are drained, the browser released, the output archived and the end
    /// event emitted, even when setup or execution failed.
    pub async fn run(&self, job: Box<dyn Job>, config: JobConfig) -> Result<JobSummary, JobError> {
        let started = Instant::now();
        let name = job.name().to_string();
        let pid = config.pid.clone();

        metrics::JOBS_STARTED.with_label_values(&[name.as_str()]).inc();
        metrics::JOBS_RUNNING.inc();
        info!(job = %name, pid = %pid, "Starting job");

        let ctx = match JobContext::open(config, Arc::clone(&self.services)).await {
            Ok(ctx) => Arc::new(ctx),
            Err(e) => {
                error!(job = %name, pid = %pid, "Job could not start: {}", e);
                metrics::JOBS_RUNNING.dec();
                metrics::JOBS_FINISHED
                    .with_label_values(&[name.as_str(), e.result_label()])
                    .inc();
                return Err(e);
            }
        };
        ctx.telemetry().emit(JOB_STARTED, MessageType::Success, None);

        let outcome = match self.setup(job.as_ref(), &ctx).await {
            Ok(()) => job.execute(Arc::clone(&ctx)).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &outcome {
            error!(job = %name, pid = %pid, "Job aborted: {}", e);
            ctx.telemetry()
                .emit(format!("Execution aborted: {}", e), MessageType::Error, None);
        }

        let download_url = self.finalize(&ctx).await;

        let cancelled = ctx.cancel().is_cancelled();
        let result = match &outcome {
            Ok(()) if cancelled => "cancelled",
            Ok(()) => "completed",
            Err(e) => e.result_label(),
        };
        let elapsed = started.elapsed();
        metrics::JOBS_RUNNING.dec();
        metrics::JOBS_FINISHED
            .with_label_values(&[name.as_str(), result])
            .inc();
        metrics::JOB_DURATION
            .with_label_values(&[name.as_str()])
            .observe(elapsed.as_secs_f64());

        outcome?;
        let summary = JobSummary {
            pid,
            job: name,
            result: result.to_string(),
            counters: ctx.telemetry().counters(),
            download_url,
            cancelled,
            duration_ms: elapsed.as_millis() as u64,
        };
        info!(
            job = %summary.job,
            pid = %summary.pid,
            result = %summary.result,
            success = summary.counters.success,
            errors = summary.counters.error,
            "Job finished"
        );
        Ok(summary)
    }

    async fn setup(&self, job: &dyn Job, ctx: &JobContext) -> Result<(), JobError> {
        if job.requires_driver() {
            let driver = self.services.drivers.launch().await?;
            ctx.restore_driver(driver).await;
        }

        if !job.authenticate(ctx).await {
            if let Some(mut driver) = ctx.take_driver().await {
                if let Err(e) = driver.quit().await {
                    warn!(pid = %ctx.pid(), "Failed to close browser after failed login: {}", e);
                }
            }
            return Err(JobError::AuthenticationFailed(format!(
                "login for {} did not complete",
                ctx.config().system
            )));
        }

        for attachment in &ctx.config().attachments {
            ctx.fetch_attachment(attachment).await?;
        }

        if let Some(input) = ctx.config().input_file.clone() {
            let path = ctx.fetch_attachment(&input).await?;
            let source = tokio::task::spawn_blocking(move || SpreadsheetSource::open(&path))
                .await
                .map_err(|e| JobError::Setup(e.to_string()))??;
            ctx.telemetry().set_total(source.total_rows());
            debug!(pid = %ctx.pid(), rows = source.total_rows(), "Input loaded");
            ctx.set_source(source);
        }
        Ok(())
    }

    /// Returns the download link when the archive made it to storage.
    async fn finalize(&self, ctx: &JobContext) -> Option<String> {
        ctx.success().shutdown().await;
        ctx.errors().shutdown().await;

        if let Some(mut driver) = ctx.take_driver().await {
            if let Err(e) = driver.quit().await {
                warn!(pid = %ctx.pid(), "Failed to close browser session: {}", e);
            }
        }

        let link = match self.upload_archive(ctx).await {
            Ok(url) => Some(url),
            Err(e) => {
                error!(pid = %ctx.pid(), "Failed to publish output archive: {}", e);
                None
            }
        };

        ctx.telemetry()
            .emit_with_link(EXECUTION_FINISHED, MessageType::Success, None, link.clone());
        tokio::time::sleep(self.services.settings.runtime.flush_grace()).await;
        ctx.telemetry().shutdown().await;
        link
    }

    async fn upload_archive(&self, ctx: &JobContext) -> Result<String, JobError> {
        let settings = &self.services.settings;
        let archive_path = settings.runtime.archive_path(ctx.pid());
        let source_dir = ctx.output_dir().to_path_buf();
        let exclude = vec![ctx.log_path().to_path_buf()];

        let target = archive_path.clone();
        tokio::task::spawn_blocking(move || build_archive(&source_dir, &target, &exclude))
            .await
            .map_err(|e| JobError::Setup(e.to_string()))??;

        let object = format!("{}.zip", ctx.pid());
        let storage = &self.services.storage;
        storage.put(&settings.bucket, &object, &archive_path).await?;
        let presigned = storage
            .presigned_download_url(&settings.bucket, &object)
            .await?;
        Ok(presigned.url)
    }
}
