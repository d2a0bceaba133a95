use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::{JobConfig, JobError, RuntimeConfig};
use crate::auth::{ChallengeResponseConfig, Credentials, PasswordLoginConfig};
use crate::cancel::CancellationFlag;
use crate::config::Config;
use crate::driver::{DriverFactory, PageDriver};
use crate::executor::FailureSink;
use crate::partition::{Partitioner, Partitions};
use crate::persistence::{PersistenceQueue, QueueError, QueueKind, XlsxSheetStore, ERROR_SHEET};
use crate::record::WorkRecord;
use crate::source::SpreadsheetSource;
use crate::storage::ObjectStorage;
use crate::telemetry::{MessageType, ProgressChannel, TelemetryQueue};

/// Named credential sets from the `[credentials]` section.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    entries: HashMap<String, Credentials>,
}

impl CredentialStore {
    pub fn new(entries: HashMap<String, Credentials>) -> Self {
        Self { entries }
    }

    pub fn get(&self, reference: &str) -> Option<&Credentials> {
        self.entries.get(reference)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Configuration every job can read.
#[derive(Debug, Clone, Default)]
pub struct JobSettings {
    pub runtime: RuntimeConfig,
    /// Bucket for inputs, keystores and output archives.
    pub bucket: String,
    pub certificate: Option<ChallengeResponseConfig>,
    pub password_login: HashMap<String, PasswordLoginConfig>,
}

impl From<&Config> for JobSettings {
    fn from(config: &Config) -> Self {
        Self {
            runtime: config.runtime.clone(),
            bucket: config.storage.bucket.clone(),
            certificate: config.certificate.clone(),
            password_login: config.password_login.clone(),
        }
    }
}

/// Long-lived collaborators shared by all jobs of a process.
pub struct JobServices {
    pub storage: Arc<dyn ObjectStorage>,
    pub channel: Option<Arc<dyn ProgressChannel>>,
    pub drivers: Arc<dyn DriverFactory>,
    pub credentials: CredentialStore,
    pub settings: JobSettings,
}

impl JobServices {
    pub fn from_config(
        config: &Config,
        storage: Arc<dyn ObjectStorage>,
        channel: Option<Arc<dyn ProgressChannel>>,
        drivers: Arc<dyn DriverFactory>,
    ) -> Self {
        Self {
            storage,
            channel,
            drivers,
            credentials: CredentialStore::new(config.credentials.clone()),
            settings: JobSettings::from(config),
        }
    }
}

/// Everything one running job owns.
///
/// Record-processing code only enqueues into the queues; the controller
/// shuts them down during finalize.
pub struct JobContext {
    config: JobConfig,
    output_dir: PathBuf,
    log_path: PathBuf,
    cancel: CancellationFlag,
    success: PersistenceQueue,
    errors: PersistenceQueue,
    telemetry: TelemetryQueue,
    driver: tokio::sync::Mutex<Option<Box<dyn PageDriver>>>,
    source: Mutex<Option<SpreadsheetSource>>,
    credentials: Option<Credentials>,
    services: Arc<JobServices>,
}

impl JobContext {
    /// Create the output directory and start the three queue writers.
    pub async fn open(config: JobConfig, services: Arc<JobServices>) -> Result<Self, JobError> {
        let credentials = match &config.credentials_ref {
            Some(reference) => Some(
                services
                    .credentials
                    .get(reference)
                    .cloned()
                    .ok_or_else(|| {
                        JobError::Setup(format!("unknown credentials reference '{}'", reference))
                    })?,
            ),
            None => None,
        };

        let runtime = &services.settings.runtime;
        let output_dir = runtime.output_dir(&config.pid);
        tokio::fs::create_dir_all(&output_dir).await.map_err(|e| {
            JobError::Setup(format!("cannot create {}: {}", output_dir.display(), e))
        })?;

        let timezone = runtime.timezone();
        let stamp = Utc::now()
            .with_timezone(&timezone)
            .format("%d-%m-%Y %H-%M-%S")
            .to_string();
        let log_path = output_dir.join(format!("{}.log", config.pid));
        let cancel = CancellationFlag::new();

        let success = PersistenceQueue::spawn(
            QueueKind::Success,
            Arc::new(XlsxSheetStore::for_job(&output_dir, QueueKind::Success, &config.pid, &stamp)),
        );
        let errors = PersistenceQueue::spawn(
            QueueKind::Error,
            Arc::new(XlsxSheetStore::for_job(&output_dir, QueueKind::Error, &config.pid, &stamp)),
        );
        let telemetry = TelemetryQueue::spawn(
            config.pid.clone(),
            services.channel.clone(),
            log_path.clone(),
            cancel.clone(),
            timezone,
        );

        debug!(pid = %config.pid, output_dir = %output_dir.display(), "Job context ready");
        Ok(Self {
            config,
            output_dir,
            log_path,
            cancel,
            success,
            errors,
            telemetry,
            driver: tokio::sync::Mutex::new(None),
            source: Mutex::new(None),
            credentials,
            services,
        })
    }

    pub fn pid(&self) -> &str {
        &self.config.pid
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The job's live log; never archived.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn cancel(&self) -> &CancellationFlag {
        &self.cancel
    }

    pub fn success(&self) -> &PersistenceQueue {
        &self.success
    }

    pub fn errors(&self) -> &PersistenceQueue {
        &self.errors
    }

    pub fn telemetry(&self) -> &TelemetryQueue {
        &self.telemetry
    }

    pub fn services(&self) -> &Arc<JobServices> {
        &self.services
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn driver_slot(&self) -> &tokio::sync::Mutex<Option<Box<dyn PageDriver>>> {
        &self.driver
    }

    /// Take the job's browser session, leaving the slot empty.
    pub async fn take_driver(&self) -> Option<Box<dyn PageDriver>> {
        self.driver.lock().await.take()
    }

    /// Put a session back so finalize releases it.
    pub async fn restore_driver(&self, driver: Box<dyn PageDriver>) {
        let previous = self.driver.lock().await.replace(driver);
        if let Some(mut previous) = previous {
            if let Err(e) = previous.quit().await {
                warn!(pid = %self.pid(), "Failed to close replaced browser session: {}", e);
            }
        }
    }

    pub(crate) fn set_source(&self, source: SpreadsheetSource) {
        *self.source.lock().unwrap_or_else(|p| p.into_inner()) = Some(source);
    }

    /// The input spreadsheet, if the request named one. Single use.
    pub fn take_source(&self) -> Option<SpreadsheetSource> {
        self.source.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    /// Partition the input by process number and reset the progress total
    /// to the number of distinct valid identifiers.
    pub fn partition_input(&self, partitioner: &Partitioner) -> Option<Partitions> {
        let source = self.take_source()?;
        let partitions = partitioner.partition(source);
        if partitions.dropped > 0 {
            warn!(
                pid = %self.pid(),
                dropped = partitions.dropped,
                field = %partitioner.field(),
                "Dropped records without a valid process number"
            );
        }
        self.telemetry.set_total(partitions.total_rows());
        Some(partitions)
    }

    /// Download `file_name` from the request's storage prefix into the
    /// output directory.
    pub async fn fetch_attachment(&self, file_name: &str) -> Result<PathBuf, JobError> {
        let local = self.output_dir.join(file_name);
        if tokio::fs::try_exists(&local).await.unwrap_or(false) {
            return Ok(local);
        }

        let object = self.config.object_name(file_name);
        self.services
            .storage
            .fetch(&self.services.settings.bucket, &object, &local)
            .await?;
        info!(pid = %self.pid(), object = %object, "Fetched input file");
        self.telemetry.emit(
            format!("File \"{}\" downloaded", file_name),
            MessageType::Success,
            None,
        );
        Ok(local)
    }

    /// Append records to a success sheet and count one completed record.
    pub fn record_succeeded(
        &self,
        sheet_name: &str,
        records: Vec<WorkRecord>,
        row: Option<usize>,
    ) -> Result<(), QueueError> {
        self.success.enqueue(sheet_name, records)?;
        self.telemetry.record_succeeded(row);
        Ok(())
    }

    /// Annotate the record with `reason`, append it to the error sheet and
    /// count one failed record.
    pub fn record_failed(
        &self,
        mut record: WorkRecord,
        row: Option<usize>,
        reason: &str,
    ) -> Result<(), QueueError> {
        record.annotate_error(reason);
        self.errors.enqueue(ERROR_SHEET, vec![record])?;
        self.telemetry.record_failed(row, reason);
        Ok(())
    }
}

impl FailureSink for JobContext {
    fn report_failure(
        &self,
        record: WorkRecord,
        row: Option<usize>,
        reason: &str,
    ) -> Result<(), QueueError> {
        self.record_failed(record, row, reason)
    }
}
