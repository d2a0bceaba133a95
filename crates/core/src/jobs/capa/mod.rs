//! Case cover extraction for the regional labour courts.
//!
//! Input rows are grouped by region. Each pool worker logs into a region
//! with the office certificate, reuses the browser session's credentials
//! for direct API calls, and writes one cover row per case plus its
//! hearings, subjects, parties and representatives.

mod api;
mod sheets;

pub use api::{CaseApi, CaseApiError, CaseDetails};
pub use sheets::*;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::auth::{ChallengeResponseAuthenticator, ChallengeResponseConfig, Keystore, OtpGenerator};
use crate::driver::PageDriver;
use crate::executor::{FailureSink, PartitionExecutor, PartitionWorker};
use crate::job::{Job, JobContext, JobError};
use crate::partition::{PartitionKey, Partitioner, DEFAULT_PARTITION_FIELD};
use crate::record::{RecordError, WorkRecord};
use crate::telemetry::MessageType;

const JOB_NAME: &str = "capa_pje";
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// `capa_pje`: cover sheets for every case in the input.
#[derive(Debug, Default)]
pub struct CaseCoverJob;

impl CaseCoverJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Job for CaseCoverJob {
    fn name(&self) -> &str {
        JOB_NAME
    }

    /// Login happens per region inside the workers.
    async fn authenticate(&self, _ctx: &JobContext) -> bool {
        true
    }

    async fn execute(&self, ctx: Arc<JobContext>) -> Result<(), JobError> {
        let certificate = ctx
            .services()
            .settings
            .certificate
            .clone()
            .ok_or_else(|| JobError::Setup("no [certificate] section configured".to_string()))?;
        let partitions = ctx
            .partition_input(&Partitioner::default())
            .ok_or_else(|| JobError::InvalidRequest(format!("{} needs an input file", JOB_NAME)))?;

        let keystore = Arc::new(load_keystore(&ctx, &certificate).await?);
        let otp = OtpGenerator::from_uri(&certificate.otp_uri)?;
        let http = ChallengeResponseAuthenticator::http_client(&certificate)?;

        info!(
            pid = %ctx.pid(),
            regions = partitions.len(),
            cases = partitions.total_rows(),
            "Extracting case covers"
        );

        let executor = PartitionExecutor::new(
            ctx.services().settings.runtime.pool_size,
            ctx.cancel().clone(),
        );
        let sink: Arc<dyn FailureSink> = ctx.clone();
        let report = executor
            .run(partitions, sink, |index| {
                CoverWorker::new(
                    index,
                    Arc::clone(&ctx),
                    ChallengeResponseAuthenticator::with_client(
                        certificate.clone(),
                        Arc::clone(&keystore),
                        otp.clone(),
                        http.clone(),
                    ),
                )
            })
            .await?;

        info!(
            pid = %ctx.pid(),
            succeeded = report.succeeded,
            failed = report.failed,
            skipped_regions = report.skipped_partitions,
            cancelled = report.cancelled,
            "Case cover extraction finished"
        );
        Ok(())
    }
}

/// Fetch the office keystore into scratch space, parse it and delete the
/// file. The output directory is archived, so the keystore never lands
/// there.
async fn load_keystore(
    ctx: &JobContext,
    certificate: &ChallengeResponseConfig,
) -> Result<Keystore, JobError> {
    let settings = &ctx.services().settings;
    let local = settings
        .runtime
        .work_dir
        .join("keystores")
        .join(format!("{}.pfx", ctx.pid()));

    ctx.services()
        .storage
        .fetch(&settings.bucket, &certificate.keystore_object, &local)
        .await?;
    let loaded = Keystore::load(&local, &certificate.keystore_passphrase);
    if let Err(e) = tokio::fs::remove_file(&local).await {
        warn!(path = %local.display(), "Failed to remove fetched keystore: {}", e);
    }
    Ok(loaded?)
}

/// One pool task: a browser session, reauthenticated per region, and the
/// case API client for the current region.
struct CoverWorker {
    index: usize,
    ctx: Arc<JobContext>,
    authenticator: ChallengeResponseAuthenticator,
    driver: Option<Box<dyn PageDriver>>,
    /// The session came from the job's driver slot and goes back there.
    borrowed: bool,
    api: Option<CaseApi>,
    region: String,
}

impl CoverWorker {
    fn new(index: usize, ctx: Arc<JobContext>, authenticator: ChallengeResponseAuthenticator) -> Self {
        Self {
            index,
            ctx,
            authenticator,
            driver: None,
            borrowed: false,
            api: None,
            region: String::new(),
        }
    }

    /// Make sure the worker holds a browser session: the job's own session
    /// for the first worker to ask, a fresh one otherwise.
    async fn ensure_driver(&mut self) -> bool {
        if self.driver.is_some() {
            return true;
        }
        if let Some(driver) = self.ctx.take_driver().await {
            self.borrowed = true;
            self.driver = Some(driver);
            return true;
        }
        match self.ctx.services().drivers.launch().await {
            Ok(driver) => {
                self.driver = Some(driver);
                true
            }
            Err(e) => {
                warn!(worker = self.index, "Failed to start browser session: {}", e);
                false
            }
        }
    }

    fn store(&self, sheet: &str, rows: Vec<WorkRecord>) -> Result<(), RecordError> {
        self.ctx
            .success()
            .enqueue(sheet, rows)
            .map_err(|e| RecordError::Failed(e.to_string()))
    }
}

#[async_trait]
impl PartitionWorker for CoverWorker {
    async fn open_session(&mut self, key: &PartitionKey) -> bool {
        self.api = None;
        let region = key.as_str().to_string();
        if !self.ensure_driver().await {
            return false;
        }
        let Some(driver) = self.driver.as_mut() else {
            return false;
        };
        let driver = driver.as_mut();

        if !self.authenticator.authenticate(driver, &region).await {
            return false;
        }
        let client = match self
            .authenticator
            .harvest(driver, &region)
            .await
            .and_then(|session| session.to_http_client(API_TIMEOUT))
        {
            Ok(client) => client,
            Err(e) => {
                warn!(worker = self.index, region = %region, "No usable API session: {}", e);
                return false;
            }
        };

        let base = self.authenticator.config().api_base(&region);
        debug!(worker = self.index, region = %region, api = %base, "Region session ready");
        self.api = Some(CaseApi::new(client, base));
        self.region = region;
        true
    }

    async fn process(
        &mut self,
        _key: &PartitionKey,
        row: Option<usize>,
        record: &mut WorkRecord,
    ) -> Result<(), RecordError> {
        let number = record
            .get_text(DEFAULT_PARTITION_FIELD)
            .ok_or_else(|| RecordError::MissingField(DEFAULT_PARTITION_FIELD.to_string()))?;
        let api = self
            .api
            .as_ref()
            .ok_or_else(|| RecordError::Failed("no API session for region".to_string()))?;

        let telemetry = self.ctx.telemetry();
        telemetry.emit(format!("Searching case {}", number), MessageType::Log, row);

        let case = api.find_case(&number).await?;
        telemetry.emit("Case found!", MessageType::Info, row);

        let hearings = api.hearings(case.id).await.unwrap_or_else(|e| {
            warn!(number = %number, "Hearings unavailable: {}", e);
            Vec::new()
        });
        let subjects = api.subjects(case.id).await.unwrap_or_else(|e| {
            warn!(number = %number, "Subjects unavailable: {}", e);
            Vec::new()
        });
        let parties = api.parties(case.id).await.unwrap_or_else(|e| {
            warn!(number = %number, "Parties unavailable: {}", e);
            Default::default()
        });

        let (party_sheet, representative_sheet) = party_rows(&number, &parties);
        self.store(HEARINGS_SHEET, hearing_rows(&number, &hearings))?;
        self.store(SUBJECTS_SHEET, subject_rows(&number, &subjects))?;
        self.store(PARTIES_SHEET, party_sheet)?;
        self.store(REPRESENTATIVES_SHEET, representative_sheet)?;

        self.ctx
            .record_succeeded(COVER_SHEET, vec![cover_row(&self.region, &case)], row)
            .map_err(|e| RecordError::Failed(e.to_string()))
    }

    async fn finish(&mut self) {
        let Some(mut driver) = self.driver.take() else {
            return;
        };
        if self.borrowed {
            self.ctx.restore_driver(driver).await;
        } else if let Err(e) = driver.quit().await {
            warn!(worker = self.index, "Failed to close browser session: {}", e);
        }
    }
}
