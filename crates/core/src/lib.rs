pub mod auth;
pub mod cancel;
pub mod config;
pub mod driver;
pub mod executor;
pub mod job;
pub mod jobs;
pub mod metrics;
pub mod partition;
pub mod persistence;
pub mod record;
pub mod source;
pub mod storage;
pub mod telemetry;
pub mod testing;

pub use auth::{
    AuthContext, AuthError, AuthState, ChallengeResponseAuthenticator, ChallengeResponseConfig,
    Credentials, Keystore, OtpGenerator, PasswordAuthenticator, PasswordLoginConfig,
    SessionCredentials, SignatureDigest,
};
pub use cancel::CancellationFlag;
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use driver::{
    BrowserCookie, CapturedRequest, DriverConfig, DriverError, DriverFactory, PageDriver,
    WaitOutcome, WebDriverClient, WebDriverFactory,
};
pub use executor::{
    process_sequential, ExecutorError, ExecutorReport, FailureSink, PartitionExecutor,
    PartitionWorker, RecordProcessor,
};
pub use job::{
    derive_job_name, CredentialStore, DispatchRequest, Job, JobConfig, JobContext,
    JobController, JobError, JobFactory, JobRegistry, JobServices, JobSettings, JobSummary,
    RuntimeConfig,
};
pub use jobs::{register_builtin_jobs, CaseCoverJob};
pub use partition::{
    PartitionError, PartitionKey, Partitioner, Partitions, PositionIndex, ProcessNumber,
};
pub use persistence::{
    PersistenceQueue, QueueError, QueueKind, SheetError, SheetStore, XlsxSheetStore, ERROR_SHEET,
};
pub use record::{FieldValue, RecordError, WorkRecord, ERROR_REASON_FIELD};
pub use source::{PartitionedSource, SourceError, SpreadsheetSource, WorkSource};
pub use storage::{
    build_archive, FsObjectStorage, ObjectStorage, PresignedUrl, StorageConfig, StorageError,
};
pub use telemetry::{
    ChannelError, EventKind, JobStatus, MessageType, ProgressChannel, ProgressCounters,
    ProgressSink, TelemetryConfig, TelemetryEvent, TelemetryQueue, WsProgressChannel,
};
