#![allow(dead_code)]

//! Common test utilities for router tests.
//!
//! Builds an in-process router over a real filesystem object store in a
//! temp dir, a mock browser factory and no progress channel, with test jobs
//! registered next to the built-in ones.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use docket_core::{
    load_config_from_str, process_sequential, register_builtin_jobs,
    testing::{MockDriverFactory, MockPageDriver},
    FieldValue, FsObjectStorage, Job, JobContext, JobController, JobError, JobRegistry,
    JobServices, ObjectStorage, RecordError, RecordProcessor, WorkRecord,
};
use docket_server::api::create_router;
use docket_server::state::AppState;

/// Re-export fixtures for test convenience
pub use docket_core::testing::fixtures;

pub const BUCKET: &str = "outputexec-bots";
pub const PUBLIC_BASE: &str = "http://docket.test/api/v1";

/// Copies input rows to the `Resultados` sheet.
struct CopyJob;

struct CopyProcessor {
    ctx: Arc<JobContext>,
}

#[async_trait]
impl RecordProcessor for CopyProcessor {
    async fn process(&mut self, row: usize, record: &mut WorkRecord) -> Result<(), RecordError> {
        self.ctx
            .record_succeeded("Resultados", vec![record.clone()], Some(row))
            .map_err(|e| RecordError::Failed(e.to_string()))
    }
}

#[async_trait]
impl Job for CopyJob {
    fn name(&self) -> &str {
        "copia_teste"
    }

    fn requires_driver(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: Arc<JobContext>) -> Result<(), JobError> {
        let mut source = ctx
            .take_source()
            .ok_or_else(|| JobError::InvalidRequest("no input".to_string()))?;
        let mut processor = CopyProcessor {
            ctx: Arc::clone(&ctx),
        };
        process_sequential(&mut source, &mut processor, ctx.as_ref(), ctx.cancel()).await?;
        Ok(())
    }
}

/// Sleeps for about a second, long enough to overlap a second dispatch.
struct SlowJob;

#[async_trait]
impl Job for SlowJob {
    fn name(&self) -> &str {
        "lento_teste"
    }

    fn requires_driver(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: Arc<JobContext>) -> Result<(), JobError> {
        for _ in 0..50 {
            if ctx.cancel().is_cancelled() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok(())
    }
}

/// Panics mid-run.
struct PanicJob;

#[async_trait]
impl Job for PanicJob {
    fn name(&self) -> &str {
        "panico_teste"
    }

    fn requires_driver(&self) -> bool {
        false
    }

    async fn execute(&self, _ctx: Arc<JobContext>) -> Result<(), JobError> {
        panic!("worker blew up");
    }
}

pub struct TestFixture {
    pub router: Router,
    pub drivers: MockDriverFactory,
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Response whose body is kept as bytes
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let objects = temp_dir.path().join("objects");
        let work = temp_dir.path().join("work");

        let config = load_config_from_str(&format!(
            r#"
[server]
host = "127.0.0.1"
port = 8080

[storage]
root = "{}"
bucket = "{}"
public_base_url = "{}"
signing_secret = "test-secret"

[runtime]
work_dir = "{}"
pool_size = 1
flush_grace_ms = 0

[credentials.office]
username = "operator"
password = "hunter2"
"#,
            objects.display(),
            BUCKET,
            PUBLIC_BASE,
            work.display()
        ))
        .expect("Failed to parse test config");

        let downloads = Arc::new(FsObjectStorage::new(&config.storage));
        let storage: Arc<dyn ObjectStorage> = downloads.clone();
        let drivers = MockDriverFactory::new(MockPageDriver::new());
        let services = Arc::new(JobServices::from_config(
            &config,
            storage,
            None,
            Arc::new(drivers.clone()),
        ));

        let mut registry = JobRegistry::new();
        register_builtin_jobs(&mut registry);
        registry.register("copia_teste", Arc::new(|| Box::new(CopyJob) as Box<dyn Job>));
        registry.register("lento_teste", Arc::new(|| Box::new(SlowJob) as Box<dyn Job>));
        registry.register("panico_teste", Arc::new(|| Box::new(PanicJob) as Box<dyn Job>));

        let controller = JobController::new(Arc::new(registry), services);
        let state = Arc::new(AppState::new(config, controller, downloads));

        Self {
            router: create_router(state),
            drivers,
            temp_dir,
        }
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.temp_dir.path().join("objects")
    }

    /// Place an input workbook at `{bucket}/uploads/{pid}/input.xlsx`.
    pub fn seed_input(&self, pid: &str, names: &[&str]) {
        let rows: Vec<Vec<FieldValue>> = names.iter().map(|n| vec![FieldValue::from(*n)]).collect();
        let path = self
            .objects_dir()
            .join(BUCKET)
            .join("uploads")
            .join(pid)
            .join("input.xlsx");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        fixtures::write_workbook(&path, &["NOME"], &rows);
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    pub async fn get_raw(&self, path: &str) -> RawResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        RawResponse {
            status,
            headers,
            body,
        }
    }

    /// Poll a run until it leaves the running state.
    pub async fn wait_for_run(&self, pid: &str) -> Value {
        for _ in 0..200 {
            let response = self.get(&format!("/api/v1/jobs/{}", pid)).await;
            if response.status == StatusCode::OK && response.body["state"] != "running" {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("run {} never finished", pid);
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}
