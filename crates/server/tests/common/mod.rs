//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process router
//! with mock container runtime and tracking database injected, enabling
//! end-to-end tests without docker or a tracking service.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use rup_core::processor::{ProcessorConfig, PublishConfig};
use rup_core::testing::{MockContainerRuntime, MockTrackingDatabase};
use rup_core::{
    load_config_from_str, Collector, FileHasher, MemoryCollector, OrphanStore, Processor,
    SqliteOrphanStore, WorkerContext,
};
use rup_server::state::AppState;

/// Re-export fixtures for test convenience
pub use rup_core::testing::fixtures;

pub const IMAGE: &str = "registry.example.org/unpacker:1";

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() {
///     let fixture = TestFixture::new().await;
///     let response = fixture.get("/api/v1/health").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock container runtime, has `IMAGE` locally
    pub runtime: Arc<MockContainerRuntime>,
    /// Mock tracking database
    pub tracking: Arc<MockTrackingDatabase>,
    /// In-memory orphan store
    pub orphans: Arc<SqliteOrphanStore>,
    pub processor: Processor,
    /// Temporary directory holding incoming files, staging and rule roots
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let config = load_config_from_str(
            r#"
[server]
host = "127.0.0.1"
port = 0

[tracking]
url = "http://tracking.invalid/api"
token = "secret-token"
"#,
        )
        .expect("Failed to parse test config");

        let processor_config = ProcessorConfig::default()
            .with_max_runs(2)
            .with_max_files(2)
            .with_temp_dir(temp_dir.path().join("staging"))
            .with_host("daq01")
            .with_publish(PublishConfig {
                initial_delay_ms: 10,
                max_delay_ms: 20,
                backoff_multiplier: 2.0,
                max_elapsed_ms: 100,
            });

        let runtime = Arc::new(MockContainerRuntime::new());
        runtime.add_local_image(IMAGE).await;
        let tracking = Arc::new(MockTrackingDatabase::new());
        let orphans = Arc::new(SqliteOrphanStore::in_memory().expect("Failed to create store"));

        let ctx = WorkerContext::new(
            processor_config,
            runtime.clone(),
            tracking.clone(),
            FileHasher::default(),
        )
        .expect("Failed to create worker context")
        .with_orphan_store(orphans.clone());
        let processor = Processor::new(ctx).expect("Failed to create processor");

        let collector = Arc::new(MemoryCollector::new());
        let observed: Arc<dyn Collector> = collector.clone();
        processor.attach_collector(&observed);

        let store: Arc<dyn OrphanStore> = orphans.clone();
        let state = Arc::new(AppState::new(
            config,
            processor.clone(),
            collector,
            Some(store),
        ));
        let router = rup_server::api::create_router(state);

        Self {
            router,
            runtime,
            tracking,
            orphans,
            processor,
            temp_dir,
        }
    }

    /// Root directory for rule path templates.
    pub fn data_root(&self) -> PathBuf {
        self.temp_dir.path().join("data")
    }

    /// A rule body for `PUT /api/v1/rules` rooted in the fixture's temp dir.
    pub fn rule_json(&self, name: &str, experiment: &str) -> Value {
        let root = self.data_root();
        serde_json::json!({
            "name": name,
            "image": IMAGE,
            "when": { "experiment": experiment },
            "raw_path": format!("{}/{{facility}}/{{experiment}}/raw", root.display()),
            "unpacked_path": format!("{}/{{facility}}/{{experiment}}/unpacked", root.display()),
            "log_path": format!("{}/{{facility}}/{{experiment}}/logs", root.display()),
        })
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a GET request and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
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
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&body_bytes).into_owned())
    }

    /// Send a request to the test server.
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

    /// Wait until every dispatched run has finished.
    pub async fn wait_idle(&self) {
        for _ in 0..200 {
            let status = self.processor.status();
            let busy = status.run_pool.active_jobs + status.run_pool.queued_jobs;
            let finished = status.run_pool.total_processed + status.run_pool.total_failed;
            if busy == 0 && finished >= status.total_dispatched {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
        panic!("processor did not become idle");
    }
}
