//! API tests driven through the router with mock services.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{fixtures, TestFixture};
use rup_core::{OrphanStore, OrphanedRun, RunKey};

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_hides_token() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/config").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["tracking"]["token_configured"], true);
    assert!(!response.body.to_string().contains("secret-token"));
}

#[tokio::test]
async fn test_status_reports_pools() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/status").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["run_pool"]["name"], "runs");
    assert_eq!(response.body["run_pool"]["max_concurrent"], 2);
    assert_eq!(response.body["file_pool"]["max_concurrent"], 2);
    assert_eq!(response.body["backlog_len"], 0);
    assert_eq!(response.body["rule_count"], 0);
}

#[tokio::test]
async fn test_replace_and_get_rules() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .put(
            "/api/v1/rules",
            json!([fixture.rule_json("e123", "e123"), fixture.rule_json("np", "/^NP\\d+$/")]),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["rules"], 2);
    assert_eq!(response.body["drained"], 0);

    let response = fixture.get("/api/v1/rules").await;
    assert_eq!(response.status, StatusCode::OK);
    let rules = response.body["rules"].as_array().unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0]["name"], "e123");
    assert_eq!(rules[1]["when"]["experiment"], "/^NP\\d+$/");
}

#[tokio::test]
async fn test_invalid_rules_are_rejected() {
    let fixture = TestFixture::new().await;
    fixture
        .put("/api/v1/rules", json!([fixture.rule_json("keep", "e123")]))
        .await;

    let duplicate = json!([fixture.rule_json("dup", "a"), fixture.rule_json("dup", "b")]);
    let response = fixture.put("/api/v1/rules", duplicate).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());

    let bad_regex = fixture.rule_json("regex", "/[unclosed/");
    let response = fixture.put("/api/v1/rules", json!([bad_regex])).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    // The previous rule set is still active.
    let response = fixture.get("/api/v1/rules").await;
    assert_eq!(response.body["rules"][0]["name"], "keep");
}

#[tokio::test]
async fn test_relative_paths_are_rejected() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post(
            "/api/v1/runs",
            json!({ "run": 1, "files": ["incoming/run0001_0001.lmd"] }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(fixture.get("/api/v1/runs").await.body["runs"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_incomplete_run_is_tracked() {
    let fixture = TestFixture::new().await;
    let run = fixtures::write_run(fixture.temp_dir.path(), 12, "e123", "hall-a", 2);

    let response = fixture
        .post(
            "/api/v1/runs",
            json!({
                "run": 12,
                "files": [run.files[0]],
                "rup_config": { "experiment": "e123", "facility": "hall-a" },
                "n_nominal_files": 2
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.body["complete"], false);
    assert_eq!(response.body["n_files"], 1);

    let response = fixture.get("/api/v1/runs").await;
    assert_eq!(response.body["total"], 1);
    assert_eq!(response.body["runs"][0]["run"], 12);
}

#[tokio::test]
async fn test_reported_run_is_processed_after_rules_arrive() {
    let fixture = TestFixture::new().await;
    fixture
        .tracking
        .register_run(RunKey::new(42, "e123", "hall-a"), "r-42")
        .await;
    let run = fixtures::write_run(fixture.temp_dir.path(), 42, "e123", "hall-a", 2);

    let response = fixture
        .post(
            "/api/v1/runs",
            json!({
                "run": 42,
                "files": run.files,
                "log_file": run.log_file,
                "rup_config": { "experiment": "e123", "facility": "hall-a" },
                "n_nominal_files": 2
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.body["complete"], true);

    // No rules yet, so the run waits in the backlog.
    let response = fixture.get("/api/v1/backlog").await;
    assert_eq!(response.body["total"], 1);
    assert_eq!(response.body["runs"][0]["run"], 42);
    assert_eq!(fixture.get("/api/v1/runs").await.body["total"], 0);

    let response = fixture
        .put("/api/v1/rules", json!([fixture.rule_json("e123", "e123")]))
        .await;
    assert_eq!(response.body["drained"], 1);
    fixture.wait_idle().await;

    assert_eq!(fixture.get("/api/v1/backlog").await.body["total"], 0);
    let records = fixture.tracking.records_for("r-42").await;
    assert_eq!(records.len(), 5);

    let unpacked = fixture
        .data_root()
        .join("hall-a")
        .join("e123")
        .join("unpacked");
    assert!(unpacked.join("run0042_0001.root").exists());
    assert!(unpacked.join("run0042_0002.root").exists());

    let status = fixture.get("/api/v1/status").await;
    assert_eq!(status.body["total_dispatched"], 1);
    assert_eq!(status.body["run_pool"]["total_processed"], 1);
}

#[tokio::test]
async fn test_orphans_can_be_listed_and_removed() {
    let fixture = TestFixture::new().await;
    let id = fixture
        .orphans
        .insert(&OrphanedRun::new(7, "e123", "hall-a", "run not found", vec![]))
        .unwrap();

    let response = fixture.get("/api/v1/orphans").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["total"], 1);
    assert_eq!(response.body["orphans"][0]["run_number"], 7);

    let response = fixture.get(&format!("/api/v1/orphans/{}", id)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["reason"], "run not found");

    let response = fixture.delete(&format!("/api/v1/orphans/{}", id)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["removed"], true);

    let response = fixture.get(&format!("/api/v1/orphans/{}", id)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unregistered_run_shows_up_as_orphan() {
    let fixture = TestFixture::new().await;
    fixture
        .put("/api/v1/rules", json!([fixture.rule_json("e123", "e123")]))
        .await;
    let run = fixtures::write_run(fixture.temp_dir.path(), 13, "e123", "hall-a", 1);

    fixture
        .post(
            "/api/v1/runs",
            json!({
                "run": 13,
                "files": run.files,
                "log_file": run.log_file,
                "rup_config": { "experiment": "e123", "facility": "hall-a" },
                "n_nominal_files": 1
            }),
        )
        .await;
    fixture.wait_idle().await;

    let response = fixture.get("/api/v1/orphans").await;
    assert_eq!(response.body["total"], 1);
    assert_eq!(response.body["orphans"][0]["run_number"], 13);
    assert_eq!(
        response.body["orphans"][0]["records"].as_array().unwrap().len(),
        3
    );
    assert_eq!(fixture.get("/api/v1/status").await.body["total_orphaned"], 1);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.get("/api/v1/health").await;

    let (status, body) = fixture.get_text("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("rup_http_requests_total"));
    assert!(body.contains("rup_backlog_length"));
}
