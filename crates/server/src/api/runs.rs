//! Run ingest and backlog endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use rup_core::{Run, RunConfig, RunUpdate};

use super::{api_error, ApiError};
use crate::state::AppState;

/// A run as seen by the collector or the backlog
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run: u64,
    pub files: Vec<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub rup_config: RunConfig,
    pub n_files: usize,
    pub n_nominal_files: Option<usize>,
    pub complete: bool,
}

impl From<Run> for RunResponse {
    fn from(run: Run) -> Self {
        Self {
            complete: run.is_complete(),
            n_files: run.n_files(),
            run: run.run,
            files: run.files,
            log_file: run.log_file,
            rup_config: run.rup_config,
            n_nominal_files: run.n_nominal_files,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListRunsResponse {
    pub runs: Vec<RunResponse>,
    pub total: usize,
}

fn check_absolute(path: &Path) -> Result<(), ApiError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("Path must be absolute: {}", path.display()),
        ))
    }
}

/// Merge a run update into the collector.
///
/// A run that becomes complete is handed to the processor immediately and is
/// no longer tracked by the collector afterwards.
pub async fn report_run(
    State(state): State<Arc<AppState>>,
    Json(update): Json<RunUpdate>,
) -> Result<(StatusCode, Json<RunResponse>), ApiError> {
    for file in &update.files {
        check_absolute(file)?;
    }
    if let Some(log_file) = &update.log_file {
        check_absolute(log_file)?;
    }

    debug!(run = update.run, files = update.files.len(), "Received run update");
    let run = state.collector().report(update);
    Ok((StatusCode::ACCEPTED, Json(RunResponse::from(run))))
}

/// Runs the collector is still waiting on.
pub async fn list_collecting(State(state): State<Arc<AppState>>) -> Json<ListRunsResponse> {
    let collector = state.collector();
    let runs: Vec<RunResponse> = collector
        .tracked_runs()
        .into_iter()
        .filter_map(|run| collector.get(run))
        .map(RunResponse::from)
        .collect();

    Json(ListRunsResponse {
        total: runs.len(),
        runs,
    })
}

/// Complete runs that no rule matched.
pub async fn list_backlog(State(state): State<Arc<AppState>>) -> Json<ListRunsResponse> {
    let runs: Vec<RunResponse> = state
        .processor()
        .backlog()
        .into_iter()
        .map(RunResponse::from)
        .collect();

    Json(ListRunsResponse {
        total: runs.len(),
        runs,
    })
}
