//! Orphaned run endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use rup_core::{OrphanStore, OrphanedRun};

use super::{api_error, ApiError};
use crate::state::AppState;

/// Maximum allowed limit for orphan queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for orphan queries
const DEFAULT_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListOrphansParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListOrphansResponse {
    pub orphans: Vec<OrphanedRun>,
    pub total: i64,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct RemoveOrphanResponse {
    pub removed: bool,
}

fn store(state: &AppState) -> Result<&Arc<dyn OrphanStore>, ApiError> {
    state.orphans().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Orphan store is disabled",
        )
    })
}

/// Most recent orphaned runs first.
pub async fn list_orphans(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListOrphansParams>,
) -> Result<Json<ListOrphansResponse>, ApiError> {
    let store = store(&state)?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let orphans = store
        .list(limit)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    let total = store
        .count()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    Ok(Json(ListOrphansResponse {
        orphans,
        total,
        limit,
    }))
}

pub async fn get_orphan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<OrphanedRun>, ApiError> {
    match store(&state)?.get(id) {
        Ok(Some(orphan)) => Ok(Json(orphan)),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Orphaned run not found: {}", id),
        )),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e)),
    }
}

/// Forget an orphaned run once it has been reconciled by hand.
pub async fn remove_orphan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<RemoveOrphanResponse>, ApiError> {
    match store(&state)?.remove(id) {
        Ok(true) => {
            info!(orphan_id = id, "Removed orphaned run");
            Ok(Json(RemoveOrphanResponse { removed: true }))
        }
        Ok(false) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Orphaned run not found: {}", id),
        )),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e)),
    }
}
