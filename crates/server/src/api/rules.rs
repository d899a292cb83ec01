//! Rule set endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use rup_core::{RuleConfig, RuleSet};

use super::{api_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RulesResponse {
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Serialize)]
pub struct ReplaceRulesResponse {
    pub rules: usize,
    /// Backlogged runs dispatched under the new rules.
    pub drained: usize,
}

/// The active rules, in matching order.
pub async fn get_rules(State(state): State<Arc<AppState>>) -> Json<RulesResponse> {
    Json(RulesResponse {
        rules: state.processor().rules().configs(),
    })
}

/// Replace the whole rule set. Rejected sets leave the active rules untouched.
pub async fn replace_rules(
    State(state): State<Arc<AppState>>,
    Json(configs): Json<Vec<RuleConfig>>,
) -> Result<Json<ReplaceRulesResponse>, ApiError> {
    let rules = RuleSet::compile(&configs).map_err(|e| {
        warn!(error = %e, "Rejected rule set");
        api_error(StatusCode::BAD_REQUEST, e)
    })?;

    let count = rules.len();
    let drained = state.processor().set_rules(rules);
    info!(rules = count, drained, "Rule set replaced via API");

    Ok(Json(ReplaceRulesResponse {
        rules: count,
        drained,
    }))
}
