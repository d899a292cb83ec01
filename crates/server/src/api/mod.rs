pub mod handlers;
pub mod middleware;
pub mod orphans;
pub mod routes;
pub mod rules;
pub mod runs;

pub use routes::create_router;

use axum::{http::StatusCode, Json};
use serde::Serialize;

/// Error response body shared by all endpoints
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A JSON error with its status code.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}
