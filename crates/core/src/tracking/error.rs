//! Error types for the tracking module.

use thiserror::Error;

/// Errors returned by a tracking database.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// The request did not complete in time.
    #[error("Tracking database request timed out")]
    Timeout,

    /// The database could not be reached.
    #[error("Connection to tracking database failed: {0}")]
    Connection(String),

    /// The database reported a server-side failure (5xx).
    #[error("Tracking database server error {status}: {body}")]
    Server { status: u16, body: String },

    /// The database refused the request (4xx).
    #[error("Tracking database rejected request with {status}: {body}")]
    Rejected { status: u16, body: String },

    /// More than one entry matched a run lookup.
    #[error("Run {run_number} ({experiment}/{facility}) matched {count} entries")]
    AmbiguousRun {
        run_number: u64,
        experiment: String,
        facility: String,
        count: usize,
    },

    /// The response body could not be decoded.
    #[error("Failed to decode tracking database response: {0}")]
    Decode(String),

    /// The client could not be built from its configuration.
    #[error("Tracking client not configured: {0}")]
    NotConfigured(String),
}

impl TrackingError {
    /// Whether the request may succeed if repeated later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection(_) | Self::Server { .. }
        )
    }
}

impl From<reqwest::Error> for TrackingError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if e.is_builder() {
            Self::NotConfigured(e.to_string())
        } else {
            Self::Connection(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(TrackingError::Timeout.is_retryable());
        assert!(TrackingError::Connection("refused".into()).is_retryable());
        assert!(TrackingError::Server {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!TrackingError::Rejected {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!TrackingError::Decode("eof".into()).is_retryable());
    }
}
