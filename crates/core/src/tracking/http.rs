//! JSON-over-HTTP tracking database client.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::hashing::FileRecord;

use super::config::TrackingConfig;
use super::error::TrackingError;
use super::traits::TrackingDatabase;
use super::types::{RunEntry, RunKey};

/// Tracking database client speaking a small REST API.
///
/// - `GET {base}/runs?run_number=..&experiment=..&facility=..` returns a JSON
///   list of run entries
/// - `POST {base}/runs/{run_id}/files` takes `{"files": [...]}`
pub struct HttpTrackingClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct AddFilesRequest<'a> {
    files: &'a [FileRecord],
}

impl HttpTrackingClient {
    /// Creates a new client.
    pub fn new(config: TrackingConfig) -> Result<Self, TrackingError> {
        if config.url.trim().is_empty() {
            return Err(TrackingError::NotConfigured(
                "tracking url is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.filter(|t| !t.is_empty()),
        })
    }

    fn runs_url(&self) -> String {
        format!("{}/runs", self.base_url)
    }

    fn files_url(&self, run_id: &str) -> String {
        format!("{}/runs/{}/files", self.base_url, run_id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check_status(response: Response) -> Result<Response, TrackingError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(TrackingError::Server {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(TrackingError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Reduces a lookup result to zero or one entry.
    fn single_entry(key: &RunKey, entries: Vec<RunEntry>) -> Result<Option<RunEntry>, TrackingError> {
        match entries.len() {
            0 | 1 => Ok(entries.into_iter().next()),
            count => Err(TrackingError::AmbiguousRun {
                run_number: key.run_number,
                experiment: key.experiment.clone(),
                facility: key.facility.clone(),
                count,
            }),
        }
    }
}

#[async_trait]
impl TrackingDatabase for HttpTrackingClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn find_run(&self, key: &RunKey) -> Result<Option<RunEntry>, TrackingError> {
        debug!(run = key.run_number, experiment = %key.experiment, facility = %key.facility, "Looking up run");

        let request = self.client.get(self.runs_url()).query(&[
            ("run_number", key.run_number.to_string()),
            ("experiment", key.experiment.clone()),
            ("facility", key.facility.clone()),
        ]);

        let response = Self::check_status(self.authorize(request).send().await?).await?;
        let entries: Vec<RunEntry> = response
            .json()
            .await
            .map_err(|e| TrackingError::Decode(e.to_string()))?;

        Self::single_entry(key, entries)
    }

    async fn add_files(&self, run_id: &str, records: &[FileRecord]) -> Result<(), TrackingError> {
        debug!(run_id = %run_id, count = records.len(), "Attaching files to run");

        let request = self
            .client
            .post(self.files_url(run_id))
            .json(&AddFilesRequest { files: records });

        Self::check_status(self.authorize(request).send().await?).await?;
        Ok(())
    }
}
