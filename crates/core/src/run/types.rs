//! Run data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::rules::RuleError;

/// Run metadata used for rule matching and path templating.
///
/// Carries at least `experiment` and `facility` for any run that is routed,
/// and optionally `start_time`/`stop_time` as RFC 3339 timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunConfig(BTreeMap<String, String>);

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Merges another config into this one, overwriting existing keys.
    pub fn extend(&mut self, other: RunConfig) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns a field, failing if it is absent.
    pub fn require(&self, key: &str) -> Result<&str, RuleError> {
        self.get(key).ok_or_else(|| RuleError::missing_field(key))
    }

    pub fn experiment(&self) -> Result<&str, RuleError> {
        self.require("experiment")
    }

    pub fn facility(&self) -> Result<&str, RuleError> {
        self.require("facility")
    }

    /// Run start time, if present and well formed.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.timestamp("start_time")
    }

    /// Run stop time, if present and well formed.
    pub fn stop_time(&self) -> Option<DateTime<Utc>> {
        self.timestamp("stop_time")
    }

    fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get(key)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RunConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A data-acquisition run: its data files, optional log file and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// Run number.
    pub run: u64,
    /// Data files belonging to the run.
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Acquisition log file, once it has arrived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Run metadata.
    #[serde(default)]
    pub rup_config: RunConfig,
    /// Number of data files the run is expected to have.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_nominal_files: Option<usize>,
}

impl Run {
    pub fn new(run: u64) -> Self {
        Self {
            run,
            files: Vec::new(),
            log_file: None,
            rup_config: RunConfig::default(),
            n_nominal_files: None,
        }
    }

    /// Whether routing metadata has arrived for this run.
    pub fn has_rup(&self) -> bool {
        !self.rup_config.is_empty()
    }

    pub fn n_files(&self) -> usize {
        self.files.len()
    }

    pub fn n_nominal_files(&self) -> Option<usize> {
        self.n_nominal_files
    }

    /// A run is complete once its metadata, its log file and all of its
    /// nominal data files have arrived.
    pub fn is_complete(&self) -> bool {
        self.has_rup()
            && self.log_file.is_some()
            && self
                .n_nominal_files
                .is_some_and(|nominal| self.n_files() >= nominal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_run() -> Run {
        Run {
            run: 42,
            files: vec![PathBuf::from("/in/run0042_0.dat")],
            log_file: Some(PathBuf::from("/in/run0042.log")),
            rup_config: [("experiment", "e1"), ("facility", "f1")].into_iter().collect(),
            n_nominal_files: Some(1),
        }
    }

    #[test]
    fn test_complete_run() {
        assert!(complete_run().is_complete());
    }

    #[test]
    fn test_incomplete_without_log() {
        let mut run = complete_run();
        run.log_file = None;
        assert!(!run.is_complete());
    }

    #[test]
    fn test_incomplete_without_metadata() {
        let mut run = complete_run();
        run.rup_config = RunConfig::default();
        assert!(!run.has_rup());
        assert!(!run.is_complete());
    }

    #[test]
    fn test_incomplete_until_nominal_files_arrive() {
        let mut run = complete_run();
        run.n_nominal_files = Some(2);
        assert!(!run.is_complete());
        run.n_nominal_files = None;
        assert!(!run.is_complete());
    }

    #[test]
    fn test_missing_fields_fail() {
        let config = RunConfig::new();
        assert!(matches!(
            config.experiment(),
            Err(RuleError::MissingField { .. })
        ));
        assert!(config.facility().is_err());
    }

    #[test]
    fn test_timestamps() {
        let mut config = RunConfig::new();
        config.insert("start_time", "2024-03-01T10:00:00+09:00");
        config.insert("stop_time", "not a time");

        let start = config.start_time().unwrap();
        assert_eq!(start.to_rfc3339(), "2024-03-01T01:00:00+00:00");
        assert!(config.stop_time().is_none());
    }

    #[test]
    fn test_run_deserialize_minimal() {
        let run: Run = serde_json::from_str(r#"{"run": 7}"#).unwrap();
        assert_eq!(run.run, 7);
        assert!(run.files.is_empty());
        assert!(!run.is_complete());
    }
}
