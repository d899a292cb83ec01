//! Configuration for routing rules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A routing rule as written in configuration.
///
/// ```toml
/// [[rules]]
/// name = "beamtime"
/// image = "registry.example.org/unpacker:2.3"
/// when = { facility = "ribf", experiment = "/^NP\\d+$/" }
/// raw_path = "/data/{facility}/{experiment}/raw"
/// unpacked_path = "/data/{facility}/{experiment}/unpacked"
/// log_path = "/data/{facility}/{experiment}/logs"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Unique rule name, used in logs and reports.
    pub name: String,

    /// Container image used to unpack the run's data files.
    pub image: String,

    /// Conditions on run metadata. Every condition must hold for the rule to
    /// match. Values wrapped in slashes are regular expressions, anything else
    /// must match exactly.
    #[serde(default)]
    pub when: BTreeMap<String, String>,

    /// Template for the raw data directory.
    pub raw_path: String,

    /// Template for the unpacked output directory.
    pub unpacked_path: String,

    /// Template for the log directory.
    pub log_path: String,
}

impl RuleConfig {
    /// Creates a rule that matches every run.
    pub fn new(name: impl Into<String>, image: impl Into<String>, root: &str) -> Self {
        let root = root.trim_end_matches('/');
        Self {
            name: name.into(),
            image: image.into(),
            when: BTreeMap::new(),
            raw_path: format!("{}/{{facility}}/{{experiment}}/raw", root),
            unpacked_path: format!("{}/{{facility}}/{{experiment}}/unpacked", root),
            log_path: format!("{}/{{facility}}/{{experiment}}/logs", root),
        }
    }

    /// Adds a metadata condition.
    pub fn when(mut self, key: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.when.insert(key.into(), pattern.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_rule() {
        let toml = r#"
            name = "beamtime"
            image = "unpacker:2.3"
            when = { facility = "ribf", experiment = "/^NP\\d+$/" }
            raw_path = "/data/{facility}/{experiment}/raw"
            unpacked_path = "/data/{facility}/{experiment}/unpacked"
            log_path = "/data/{facility}/{experiment}/logs"
        "#;
        let rule: RuleConfig = toml::from_str(toml).unwrap();
        assert_eq!(rule.name, "beamtime");
        assert_eq!(rule.when.get("facility").map(String::as_str), Some("ribf"));
        assert_eq!(
            rule.when.get("experiment").map(String::as_str),
            Some("/^NP\\d+$/")
        );
    }

    #[test]
    fn test_deserialize_without_conditions() {
        let toml = r#"
            name = "catch-all"
            image = "unpacker:latest"
            raw_path = "/raw"
            unpacked_path = "/unpacked"
            log_path = "/logs"
        "#;
        let rule: RuleConfig = toml::from_str(toml).unwrap();
        assert!(rule.when.is_empty());
    }

    #[test]
    fn test_builder() {
        let rule = RuleConfig::new("r", "img", "/data/").when("facility", "ribf");
        assert_eq!(rule.raw_path, "/data/{facility}/{experiment}/raw");
        assert_eq!(rule.when.len(), 1);
    }
}
