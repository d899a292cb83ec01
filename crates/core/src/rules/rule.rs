//! Compiled rules and rule sets.

use regex_lite::Regex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::run::RunConfig;

use super::config::RuleConfig;
use super::error::RuleError;

/// Destination directories for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub raw: PathBuf,
    pub unpacked: PathBuf,
    pub log: PathBuf,
}

#[derive(Debug, Clone)]
enum Matcher {
    Exact(String),
    Pattern(Regex),
}

impl Matcher {
    fn is_match(&self, value: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == value,
            Self::Pattern(re) => re.is_match(value),
        }
    }
}

#[derive(Debug, Clone)]
struct Condition {
    key: String,
    matcher: Matcher,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Experiment,
    Facility,
}

/// A path template with `{experiment}` and `{facility}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PathTemplate {
    segments: Vec<Segment>,
}

impl PathTemplate {
    fn parse(rule: &str, template: &str) -> Result<Self, RuleError> {
        let invalid = |reason: String| RuleError::InvalidTemplate {
            rule: rule.to_string(),
            template: template.to_string(),
            reason,
        };

        let mut segments = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| invalid("unterminated placeholder".to_string()))?;
            match &after[..close] {
                "experiment" => segments.push(Segment::Experiment),
                "facility" => segments.push(Segment::Facility),
                other => return Err(invalid(format!("unknown placeholder {{{}}}", other))),
            }
            rest = &after[close + 1..];
        }

        if rest.contains('}') {
            return Err(invalid("unbalanced '}'".to_string()));
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    fn render(&self, experiment: &str, facility: &str) -> PathBuf {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Experiment => out.push_str(experiment),
                Segment::Facility => out.push_str(facility),
            }
        }
        PathBuf::from(out)
    }
}

/// A compiled routing rule.
#[derive(Debug, Clone)]
pub struct Rule {
    config: RuleConfig,
    conditions: Vec<Condition>,
    raw: PathTemplate,
    unpacked: PathTemplate,
    log: PathTemplate,
}

impl Rule {
    /// Compiles a rule from its configuration.
    pub fn compile(config: RuleConfig) -> Result<Self, RuleError> {
        if config.name.trim().is_empty() {
            return Err(RuleError::EmptyName);
        }
        if config.image.trim().is_empty() {
            return Err(RuleError::MissingImage {
                rule: config.name.clone(),
            });
        }

        let mut conditions = Vec::with_capacity(config.when.len());
        for (key, pattern) in &config.when {
            let matcher = match pattern
                .strip_prefix('/')
                .and_then(|p| p.strip_suffix('/'))
            {
                Some(expr) => Matcher::Pattern(Regex::new(expr).map_err(|e| {
                    RuleError::InvalidPattern {
                        rule: config.name.clone(),
                        key: key.clone(),
                        reason: e.to_string(),
                    }
                })?),
                None => Matcher::Exact(pattern.clone()),
            };
            conditions.push(Condition {
                key: key.clone(),
                matcher,
            });
        }

        let raw = PathTemplate::parse(&config.name, &config.raw_path)?;
        let unpacked = PathTemplate::parse(&config.name, &config.unpacked_path)?;
        let log = PathTemplate::parse(&config.name, &config.log_path)?;

        Ok(Self {
            config,
            conditions,
            raw,
            unpacked,
            log,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Container image used to unpack matched runs.
    pub fn image(&self) -> &str {
        &self.config.image
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Whether every condition holds for the given metadata.
    ///
    /// Conditions on keys absent from the metadata never hold.
    pub fn matches(&self, metadata: &RunConfig) -> bool {
        self.conditions.iter().all(|c| {
            metadata
                .get(&c.key)
                .is_some_and(|value| c.matcher.is_match(value))
        })
    }

    pub fn raw_path(&self, experiment: &str, facility: &str) -> PathBuf {
        self.raw.render(experiment, facility)
    }

    pub fn unpacked_path(&self, experiment: &str, facility: &str) -> PathBuf {
        self.unpacked.render(experiment, facility)
    }

    pub fn log_path(&self, experiment: &str, facility: &str) -> PathBuf {
        self.log.render(experiment, facility)
    }

    /// Resolves all three destination directories for a run.
    pub fn paths_for(&self, metadata: &RunConfig) -> Result<RunPaths, RuleError> {
        let experiment = metadata.experiment()?;
        let facility = metadata.facility()?;
        Ok(RunPaths {
            raw: self.raw_path(experiment, facility),
            unpacked: self.unpacked_path(experiment, facility),
            log: self.log_path(experiment, facility),
        })
    }
}

/// An immutable, ordered set of rules. The first matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Arc<Rule>>,
}

impl RuleSet {
    /// Compiles rules in order, rejecting duplicate names.
    pub fn compile(configs: &[RuleConfig]) -> Result<Self, RuleError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(configs.len());

        for config in configs {
            if !seen.insert(config.name.clone()) {
                return Err(RuleError::DuplicateName(config.name.clone()));
            }
            rules.push(Arc::new(Rule::compile(config.clone())?));
        }

        Ok(Self { rules })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the first rule, in configured order, that matches.
    pub fn first_match(&self, metadata: &RunConfig) -> Option<&Arc<Rule>> {
        self.rules.iter().find(|rule| rule.matches(metadata))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The configurations the set was compiled from.
    pub fn configs(&self) -> Vec<RuleConfig> {
        self.rules.iter().map(|r| r.config().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, &str)]) -> RunConfig {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_paths_rendered_from_templates() {
        let rule = Rule::compile(RuleConfig::new("r", "img", "/data")).unwrap();
        let md = metadata(&[("experiment", "NP1912"), ("facility", "ribf")]);

        let paths = rule.paths_for(&md).unwrap();
        assert_eq!(paths.raw, PathBuf::from("/data/ribf/NP1912/raw"));
        assert_eq!(paths.unpacked, PathBuf::from("/data/ribf/NP1912/unpacked"));
        assert_eq!(paths.log, PathBuf::from("/data/ribf/NP1912/logs"));
    }

    #[test]
    fn test_paths_fail_fast_on_missing_field() {
        let rule = Rule::compile(RuleConfig::new("r", "img", "/data")).unwrap();
        let md = metadata(&[("experiment", "NP1912")]);

        let err = rule.paths_for(&md).unwrap_err();
        assert!(matches!(err, RuleError::MissingField { ref field } if field == "facility"));
    }

    #[test]
    fn test_exact_and_regex_conditions() {
        let rule = Rule::compile(
            RuleConfig::new("r", "img", "/data")
                .when("facility", "ribf")
                .when("experiment", "/^NP\\d+$/"),
        )
        .unwrap();

        assert!(rule.matches(&metadata(&[("facility", "ribf"), ("experiment", "NP1912")])));
        assert!(!rule.matches(&metadata(&[("facility", "ribf"), ("experiment", "test")])));
        assert!(!rule.matches(&metadata(&[("facility", "gsi"), ("experiment", "NP1912")])));
        assert!(!rule.matches(&metadata(&[("experiment", "NP1912")])));
    }

    #[test]
    fn test_rule_without_conditions_matches_everything() {
        let rule = Rule::compile(RuleConfig::new("any", "img", "/data")).unwrap();
        assert!(rule.matches(&RunConfig::default()));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let err = Rule::compile(RuleConfig::new("r", "img", "/data").when("experiment", "/(/"))
            .unwrap_err();
        assert!(matches!(err, RuleError::InvalidPattern { .. }));
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let mut config = RuleConfig::new("r", "img", "/data");
        config.log_path = "/data/{run}/logs".to_string();
        assert!(matches!(
            Rule::compile(config),
            Err(RuleError::InvalidTemplate { .. })
        ));

        let mut config = RuleConfig::new("r", "img", "/data");
        config.raw_path = "/data/{facility".to_string();
        assert!(matches!(
            Rule::compile(config),
            Err(RuleError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn test_first_match_respects_order() {
        let set = RuleSet::compile(&[
            RuleConfig::new("specific", "img-a", "/a").when("facility", "ribf"),
            RuleConfig::new("general", "img-b", "/b"),
        ])
        .unwrap();

        let md = metadata(&[("facility", "ribf"), ("experiment", "e1")]);
        assert_eq!(set.first_match(&md).unwrap().name(), "specific");

        let md = metadata(&[("facility", "gsi"), ("experiment", "e1")]);
        assert_eq!(set.first_match(&md).unwrap().name(), "general");
    }

    #[test]
    fn test_first_match_none() {
        let set = RuleSet::compile(&[RuleConfig::new("r", "img", "/a").when("facility", "ribf")])
            .unwrap();
        assert!(set.first_match(&metadata(&[("facility", "gsi")])).is_none());
        assert!(RuleSet::empty().first_match(&RunConfig::default()).is_none());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = RuleSet::compile(&[
            RuleConfig::new("r", "img", "/a"),
            RuleConfig::new("r", "img", "/b"),
        ])
        .unwrap_err();
        assert!(matches!(err, RuleError::DuplicateName(name) if name == "r"));
    }

    #[test]
    fn test_empty_image_rejected() {
        let err = Rule::compile(RuleConfig::new("r", " ", "/a")).unwrap_err();
        assert!(matches!(err, RuleError::MissingImage { .. }));
    }
}
