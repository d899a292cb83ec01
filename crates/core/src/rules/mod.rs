//! Routing rules.
//!
//! A rule decides whether a run belongs to it and where the run's raw,
//! unpacked and log files are stored. Rules are evaluated in configured order
//! and the first match wins. A [`RuleSet`] is immutable once compiled; the
//! processor replaces it wholesale when rules change.

mod config;
mod error;
mod rule;

pub use config::RuleConfig;
pub use error::RuleError;
pub use rule::{Rule, RuleSet, RunPaths};
