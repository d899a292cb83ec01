//! Error types for the rules module.

use thiserror::Error;

/// Errors raised while compiling or applying routing rules.
#[derive(Debug, Error)]
pub enum RuleError {
    /// A run's metadata lacks a field needed to build its paths.
    #[error("Run metadata is missing required field: {field}")]
    MissingField { field: String },

    /// A rule was configured without a name.
    #[error("Rule name cannot be empty")]
    EmptyName,

    /// Two rules share the same name.
    #[error("Duplicate rule name: {0}")]
    DuplicateName(String),

    /// A rule was configured without a container image.
    #[error("Rule {rule} has no container image")]
    MissingImage { rule: String },

    /// A `/.../` condition is not a valid regular expression.
    #[error("Rule {rule} has an invalid pattern for {key}: {reason}")]
    InvalidPattern {
        rule: String,
        key: String,
        reason: String,
    },

    /// A path template contains an unknown or unterminated placeholder.
    #[error("Rule {rule} has an invalid path template {template:?}: {reason}")]
    InvalidTemplate {
        rule: String,
        template: String,
        reason: String,
    },
}

impl RuleError {
    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}
