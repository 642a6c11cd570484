//! Structured diagnostics reported to the invoking build layer.

use serde::Serialize;
use std::fmt;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Processing of the subject stopped
    Error,
    /// Processing continued with a fallback
    Warning,
}

impl Severity {
    /// Returns the lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

/// A single validator, discovery or cycle finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Error or warning
    pub severity: Severity,
    /// Message text, stable for consumers that match on it
    pub message: String,
    /// Unit the finding is about
    pub unit: String,
    /// Type the finding is about, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

impl Diagnostic {
    /// Creates an error diagnostic
    pub fn error(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            unit: unit.into(),
            type_name: None,
        }
    }

    /// Creates a warning diagnostic
    pub fn warning(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            unit: unit.into(),
            type_name: None,
        }
    }

    /// Attaches the subject type
    pub fn with_type(mut self, type_name: Option<String>) -> Self {
        self.type_name = type_name;
        self
    }

    /// Returns true for error diagnostics
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.severity.as_str(), self.unit, self.message)
    }
}
