//! Backward-incompatible change records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How severe a reported change is for existing clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Likely to break some clients.
    Warning,
    /// Breaks clients relying on the previous contract.
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One backward-incompatible change between two document versions.
///
/// Produced by an evaluator and delivered as-is; never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Incompatibility {
    /// Rule identifier, e.g. `api-path-removed`.
    pub id: String,
    /// Human readable description.
    pub text: String,
    /// Severity.
    pub level: Level,
    /// HTTP method of the affected operation (upper case), empty for path-level changes.
    pub operation: String,
    /// Affected path as written in the older document.
    pub path: String,
    /// Locator of the document the change was observed in.
    pub source: String,
}

impl Incompatibility {
    /// Create an error-level incompatibility.
    pub fn error(
        id: impl Into<String>,
        text: impl Into<String>,
        operation: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            level: Level::Error,
            operation: operation.into(),
            path: path.into(),
            source: String::new(),
        }
    }

    /// Override the level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set the source locator.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

impl fmt::Display for Incompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operation.is_empty() {
            write!(f, "{} [{}] {}: {}", self.level, self.id, self.path, self.text)
        } else {
            write!(
                f,
                "{} [{}] {} {}: {}",
                self.level, self.id, self.operation, self.path, self.text
            )
        }
    }
}
