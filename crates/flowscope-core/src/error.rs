//! Fatal error taxonomy for script splitting and analysis.
//!
//! # Error handling strategy
//!
//! This crate uses two complementary patterns, mirroring the original Python
//! implementation's split between raised exceptions and collected warnings:
//!
//! - [`LineageError`]: fatal errors that abort analysis of the statement (or,
//!   for [`LineageError::ParseFailure`]/[`LineageError::EmptyScript`], the whole
//!   script). Returned as `Result<T, LineageError>`.
//! - [`crate::warning::Warning`]: non-fatal diagnostics accumulated in a
//!   [`crate::warning::WarningCollector`] alongside a (possibly partial)
//!   successful result.
//!
//! Every variant carries a `context` map of structured key/value pairs so a
//! host (CLI, JSON export) can render detail without parsing the message.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub type Context = BTreeMap<String, String>;

/// Fatal error raised while splitting, classifying, or analyzing a script.
///
/// Corresponds one-to-one with the error kinds in the design's error table:
/// `ParseFailure`, `EmptyScript`, `AmbiguousColumn`, `UnresolvedReference`,
/// `SchemaValidation`, `ComplexityExceeded`, `IncorrectStatementType`,
/// `TargetMissing`, `ColumnCountMismatch`, `NotImplemented`.
#[derive(Debug, Error, Clone)]
pub enum LineageError {
    #[error("failed to parse SQL: {message}")]
    ParseFailure { message: String, context: Context },

    #[error("script contains no usable statements")]
    EmptyScript { context: Context },

    #[error("column '{column}' is ambiguous across tables {candidates:?}")]
    AmbiguousColumn {
        column: String,
        candidates: Vec<String>,
        suggestion: Option<String>,
        context: Context,
    },

    #[error("unresolved reference '{reference}': {message}")]
    UnresolvedReference {
        reference: String,
        message: String,
        context: Context,
    },

    #[error("schema validation failed: {message}")]
    SchemaValidation { message: String, context: Context },

    #[error("complexity limit exceeded: {message}")]
    ComplexityExceeded { message: String, context: Context },

    #[error("analyzer received statement of incorrect kind: expected {expected}, got {actual}")]
    IncorrectStatementType {
        expected: String,
        actual: String,
        context: Context,
    },

    #[error("INSERT target table '{table}' does not exist in the registry")]
    TargetMissing { table: String, context: Context },

    #[error("column count mismatch: expected {expected}, got {actual}")]
    ColumnCountMismatch {
        expected: usize,
        actual: usize,
        context: Context,
    },

    #[error("not implemented: {message}")]
    NotImplemented { message: String, context: Context },

    /// Not one of the ten named kinds in the design's error table, but
    /// required by the registry invariant in spec.md §4.4/§8: "a source
    /// (External) table may not be redefined."
    #[error("cannot redefine source table '{table}': source tables are assumed to exist before the script")]
    SourceRedefinition { table: String, context: Context },
}

impl LineageError {
    pub fn parse_failure(message: impl Into<String>) -> Self {
        Self::ParseFailure {
            message: message.into(),
            context: Context::new(),
        }
    }

    pub fn empty_script() -> Self {
        Self::EmptyScript {
            context: Context::new(),
        }
    }

    pub fn ambiguous_column(
        column: impl Into<String>,
        candidates: Vec<String>,
        suggestion: Option<String>,
    ) -> Self {
        Self::AmbiguousColumn {
            column: column.into(),
            candidates,
            suggestion,
            context: Context::new(),
        }
    }

    pub fn unresolved_reference(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            reference: reference.into(),
            message: message.into(),
            context: Context::new(),
        }
    }

    pub fn schema_validation(message: impl Into<String>) -> Self {
        Self::SchemaValidation {
            message: message.into(),
            context: Context::new(),
        }
    }

    pub fn complexity_exceeded(message: impl Into<String>) -> Self {
        Self::ComplexityExceeded {
            message: message.into(),
            context: Context::new(),
        }
    }

    pub fn incorrect_statement_type(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::IncorrectStatementType {
            expected: expected.into(),
            actual: actual.into(),
            context: Context::new(),
        }
    }

    pub fn target_missing(table: impl Into<String>) -> Self {
        Self::TargetMissing {
            table: table.into(),
            context: Context::new(),
        }
    }

    pub fn column_count_mismatch(expected: usize, actual: usize) -> Self {
        Self::ColumnCountMismatch {
            expected,
            actual,
            context: Context::new(),
        }
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::NotImplemented {
            message: message.into(),
            context: Context::new(),
        }
    }

    pub fn source_redefinition(table: impl Into<String>) -> Self {
        Self::SourceRedefinition {
            table: table.into(),
            context: Context::new(),
        }
    }

    /// Attaches a structured context entry, builder-style.
    pub fn with_context(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        let ctx = match &mut self {
            Self::ParseFailure { context, .. }
            | Self::EmptyScript { context }
            | Self::AmbiguousColumn { context, .. }
            | Self::UnresolvedReference { context, .. }
            | Self::SchemaValidation { context, .. }
            | Self::ComplexityExceeded { context, .. }
            | Self::IncorrectStatementType { context, .. }
            | Self::TargetMissing { context, .. }
            | Self::ColumnCountMismatch { context, .. }
            | Self::NotImplemented { context, .. }
            | Self::SourceRedefinition { context, .. } => context,
        };
        ctx.insert(key.into(), value.to_string());
        self
    }

    /// Machine-readable kind name, for CLI exit-code mapping and JSON rendering.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ParseFailure { .. } => "parse_failure",
            Self::EmptyScript { .. } => "empty_script",
            Self::AmbiguousColumn { .. } => "ambiguous_column",
            Self::UnresolvedReference { .. } => "unresolved_reference",
            Self::SchemaValidation { .. } => "schema_validation",
            Self::ComplexityExceeded { .. } => "complexity_exceeded",
            Self::IncorrectStatementType { .. } => "incorrect_statement_type",
            Self::TargetMissing { .. } => "target_missing",
            Self::ColumnCountMismatch { .. } => "column_count_mismatch",
            Self::NotImplemented { .. } => "not_implemented",
            Self::SourceRedefinition { .. } => "source_redefinition",
        }
    }
}

impl From<sqlparser::parser::ParserError> for LineageError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        Self::parse_failure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(LineageError::empty_script().kind(), "empty_script");
        assert_eq!(
            LineageError::target_missing("sink").kind(),
            "target_missing"
        );
    }

    #[test]
    fn with_context_attaches_entries() {
        let err = LineageError::target_missing("sink").with_context("statement", 3);
        match err {
            LineageError::TargetMissing { context, .. } => {
                assert_eq!(context.get("statement").map(String::as_str), Some("3"));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn ambiguous_column_display() {
        let err = LineageError::ambiguous_column(
            "id",
            vec!["orders".to_string(), "customers".to_string()],
            Some("use orders.id or customers.id".to_string()),
        );
        assert!(err.to_string().contains("is ambiguous"));
    }
}
