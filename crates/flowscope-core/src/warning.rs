//! Warning Collector (C14): accumulates non-fatal diagnostics produced during
//! resolution, CTE expansion, and complexity checks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub level: WarningLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl Warning {
    pub fn new(level: WarningLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Per-resolver (i.e. per-scope) warning sink. The caller is responsible for
/// merging warnings from child scopes/extractors into a script-level summary.
#[derive(Debug, Clone, Default)]
pub struct WarningCollector {
    warnings: Vec<Warning>,
}

impl WarningCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Warning::new(WarningLevel::Info, message));
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Warning::new(WarningLevel::Warning, message));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Warning::new(WarningLevel::Error, message));
    }

    /// Records an ambiguous-column resolution that was downgraded (policy
    /// `Warn`/`Ignore`) instead of rejected.
    pub fn ambiguity(&mut self, column: &str, candidates: &[String], chosen: &str) {
        self.push(
            Warning::new(
                WarningLevel::Warning,
                format!(
                    "column '{column}' is ambiguous across {candidates:?}; chose '{chosen}'"
                ),
            )
            .with_context("column", column)
            .with_context("chosen", chosen),
        );
    }

    pub fn missing_schema(&mut self, table: &str) {
        self.push(
            Warning::new(
                WarningLevel::Warning,
                format!("no schema information available for table '{table}'"),
            )
            .with_context("table", table),
        );
    }

    pub fn inference(&mut self, message: impl Into<String>) {
        self.push(Warning::new(WarningLevel::Info, message));
    }

    pub fn extend(&mut self, other: WarningCollector) {
        self.warnings.extend(other.warnings);
    }

    pub fn into_vec(self) -> Vec<Warning> {
        self.warnings
    }

    pub fn as_slice(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Summary of warning counts by level, for `ScriptResult` reporting.
    pub fn summary(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for warning in &self.warnings {
            let key = match warning.level {
                WarningLevel::Info => "info",
                WarningLevel::Warning => "warning",
                WarningLevel::Error => "error",
            };
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_by_level() {
        let mut collector = WarningCollector::new();
        collector.warn("a");
        collector.warn("b");
        collector.error("c");
        let summary = collector.summary();
        assert_eq!(summary.get("warning"), Some(&2));
        assert_eq!(summary.get("error"), Some(&1));
    }

    #[test]
    fn extend_merges_collectors() {
        let mut a = WarningCollector::new();
        a.info("from a");
        let mut b = WarningCollector::new();
        b.info("from b");
        a.extend(b);
        assert_eq!(a.into_vec().len(), 2);
    }
}
