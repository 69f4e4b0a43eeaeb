//! Analysis configuration threaded through the Scope Builder, Symbol
//! Resolver, Dependency Extractor, and Complexity Guard.

use serde::{Deserialize, Serialize};

/// What to do when a column reference resolves to more than one in-scope
/// table and no qualifier disambiguates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AmbiguityPolicy {
    /// Reject the statement with `LineageError::AmbiguousColumn`.
    Fail,
    /// Pick the first FROM-clause candidate, at reduced confidence, and
    /// record a warning.
    #[default]
    Warn,
    /// Pick the first FROM-clause candidate silently.
    Ignore,
}

/// Limits enforced by the Complexity Guard (C13).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityLimits {
    pub max_nodes: usize,
    pub max_depth: usize,
    pub max_case_branches: usize,
}

impl Default for ComplexityLimits {
    fn default() -> Self {
        Self {
            max_nodes: 1500,
            max_depth: 50,
            max_case_branches: 100,
        }
    }
}

/// What to do when a Complexity Guard limit is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityPolicy {
    Fail,
    #[default]
    Warn,
    Ignore,
}

/// Full analysis configuration. Constructed once per script analysis and
/// shared (by reference) across every Scope/Resolver/Extractor it spawns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub ambiguity_policy: AmbiguityPolicy,
    /// When true, an unqualified column reference with more than one
    /// candidate table always fails regardless of `ambiguity_policy`.
    pub require_table_prefix: bool,
    /// When true, a Schema Provider's `column_exists` contradiction is
    /// treated as a fatal `SchemaValidation` error rather than a confidence
    /// penalty.
    pub validate_against_schema: bool,
    /// When true, `SELECT *` / `table.*` is expanded using Registry/Schema
    /// column knowledge; when false (and no knowledge is available), star
    /// expansion silently yields zero sources instead of failing.
    pub expand_wildcards: bool,
    pub complexity_limits: ComplexityLimits,
    pub on_complexity_exceeded: ComplexityPolicy,
    /// Default depth bound for `trace_to_source` / `find_impact`.
    pub max_trace_depth: usize,
    /// Fudge factor applied to the recursive-CTE self-reference count when
    /// checking against `max_recursion_depth` (see CTE Extractor §4.11).
    pub max_recursion_depth: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            ambiguity_policy: AmbiguityPolicy::default(),
            require_table_prefix: false,
            validate_against_schema: false,
            expand_wildcards: true,
            complexity_limits: ComplexityLimits::default(),
            on_complexity_exceeded: ComplexityPolicy::default(),
            max_trace_depth: 100,
            max_recursion_depth: 100,
        }
    }
}

impl AnalysisConfig {
    /// `--strict`: ambiguity becomes fatal.
    pub fn strict() -> Self {
        Self {
            ambiguity_policy: AmbiguityPolicy::Fail,
            ..Self::default()
        }
    }
}
