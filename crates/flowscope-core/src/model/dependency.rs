//! `ColumnDependency` (spec.md §3): one edge produced by the Dependency
//! Extractor, before grouping into `ColumnLineage`.

use super::column::ColumnRef;
use super::expression_kind::{AggregateFunction, ExpressionKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDependency {
    pub source: ColumnRef,
    pub target: ColumnRef,
    pub expr_kind: ExpressionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression_text: Option<String>,
    pub confidence: f64,
    pub is_aggregate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_function: Option<AggregateFunction>,
    pub is_group_by: bool,
}

impl ColumnDependency {
    pub fn new(source: ColumnRef, target: ColumnRef, expr_kind: ExpressionKind) -> Self {
        Self {
            source,
            target,
            expr_kind,
            expression_text: None,
            confidence: 1.0,
            is_aggregate: false,
            aggregate_function: None,
            is_group_by: false,
        }
    }

    pub fn with_expression_text(mut self, text: impl Into<String>) -> Self {
        self.expression_text = Some(text.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        debug_assert!((0.0..=1.0).contains(&confidence));
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn as_aggregate(mut self, function: AggregateFunction) -> Self {
        self.is_aggregate = true;
        self.aggregate_function = Some(function);
        self
    }

    pub fn as_group_by(mut self) -> Self {
        self.is_group_by = true;
        self
    }
}
