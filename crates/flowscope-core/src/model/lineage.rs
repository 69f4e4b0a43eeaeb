//! `ColumnLineage` (spec.md §3/§4.5): the grouped, per-output-column record
//! stored inside a `TableDefinition`.

use super::column::ColumnRef;
use super::expression_kind::{AggregateFunction, ExpressionKind};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ColumnLineage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    pub sources: Vec<ColumnRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    pub expression_kind: ExpressionKind,
    pub confidence: f64,
    pub is_aggregate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_function: Option<AggregateFunction>,
    pub is_group_by: bool,
    /// Expressions from merged-in lineages (INSERT merges, UNION branches)
    /// that did not become the primary `expression`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternative_expressions: Vec<String>,
}

impl ColumnLineage {
    pub fn new(name: impl Into<String>, expression_kind: ExpressionKind) -> Self {
        Self {
            name: name.into(),
            data_type: None,
            sources: Vec::new(),
            expression: None,
            expression_kind,
            confidence: 1.0,
            is_aggregate: false,
            aggregate_function: None,
            is_group_by: false,
            alternative_expressions: Vec::new(),
        }
    }

    fn push_source_dedup(&mut self, source: ColumnRef) {
        if !self
            .sources
            .iter()
            .any(|existing| existing.qualified_name() == source.qualified_name())
        {
            self.sources.push(source);
        }
    }

    pub fn add_sources<I: IntoIterator<Item = ColumnRef>>(&mut self, sources: I) {
        for source in sources {
            self.push_source_dedup(source);
        }
    }

    /// Merges `other` into `self` (spec.md §4.5). Requires identical names;
    /// panics otherwise since callers must have already grouped by name.
    pub fn merge_from(&mut self, other: ColumnLineage) {
        assert_eq!(
            self.name, other.name,
            "merge_from requires identical column names"
        );
        self.add_sources(other.sources);
        if let Some(expr) = other.expression {
            self.alternative_expressions.push(expr);
        }
        self.alternative_expressions
            .extend(other.alternative_expressions);
        self.confidence = self.confidence.min(other.confidence * 0.9);
        self.is_aggregate = self.is_aggregate || other.is_aggregate;
        self.is_group_by = self.is_group_by || other.is_group_by;
        if self.aggregate_function.is_none() {
            self.aggregate_function = other.aggregate_function;
        }
    }
}

/// Kind of table a `TableDefinition` describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    Table,
    View,
    TempTable,
    Cte,
    External,
    Subquery,
}

impl TableType {
    pub fn as_export_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
            Self::TempTable => "temp_table",
            Self::Cte => "cte",
            Self::External => "external",
            Self::Subquery => "subquery",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_from_dedups_sources_and_lowers_confidence() {
        let mut a = ColumnLineage::new("amount", ExpressionKind::Direct);
        a.add_sources([ColumnRef::new("src1", "amount")]);
        let mut b = ColumnLineage::new("amount", ExpressionKind::Direct);
        b.add_sources([ColumnRef::new("src1", "amount"), ColumnRef::new("src2", "amount")]);
        b.confidence = 0.9;

        a.merge_from(b);
        assert_eq!(a.sources.len(), 2);
        assert!(a.confidence < 1.0);
    }

    #[test]
    #[should_panic]
    fn merge_from_rejects_mismatched_names() {
        let mut a = ColumnLineage::new("amount", ExpressionKind::Direct);
        let b = ColumnLineage::new("total", ExpressionKind::Direct);
        a.merge_from(b);
    }

    #[test]
    fn merge_from_ors_aggregation_flags() {
        let mut a = ColumnLineage::new("x", ExpressionKind::Direct);
        let mut b = ColumnLineage::new("x", ExpressionKind::Direct);
        b.is_group_by = true;
        a.merge_from(b);
        assert!(a.is_group_by);
    }
}
