//! Column and table reference value types (spec.md §3 `ColumnRef`/`TableRef`).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel table names used internally by the Dependency Extractor. Kept as
/// a distinct tag rather than compared against string literals, so a real
/// user table named e.g. `__output__` can never collide with the sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefKind {
    /// An ordinary reference to a real (or not-yet-registered source) table.
    Real,
    /// The synthetic target used while a projection's final table name is
    /// not yet known (rewritten to the real target at materialization).
    Output,
    /// A constant-only projection has no source column; this sentinel keeps
    /// a dependency (and hence a lineage entry) around for the target column
    /// anyway. Filtered from user-visible output.
    Constant,
}

pub const OUTPUT_TABLE: &str = "__OUTPUT__";
pub const CONSTANT_TABLE: &str = "__CONSTANT__";

/// A fully (or partially) qualified column reference.
///
/// Hash/Eq are based on `(database, schema, table, column)`; `alias` is
/// excluded from identity so two `ColumnRef`s naming the same column under
/// different aliases compare equal.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            database: None,
            schema: None,
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn constant(target_name: impl Into<String>) -> Self {
        Self::new(CONSTANT_TABLE, target_name)
    }

    pub fn output(column: impl Into<String>) -> Self {
        Self::new(OUTPUT_TABLE, column)
    }

    pub fn kind(&self) -> RefKind {
        match self.table.as_str() {
            OUTPUT_TABLE => RefKind::Output,
            CONSTANT_TABLE => RefKind::Constant,
            _ => RefKind::Real,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind(), RefKind::Constant)
    }

    /// `database.schema.table.column`, omitting empty/absent parts.
    pub fn qualified_name(&self) -> String {
        let mut parts = Vec::with_capacity(4);
        if let Some(db) = self.database.as_deref().filter(|s| !s.is_empty()) {
            parts.push(db.to_string());
        }
        if let Some(schema) = self.schema.as_deref().filter(|s| !s.is_empty()) {
            parts.push(schema.to_string());
        }
        parts.push(self.table.clone());
        parts.push(self.column.clone());
        parts.join(".")
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified_name())
    }
}

impl PartialEq for ColumnRef {
    fn eq(&self, other: &Self) -> bool {
        self.database == other.database
            && self.schema == other.schema
            && self.table == other.table
            && self.column == other.column
    }
}
impl Eq for ColumnRef {}

impl std::hash::Hash for ColumnRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.database.hash(state);
        self.schema.hash(state);
        self.table.hash(state);
        self.column.hash(state);
    }
}

/// A reference to a table (or subquery standing in for one) in scope.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableRef {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub is_subquery: bool,
}

impl TableRef {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            database: None,
            schema: None,
            alias: None,
            is_subquery: false,
        }
    }

    /// The name this table is visible under in a scope: its alias if
    /// present, otherwise its bare name.
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    pub fn qualified_name(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if let Some(db) = self.database.as_deref().filter(|s| !s.is_empty()) {
            parts.push(db.to_string());
        }
        if let Some(schema) = self.schema.as_deref().filter(|s| !s.is_empty()) {
            parts.push(schema.to_string());
        }
        parts.push(self.table.clone());
        parts.join(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn qualified_name_omits_empty_parts() {
        let col = ColumnRef::new("orders", "amount");
        assert_eq!(col.qualified_name(), "orders.amount");
    }

    #[test]
    fn qualified_name_includes_db_and_schema() {
        let col = ColumnRef::new("orders", "amount")
            .with_database("prod")
            .with_schema("public");
        assert_eq!(col.qualified_name(), "prod.public.orders.amount");
    }

    #[test]
    fn equality_ignores_alias() {
        let a = ColumnRef::new("orders", "amount").with_alias("amt1");
        let b = ColumnRef::new("orders", "amount").with_alias("amt2");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_matches_eq_contract() {
        let a = ColumnRef::new("orders", "amount").with_alias("amt1");
        let b = ColumnRef::new("orders", "amount").with_alias("amt2");
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn sentinel_kinds_are_distinguished() {
        assert_eq!(ColumnRef::output("x").kind(), RefKind::Output);
        assert_eq!(ColumnRef::constant("x").kind(), RefKind::Constant);
        assert_eq!(ColumnRef::new("orders", "x").kind(), RefKind::Real);
    }

    #[test]
    fn table_ref_effective_name_prefers_alias() {
        let mut t = TableRef::new("orders");
        assert_eq!(t.effective_name(), "orders");
        t.alias = Some("o".to_string());
        assert_eq!(t.effective_name(), "o");
    }
}
