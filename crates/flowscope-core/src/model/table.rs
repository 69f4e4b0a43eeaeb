//! `TableDefinition` (spec.md §3): a table's column lineage registered
//! inside a `TableRegistry`.

use super::lineage::{ColumnLineage, TableType};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableDefinition {
    pub name: String,
    /// Insertion order is the declaration order; used by position-based
    /// INSERT column matching.
    pub columns: IndexMap<String, ColumnLineage>,
    pub table_type: TableType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_statement: Option<usize>,
    pub is_source_table: bool,
    pub is_recursive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, table_type: TableType) -> Self {
        let is_source_table = table_type == TableType::External;
        Self {
            name: name.into(),
            columns: IndexMap::new(),
            table_type,
            created_by_sql: None,
            created_at_statement: None,
            is_source_table,
            is_recursive: false,
            schema: None,
            database: None,
        }
    }

    pub fn with_created_by_sql(mut self, sql: impl Into<String>) -> Self {
        self.created_by_sql = Some(sql.into());
        self
    }

    pub fn with_recursive(mut self, is_recursive: bool) -> Self {
        self.is_recursive = is_recursive;
        self
    }

    /// Inserts a column, or merges it into an existing column of the same
    /// name (spec.md §4.5).
    pub fn add_column(&mut self, lineage: ColumnLineage) {
        match self.columns.get_mut(&lineage.name) {
            Some(existing) => existing.merge_from(lineage),
            None => {
                self.columns.insert(lineage.name.clone(), lineage);
            }
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnLineage> {
        self.columns.get(name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(String::as_str).collect()
    }
}
