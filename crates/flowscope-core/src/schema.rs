//! Schema Provider (C3): an optional collaborator answering column-existence
//! questions the Registry alone cannot (tables never created by the script).

use std::collections::BTreeMap;

/// Capability set a schema source must provide. An in-memory dictionary
/// provider (`DictSchemaProvider`) is the only implementation this crate
/// ships; hosts with a live catalog connection implement this trait
/// themselves and hand it to the analyzer.
pub trait SchemaProvider: std::fmt::Debug {
    /// Columns known for `table`, in declaration order. Empty if unknown.
    fn columns_of(&self, table: &str) -> Vec<String>;

    /// Whether `column` is known to exist on `table`. Implementations that
    /// cannot answer authoritatively should return `true` (don't contradict)
    /// so validation does not produce false negatives.
    fn column_exists(&self, table: &str, column: &str) -> bool {
        let columns = self.columns_of(table);
        if columns.is_empty() {
            true
        } else {
            columns.iter().any(|c| c.eq_ignore_ascii_case(column))
        }
    }

    /// Structured schema metadata for `table`, if any is tracked beyond the
    /// plain column list (reserved for richer providers).
    fn schema_of(&self, _table: &str) -> Option<BTreeMap<String, String>> {
        None
    }
}

/// An in-memory schema provider backed by a `table -> columns` dictionary,
/// typically loaded from the CLI's `--schema FILE` JSON document.
#[derive(Debug, Clone, Default)]
pub struct DictSchemaProvider {
    tables: BTreeMap<String, Vec<String>>,
}

impl DictSchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(tables: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            tables: tables
                .into_iter()
                .map(|(name, cols)| (name.trim().to_lowercase(), cols))
                .collect(),
        }
    }

    pub fn insert(&mut self, table: impl Into<String>, columns: Vec<String>) {
        self.tables.insert(table.into().trim().to_lowercase(), columns);
    }
}

impl SchemaProvider for DictSchemaProvider {
    fn columns_of(&self, table: &str) -> Vec<String> {
        self.tables
            .get(&table.trim().to_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}
