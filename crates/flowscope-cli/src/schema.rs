//! Loads the `--schema FILE` JSON document into a `DictSchemaProvider`.

use anyhow::{Context, Result};
use flowscope_core::DictSchemaProvider;
use std::collections::BTreeMap;
use std::path::Path;

/// Parses a JSON object mapping `table_name` -> array of column names
/// (spec.md §6) into a `DictSchemaProvider`.
pub fn load_schema(path: &Path) -> Result<DictSchemaProvider> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema file: {}", path.display()))?;
    let tables: BTreeMap<String, Vec<String>> = serde_json::from_str(&content)
        .with_context(|| format!("schema file is not a JSON object of table -> columns: {}", path.display()))?;
    Ok(DictSchemaProvider::from_map(tables))
}
