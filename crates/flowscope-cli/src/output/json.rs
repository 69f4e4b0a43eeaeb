//! `--format json`: the full `TableRegistry`, one entry per table, serialized
//! with every field `TableDefinition`/`ColumnLineage` carry (sources,
//! confidence, aggregation flags, alternative expressions, ...) -- the
//! programmatic counterpart to `--format pretty`.

use flowscope_core::TableRegistry;
use serde_json::{json, Value};

pub fn export_registry(registry: &TableRegistry) -> Value {
    let mut tables = serde_json::Map::new();
    for table in registry.all_tables() {
        tables.insert(
            table.name.clone(),
            serde_json::to_value(table).expect("TableDefinition always serializes"),
        );
    }
    json!({ "tables": tables })
}

pub fn format_json(registry: &TableRegistry, compact: bool) -> String {
    let value = export_registry(registry);
    if compact {
        serde_json::to_string(&value).expect("serialization cannot fail")
    } else {
        serde_json::to_string_pretty(&value).expect("serialization cannot fail")
    }
}
