//! `--format graph` / `--export`: the `{tables, lineage}` JSON shape
//! documented in spec.md §6.

use flowscope_core::TableRegistry;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Serialize)]
struct GraphTable {
    #[serde(rename = "type")]
    kind: &'static str,
    columns: Vec<String>,
    is_source: bool,
}

#[derive(Serialize)]
struct GraphEdge {
    from: String,
    to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expression: Option<String>,
    #[serde(rename = "type")]
    kind: Value,
}

/// Builds the `{tables, lineage}` export shape. `__CONSTANT__` sources are
/// filtered per the invariant in spec.md §8 (they must never reach
/// user-visible output); a constant-only column still appears in its
/// table's `columns` list, just with no incoming lineage edge.
pub fn export_graph(registry: &TableRegistry) -> Value {
    let mut tables = serde_json::Map::new();
    let mut lineage = Vec::new();

    for table in registry.all_tables() {
        let entry = GraphTable {
            kind: table.table_type.as_export_str(),
            columns: table.column_names().into_iter().map(String::from).collect(),
            is_source: table.is_source_table,
        };
        tables.insert(table.name.clone(), serde_json::to_value(entry).expect("GraphTable always serializes"));

        for lineage_col in table.columns.values() {
            let to = format!("{}.{}", table.name, lineage_col.name);
            for source in &lineage_col.sources {
                if source.is_constant() {
                    continue;
                }
                lineage.push(GraphEdge {
                    from: source.qualified_name(),
                    to: to.clone(),
                    expression: lineage_col.expression.clone(),
                    kind: serde_json::to_value(lineage_col.expression_kind).expect("ExpressionKind always serializes"),
                });
            }
        }
    }

    json!({
        "tables": tables,
        "lineage": lineage,
    })
}
