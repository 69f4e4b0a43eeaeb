//! `--format table`: a `tabled`-rendered table of every derived column and
//! its direct sources (spec.md §6).

use flowscope_core::TableRegistry;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "table")]
    table: String,
    #[tabled(rename = "column")]
    column: String,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "confidence")]
    confidence: String,
    #[tabled(rename = "sources")]
    sources: String,
}

pub fn format_table(registry: &TableRegistry) -> String {
    let mut derived = registry.derived_tables();
    derived.sort_by(|a, b| a.name.cmp(&b.name));

    let mut rows = Vec::new();
    for table in derived {
        for lineage in table.columns.values() {
            let sources = if lineage.sources.is_empty() {
                "(constant)".to_string()
            } else {
                lineage
                    .sources
                    .iter()
                    .map(|s| s.qualified_name())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            rows.push(Row {
                table: table.name.clone(),
                column: lineage.name.clone(),
                kind: format!("{:?}", lineage.expression_kind),
                confidence: format!("{:.2}", lineage.confidence),
                sources,
            });
        }
    }

    if rows.is_empty() {
        return "(no derived tables)".to_string();
    }

    Table::new(rows).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowscope_core::{AnalysisConfig, ScriptAnalyzer};

    #[test]
    fn table_lists_derived_columns() {
        let result = ScriptAnalyzer::new(None, AnalysisConfig::default())
            .analyze("CREATE TABLE totals AS SELECT amount FROM orders")
            .unwrap();
        let text = format_table(&result.registry);
        assert!(text.contains("totals"));
        assert!(text.contains("orders.amount"));
    }

    #[test]
    fn no_derived_tables_says_so() {
        let registry = flowscope_core::TableRegistry::new();
        assert_eq!(format_table(&registry), "(no derived tables)");
    }
}
