//! `--format pretty`: a human-readable block listing source/derived tables,
//! their columns, and the first few column sources with `->` arrows
//! (spec.md §6).

use flowscope_core::{TableDefinition, TableRegistry};
use owo_colors::OwoColorize;
use std::fmt::Write as _;

const MAX_SOURCES_SHOWN: usize = 3;

pub fn format_pretty(registry: &TableRegistry, colored: bool) -> String {
    let mut out = String::new();

    let mut sources: Vec<&TableDefinition> = registry.source_tables();
    sources.sort_by(|a, b| a.name.cmp(&b.name));
    let mut derived: Vec<&TableDefinition> = registry.derived_tables();
    derived.sort_by(|a, b| a.name.cmp(&b.name));

    write_section(&mut out, "Source tables", &sources, colored);
    write_section(&mut out, "Derived tables", &derived, colored);

    out.trim_end().to_string()
}

fn write_section(out: &mut String, title: &str, tables: &[&TableDefinition], colored: bool) {
    if tables.is_empty() {
        return;
    }
    if colored {
        let _ = writeln!(out, "{}", title.bold());
    } else {
        let _ = writeln!(out, "{title}:");
    }
    for table in tables {
        let _ = writeln!(out, "  {} ({} column(s))", table.name, table.columns.len());
        for lineage in table.columns.values() {
            let mut line = format!("    {}", lineage.name);
            if !lineage.sources.is_empty() {
                let shown: Vec<String> = lineage
                    .sources
                    .iter()
                    .take(MAX_SOURCES_SHOWN)
                    .map(|s| s.qualified_name())
                    .collect();
                let suffix = if lineage.sources.len() > MAX_SOURCES_SHOWN {
                    format!(" (+{} more)", lineage.sources.len() - MAX_SOURCES_SHOWN)
                } else {
                    String::new()
                };
                let arrow = if colored { "->".cyan().to_string() } else { "->".to_string() };
                let _ = write!(line, " {arrow} {}{suffix}", shown.join(", "));
            }
            let _ = writeln!(out, "{line}");
        }
    }
    let _ = writeln!(out);
}
