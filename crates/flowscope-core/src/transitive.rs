//! Transitive Resolver (C12): depth-bounded traversal over a completed
//! `TableRegistry` answering "where did this come from" (`trace_to_source`),
//! "what does this affect" (`find_impact`), and a prose rendering of the
//! former (`explain_calculation`).
//!
//! Holds only a shared reference to the Registry -- it is meant to be
//! constructed lazily from a finished `ScriptResult` (see
//! [`crate::analyzer::ScriptResult::resolver`]) rather than threaded through
//! analysis itself.

use crate::model::{ColumnRef, ExpressionKind, TableType};
use crate::registry::TableRegistry;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;

fn ref_key(column: &ColumnRef) -> String {
    format!("{}.{}", column.table.trim().to_lowercase(), column.column.trim().to_lowercase())
}

/// One hop in a `LineagePath`: a column, and (unless it is the path's own
/// starting point) the expression that computed it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LineageNode {
    pub column: ColumnRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression_kind: Option<ExpressionKind>,
    pub table_type: TableType,
}

/// An ordered chain from a query target column down to one of its ultimate
/// sources (spec.md §3). `hops()` is `len() - 1`; the first node is the
/// traced target, the last is a source (or the point the trace gave up).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct LineagePath {
    pub nodes: Vec<LineageNode>,
}

impl LineagePath {
    pub fn hops(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    pub fn target(&self) -> Option<&LineageNode> {
        self.nodes.first()
    }

    pub fn source(&self) -> Option<&LineageNode> {
        self.nodes.last()
    }
}

pub struct TransitiveResolver<'a> {
    registry: &'a TableRegistry,
    max_depth: usize,
}

impl<'a> TransitiveResolver<'a> {
    pub fn new(registry: &'a TableRegistry, max_depth: usize) -> Self {
        Self { registry, max_depth }
    }

    fn node_for(&self, column: &ColumnRef) -> LineageNode {
        let table_type = self
            .registry
            .get_table(&column.table)
            .map(|t| t.table_type)
            .unwrap_or(TableType::External);
        LineageNode {
            column: column.clone(),
            expression: None,
            expression_kind: None,
            table_type,
        }
    }

    /// DFS from `(table, column)` down to every ultimate source (spec.md
    /// §4.14). Each source branches independently: a copy of `visited` and
    /// of the path-so-far is taken before recursing, so one branch's cycle
    /// or depth cutoff never truncates a sibling branch.
    pub fn trace_to_source(&self, table: &str, column: &str) -> Vec<LineagePath> {
        let start = ColumnRef::new(table, column);
        let mut paths = Vec::new();
        let visited = HashSet::new();
        let path = vec![self.node_for(&start)];
        self.trace_inner(&start, path, visited, 0, &mut paths);
        paths
    }

    fn trace_inner(
        &self,
        current: &ColumnRef,
        mut path_so_far: Vec<LineageNode>,
        visited: HashSet<String>,
        depth: usize,
        paths: &mut Vec<LineagePath>,
    ) {
        let key = ref_key(current);
        if visited.contains(&key) || depth >= self.max_depth {
            paths.push(LineagePath { nodes: path_so_far });
            return;
        }

        let Some(table_def) = self.registry.get_table(&current.table) else {
            paths.push(LineagePath { nodes: path_so_far });
            return;
        };

        if table_def.is_source_table {
            paths.push(LineagePath { nodes: path_so_far });
            return;
        }

        let Some(lineage) = table_def.get_column(&current.column) else {
            paths.push(LineagePath { nodes: path_so_far });
            return;
        };

        if let Some(last) = path_so_far.last_mut() {
            last.expression = lineage.expression.clone();
            last.expression_kind = Some(lineage.expression_kind);
        }

        if lineage.sources.is_empty() {
            paths.push(LineagePath { nodes: path_so_far });
            return;
        }

        let mut next_visited = visited;
        next_visited.insert(key);

        for source in &lineage.sources {
            let mut branch_path = path_so_far.clone();
            branch_path.push(self.node_for(source));
            self.trace_inner(source, branch_path, next_visited.clone(), depth + 1, paths);
        }
    }

    /// Reverse DFS: every column anywhere in the Registry whose sources
    /// transitively include `(source_table, source_column)` (spec.md §4.14).
    pub fn find_impact(&self, source_table: &str, source_column: &str) -> Vec<ColumnRef> {
        let start = ColumnRef::new(source_table, source_column);
        let mut impacted = Vec::new();
        let mut seen = HashSet::new();
        self.find_impact_inner(&start, 0, &mut seen, &mut impacted);
        impacted
    }

    fn find_impact_inner(
        &self,
        target: &ColumnRef,
        depth: usize,
        seen: &mut HashSet<String>,
        out: &mut Vec<ColumnRef>,
    ) {
        if depth >= self.max_depth {
            return;
        }
        let target_key = ref_key(target);
        for table_def in self.registry.all_tables() {
            for lineage in table_def.columns.values() {
                let points_here = lineage.sources.iter().any(|s| ref_key(s) == target_key);
                if !points_here {
                    continue;
                }
                let downstream = ColumnRef::new(table_def.name.clone(), lineage.name.clone());
                if !seen.insert(ref_key(&downstream)) {
                    continue;
                }
                out.push(downstream.clone());
                self.find_impact_inner(&downstream, depth + 1, seen, out);
            }
        }
    }

    /// Deduplicated ultimate source tables reached by `trace_to_source`.
    pub fn source_tables_for(&self, table: &str, column: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut tables = Vec::new();
        for path in self.trace_to_source(table, column) {
            if let Some(node) = path.source() {
                if seen.insert(node.column.table.to_lowercase()) {
                    tables.push(node.column.table.clone());
                }
            }
        }
        tables
    }

    /// Human-readable, indented rendering of every `trace_to_source` path,
    /// followed by a one-line summary of the deduplicated ultimate source
    /// tables reached (`source_tables_for`).
    pub fn explain_calculation(&self, table: &str, column: &str) -> String {
        let paths = self.trace_to_source(table, column);
        if paths.is_empty() {
            return format!("{table}.{column}: no lineage information available");
        }

        let mut out = String::new();
        for (i, path) in paths.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let _ = writeln!(out, "path {}:", i + 1);
            let last_index = path.nodes.len().saturating_sub(1);
            for (depth, node) in path.nodes.iter().enumerate() {
                let indent = "  ".repeat(depth);
                let marker = if depth == last_index {
                    if node.table_type == TableType::External {
                        " (source)"
                    } else {
                        " (direct)"
                    }
                } else {
                    ""
                };
                match (&node.expression, node.expression_kind) {
                    (Some(expr), Some(kind)) => {
                        let _ = writeln!(
                            out,
                            "{indent}{} = {expr} [{kind:?}]{marker}",
                            node.column.qualified_name()
                        );
                    }
                    _ => {
                        let _ = writeln!(out, "{indent}{}{marker}", node.column.qualified_name());
                    }
                }
            }
        }
        let sources = self.source_tables_for(table, column);
        if !sources.is_empty() {
            let _ = writeln!(out, "\nultimate source table(s): {}", sources.join(", "));
        }
        out.trim_end().to_string()
    }
}
