//! CTE Extractor (C9): analyzes a `WITH` clause's common table expressions
//! and registers each as a `Cte`-kind `TableDefinition`, implementing the
//! recursive-CTE fixed point (spec.md §4.11).

use crate::config::AnalysisConfig;
use crate::dependency::{group_into_lineages, DependencyExtractor};
use crate::error::LineageError;
use crate::model::{ColumnDependency, ColumnLineage, ColumnRef, TableDefinition, TableType};
use crate::registry::TableRegistry;
use crate::schema::SchemaProvider;
use crate::scope::flatten_set_expr;
use crate::warning::WarningCollector;
use indexmap::IndexMap;
use sqlparser::ast::{Query, Select, SetExpr, TableFactor, TableWithJoins, With};

fn table_factor_references(factor: &TableFactor, name: &str) -> bool {
    match factor {
        TableFactor::Table { name: tname, .. } => tname
            .0
            .last()
            .map(|p| p.value.eq_ignore_ascii_case(name))
            .unwrap_or(false),
        TableFactor::Derived { subquery, .. } => {
            let mut branches = Vec::new();
            flatten_set_expr(&subquery.body, &mut branches);
            branches.iter().any(|s| select_references_table(s, name))
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => table_with_joins_references(table_with_joins, name),
        _ => false,
    }
}

fn table_with_joins_references(twj: &TableWithJoins, name: &str) -> bool {
    table_factor_references(&twj.relation, name)
        || twj.joins.iter().any(|j| table_factor_references(&j.relation, name))
}

fn select_references_table(select: &Select, name: &str) -> bool {
    select.from.iter().any(|twj| table_with_joins_references(twj, name))
}

fn is_set_operation(body: &SetExpr) -> bool {
    match body {
        SetExpr::SetOperation { .. } => true,
        SetExpr::Query(inner) => is_set_operation(&inner.body),
        _ => false,
    }
}

/// Strips a single `qualifier.` prefix and a trailing `+ N` / `- N` bump,
/// the way the original's heuristic aligns a recursive projection like
/// `h.level + 1` with the anchor's `level` column (spec.md §4.11, §9).
fn normalize_for_recursive_match(text: &str) -> String {
    let mut s = text.trim().to_string();
    if let Some(op_pos) = s.rfind(['+', '-']) {
        let tail = s[op_pos + 1..].trim();
        if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
            s = s[..op_pos].trim_end().to_string();
        }
    }
    if let Some(dot) = s.find('.') {
        if s[..dot].chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            s = s[dot + 1..].to_string();
        }
    }
    s.trim().to_lowercase()
}

fn count_self_references(selects: &[Select], name: &str) -> usize {
    selects
        .iter()
        .filter(|s| select_references_table(s, name))
        .count()
}

/// Unions `other` into `existing` without the extra 0.9 confidence penalty
/// `ColumnLineage::merge_from` applies (that penalty is already charged once
/// to the recursive part below; applying it again here would double-count
/// it against the spec's single "multiplied by 0.9" step).
fn union_merge(existing: &mut ColumnLineage, other: ColumnLineage) {
    existing.add_sources(other.sources);
    existing.confidence = existing.confidence.min(other.confidence);
    existing.is_aggregate = existing.is_aggregate || other.is_aggregate;
    existing.is_group_by = existing.is_group_by || other.is_group_by;
    if existing.aggregate_function.is_none() {
        existing.aggregate_function = other.aggregate_function;
    }
    if let Some(expr) = other.expression {
        if existing.expression.as_deref() != Some(expr.as_str()) {
            existing.alternative_expressions.push(expr);
        }
    }
}

pub struct CteExtractor<'a> {
    pub schema: Option<&'a dyn SchemaProvider>,
    pub config: &'a AnalysisConfig,
}

impl<'a> CteExtractor<'a> {
    pub fn new(schema: Option<&'a dyn SchemaProvider>, config: &'a AnalysisConfig) -> Self {
        Self { schema, config }
    }

    /// Analyzes and registers every CTE in `with`, in declaration order.
    /// Returns the names successfully registered (for later cleanup by the
    /// caller); a CTE whose own analysis fails is skipped with a warning
    /// rather than aborting the others (spec.md §4.11, §7).
    pub fn extract_and_register(
        &self,
        with: &With,
        registry: &mut TableRegistry,
        warnings: &mut WarningCollector,
    ) -> Vec<String> {
        let mut registered = Vec::new();
        for cte in &with.cte_tables {
            let name = cte.alias.name.value.clone();
            match self.analyze_one_cte(with.recursive, &name, &cte.query, registry, warnings) {
                Ok(table_def) => {
                    registry.remove_table(&name);
                    if let Err(err) = registry.register_table(table_def, warnings) {
                        warnings.warn(format!("CTE '{name}' could not be registered: {err}"));
                        continue;
                    }
                    registered.push(name);
                }
                Err(err) => {
                    warnings.warn(format!("CTE '{name}' could not be analyzed: {err}"));
                }
            }
        }
        registered
    }

    fn analyze_one_cte(
        &self,
        with_recursive: bool,
        name: &str,
        query: &Query,
        registry: &mut TableRegistry,
        warnings: &mut WarningCollector,
    ) -> Result<TableDefinition, LineageError> {
        if with_recursive && is_set_operation(&query.body) {
            let mut branches = Vec::new();
            flatten_set_expr(&query.body, &mut branches);
            let (recursive, anchor): (Vec<Select>, Vec<Select>) =
                branches.into_iter().partition(|s| select_references_table(s, name));
            if !recursive.is_empty() && !anchor.is_empty() {
                return self.analyze_recursive(name, &anchor, &recursive, registry, warnings);
            }
            warnings.warn(format!(
                "CTE '{name}' is declared RECURSIVE but its body has no self-reference; treating as non-recursive"
            ));
        }
        self.analyze_non_recursive(name, query, registry, warnings)
    }

    fn analyze_non_recursive(
        &self,
        name: &str,
        query: &Query,
        registry: &mut TableRegistry,
        warnings: &mut WarningCollector,
    ) -> Result<TableDefinition, LineageError> {
        let extractor = DependencyExtractor::new(self.schema, self.config);
        let deps = extractor.extract_query(query, None, registry, warnings)?;
        let lineages = group_into_lineages(deps);
        let mut table_def = TableDefinition::new(name, TableType::Cte);
        for lineage in lineages {
            table_def.add_column(lineage);
        }
        Ok(table_def)
    }

    fn analyze_recursive(
        &self,
        name: &str,
        anchor_selects: &[Select],
        recursive_selects: &[Select],
        registry: &mut TableRegistry,
        warnings: &mut WarningCollector,
    ) -> Result<TableDefinition, LineageError> {
        let extractor = DependencyExtractor::new(self.schema, self.config);

        let mut anchor_deps: Vec<ColumnDependency> = Vec::new();
        for select in anchor_selects {
            anchor_deps.extend(extractor.extract_select(select, None, registry, warnings)?);
        }
        let anchor_lineages = group_into_lineages(anchor_deps);

        // Register a scratch definition carrying just the anchor's columns
        // so the recursive part's self-references resolve against it.
        let mut scratch = TableDefinition::new(name, TableType::Cte);
        for lineage in &anchor_lineages {
            scratch.add_column(lineage.clone());
        }
        registry.remove_table(name);
        registry.register_table(scratch, warnings)?;

        let mut recursive_deps_raw: Vec<ColumnDependency> = Vec::new();
        for select in recursive_selects {
            recursive_deps_raw.extend(extractor.extract_select(select, None, registry, warnings)?);
        }
        registry.remove_table(name);

        let mut rewritten = Vec::new();
        for dep in recursive_deps_raw {
            let normalized_target = normalize_for_recursive_match(&dep.target.column);
            let anchor_match = anchor_lineages
                .iter()
                .find(|l| l.name.eq_ignore_ascii_case(&dep.target.column) || l.name.to_lowercase() == normalized_target);
            let target_name = anchor_match.map(|l| l.name.clone()).unwrap_or_else(|| dep.target.column.clone());

            if dep.source.table.eq_ignore_ascii_case(name) {
                let normalized_source = normalize_for_recursive_match(&dep.source.column);
                let Some(anchor_source_lineage) = anchor_lineages
                    .iter()
                    .find(|l| l.name.eq_ignore_ascii_case(&dep.source.column) || l.name.to_lowercase() == normalized_source)
                else {
                    // Can't align this self-reference with any anchor column; drop it
                    // rather than leave a dangling reference to the CTE itself.
                    continue;
                };
                for source in &anchor_source_lineage.sources {
                    rewritten.push(
                        ColumnDependency::new(source.clone(), ColumnRef::output(target_name.clone()), dep.expr_kind)
                            .with_expression_text(dep.expression_text.clone().unwrap_or_default())
                            .with_confidence(dep.confidence * 0.9),
                    );
                }
                continue;
            }

            let mut new_dep = dep;
            new_dep.target = ColumnRef::output(target_name);
            new_dep.confidence *= 0.9;
            rewritten.push(new_dep);
        }
        let recursive_lineages = group_into_lineages(rewritten);

        let mut merged: IndexMap<String, ColumnLineage> = IndexMap::new();
        for lineage in anchor_lineages {
            merged.insert(lineage.name.clone(), lineage);
        }
        for lineage in recursive_lineages {
            match merged.get_mut(&lineage.name) {
                Some(existing) => union_merge(existing, lineage),
                None => {
                    merged.insert(lineage.name.clone(), lineage);
                }
            }
        }

        let self_ref_count = count_self_references(recursive_selects, name);
        let fudge_factor = 2;
        if self_ref_count.saturating_mul(fudge_factor) > self.config.max_recursion_depth {
            warnings.warn(format!(
                "CTE '{name}' recursive part references itself {self_ref_count} time(s); this may exceed the configured recursion-depth heuristic of {}",
                self.config.max_recursion_depth
            ));
        }

        let mut table_def = TableDefinition::new(name, TableType::Cte).with_recursive(true);
        for (_, lineage) in merged {
            table_def.add_column(lineage);
        }
        Ok(table_def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::ast::Statement;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    fn parse_with(sql: &str) -> With {
        let stmts = Parser::parse_sql(&GenericDialect {}, sql).unwrap();
        match &stmts[0] {
            Statement::Query(q) => q.with.clone().unwrap(),
            _ => panic!("expected query"),
        }
    }

    fn register_source(registry: &mut TableRegistry, name: &str, columns: &[&str]) {
        registry.register_source_table(name, columns.iter().map(|c| c.to_string()).collect());
    }

    #[test]
    fn non_recursive_cte_is_registered_and_removable() {
        let with = parse_with("WITH c AS (SELECT id, amount FROM orders) SELECT * FROM c");
        let mut registry = TableRegistry::new();
        register_source(&mut registry, "orders", &["id", "amount"]);
        let config = AnalysisConfig::default();
        let extractor = CteExtractor::new(None, &config);
        let mut warnings = WarningCollector::new();
        let registered = extractor.extract_and_register(&with, &mut registry, &mut warnings);
        assert_eq!(registered, vec!["c".to_string()]);
        assert!(registry.get_table("c").unwrap().get_column("amount").is_some());
    }

    #[test]
    fn union_cte_merges_positionally() {
        let with = parse_with(
            "WITH combined AS (SELECT id, name FROM t1 UNION ALL SELECT id, name FROM t2) SELECT * FROM combined",
        );
        let mut registry = TableRegistry::new();
        register_source(&mut registry, "t1", &["id", "name"]);
        register_source(&mut registry, "t2", &["id", "name"]);
        let config = AnalysisConfig::default();
        let extractor = CteExtractor::new(None, &config);
        let mut warnings = WarningCollector::new();
        extractor.extract_and_register(&with, &mut registry, &mut warnings);
        let combined = registry.get_table("combined").unwrap();
        let id_col = combined.get_column("id").unwrap();
        assert_eq!(id_col.sources.len(), 2);
    }

    #[test]
    fn recursive_cte_aligns_self_reference_to_anchor() {
        let with = parse_with(
            "WITH RECURSIVE h AS ( \
                SELECT emp_id, manager_id, 1 AS level FROM employees WHERE manager_id IS NULL \
                UNION ALL \
                SELECT e.emp_id, e.manager_id, h.level + 1 FROM employees e JOIN h ON e.manager_id = h.emp_id \
            ) SELECT * FROM h",
        );
        let mut registry = TableRegistry::new();
        register_source(
            &mut registry,
            "employees",
            &["emp_id", "manager_id"],
        );
        let config = AnalysisConfig::default();
        let extractor = CteExtractor::new(None, &config);
        let mut warnings = WarningCollector::new();
        let registered = extractor.extract_and_register(&with, &mut registry, &mut warnings);
        assert_eq!(registered, vec!["h".to_string()]);

        let h = registry.get_table("h").unwrap();
        assert!(h.is_recursive);
        let level = h.get_column("level").unwrap();
        assert!(level.sources.iter().all(|s| s.table != "h"));
        assert!(level.confidence < 1.0);
    }
}
