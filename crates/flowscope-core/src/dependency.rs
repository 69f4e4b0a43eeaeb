//! Dependency Extractor (C8) and Subquery Analyzer (spec.md §4.9): walks a
//! `SELECT`/`UNION` body and produces one `ColumnDependency` per
//! source-column -> target-column edge.
//!
//! The Subquery Analyzer is folded in here rather than kept as a separate
//! module: every one of its three call sites (FROM-clause derived table,
//! scalar subquery in the SELECT list, correlated subquery in WHERE/HAVING)
//! needs the same `schema`/`config` the Dependency Extractor already holds,
//! and splitting it out would just reintroduce the cycle the
//! `DerivedTableAnalyzer` trait in `scope.rs` was built to avoid.

use crate::complexity::ComplexityGuard;
use crate::config::AnalysisConfig;
use crate::error::LineageError;
use crate::expression::visit_expr;
use crate::model::{AggregateFunction, ColumnDependency, ColumnRef, ExpressionKind};
use crate::registry::TableRegistry;
use crate::resolver::SymbolResolver;
use crate::schema::SchemaProvider;
use crate::scope::{flatten_set_expr, DerivedTableAnalyzer, Scope, ScopeBuilder};
use crate::warning::WarningCollector;
use sqlparser::ast::{
    Expr, GroupByExpr, Query, Select, SelectItem, SelectItemQualifiedWildcardKind, SetExpr,
};
use std::collections::HashSet;

/// Collapses runs of whitespace so expression text produced from
/// `Expr::to_string()` is stable regardless of the source's original
/// formatting (matches GROUP BY alias/expression comparisons below).
fn normalize_text(text: impl AsRef<str>) -> String {
    text.as_ref().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Picks the name a target column is reported under: an explicit alias,
/// else a bare identifier's own name, else the normalized SQL text of the
/// expression (a computed column with no alias is named after its formula).
fn target_column_name(expr: &Expr, alias: Option<&str>) -> String {
    if let Some(alias) = alias {
        return alias.to_string();
    }
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(parts) => parts
            .last()
            .map(|p| p.value.clone())
            .unwrap_or_else(|| normalize_text(expr.to_string())),
        _ => normalize_text(expr.to_string()),
    }
}

/// Best-effort syntactic scan for an aggregate call anywhere in `expr`,
/// used only to decide whether a SELECT with no GROUP BY still needs the
/// GROUP-BY-aware handling (a bare `SELECT SUM(x) FROM t` is an aggregation
/// query even without a GROUP BY clause).
fn contains_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Function(function) => {
            let name = function
                .name
                .0
                .last()
                .map(|p| p.to_string())
                .unwrap_or_default();
            if AggregateFunction::from_name(&name).is_some() {
                return true;
            }
            if let sqlparser::ast::FunctionArguments::List(args) = &function.args {
                return args.args.iter().any(|arg| match arg {
                    sqlparser::ast::FunctionArg::Named { arg, .. }
                    | sqlparser::ast::FunctionArg::Unnamed(arg) => match arg {
                        sqlparser::ast::FunctionArgExpr::Expr(inner) => contains_aggregate(inner),
                        _ => false,
                    },
                });
            }
            false
        }
        Expr::BinaryOp { left, right, .. } => contains_aggregate(left) || contains_aggregate(right),
        Expr::UnaryOp { expr, .. }
        | Expr::Nested(expr)
        | Expr::Cast { expr, .. }
        | Expr::IsNull(expr)
        | Expr::IsNotNull(expr) => contains_aggregate(expr),
        Expr::InList { expr, list, .. } => {
            contains_aggregate(expr) || list.iter().any(contains_aggregate)
        }
        Expr::Between { expr, low, high, .. } => {
            contains_aggregate(expr) || contains_aggregate(low) || contains_aggregate(high)
        }
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            operand.as_deref().map(contains_aggregate).unwrap_or(false)
                || conditions
                    .iter()
                    .any(|cw| contains_aggregate(&cw.condition) || contains_aggregate(&cw.result))
                || else_result.as_deref().map(contains_aggregate).unwrap_or(false)
        }
        _ => false,
    }
}

/// Walks `expr` for `Expr::Subquery`/`Expr::InSubquery`/`Expr::Exists`
/// nodes, recursing each one with `parent` as its scope's parent
/// (correlation support) purely for warning/error surfacing; WHERE/HAVING
/// subqueries register no table and contribute no dependency of their own
/// (spec.md §4.9).
fn walk_nested_subqueries(
    expr: &Expr,
    extractor: &DependencyExtractor<'_>,
    parent: &Scope<'_>,
    registry: &mut TableRegistry,
    warnings: &mut WarningCollector,
) {
    match expr {
        Expr::Subquery(query) | Expr::Exists { subquery: query, .. } => {
            if let Err(err) = extractor.extract_query(query, Some(parent), registry, warnings) {
                warnings.warn(format!("nested subquery could not be analyzed: {err}"));
            }
        }
        Expr::InSubquery { subquery, expr, .. } => {
            walk_nested_subqueries(expr, extractor, parent, registry, warnings);
            if let Err(err) = extractor.extract_query(subquery, Some(parent), registry, warnings) {
                warnings.warn(format!("nested subquery could not be analyzed: {err}"));
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            walk_nested_subqueries(left, extractor, parent, registry, warnings);
            walk_nested_subqueries(right, extractor, parent, registry, warnings);
        }
        Expr::UnaryOp { expr, .. }
        | Expr::Nested(expr)
        | Expr::Cast { expr, .. }
        | Expr::IsNull(expr)
        | Expr::IsNotNull(expr) => walk_nested_subqueries(expr, extractor, parent, registry, warnings),
        Expr::InList { expr, list, .. } => {
            walk_nested_subqueries(expr, extractor, parent, registry, warnings);
            for item in list {
                walk_nested_subqueries(item, extractor, parent, registry, warnings);
            }
        }
        Expr::Between { expr, low, high, .. } => {
            walk_nested_subqueries(expr, extractor, parent, registry, warnings);
            walk_nested_subqueries(low, extractor, parent, registry, warnings);
            walk_nested_subqueries(high, extractor, parent, registry, warnings);
        }
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(operand) = operand {
                walk_nested_subqueries(operand, extractor, parent, registry, warnings);
            }
            for cw in conditions {
                walk_nested_subqueries(&cw.condition, extractor, parent, registry, warnings);
                walk_nested_subqueries(&cw.result, extractor, parent, registry, warnings);
            }
            if let Some(else_result) = else_result {
                walk_nested_subqueries(else_result, extractor, parent, registry, warnings);
            }
        }
        _ => {}
    }
}

/// Extracts column-level dependencies from `SELECT`/`UNION` query bodies.
///
/// Deliberately holds no `&mut TableRegistry`: every method that needs one
/// takes it as an explicit parameter instead. This lets the same value act
/// as a `DerivedTableAnalyzer` (whose trait method requires `&mut self`)
/// without ever double-borrowing the registry through a struct field.
pub struct DependencyExtractor<'a> {
    pub schema: Option<&'a dyn SchemaProvider>,
    pub config: &'a AnalysisConfig,
}

impl<'a> DependencyExtractor<'a> {
    pub fn new(schema: Option<&'a dyn SchemaProvider>, config: &'a AnalysisConfig) -> Self {
        Self { schema, config }
    }

    /// Extracts dependencies for an entire query body, dispatching to the
    /// UNION path when the body is a set operation.
    pub fn extract_query<'p>(
        &self,
        query: &Query,
        parent: Option<&Scope<'p>>,
        registry: &mut TableRegistry,
        warnings: &mut WarningCollector,
    ) -> Result<Vec<ColumnDependency>, LineageError> {
        match &*query.body {
            SetExpr::Select(select) => self.extract_select(select, parent, registry, warnings),
            SetExpr::Query(inner) => self.extract_query(inner, parent, registry, warnings),
            SetExpr::SetOperation { .. } => self.extract_union(&query.body, parent, registry, warnings),
            _ => Ok(Vec::new()),
        }
    }

    /// Flattens every branch of a UNION/UNION ALL (recursing through nested
    /// set operations), analyzes each branch independently (fresh scope and
    /// table set per branch), then merges dependencies by SELECT-list
    /// position -- unless the first branch used `SELECT *`, in which case
    /// branches are merged by target column name instead.
    fn extract_union<'p>(
        &self,
        body: &SetExpr,
        parent: Option<&Scope<'p>>,
        registry: &mut TableRegistry,
        warnings: &mut WarningCollector,
    ) -> Result<Vec<ColumnDependency>, LineageError> {
        let mut branches = Vec::new();
        flatten_set_expr(body, &mut branches);

        if branches.len() < 2 {
            return match branches.into_iter().next() {
                Some(select) => self.extract_select(&select, parent, registry, warnings),
                None => Ok(Vec::new()),
            };
        }

        let first_is_star = matches!(
            branches[0].projection.first(),
            Some(SelectItem::Wildcard(_)) | Some(SelectItem::QualifiedWildcard(_, _))
        );

        let mut per_branch = Vec::with_capacity(branches.len());
        for branch in &branches {
            per_branch.push(self.extract_select(branch, parent, registry, warnings)?);
        }

        if first_is_star {
            merge_union_by_name(per_branch)
        } else {
            merge_union_by_position(per_branch)
        }
    }

    /// Extracts dependencies for a single `SELECT`, handling wildcard
    /// expansion, scalar subqueries in the projection list, GROUP BY /
    /// aggregate attribution, and WHERE/HAVING correlated subqueries.
    pub fn extract_select<'p>(
        &self,
        select: &Select,
        parent: Option<&Scope<'p>>,
        registry: &mut TableRegistry,
        warnings: &mut WarningCollector,
    ) -> Result<Vec<ColumnDependency>, LineageError> {
        let scope = {
            let mut builder = ScopeBuilder::new(registry, self.schema, self.config);
            let mut derived_analyzer = Self {
                schema: self.schema,
                config: self.config,
            };
            builder.build_select_scope(select, parent, &mut derived_analyzer, warnings)?
        };

        let guard = ComplexityGuard::new(&self.config.complexity_limits, self.config.on_complexity_exceeded);
        for item in &select.projection {
            if let Some(expr) = projection_expr(item) {
                guard.check(expr, warnings)?;
            }
        }
        if let Some(selection) = &select.selection {
            guard.check(selection, warnings)?;
        }
        if let Some(having) = &select.having {
            guard.check(having, warnings)?;
        }
        let group_by_exprs: Vec<&Expr> = match &select.group_by {
            GroupByExpr::Expressions(exprs, _) => exprs.iter().collect(),
            GroupByExpr::All(_) => Vec::new(),
        };
        for expr in &group_by_exprs {
            guard.check(expr, warnings)?;
        }

        let resolver = SymbolResolver::new(&scope, self.schema, self.config);

        let has_group_by = !group_by_exprs.is_empty() || matches!(select.group_by, GroupByExpr::All(_));
        let has_scalar_aggregate = select
            .projection
            .iter()
            .filter_map(projection_expr)
            .any(contains_aggregate);
        let is_aggregation_query = has_group_by || has_scalar_aggregate;

        let group_by_all = matches!(select.group_by, GroupByExpr::All(_));
        let mut group_by_columns: HashSet<(String, String)> = HashSet::new();
        let mut group_by_texts: HashSet<String> = HashSet::new();
        let mut group_by_names: HashSet<String> = HashSet::new();
        for expr in &group_by_exprs {
            let outcome = visit_expr(expr, &resolver, warnings)?;
            for col in &outcome.sources {
                group_by_columns.insert((col.table.to_lowercase(), col.column.to_lowercase()));
            }
            group_by_texts.insert(normalize_text(expr.to_string()));
            if let Expr::Identifier(ident) = expr {
                group_by_names.insert(ident.value.to_lowercase());
            }
        }

        let mut dependencies = Vec::new();

        for item in &select.projection {
            match item {
                SelectItem::Wildcard(_) => {
                    for source in resolver.resolve_star(None)? {
                        let target = ColumnRef::output(source.column.clone());
                        dependencies.push(
                            ColumnDependency::new(source, target, ExpressionKind::Direct)
                                .with_confidence(1.0),
                        );
                    }
                }
                SelectItem::QualifiedWildcard(kind, _) => match kind {
                    SelectItemQualifiedWildcardKind::ObjectName(name) => {
                        let qualifier = name.0.last().map(|p| p.value.clone());
                        if let Some(qualifier) = qualifier {
                            for source in resolver.resolve_star(Some(&qualifier))? {
                                let target = ColumnRef::output(source.column.clone());
                                dependencies.push(
                                    ColumnDependency::new(source, target, ExpressionKind::Direct)
                                        .with_confidence(1.0),
                                );
                            }
                        }
                    }
                    SelectItemQualifiedWildcardKind::Expr(_) => {
                        warnings.warn("qualified wildcard on a non-table expression is not traced");
                    }
                },
                SelectItem::UnnamedExpr(expr) => self.extract_projection_expr(
                    expr,
                    None,
                    &scope,
                    &resolver,
                    registry,
                    is_aggregation_query,
                    &group_by_columns,
                    &group_by_texts,
                    &group_by_names,
                    group_by_all,
                    &mut dependencies,
                    warnings,
                )?,
                SelectItem::ExprWithAlias { expr, alias } => self.extract_projection_expr(
                    expr,
                    Some(alias.value.as_str()),
                    &scope,
                    &resolver,
                    registry,
                    is_aggregation_query,
                    &group_by_columns,
                    &group_by_texts,
                    &group_by_names,
                    group_by_all,
                    &mut dependencies,
                    warnings,
                )?,
            }
        }

        if let Some(selection) = &select.selection {
            walk_nested_subqueries(selection, self, &scope, registry, warnings);
        }
        if let Some(having) = &select.having {
            walk_nested_subqueries(having, self, &scope, registry, warnings);
        }

        Ok(dependencies)
    }

    #[allow(clippy::too_many_arguments)]
    fn extract_projection_expr(
        &self,
        expr: &Expr,
        alias: Option<&str>,
        scope: &Scope<'_>,
        resolver: &SymbolResolver<'_, '_>,
        registry: &mut TableRegistry,
        is_aggregation_query: bool,
        group_by_columns: &HashSet<(String, String)>,
        group_by_texts: &HashSet<String>,
        group_by_names: &HashSet<String>,
        group_by_all: bool,
        dependencies: &mut Vec<ColumnDependency>,
        warnings: &mut WarningCollector,
    ) -> Result<(), LineageError> {
        let target_name = target_column_name(expr, alias);
        let text = normalize_text(expr.to_string());

        // Scalar subquery in the SELECT list: re-analyze it as a correlated
        // child scope and fold every one of its source columns into this
        // single target column (spec.md §4.9).
        if let Expr::Subquery(inner_query) = expr {
            let mut inner_analyzer = Self {
                schema: self.schema,
                config: self.config,
            };
            let sub_deps = inner_analyzer.extract_query(inner_query, Some(scope), registry, warnings)?;
            for dep in sub_deps {
                dependencies.push(
                    ColumnDependency::new(dep.source, ColumnRef::output(target_name.clone()), ExpressionKind::Function)
                        .with_expression_text(text.clone())
                        .with_confidence(dep.confidence * 0.9),
                );
            }
            return Ok(());
        }

        let outcome = visit_expr(expr, resolver, warnings)?;

        if outcome.sources.is_empty() {
            dependencies.push(
                ColumnDependency::new(
                    ColumnRef::constant(target_name.clone()),
                    ColumnRef::output(target_name),
                    outcome.kind,
                )
                .with_expression_text(text),
            );
            return Ok(());
        }

        let is_group_by_target = is_aggregation_query
            && outcome.aggregate_function.is_none()
            && (group_by_all
                || group_by_texts.contains(&text)
                || group_by_names.contains(&target_name.to_lowercase())
                || outcome
                    .sources
                    .iter()
                    .any(|s| group_by_columns.contains(&(s.table.to_lowercase(), s.column.to_lowercase()))));

        for source in outcome.sources {
            let mut dep = ColumnDependency::new(source, ColumnRef::output(target_name.clone()), outcome.kind)
                .with_expression_text(text.clone());
            if let Some(function) = outcome.aggregate_function {
                dep = dep.as_aggregate(function);
            } else if is_group_by_target {
                dep = dep.as_group_by();
            }
            dependencies.push(dep);
        }
        Ok(())
    }
}

fn projection_expr(item: &SelectItem) -> Option<&Expr> {
    match item {
        SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => Some(expr),
        _ => None,
    }
}

/// Groups `ColumnDependency` edges by target column name into `ColumnLineage`
/// values (spec.md §4.10 step 4): sources are concatenated in declaration
/// order (the `__CONSTANT__` sentinel is dropped, not carried into
/// `sources`), while `expression`/`expression_kind`/`confidence` are taken
/// from each group's first dependency. Aggregation flags OR across the
/// group. This is deliberately *not* `ColumnLineage::merge_from` -- that
/// method's 0.9 confidence penalty is for merging lineages from separate
/// statements/branches (spec.md §4.5), not for folding together the several
/// source columns a single computed expression reads.
pub fn group_into_lineages(deps: Vec<ColumnDependency>) -> Vec<crate::model::ColumnLineage> {
    let mut by_target: indexmap::IndexMap<String, crate::model::ColumnLineage> = indexmap::IndexMap::new();
    for dep in deps {
        let name = dep.target.column.clone();
        let entry = by_target.entry(name.clone()).or_insert_with(|| {
            let mut lineage = crate::model::ColumnLineage::new(name.clone(), dep.expr_kind);
            lineage.expression = dep.expression_text.clone();
            lineage.confidence = dep.confidence;
            lineage
        });
        if !dep.source.is_constant() {
            entry.add_sources([dep.source.clone()]);
        }
        entry.is_aggregate = entry.is_aggregate || dep.is_aggregate;
        entry.is_group_by = entry.is_group_by || dep.is_group_by;
        if entry.aggregate_function.is_none() {
            entry.aggregate_function = dep.aggregate_function;
        }
    }
    by_target.into_values().collect()
}

/// Merges UNION branches positionally: branch N's Kth dependency group
/// lines up with every other branch's Kth group by SELECT-list order.
fn merge_union_by_position(
    per_branch: Vec<Vec<ColumnDependency>>,
) -> Result<Vec<ColumnDependency>, LineageError> {
    let mut ordered_targets: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for dep in &per_branch[0] {
        if seen.insert(dep.target.column.clone()) {
            ordered_targets.push(dep.target.column.clone());
        }
    }

    let mut merged = Vec::new();
    for (position, target_name) in ordered_targets.iter().enumerate() {
        let mut by_source: indexmap::IndexMap<String, ColumnDependency> = indexmap::IndexMap::new();
        let mut kind = ExpressionKind::Direct;
        for branch in &per_branch {
            let branch_targets: Vec<String> = {
                let mut seen = HashSet::new();
                let mut names = Vec::new();
                for dep in branch {
                    if seen.insert(dep.target.column.clone()) {
                        names.push(dep.target.column.clone());
                    }
                }
                names
            };
            let branch_target_name = branch_targets.get(position).cloned().unwrap_or_else(|| target_name.clone());
            for dep in branch.iter().filter(|d| d.target.column == branch_target_name) {
                kind = kind.merge_precedence(dep.expr_kind);
                by_source
                    .entry(dep.source.qualified_name())
                    .and_modify(|existing| {
                        existing.confidence = existing.confidence.min(dep.confidence);
                    })
                    .or_insert_with(|| dep.clone());
            }
        }
        for (_, mut dep) in by_source {
            dep.target = ColumnRef::output(target_name.clone());
            dep.expr_kind = kind;
            merged.push(dep);
        }
    }
    Ok(merged)
}

/// Merges UNION branches by target column name (used when the first branch
/// is a `SELECT *`, so positional matching can't be trusted).
fn merge_union_by_name(
    per_branch: Vec<Vec<ColumnDependency>>,
) -> Result<Vec<ColumnDependency>, LineageError> {
    let mut ordered_targets: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for branch in &per_branch {
        for dep in branch {
            if seen.insert(dep.target.column.clone()) {
                ordered_targets.push(dep.target.column.clone());
            }
        }
    }

    let mut merged = Vec::new();
    for target_name in ordered_targets {
        let mut by_source: indexmap::IndexMap<String, ColumnDependency> = indexmap::IndexMap::new();
        let mut kind = ExpressionKind::Direct;
        for branch in &per_branch {
            for dep in branch.iter().filter(|d| d.target.column == target_name) {
                kind = kind.merge_precedence(dep.expr_kind);
                by_source
                    .entry(dep.source.qualified_name())
                    .and_modify(|existing| {
                        existing.confidence = existing.confidence.min(dep.confidence);
                    })
                    .or_insert_with(|| dep.clone());
            }
        }
        for (_, mut dep) in by_source {
            dep.target = ColumnRef::output(target_name.clone());
            dep.expr_kind = kind;
            merged.push(dep);
        }
    }
    Ok(merged)
}

/// Handles FROM-clause derived tables (`FROM (SELECT ...) AS alias`):
/// recursively extracts the subquery's own dependencies, then registers a
/// `Subquery`-kind table under `alias` carrying one `ColumnLineage` per
/// target column the subquery produced.
impl<'a> DerivedTableAnalyzer for DependencyExtractor<'a> {
    fn analyze_derived_table(
        &mut self,
        query: &Query,
        alias: &str,
        registry: &mut TableRegistry,
        schema: Option<&dyn SchemaProvider>,
        config: &AnalysisConfig,
        warnings: &mut WarningCollector,
    ) -> Result<(), LineageError> {
        let local = DependencyExtractor { schema, config };
        let dependencies = local.extract_query(query, None, registry, warnings)?;

        let mut table_def =
            crate::model::TableDefinition::new(alias.to_string(), crate::model::TableType::Subquery);
        for lineage in group_into_lineages(dependencies) {
            table_def.add_column(lineage);
        }
        registry.register_table(table_def, warnings)
    }
}
