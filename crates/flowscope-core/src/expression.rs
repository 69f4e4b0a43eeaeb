//! Expression Visitor (C7): walks a `sqlparser` expression tree, resolving
//! every column reference it touches and classifying the expression's shape.

use crate::model::{AggregateFunction, ExpressionKind};
use crate::resolver::SymbolResolver;
use crate::warning::WarningCollector;
use sqlparser::ast::{Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments};

/// What walking an expression produced: every column it reads, its overall
/// shape, and (if it is itself a supported aggregate call) which one.
#[derive(Debug, Clone)]
pub struct ExpressionOutcome {
    pub sources: Vec<crate::model::ColumnRef>,
    pub kind: ExpressionKind,
    pub aggregate_function: Option<AggregateFunction>,
}

impl ExpressionOutcome {
    fn leaf(sources: Vec<crate::model::ColumnRef>, kind: ExpressionKind) -> Self {
        Self {
            sources,
            kind,
            aggregate_function: None,
        }
    }

    fn merge(mut self, other: ExpressionOutcome, combined_kind: ExpressionKind) -> Self {
        self.sources.extend(other.sources);
        self.kind = combined_kind;
        self.aggregate_function = self.aggregate_function.or(other.aggregate_function);
        self
    }
}

/// Visits `expr` and resolves every column reference within it.
///
/// Failures to resolve an individual column are downgraded to a warning
/// (`warnings`) rather than aborting the whole expression, so that e.g. one
/// unresolvable operand of a `+` doesn't erase lineage for the other.
/// Resolution errors that represent a policy decision (strict ambiguity,
/// schema validation) still propagate.
pub fn visit_expr(
    expr: &Expr,
    resolver: &SymbolResolver<'_, '_>,
    warnings: &mut WarningCollector,
) -> Result<ExpressionOutcome, crate::error::LineageError> {
    match expr {
        Expr::Identifier(ident) => resolve_or_warn(&ident.value, None, resolver, warnings),

        Expr::CompoundIdentifier(parts) => {
            if parts.len() < 2 {
                let name = parts.last().map(|p| p.value.as_str()).unwrap_or_default();
                return resolve_or_warn(name, None, resolver, warnings);
            }
            let column = &parts[parts.len() - 1].value;
            let qualifier = &parts[parts.len() - 2].value;
            resolve_or_warn(column, Some(qualifier.as_str()), resolver, warnings)
        }

        Expr::Value(_) => Ok(ExpressionOutcome::leaf(Vec::new(), ExpressionKind::Direct)),

        Expr::BinaryOp { left, right, .. } => {
            let left_out = visit_expr(left, resolver, warnings)?;
            let right_out = visit_expr(right, resolver, warnings)?;
            let kind = ExpressionKind::Computed
                .merge_precedence(left_out.kind)
                .merge_precedence(right_out.kind);
            Ok(left_out.merge(right_out, kind))
        }

        Expr::UnaryOp { expr, .. } => {
            let inner = visit_expr(expr, resolver, warnings)?;
            let kind = ExpressionKind::Computed.merge_precedence(inner.kind);
            Ok(ExpressionOutcome {
                kind,
                ..inner
            })
        }

        Expr::Nested(inner) => visit_expr(inner, resolver, warnings),

        Expr::Cast { expr, .. } => {
            let inner = visit_expr(expr, resolver, warnings)?;
            let kind = ExpressionKind::Computed.merge_precedence(inner.kind);
            Ok(ExpressionOutcome {
                kind,
                ..inner
            })
        }

        Expr::IsNull(inner) | Expr::IsNotNull(inner) => {
            let inner_out = visit_expr(inner, resolver, warnings)?;
            Ok(ExpressionOutcome {
                kind: ExpressionKind::Computed,
                ..inner_out
            })
        }

        Expr::InList { expr, list, .. } => {
            let mut out = visit_expr(expr, resolver, warnings)?;
            for item in list {
                let item_out = visit_expr(item, resolver, warnings)?;
                out = out.merge(item_out, ExpressionKind::Computed);
            }
            Ok(out)
        }

        Expr::Between {
            expr, low, high, ..
        } => {
            let mut out = visit_expr(expr, resolver, warnings)?;
            out = out.merge(visit_expr(low, resolver, warnings)?, ExpressionKind::Computed);
            out = out.merge(visit_expr(high, resolver, warnings)?, ExpressionKind::Computed);
            Ok(out)
        }

        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            let mut out = ExpressionOutcome::leaf(Vec::new(), ExpressionKind::Case);
            if let Some(operand) = operand {
                out = out.merge(visit_expr(operand, resolver, warnings)?, ExpressionKind::Case);
            }
            for case_when in conditions {
                out = out.merge(
                    visit_expr(&case_when.condition, resolver, warnings)?,
                    ExpressionKind::Case,
                );
                out = out.merge(
                    visit_expr(&case_when.result, resolver, warnings)?,
                    ExpressionKind::Case,
                );
            }
            if let Some(else_result) = else_result {
                out = out.merge(visit_expr(else_result, resolver, warnings)?, ExpressionKind::Case);
            }
            Ok(out)
        }

        Expr::Function(function) => visit_function(function, resolver, warnings),

        Expr::Subquery(_) => {
            warnings.warn("scalar subquery in expression position is not traced through");
            Ok(ExpressionOutcome::leaf(Vec::new(), ExpressionKind::Computed))
        }

        Expr::Exists { .. } => {
            Ok(ExpressionOutcome::leaf(Vec::new(), ExpressionKind::Computed))
        }

        other => {
            warnings.warn(format!("expression node '{other}' is not specifically handled; treating as an opaque computed value"));
            Ok(ExpressionOutcome::leaf(Vec::new(), ExpressionKind::Computed))
        }
    }
}

fn resolve_or_warn(
    column: &str,
    qualifier: Option<&str>,
    resolver: &SymbolResolver<'_, '_>,
    warnings: &mut WarningCollector,
) -> Result<ExpressionOutcome, crate::error::LineageError> {
    match resolver.resolve(column, qualifier, warnings) {
        Ok((col_ref, _confidence)) => Ok(ExpressionOutcome::leaf(vec![col_ref], ExpressionKind::Direct)),
        Err(err) => match err {
            crate::error::LineageError::AmbiguousColumn { .. }
            | crate::error::LineageError::SchemaValidation { .. } => Err(err),
            _ => {
                warnings.warn(format!("could not resolve column reference: {err}"));
                Ok(ExpressionOutcome::leaf(Vec::new(), ExpressionKind::Direct))
            }
        },
    }
}

fn visit_function(
    function: &Function,
    resolver: &SymbolResolver<'_, '_>,
    warnings: &mut WarningCollector,
) -> Result<ExpressionOutcome, crate::error::LineageError> {
    let name = function
        .name
        .0
        .last()
        .map(|p| p.to_string())
        .unwrap_or_default();
    let aggregate_function = AggregateFunction::from_name(&name);
    let is_window = function.over.is_some();

    let mut sources = Vec::new();
    let mut kind = if is_window {
        ExpressionKind::Window
    } else if aggregate_function.is_some() {
        ExpressionKind::Aggregation
    } else {
        ExpressionKind::Function
    };

    if let FunctionArguments::List(args) = &function.args {
        for arg in &args.args {
            match arg {
                FunctionArg::Named { arg, .. } | FunctionArg::Unnamed(arg) => match arg {
                    FunctionArgExpr::Expr(expr) => {
                        let arg_out = visit_expr(expr, resolver, warnings)?;
                        sources.extend(arg_out.sources);
                        if !is_window && aggregate_function.is_none() {
                            kind = kind.merge_precedence(arg_out.kind);
                        }
                    }
                    FunctionArgExpr::Wildcard => {
                        // COUNT(*): no traceable source column, just the
                        // aggregate marker.
                    }
                    FunctionArgExpr::QualifiedWildcard(_) => {}
                },
            }
        }
    }

    Ok(ExpressionOutcome {
        sources,
        kind,
        aggregate_function,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::registry::TableRegistry;
    use crate::scope::{DerivedTableAnalyzer, Scope, ScopeBuilder};
    use crate::schema::SchemaProvider;
    use sqlparser::ast::{Select, SetExpr, Statement};
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    struct NoopDerived;
    impl DerivedTableAnalyzer for NoopDerived {
        fn analyze_derived_table(
            &mut self,
            _query: &sqlparser::ast::Query,
            _alias: &str,
            _registry: &mut TableRegistry,
            _schema: Option<&dyn SchemaProvider>,
            _config: &AnalysisConfig,
            _warnings: &mut WarningCollector,
        ) -> Result<(), crate::error::LineageError> {
            Ok(())
        }
    }

    fn parse_select(sql: &str) -> Select {
        let stmts = Parser::parse_sql(&GenericDialect {}, sql).unwrap();
        match &stmts[0] {
            Statement::Query(q) => match &*q.body {
                SetExpr::Select(s) => (**s).clone(),
                _ => panic!("expected select"),
            },
            _ => panic!("expected query"),
        }
    }

    fn projection_expr(select: &Select) -> &Expr {
        match &select.projection[0] {
            sqlparser::ast::SelectItem::UnnamedExpr(expr) => expr,
            sqlparser::ast::SelectItem::ExprWithAlias { expr, .. } => expr,
            _ => panic!("expected expression projection"),
        }
    }

    fn scope_for(select: &Select, registry: &mut TableRegistry, config: &AnalysisConfig) -> Scope<'static> {
        let mut builder = ScopeBuilder::new(registry, None, config);
        let mut warnings = WarningCollector::new();
        let mut noop = NoopDerived;
        builder
            .build_select_scope(select, None, &mut noop, &mut warnings)
            .unwrap()
    }

    #[test]
    fn direct_column_reference() {
        let select = parse_select("SELECT amount FROM orders");
        let mut registry = TableRegistry::new();
        let config = AnalysisConfig::default();
        let scope = scope_for(&select, &mut registry, &config);
        let resolver = SymbolResolver::new(&scope, None, &config);
        let mut warnings = WarningCollector::new();
        let outcome = visit_expr(projection_expr(&select), &resolver, &mut warnings).unwrap();
        assert_eq!(outcome.kind, ExpressionKind::Direct);
        assert_eq!(outcome.sources.len(), 1);
        assert_eq!(outcome.sources[0].column, "amount");
    }

    #[test]
    fn binary_op_is_computed_and_merges_sources() {
        let select = parse_select("SELECT price * qty FROM orders");
        let mut registry = TableRegistry::new();
        let config = AnalysisConfig::default();
        let scope = scope_for(&select, &mut registry, &config);
        let resolver = SymbolResolver::new(&scope, None, &config);
        let mut warnings = WarningCollector::new();
        let outcome = visit_expr(projection_expr(&select), &resolver, &mut warnings).unwrap();
        assert_eq!(outcome.kind, ExpressionKind::Computed);
        assert_eq!(outcome.sources.len(), 2);
    }

    #[test]
    fn sum_function_is_aggregation() {
        let select = parse_select("SELECT SUM(amount) FROM orders");
        let mut registry = TableRegistry::new();
        let config = AnalysisConfig::default();
        let scope = scope_for(&select, &mut registry, &config);
        let resolver = SymbolResolver::new(&scope, None, &config);
        let mut warnings = WarningCollector::new();
        let outcome = visit_expr(projection_expr(&select), &resolver, &mut warnings).unwrap();
        assert_eq!(outcome.kind, ExpressionKind::Aggregation);
        assert_eq!(outcome.aggregate_function, Some(AggregateFunction::Sum));
        assert_eq!(outcome.sources.len(), 1);
    }

    #[test]
    fn count_star_has_no_sources() {
        let select = parse_select("SELECT COUNT(*) FROM orders");
        let mut registry = TableRegistry::new();
        let config = AnalysisConfig::default();
        let scope = scope_for(&select, &mut registry, &config);
        let resolver = SymbolResolver::new(&scope, None, &config);
        let mut warnings = WarningCollector::new();
        let outcome = visit_expr(projection_expr(&select), &resolver, &mut warnings).unwrap();
        assert_eq!(outcome.aggregate_function, Some(AggregateFunction::Count));
        assert!(outcome.sources.is_empty());
    }

    #[test]
    fn case_expression_is_classified_case() {
        let select =
            parse_select("SELECT CASE WHEN amount > 0 THEN 'pos' ELSE 'neg' END FROM orders");
        let mut registry = TableRegistry::new();
        let config = AnalysisConfig::default();
        let scope = scope_for(&select, &mut registry, &config);
        let resolver = SymbolResolver::new(&scope, None, &config);
        let mut warnings = WarningCollector::new();
        let outcome = visit_expr(projection_expr(&select), &resolver, &mut warnings).unwrap();
        assert_eq!(outcome.kind, ExpressionKind::Case);
        assert_eq!(outcome.sources.len(), 1);
    }

    #[test]
    fn literal_has_no_sources() {
        let select = parse_select("SELECT 42 FROM orders");
        let mut registry = TableRegistry::new();
        let config = AnalysisConfig::default();
        let scope = scope_for(&select, &mut registry, &config);
        let resolver = SymbolResolver::new(&scope, None, &config);
        let mut warnings = WarningCollector::new();
        let outcome = visit_expr(projection_expr(&select), &resolver, &mut warnings).unwrap();
        assert!(outcome.sources.is_empty());
        assert_eq!(outcome.kind, ExpressionKind::Direct);
    }
}
