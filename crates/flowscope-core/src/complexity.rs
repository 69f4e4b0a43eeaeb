//! Complexity Guard (C13): bounds how much work the Dependency Extractor
//! will sink into a single expression before giving up or warning.

use crate::config::{ComplexityLimits, ComplexityPolicy};
use crate::error::LineageError;
use crate::warning::WarningCollector;
use sqlparser::ast::{Expr, FunctionArg, FunctionArgExpr, FunctionArguments};

#[derive(Debug, Default, Clone, Copy)]
struct ExprStats {
    nodes: usize,
    depth: usize,
    case_branches: usize,
}

fn walk(expr: &Expr, depth: usize) -> ExprStats {
    let mut stats = ExprStats {
        nodes: 1,
        depth,
        case_branches: 0,
    };

    let mut fold_in = |child: &Expr| {
        let child_stats = walk(child, depth + 1);
        stats.nodes += child_stats.nodes;
        stats.depth = stats.depth.max(child_stats.depth);
        stats.case_branches += child_stats.case_branches;
    };

    match expr {
        Expr::BinaryOp { left, right, .. } => {
            fold_in(left);
            fold_in(right);
        }
        Expr::UnaryOp { expr, .. }
        | Expr::Nested(expr)
        | Expr::Cast { expr, .. }
        | Expr::IsNull(expr)
        | Expr::IsNotNull(expr) => fold_in(expr),
        Expr::InList { expr, list, .. } => {
            fold_in(expr);
            for item in list {
                fold_in(item);
            }
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            fold_in(expr);
            fold_in(low);
            fold_in(high);
        }
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(operand) = operand {
                fold_in(operand);
            }
            stats.case_branches += conditions.len();
            for case_when in conditions {
                fold_in(&case_when.condition);
                fold_in(&case_when.result);
            }
            if let Some(else_result) = else_result {
                fold_in(else_result);
            }
        }
        Expr::Function(function) => {
            if let FunctionArguments::List(args) = &function.args {
                for arg in &args.args {
                    let inner = match arg {
                        FunctionArg::Named { arg, .. } | FunctionArg::Unnamed(arg) => arg,
                    };
                    if let FunctionArgExpr::Expr(expr) = inner {
                        fold_in(expr);
                    }
                }
            }
        }
        _ => {}
    }

    stats
}

/// Applied once per top-level projection/WHERE/HAVING expression.
pub struct ComplexityGuard<'a> {
    limits: &'a ComplexityLimits,
    policy: ComplexityPolicy,
}

impl<'a> ComplexityGuard<'a> {
    pub fn new(limits: &'a ComplexityLimits, policy: ComplexityPolicy) -> Self {
        Self { limits, policy }
    }

    /// Checks `expr` against the configured limits. Returns an error only
    /// when the policy is `Fail`; otherwise warns (`Warn`) or is silent
    /// (`Ignore`), in both cases letting the caller proceed.
    pub fn check(
        &self,
        expr: &Expr,
        warnings: &mut WarningCollector,
    ) -> Result<(), LineageError> {
        let stats = walk(expr, 0);

        let violation = if stats.nodes > self.limits.max_nodes {
            Some(format!(
                "expression has {} nodes, exceeding the limit of {}",
                stats.nodes, self.limits.max_nodes
            ))
        } else if stats.depth > self.limits.max_depth {
            Some(format!(
                "expression nests {} levels deep, exceeding the limit of {}",
                stats.depth, self.limits.max_depth
            ))
        } else if stats.case_branches > self.limits.max_case_branches {
            Some(format!(
                "CASE expression has {} branches, exceeding the limit of {}",
                stats.case_branches, self.limits.max_case_branches
            ))
        } else {
            None
        };

        let Some(message) = violation else {
            return Ok(());
        };

        match self.policy {
            ComplexityPolicy::Fail => Err(LineageError::complexity_exceeded(message)),
            ComplexityPolicy::Warn => {
                warnings.warn(message);
                Ok(())
            }
            ComplexityPolicy::Ignore => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    fn parse_expr(sql: &str) -> Expr {
        let full = format!("SELECT {sql}");
        let stmts = Parser::parse_sql(&GenericDialect {}, &full).unwrap();
        match &stmts[0] {
            sqlparser::ast::Statement::Query(q) => match &*q.body {
                sqlparser::ast::SetExpr::Select(select) => match &select.projection[0] {
                    sqlparser::ast::SelectItem::UnnamedExpr(expr) => expr.clone(),
                    _ => panic!("expected expression"),
                },
                _ => panic!("expected select"),
            },
            _ => panic!("expected query"),
        }
    }

    #[test]
    fn small_expression_passes() {
        let expr = parse_expr("a + b");
        let limits = ComplexityLimits::default();
        let guard = ComplexityGuard::new(&limits, ComplexityPolicy::Fail);
        let mut warnings = WarningCollector::new();
        assert!(guard.check(&expr, &mut warnings).is_ok());
    }

    #[test]
    fn node_limit_exceeded_fails_under_fail_policy() {
        let expr = parse_expr("a + b");
        let limits = ComplexityLimits {
            max_nodes: 1,
            ..ComplexityLimits::default()
        };
        let guard = ComplexityGuard::new(&limits, ComplexityPolicy::Fail);
        let mut warnings = WarningCollector::new();
        assert!(guard.check(&expr, &mut warnings).is_err());
    }

    #[test]
    fn node_limit_exceeded_warns_under_warn_policy() {
        let expr = parse_expr("a + b");
        let limits = ComplexityLimits {
            max_nodes: 1,
            ..ComplexityLimits::default()
        };
        let guard = ComplexityGuard::new(&limits, ComplexityPolicy::Warn);
        let mut warnings = WarningCollector::new();
        assert!(guard.check(&expr, &mut warnings).is_ok());
        assert!(!warnings.is_empty());
    }

    #[test]
    fn case_branch_count_is_tracked() {
        let expr = parse_expr("CASE WHEN a THEN 1 WHEN b THEN 2 ELSE 3 END");
        let limits = ComplexityLimits {
            max_case_branches: 1,
            ..ComplexityLimits::default()
        };
        let guard = ComplexityGuard::new(&limits, ComplexityPolicy::Fail);
        let mut warnings = WarningCollector::new();
        assert!(guard.check(&expr, &mut warnings).is_err());
    }
}
