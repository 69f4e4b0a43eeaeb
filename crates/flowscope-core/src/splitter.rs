//! Script Splitter (C1): parses a whole script into statement ASTs paired
//! with their own SQL text.
//!
//! `sqlparser` doesn't hand back per-statement source spans, so the "original
//! text" half of each pair is the statement's own `Display` rendering
//! (`Statement::to_string()`) rather than a slice of the input. This is
//! sufficient for everything downstream uses raw text for (CTE diagnostics,
//! `created_by_sql`) since none of it depends on the user's original
//! formatting surviving verbatim.

use crate::error::LineageError;
use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// Splits `script` into `(Statement, original_text)` pairs in source order.
///
/// Fails with `LineageError::ParseFailure` if the parser rejects the script,
/// and with `LineageError::EmptyScript` if the script is empty/whitespace or
/// parses to zero statements.
pub fn split_statements(script: &str) -> Result<Vec<(Statement, String)>, LineageError> {
    if script.trim().is_empty() {
        return Err(LineageError::empty_script());
    }

    let statements = Parser::parse_sql(&GenericDialect {}, script)
        .map_err(|err| LineageError::parse_failure(err.to_string()))?;

    if statements.is_empty() {
        return Err(LineageError::empty_script());
    }

    Ok(statements
        .into_iter()
        .map(|stmt| {
            let text = stmt.to_string();
            (stmt, text)
        })
        .collect())
}
