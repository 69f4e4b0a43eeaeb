//! Symbol Resolver (C6): resolves column references (qualified or not) to
//! fully-qualified `ColumnRef`s plus a confidence score.

use crate::config::{AmbiguityPolicy, AnalysisConfig};
use crate::error::LineageError;
use crate::model::ColumnRef;
use crate::schema::SchemaProvider;
use crate::scope::Scope;
use crate::warning::WarningCollector;

pub struct SymbolResolver<'a, 'p> {
    scope: &'a Scope<'p>,
    schema: Option<&'a dyn SchemaProvider>,
    config: &'a AnalysisConfig,
}

impl<'a, 'p> SymbolResolver<'a, 'p> {
    pub fn new(
        scope: &'a Scope<'p>,
        schema: Option<&'a dyn SchemaProvider>,
        config: &'a AnalysisConfig,
    ) -> Self {
        Self {
            scope,
            schema,
            config,
        }
    }

    /// Resolves `column`, optionally qualified by `qualifier` (spec.md §4.7).
    pub fn resolve(
        &self,
        column: &str,
        qualifier: Option<&str>,
        warnings: &mut WarningCollector,
    ) -> Result<(ColumnRef, f64), LineageError> {
        match qualifier {
            Some(qualifier) => self.resolve_qualified(column, qualifier),
            None => self.resolve_unqualified(column, warnings),
        }
    }

    fn resolve_qualified(
        &self,
        column: &str,
        qualifier: &str,
    ) -> Result<(ColumnRef, f64), LineageError> {
        let table_ref = self.scope.lookup_table(qualifier).ok_or_else(|| {
            let available: Vec<String> = self
                .scope
                .tables()
                .map(|t| t.effective_name().to_string())
                .collect();
            LineageError::unresolved_reference(
                format!("{qualifier}.{column}"),
                format!("table alias '{qualifier}' not found in scope; available: {available:?}"),
            )
        })?;

        if self.config.validate_against_schema {
            if let Some(schema) = self.schema {
                if !schema.column_exists(&table_ref.table, column) {
                    return Err(LineageError::schema_validation(format!(
                        "column '{column}' does not exist on table '{}'",
                        table_ref.table
                    )));
                }
            }
        }

        let mut col_ref = ColumnRef::new(table_ref.table.clone(), column);
        if let Some(alias) = &table_ref.alias {
            col_ref = col_ref.with_alias(alias.clone());
        }
        if let Some(schema) = &table_ref.schema {
            col_ref = col_ref.with_schema(schema.clone());
        }
        if let Some(db) = &table_ref.database {
            col_ref = col_ref.with_database(db.clone());
        }
        Ok((col_ref, 0.95))
    }

    fn resolve_unqualified(
        &self,
        column: &str,
        warnings: &mut WarningCollector,
    ) -> Result<(ColumnRef, f64), LineageError> {
        if self.config.require_table_prefix {
            return Err(LineageError::ambiguous_column(column, Vec::new(), None));
        }

        let tables: Vec<_> = self.scope.tables().collect();

        if tables.len() == 1 {
            let table_ref = tables[0];
            let confidence = self.confidence_for_single_table(table_ref, column);
            let mut col_ref = ColumnRef::new(table_ref.table.clone(), column);
            if let Some(alias) = &table_ref.alias {
                col_ref = col_ref.with_alias(alias.clone());
            }
            return Ok((col_ref, confidence));
        }

        if self.schema.is_some() || self.has_registered_columns() {
            let candidates: Vec<&ColumnRef> = self.scope.columns_named(column);
            match candidates.len() {
                0 => {
                    if self.config.validate_against_schema {
                        return Err(LineageError::schema_validation(format!(
                            "column '{column}' not found in any in-scope table"
                        )));
                    }
                    warnings.warn(format!(
                        "column '{column}' not found in any known table; guessing first FROM-clause table"
                    ));
                    let table_ref = tables[0];
                    return Ok((ColumnRef::new(table_ref.table.clone(), column), 0.3));
                }
                1 => return Ok((candidates[0].clone(), 1.0)),
                _ => {
                    return self.disambiguate(column, candidates, &tables, warnings);
                }
            }
        }

        self.disambiguate_without_schema(column, &tables, warnings)
    }

    fn confidence_for_single_table(&self, table_ref: &crate::model::TableRef, column: &str) -> f64 {
        if let Some(schema) = self.schema {
            if schema.columns_of(&table_ref.table).is_empty() {
                1.0
            } else if schema.column_exists(&table_ref.table, column) {
                1.0
            } else if self.config.validate_against_schema {
                1.0
            } else {
                0.3
            }
        } else {
            0.95
        }
    }

    fn has_registered_columns(&self) -> bool {
        self.scope.columns().next().is_some()
            || self.scope.tables().any(|t| !self.scope_columns_for(t).is_empty())
    }

    fn scope_columns_for(&self, table_ref: &crate::model::TableRef) -> Vec<String> {
        if let Some(schema) = self.schema {
            schema.columns_of(&table_ref.table)
        } else {
            Vec::new()
        }
    }

    fn disambiguate(
        &self,
        column: &str,
        candidates: Vec<&ColumnRef>,
        tables: &[&crate::model::TableRef],
        warnings: &mut WarningCollector,
    ) -> Result<(ColumnRef, f64), LineageError> {
        match self.config.ambiguity_policy {
            AmbiguityPolicy::Fail => {
                let candidate_names: Vec<String> =
                    candidates.iter().map(|c| c.table.clone()).collect();
                let suggestion = candidates
                    .iter()
                    .map(|c| format!("{}.{}", c.table, column))
                    .collect::<Vec<_>>()
                    .join(" or ");
                Err(LineageError::ambiguous_column(
                    column,
                    candidate_names,
                    Some(suggestion),
                ))
            }
            AmbiguityPolicy::Warn => {
                let chosen = first_in_from_order(&candidates, tables);
                warnings.ambiguity(
                    column,
                    &candidates.iter().map(|c| c.table.clone()).collect::<Vec<_>>(),
                    &chosen.table,
                );
                Ok((chosen, 0.6))
            }
            AmbiguityPolicy::Ignore => {
                let chosen = first_in_from_order(&candidates, tables);
                Ok((chosen, 0.8))
            }
        }
    }

    fn disambiguate_without_schema(
        &self,
        column: &str,
        tables: &[&crate::model::TableRef],
        warnings: &mut WarningCollector,
    ) -> Result<(ColumnRef, f64), LineageError> {
        let candidate_names: Vec<String> = tables.iter().map(|t| t.table.clone()).collect();
        match self.config.ambiguity_policy {
            AmbiguityPolicy::Fail => Err(LineageError::ambiguous_column(
                column,
                candidate_names,
                Some(
                    tables
                        .iter()
                        .map(|t| format!("{}.{}", t.effective_name(), column))
                        .collect::<Vec<_>>()
                        .join(" or "),
                ),
            )),
            AmbiguityPolicy::Warn => {
                let table_ref = tables[0];
                warnings.ambiguity(column, &candidate_names, &table_ref.table);
                Ok((ColumnRef::new(table_ref.table.clone(), column), 0.6))
            }
            AmbiguityPolicy::Ignore => {
                let table_ref = tables[0];
                Ok((ColumnRef::new(table_ref.table.clone(), column), 0.5))
            }
        }
    }

    /// Expands `*` (no qualifier) or `table.*` into the columns each
    /// in-scope table is known to have.
    pub fn resolve_star(&self, qualifier: Option<&str>) -> Result<Vec<ColumnRef>, LineageError> {
        match qualifier {
            Some(qualifier) => {
                let table_ref = self.scope.lookup_table(qualifier).ok_or_else(|| {
                    LineageError::unresolved_reference(
                        format!("{qualifier}.*"),
                        format!("table alias '{qualifier}' not found in scope"),
                    )
                })?;
                let columns = self.columns_for(table_ref);
                if columns.is_empty() && self.config.expand_wildcards {
                    return Err(LineageError::schema_validation(format!(
                        "cannot expand '{qualifier}.*': no column information for table '{}'",
                        table_ref.table
                    )));
                }
                Ok(columns
                    .into_iter()
                    .map(|c| {
                        let mut col_ref = ColumnRef::new(table_ref.table.clone(), c);
                        if let Some(alias) = &table_ref.alias {
                            col_ref = col_ref.with_alias(alias.clone());
                        }
                        col_ref
                    })
                    .collect())
            }
            None => {
                if !self.config.expand_wildcards {
                    return Ok(Vec::new());
                }
                let mut seen = std::collections::HashSet::new();
                let mut out = Vec::new();
                let mut any_known = false;
                for table_ref in self.scope.tables() {
                    let columns = self.columns_for(table_ref);
                    if !columns.is_empty() {
                        any_known = true;
                    }
                    for column in columns {
                        if seen.insert(column.to_lowercase()) {
                            out.push(ColumnRef::new(table_ref.table.clone(), column));
                        }
                    }
                }
                if !any_known {
                    return Err(LineageError::schema_validation(
                        "cannot expand '*': no column information for any in-scope table",
                    ));
                }
                Ok(out)
            }
        }
    }

    fn columns_for(&self, table_ref: &crate::model::TableRef) -> Vec<String> {
        let from_scope: Vec<String> = self
            .scope
            .columns()
            .filter(|(_, refs)| refs.iter().any(|r| r.table == table_ref.table))
            .map(|(name, _)| name.clone())
            .collect();
        if !from_scope.is_empty() {
            return from_scope;
        }
        self.scope_columns_for(table_ref)
    }

    /// Maps each `USING(col)` name to the left (first) table's column.
    pub fn handle_using(&self, column_names: &[String]) -> Vec<ColumnRef> {
        let tables: Vec<_> = self.scope.tables().collect();
        let first = tables.first();
        column_names
            .iter()
            .map(|name| match first {
                Some(table_ref) => {
                    let mut col_ref = ColumnRef::new(table_ref.table.clone(), name.clone());
                    if let Some(alias) = &table_ref.alias {
                        col_ref = col_ref.with_alias(alias.clone());
                    }
                    col_ref
                }
                None => ColumnRef::new("", name.clone()),
            })
            .collect()
    }
}

fn first_in_from_order(candidates: &[&ColumnRef], tables: &[&crate::model::TableRef]) -> ColumnRef {
    for table_ref in tables {
        if let Some(found) = candidates.iter().find(|c| c.table == table_ref.table) {
            return (*found).clone();
        }
    }
    (*candidates[0]).clone()
}
