//! Scope Builder (C5): from a `SELECT`/`UNION` AST, produces a `Scope`
//! listing visible tables (with aliases) and pre-registered columns.

use crate::config::{AmbiguityPolicy, AnalysisConfig};
use crate::error::LineageError;
use crate::model::{ColumnRef, TableRef};
use crate::registry::TableRegistry;
use crate::schema::SchemaProvider;
use crate::warning::WarningCollector;
use indexmap::IndexMap;
use sqlparser::ast::{ObjectName, Select, SetExpr, TableFactor, TableWithJoins};

/// The set of tables and columns visible to a query body during analysis.
///
/// Lives only for the duration of the SELECT/CTE body that built it. Parent
/// links support correlated subqueries (spec.md §4.9): a child scope reads
/// through to its parent on a lookup miss but never mutates it.
pub struct Scope<'p> {
    /// Keyed by lowercased alias-or-real-name; each table is additionally
    /// registered under its real name if an alias is also present.
    tables: IndexMap<String, TableRef>,
    /// column_name (lowercased) -> candidate refs, in FROM-clause order.
    columns: IndexMap<String, Vec<ColumnRef>>,
    parent: Option<&'p Scope<'p>>,
}

impl<'p> Scope<'p> {
    pub fn root() -> Self {
        Self {
            tables: IndexMap::new(),
            columns: IndexMap::new(),
            parent: None,
        }
    }

    pub fn with_parent(parent: &'p Scope<'p>) -> Self {
        Self {
            tables: IndexMap::new(),
            columns: IndexMap::new(),
            parent: Some(parent),
        }
    }

    pub fn parent(&self) -> Option<&'p Scope<'p>> {
        self.parent
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableRef> {
        // tables is keyed by both real name and alias for the same table
        // when both exist; de-duplicate by identity using effective_name.
        let mut seen = std::collections::HashSet::new();
        self.tables.values().filter(move |t| seen.insert(t.effective_name().to_lowercase()))
    }

    pub fn lookup_table(&self, qualifier: &str) -> Option<&TableRef> {
        let key = qualifier.trim().to_lowercase();
        self.tables
            .get(&key)
            .or_else(|| self.parent.and_then(|p| p.lookup_table(qualifier)))
    }

    pub fn columns_named(&self, column: &str) -> Vec<&ColumnRef> {
        self.columns
            .get(&column.to_lowercase())
            .map(|v| v.iter().collect())
            .unwrap_or_default()
    }

    /// All pre-registered (column name -> candidate refs) entries, in
    /// FROM-clause order. Empty when no in-scope table had known columns
    /// (no registry entry, no schema provider).
    pub fn columns(&self) -> impl Iterator<Item = (&String, &Vec<ColumnRef>)> {
        self.columns.iter()
    }

    fn insert_table(
        &mut self,
        table_ref: TableRef,
        policy: AmbiguityPolicy,
        warnings: &mut WarningCollector,
    ) -> Result<(), LineageError> {
        let mut keys = Vec::with_capacity(2);
        keys.push(table_ref.effective_name().to_lowercase());
        if table_ref.alias.is_some() {
            let real = table_ref.table.to_lowercase();
            if real != keys[0] {
                keys.push(real);
            }
        }

        for key in &keys {
            if self.tables.contains_key(key) {
                match policy {
                    AmbiguityPolicy::Fail => {
                        return Err(LineageError::unresolved_reference(
                            key.clone(),
                            format!("duplicate table alias '{key}' in scope"),
                        ));
                    }
                    AmbiguityPolicy::Warn => {
                        warnings.warn(format!("duplicate table alias '{key}' in scope; keeping first"));
                        return Ok(());
                    }
                    AmbiguityPolicy::Ignore => return Ok(()),
                }
            }
        }

        for key in keys {
            self.tables.insert(key, table_ref.clone());
        }
        Ok(())
    }

    fn register_columns_for(&mut self, table_ref: &TableRef, columns: Vec<String>) {
        for column in columns {
            let col_ref = ColumnRef::new(table_ref.table.clone(), column.clone());
            let col_ref = if let Some(alias) = &table_ref.alias {
                col_ref.with_alias(alias.clone())
            } else {
                col_ref
            };
            self.columns
                .entry(column.to_lowercase())
                .or_default()
                .push(col_ref);
        }
    }
}

/// Signature used to recurse into a FROM-clause subquery: the Subquery
/// Analyzer (spec.md §4.9) registers it as a `Subquery`-kind table and
/// returns the `TableRef` pointing at its alias. Threaded as a callback so
/// `scope.rs` does not need to depend on `dependency.rs` directly (avoids a
/// module cycle between Scope Builder and Dependency Extractor, which call
/// into each other for derived tables).
pub trait DerivedTableAnalyzer {
    fn analyze_derived_table(
        &mut self,
        query: &sqlparser::ast::Query,
        alias: &str,
        registry: &mut TableRegistry,
        schema: Option<&dyn SchemaProvider>,
        config: &AnalysisConfig,
        warnings: &mut WarningCollector,
    ) -> Result<(), LineageError>;
}

pub struct ScopeBuilder<'a> {
    pub registry: &'a mut TableRegistry,
    pub schema: Option<&'a dyn SchemaProvider>,
    pub config: &'a AnalysisConfig,
}

impl<'a> ScopeBuilder<'a> {
    pub fn new(
        registry: &'a mut TableRegistry,
        schema: Option<&'a dyn SchemaProvider>,
        config: &'a AnalysisConfig,
    ) -> Self {
        Self {
            registry,
            schema,
            config,
        }
    }

    /// Builds a scope for a `Select`, handling each FROM item and JOIN.
    /// `derived: &mut impl DerivedTableAnalyzer` analyzes FROM-clause
    /// subqueries as derived tables before they are registered into scope.
    pub fn build_select_scope<'p>(
        &mut self,
        select: &Select,
        parent: Option<&'p Scope<'p>>,
        derived: &mut dyn DerivedTableAnalyzer,
        warnings: &mut WarningCollector,
    ) -> Result<Scope<'p>, LineageError> {
        let mut scope = match parent {
            Some(p) => Scope::with_parent(p),
            None => Scope::root(),
        };

        for twj in &select.from {
            self.add_table_with_joins(&mut scope, twj, derived, warnings)?;
        }

        Ok(scope)
    }

    fn add_table_with_joins(
        &mut self,
        scope: &mut Scope<'_>,
        twj: &TableWithJoins,
        derived: &mut dyn DerivedTableAnalyzer,
        warnings: &mut WarningCollector,
    ) -> Result<(), LineageError> {
        self.add_table_factor(scope, &twj.relation, derived, warnings)?;
        for join in &twj.joins {
            self.add_table_factor(scope, &join.relation, derived, warnings)?;
        }
        Ok(())
    }

    fn add_table_factor(
        &mut self,
        scope: &mut Scope<'_>,
        factor: &TableFactor,
        derived: &mut dyn DerivedTableAnalyzer,
        warnings: &mut WarningCollector,
    ) -> Result<(), LineageError> {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let table_ref = object_name_to_table_ref(name, alias);
                self.auto_register_source_table(&table_ref);
                self.register_columns_from_known_sources(scope, &table_ref);
                scope.insert_table(table_ref, self.config.ambiguity_policy, warnings)?;
                Ok(())
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                let alias = alias
                    .as_ref()
                    .ok_or_else(|| {
                        LineageError::unresolved_reference(
                            "<derived table>",
                            "a FROM-clause subquery must have an alias",
                        )
                    })?
                    .name
                    .value
                    .clone();

                derived.analyze_derived_table(
                    subquery,
                    &alias,
                    self.registry,
                    self.schema,
                    self.config,
                    warnings,
                )?;

                let mut table_ref = TableRef::new(alias.clone());
                table_ref.alias = Some(alias);
                table_ref.is_subquery = true;
                self.register_columns_from_known_sources(scope, &table_ref);
                scope.insert_table(table_ref, self.config.ambiguity_policy, warnings)?;
                Ok(())
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.add_table_with_joins(scope, table_with_joins, derived, warnings),
            // Table functions, UNNEST, etc. carry no resolvable lineage.
            _ => Ok(()),
        }
    }

    /// Auto-registers a referenced-but-unknown table as an `External` source
    /// (spec.md §4.10 step 3), consulting the Schema Provider for its
    /// columns. A no-op if the table (under any kind) is already known --
    /// `register_source_table` is itself idempotent, but checking first
    /// avoids a wasted Schema Provider lookup for tables the Registry or a
    /// prior statement already knows about (CTEs, earlier `CREATE`s).
    fn auto_register_source_table(&mut self, table_ref: &TableRef) {
        if self.registry.has_table(&table_ref.table) {
            return;
        }
        let columns = self
            .schema
            .map(|schema| schema.columns_of(&table_ref.table))
            .unwrap_or_default();
        self.registry.register_source_table(&table_ref.table, columns);
    }

    fn register_columns_from_known_sources(&self, scope: &mut Scope<'_>, table_ref: &TableRef) {
        let columns = if let Some(table_def) = self.registry.get_table(&table_ref.table) {
            table_def.column_names().into_iter().map(String::from).collect()
        } else if let Some(schema) = self.schema {
            schema.columns_of(&table_ref.table)
        } else {
            Vec::new()
        };
        scope.register_columns_for(table_ref, columns);
    }
}

pub fn object_name_to_table_ref(
    name: &ObjectName,
    alias: &Option<sqlparser::ast::TableAlias>,
) -> TableRef {
    let parts: Vec<String> = name.0.iter().map(|p| p.to_string()).collect();
    let (database, schema, table) = match parts.len() {
        0 => (None, None, String::new()),
        1 => (None, None, parts[0].clone()),
        2 => (None, Some(parts[0].clone()), parts[1].clone()),
        _ => (
            Some(parts[parts.len() - 3].clone()),
            Some(parts[parts.len() - 2].clone()),
            parts[parts.len() - 1].clone(),
        ),
    };
    let mut table_ref = TableRef::new(table);
    table_ref.database = database;
    table_ref.schema = schema;
    table_ref.alias = alias.as_ref().map(|a| a.name.value.clone());
    table_ref
}

/// Flattens a `SetExpr` into its leaf `Select`s (for UNION branch handling),
/// recursing through nested `SetExpr::Query`/`SetExpr::SetOperation` nodes.
pub fn flatten_set_expr(body: &SetExpr, out: &mut Vec<Select>) {
    match body {
        SetExpr::Select(select) => out.push((**select).clone()),
        SetExpr::Query(query) => flatten_set_expr(&query.body, out),
        SetExpr::SetOperation { left, right, .. } => {
            flatten_set_expr(left, out);
            flatten_set_expr(right, out);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
        ) -> Result<(), LineageError> {
            Ok(())
        }
    }

    fn parse_select(sql: &str) -> Select {
        use sqlparser::dialect::GenericDialect;
        use sqlparser::parser::Parser;
        let stmts = Parser::parse_sql(&GenericDialect {}, sql).unwrap();
        match &stmts[0] {
            sqlparser::ast::Statement::Query(q) => match &*q.body {
                SetExpr::Select(s) => (**s).clone(),
                _ => panic!("expected select"),
            },
            _ => panic!("expected query"),
        }
    }

    #[test]
    fn single_table_scope_registers_alias_and_real_name() {
        let select = parse_select("SELECT * FROM orders o");
        let mut registry = TableRegistry::new();
        let config = AnalysisConfig::default();
        let mut builder = ScopeBuilder::new(&mut registry, None, &config);
        let mut warnings = WarningCollector::new();
        let mut noop = NoopDerived;
        let scope = builder
            .build_select_scope(&select, None, &mut noop, &mut warnings)
            .unwrap();
        assert!(scope.lookup_table("o").is_some());
        assert!(scope.lookup_table("orders").is_some());
    }

    #[test]
    fn join_adds_both_tables() {
        let select = parse_select(
            "SELECT * FROM orders o JOIN customers c ON o.customer_id = c.id",
        );
        let mut registry = TableRegistry::new();
        let config = AnalysisConfig::default();
        let mut builder = ScopeBuilder::new(&mut registry, None, &config);
        let mut warnings = WarningCollector::new();
        let mut noop = NoopDerived;
        let scope = builder
            .build_select_scope(&select, None, &mut noop, &mut warnings)
            .unwrap();
        assert!(scope.lookup_table("o").is_some());
        assert!(scope.lookup_table("c").is_some());
    }

    #[test]
    fn derived_table_without_alias_fails() {
        let select = parse_select("SELECT * FROM (SELECT 1 AS x)");
        let mut registry = TableRegistry::new();
        let config = AnalysisConfig::default();
        let mut builder = ScopeBuilder::new(&mut registry, None, &config);
        let mut warnings = WarningCollector::new();
        let mut noop = NoopDerived;
        let result = builder.build_select_scope(&select, None, &mut noop, &mut warnings);
        assert!(result.is_err());
    }
}
