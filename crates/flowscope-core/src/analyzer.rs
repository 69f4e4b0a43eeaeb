//! Per-Statement Analyzers (C10) and the `ScriptAnalyzer` orchestrator
//! (C11): the top-level entry point that turns a script's text into a
//! completed `TableRegistry` plus one result per statement.

use crate::config::AnalysisConfig;
use crate::cte::CteExtractor;
use crate::dependency::{group_into_lineages, DependencyExtractor};
use crate::error::LineageError;
use crate::model::{ColumnRef, TableDefinition, TableType};
use crate::registry::TableRegistry;
use crate::schema::SchemaProvider;
use crate::splitter::split_statements;
use crate::statement::{classify, ClassifiedStatement, StatementKind};
use crate::transitive::TransitiveResolver;
use crate::warning::WarningCollector;
use sqlparser::ast::Query;
use std::collections::{HashMap, HashSet};
#[cfg(feature = "tracing")]
use tracing::{info, info_span};

/// Extracts and registers any CTEs attached to `query`'s `WITH` clause,
/// wherever in the statement's AST that clause lives -- in `sqlparser`,
/// always on the `Query` node itself, whether that node came from a bare
/// `CREATE ... AS`, an `INSERT ... SELECT`, or a standalone query (spec.md
/// §4.10 step 2).
fn extract_ctes(
    query: &Query,
    schema: Option<&dyn SchemaProvider>,
    config: &AnalysisConfig,
    registry: &mut TableRegistry,
    warnings: &mut WarningCollector,
) -> Vec<String> {
    match &query.with {
        Some(with) => CteExtractor::new(schema, config).extract_and_register(with, registry, warnings),
        None => Vec::new(),
    }
}

/// CTE lineage expansion (spec.md §4.10 step 7): before the just-registered
/// CTEs are removed, every other table's columns are walked and any source
/// pointing at a CTE is replaced with that CTE column's own sources,
/// iterated to a fixed point so chained CTEs (`b` reading from `a`) resolve
/// all the way down. Runs (and removes the CTEs) unconditionally, even when
/// the statement that produced them failed (step 8).
fn expand_and_cleanup_ctes(registry: &mut TableRegistry, cte_names: &[String]) {
    if cte_names.is_empty() {
        return;
    }

    let cte_key_set: HashSet<String> = cte_names.iter().map(|n| n.trim().to_lowercase()).collect();

    loop {
        let mut cte_columns: HashMap<(String, String), Vec<ColumnRef>> = HashMap::new();
        for name in cte_names {
            if let Some(def) = registry.get_table(name) {
                for (col_name, lineage) in def.columns.iter() {
                    cte_columns.insert(
                        (name.trim().to_lowercase(), col_name.trim().to_lowercase()),
                        lineage.sources.clone(),
                    );
                }
            }
        }

        let target_names: Vec<String> = registry
            .all_tables()
            .filter(|t| t.table_type != TableType::Cte)
            .map(|t| t.name.clone())
            .collect();

        let mut changed = false;
        for name in target_names {
            let Some(table) = registry.get_table_mut(&name) else {
                continue;
            };
            for lineage in table.columns.values_mut() {
                if !lineage
                    .sources
                    .iter()
                    .any(|s| cte_key_set.contains(&s.table.trim().to_lowercase()))
                {
                    continue;
                }

                let mut new_sources: Vec<ColumnRef> = Vec::new();
                for source in &lineage.sources {
                    let source_key = source.table.trim().to_lowercase();
                    if cte_key_set.contains(&source_key) {
                        if let Some(replacement) =
                            cte_columns.get(&(source_key, source.column.trim().to_lowercase()))
                        {
                            for r in replacement {
                                if !new_sources.iter().any(|existing| existing.qualified_name() == r.qualified_name()) {
                                    new_sources.push(r.clone());
                                }
                            }
                        }
                        // Source points at a CTE column this pass couldn't
                        // resolve (e.g. a dropped recursive self-reference);
                        // drop it rather than leave a dangling CTE pointer.
                    } else if !new_sources.iter().any(|existing| existing.qualified_name() == source.qualified_name()) {
                        new_sources.push(source.clone());
                    }
                }
                lineage.sources = new_sources;
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    for name in cte_names {
        registry.remove_table(name);
    }
}

/// Outcome of analyzing one statement within a script.
#[derive(Debug, Clone)]
pub struct StatementResult {
    pub index: usize,
    pub kind: StatementKind,
    pub target_table: Option<String>,
    pub success: bool,
    pub error: Option<LineageError>,
    /// Set for statements the orchestrator deliberately did not run an
    /// analyzer over (unsupported statement kinds, plain `SELECT`s that
    /// materialize nothing) -- still `success: true`, since skipping is not
    /// a failure.
    pub note: Option<String>,
}

impl StatementResult {
    fn skipped(statement: &ClassifiedStatement, note: impl Into<String>) -> Self {
        Self {
            index: statement.index,
            kind: statement.kind,
            target_table: statement.target_table.clone(),
            success: true,
            error: None,
            note: Some(note.into()),
        }
    }

    fn ok(statement: &ClassifiedStatement, target_table: Option<String>) -> Self {
        Self {
            index: statement.index,
            kind: statement.kind,
            target_table,
            success: true,
            error: None,
            note: None,
        }
    }

    fn failed(statement: &ClassifiedStatement, error: LineageError) -> Self {
        Self {
            index: statement.index,
            kind: statement.kind,
            target_table: statement.target_table.clone(),
            success: false,
            error: Some(error),
            note: None,
        }
    }
}

/// The fully analyzed script: the completed Registry, the classified
/// statements, one result per statement, the config they ran under, and the
/// accumulated warnings (spec.md §4.15).
#[derive(Debug)]
pub struct ScriptResult {
    pub registry: TableRegistry,
    pub statements: Vec<ClassifiedStatement>,
    pub statement_results: Vec<StatementResult>,
    pub config: AnalysisConfig,
    pub warnings: WarningCollector,
}

impl ScriptResult {
    /// A `TransitiveResolver` over this result's Registry, built fresh per
    /// call since it only borrows -- cheap, and avoids keeping one alive
    /// across mutation that never happens post-analysis anyway.
    pub fn resolver(&self) -> TransitiveResolver<'_> {
        TransitiveResolver::new(&self.registry, self.config.max_trace_depth)
    }

    pub fn has_errors(&self) -> bool {
        self.statement_results.iter().any(|r| !r.success)
    }
}

/// Top-level driver (C11): split, classify, dispatch, and assemble a
/// `ScriptResult`. One `ScriptAnalyzer` run corresponds to one script.
pub struct ScriptAnalyzer<'a> {
    pub schema: Option<&'a dyn SchemaProvider>,
    pub config: AnalysisConfig,
}

impl<'a> ScriptAnalyzer<'a> {
    pub fn new(schema: Option<&'a dyn SchemaProvider>, config: AnalysisConfig) -> Self {
        Self { schema, config }
    }

    pub fn analyze(&self, script: &str) -> Result<ScriptResult, LineageError> {
        let pairs = split_statements(script)?;
        #[cfg(feature = "tracing")]
        let _span = info_span!("analyze_script", statement_count = pairs.len()).entered();

        let mut registry = TableRegistry::new();
        let mut warnings = WarningCollector::new();
        let mut statements = Vec::with_capacity(pairs.len());
        let mut statement_results = Vec::with_capacity(pairs.len());

        for (index, (stmt, raw_sql)) in pairs.iter().enumerate() {
            let classified = classify(stmt, raw_sql, index);
            let result = self.dispatch(&classified, &mut registry, &mut warnings);
            #[cfg(feature = "tracing")]
            if !result.success {
                info!(index, kind = ?result.kind, "statement failed analysis");
            }
            registry.increment_statement_counter();
            statement_results.push(result);
            statements.push(classified);
        }

        Ok(ScriptResult {
            registry,
            statements,
            statement_results,
            config: self.config.clone(),
            warnings,
        })
    }

    /// Dispatches one classified statement to its analyzer. Catches every
    /// analyzer error and folds it into a `{success: false, error}` result
    /// rather than propagating, so one bad statement never aborts the rest
    /// of the script (spec.md §4.15, §7).
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, statement, registry, warnings), fields(index = statement.index, kind = ?statement.kind)))]
    fn dispatch(
        &self,
        statement: &ClassifiedStatement,
        registry: &mut TableRegistry,
        warnings: &mut WarningCollector,
    ) -> StatementResult {
        if !statement.kind.is_supported() {
            let reason = statement
                .metadata
                .get("reason")
                .cloned()
                .unwrap_or_else(|| "statement kind is not analyzed for lineage".to_string());
            return StatementResult::skipped(statement, reason);
        }

        if matches!(statement.kind, StatementKind::Select) {
            return StatementResult::skipped(statement, "plain SELECT produces no materialized table");
        }

        let outcome = match statement.kind {
            StatementKind::CreateTableAs | StatementKind::CreateTempTable | StatementKind::CreateView => {
                self.analyze_create(statement, registry, warnings)
            }
            StatementKind::InsertIntoSelect => self.analyze_insert(statement, registry, warnings),
            StatementKind::WithCte => self.analyze_with_cte(statement, registry, warnings),
            _ => unreachable!("is_supported() kinds are exhaustively handled above"),
        };

        match outcome {
            Ok(target_table) => StatementResult::ok(statement, target_table),
            Err(err) => StatementResult::failed(statement, err),
        }
    }

    fn analyze_create(
        &self,
        statement: &ClassifiedStatement,
        registry: &mut TableRegistry,
        warnings: &mut WarningCollector,
    ) -> Result<Option<String>, LineageError> {
        let query = statement.query_ast.as_ref().ok_or_else(|| {
            LineageError::incorrect_statement_type("query-bearing CREATE", "CREATE without a query body")
        })?;
        let target = statement
            .target_table
            .clone()
            .ok_or_else(|| LineageError::incorrect_statement_type("named CREATE target", "anonymous"))?;

        let cte_names = extract_ctes(query, self.schema, &self.config, registry, warnings);
        let outcome = self.do_create(query, &target, statement, registry, warnings);
        expand_and_cleanup_ctes(registry, &cte_names);
        outcome.map(|_| Some(target))
    }

    fn do_create(
        &self,
        query: &Query,
        target: &str,
        statement: &ClassifiedStatement,
        registry: &mut TableRegistry,
        warnings: &mut WarningCollector,
    ) -> Result<(), LineageError> {
        let extractor = DependencyExtractor::new(self.schema, &self.config);
        let deps = extractor.extract_query(query, None, registry, warnings)?;
        let lineages = group_into_lineages(deps);

        let table_type = match statement.kind {
            StatementKind::CreateView => TableType::View,
            StatementKind::CreateTempTable => TableType::TempTable,
            _ => TableType::Table,
        };

        let mut table_def =
            TableDefinition::new(target.to_string(), table_type).with_created_by_sql(statement.raw_sql.clone());
        for lineage in lineages {
            table_def.add_column(lineage);
        }
        registry.register_table(table_def, warnings)
    }

    fn analyze_insert(
        &self,
        statement: &ClassifiedStatement,
        registry: &mut TableRegistry,
        warnings: &mut WarningCollector,
    ) -> Result<Option<String>, LineageError> {
        let query = statement
            .query_ast
            .as_ref()
            .ok_or_else(|| LineageError::incorrect_statement_type("INSERT ... SELECT", "INSERT without a query source"))?;
        let target = statement
            .target_table
            .clone()
            .ok_or_else(|| LineageError::incorrect_statement_type("named INSERT target", "anonymous"))?;

        let cte_names = extract_ctes(query, self.schema, &self.config, registry, warnings);
        let outcome = self.do_insert(query, &target, statement, registry, warnings);
        expand_and_cleanup_ctes(registry, &cte_names);
        outcome.map(|_| Some(target))
    }

    fn do_insert(
        &self,
        query: &Query,
        target: &str,
        statement: &ClassifiedStatement,
        registry: &mut TableRegistry,
        warnings: &mut WarningCollector,
    ) -> Result<(), LineageError> {
        if !registry.has_table(target) {
            return Err(LineageError::target_missing(target));
        }

        let extractor = DependencyExtractor::new(self.schema, &self.config);
        let deps = extractor.extract_query(query, None, registry, warnings)?;
        let mut lineages = group_into_lineages(deps);

        let target_columns: Vec<String> = registry
            .get_table(target)
            .map(|t| t.column_names().into_iter().map(String::from).collect())
            .unwrap_or_default();

        if !statement.insert_columns.is_empty() {
            if statement.insert_columns.len() != lineages.len() {
                return Err(LineageError::column_count_mismatch(
                    statement.insert_columns.len(),
                    lineages.len(),
                ));
            }
            for (name, lineage) in statement.insert_columns.iter().zip(lineages.iter_mut()) {
                if !target_columns.iter().any(|c| c.eq_ignore_ascii_case(name)) {
                    return Err(LineageError::unresolved_reference(
                        name.clone(),
                        format!("column '{name}' does not exist on target table '{target}'"),
                    ));
                }
                lineage.name = name.clone();
            }
        } else if !target_columns.is_empty() {
            if target_columns.len() != lineages.len() {
                return Err(LineageError::column_count_mismatch(target_columns.len(), lineages.len()));
            }
            for (name, lineage) in target_columns.iter().zip(lineages.iter_mut()) {
                lineage.name = name.clone();
            }
        }

        registry.update_columns(target, lineages)
    }

    /// Standalone `WITH ... SELECT`: registers the CTEs so their analysis
    /// and any warnings it raises happen, then discards them -- the final
    /// SELECT materializes no table of its own (spec.md §4.10).
    fn analyze_with_cte(
        &self,
        statement: &ClassifiedStatement,
        registry: &mut TableRegistry,
        warnings: &mut WarningCollector,
    ) -> Result<Option<String>, LineageError> {
        let query = statement.query_ast.as_ref().ok_or_else(|| {
            LineageError::incorrect_statement_type("WITH ... SELECT", "WITH-clause statement without a query body")
        })?;
        let with = query
            .with
            .as_ref()
            .ok_or_else(|| LineageError::incorrect_statement_type("WITH clause", "query without a WITH clause"))?;

        let registered = CteExtractor::new(self.schema, &self.config).extract_and_register(with, registry, warnings);
        for name in &registered {
            registry.remove_table(name);
        }
        Ok(None)
    }
}
