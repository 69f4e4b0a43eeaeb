//! Column-level SQL lineage analysis.
//!
//! Feeds a SQL script to a [`ScriptAnalyzer`] and gets back a [`ScriptResult`]
//! carrying a completed [`TableRegistry`] (every derived table's columns,
//! each pointing at the columns it was computed from) plus one
//! [`StatementResult`] per statement in source order. From there,
//! [`ScriptResult::resolver`] answers "where did this value come from"
//! (`trace_to_source`) and "what does this affect" (`find_impact`) without
//! re-parsing anything.
//!
//! ```no_run
//! use flowscope_core::{AnalysisConfig, ScriptAnalyzer};
//!
//! let analyzer = ScriptAnalyzer::new(None, AnalysisConfig::default());
//! let result = analyzer
//!     .analyze("CREATE TABLE totals AS SELECT id, amount FROM orders")
//!     .expect("script splits and parses");
//! for path in result.resolver().trace_to_source("totals", "amount") {
//!     println!("{} hops", path.hops());
//! }
//! ```

mod analyzer;
mod complexity;
mod config;
mod cte;
mod dependency;
mod error;
mod expression;
mod model;
mod registry;
mod resolver;
mod schema;
mod scope;
mod splitter;
mod statement;
mod transitive;
mod warning;

pub use analyzer::{ScriptAnalyzer, ScriptResult, StatementResult};
pub use config::{AmbiguityPolicy, AnalysisConfig, ComplexityLimits, ComplexityPolicy};
pub use error::{Context, LineageError};
pub use model::{
    AggregateFunction, ColumnDependency, ColumnLineage, ColumnRef, ExpressionKind, RefKind,
    TableDefinition, TableRef, TableType, CONSTANT_TABLE, OUTPUT_TABLE,
};
pub use registry::TableRegistry;
pub use schema::{DictSchemaProvider, SchemaProvider};
pub use splitter::split_statements;
pub use statement::{classify, ClassifiedStatement, StatementKind};
pub use transitive::{LineageNode, LineagePath, TransitiveResolver};
pub use warning::{Warning, WarningCollector, WarningLevel};
