//! CLI argument parsing using clap.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// flowscope - column-level SQL lineage analyzer
#[derive(Parser, Debug)]
#[command(name = "flowscope")]
#[command(about = "Analyze a SQL script for column-level lineage", long_about = None)]
#[command(version)]
pub struct Args {
    /// Path to the SQL script to analyze
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    /// JSON file mapping table name -> array of column names, used to
    /// resolve references to tables the script itself never creates
    #[arg(long, value_name = "FILE")]
    pub schema: Option<PathBuf>,

    /// Print every upstream path to TABLE.COLUMN's ultimate sources
    #[arg(long, value_name = "TABLE.COLUMN")]
    pub trace: Option<String>,

    /// Print every column downstream of TABLE.COLUMN, grouped by table
    #[arg(long, value_name = "TABLE.COLUMN")]
    pub impact: Option<String>,

    /// Print an indented, human-readable derivation of TABLE.COLUMN
    #[arg(long, value_name = "TABLE.COLUMN")]
    pub explain: Option<String>,

    /// List source and derived tables with their column counts
    #[arg(long)]
    pub list_tables: bool,

    /// Write the full table registry as JSON to FILE
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Output format for the default analysis report. Defaults to `pretty`,
    /// or to `json` when `--export` is given without an explicit `--format`.
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Treat ambiguous column references as fatal errors
    #[arg(long)]
    pub strict: bool,

    /// Suppress warning output
    #[arg(long)]
    pub no_warnings: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Override the default depth bound for trace/impact traversal
    #[arg(long, value_name = "INT")]
    pub max_depth: Option<usize>,
}

/// Output format for the default (no `--trace`/`--impact`/`--explain`/
/// `--list-tables`) analysis report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable block listing tables, columns, and sources
    Pretty,
    /// The full registry, as the `--export` JSON shape
    Json,
    /// A `tabled`-rendered table of columns and their direct sources
    Table,
    /// The `{tables, lineage}` JSON graph shape (spec.md §6)
    Graph,
}

impl Args {
    /// Resolves the effective output format: the explicit `--format`, else
    /// `json` when `--export` was given (quickstart convenience noted in
    /// SPEC_FULL.md §2), else `pretty`.
    pub fn resolved_format(&self) -> OutputFormat {
        self.format.unwrap_or(if self.export.is_some() {
            OutputFormat::Json
        } else {
            OutputFormat::Pretty
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_invocation() {
        let args = Args::parse_from(["flowscope", "script.sql"]);
        assert_eq!(args.script, PathBuf::from("script.sql"));
        assert_eq!(args.resolved_format(), OutputFormat::Pretty);
        assert!(!args.strict);
        assert!(args.trace.is_none());
    }

    #[test]
    fn parses_targeted_flags() {
        let args = Args::parse_from([
            "flowscope",
            "script.sql",
            "--schema",
            "schema.json",
            "--trace",
            "orders.amount",
            "--strict",
            "--no-warnings",
            "--no-color",
            "--max-depth",
            "10",
            "--format",
            "json",
        ]);
        assert_eq!(args.schema.unwrap(), PathBuf::from("schema.json"));
        assert_eq!(args.trace.as_deref(), Some("orders.amount"));
        assert!(args.strict);
        assert!(args.no_warnings);
        assert!(args.no_color);
        assert_eq!(args.max_depth, Some(10));
        assert_eq!(args.resolved_format(), OutputFormat::Json);
    }

    #[test]
    fn parses_list_tables_and_export() {
        let args = Args::parse_from(["flowscope", "script.sql", "--list-tables", "--export", "out.json"]);
        assert!(args.list_tables);
        assert_eq!(args.export.unwrap(), PathBuf::from("out.json"));
    }

    #[test]
    fn export_without_explicit_format_defaults_to_json() {
        let args = Args::parse_from(["flowscope", "script.sql", "--export", "out.json"]);
        assert_eq!(args.resolved_format(), OutputFormat::Json);
    }

    #[test]
    fn explicit_format_overrides_export_default() {
        let args = Args::parse_from([
            "flowscope", "script.sql", "--export", "out.json", "--format", "table",
        ]);
        assert_eq!(args.resolved_format(), OutputFormat::Table);
    }
}
