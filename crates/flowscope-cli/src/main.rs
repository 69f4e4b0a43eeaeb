//! FlowScope CLI: column-level SQL lineage analyzer (spec.md §6).

mod cli;
mod input;
mod output;
mod schema;

use anyhow::{Context, Result};
use clap::Parser;
use flowscope_core::{AnalysisConfig, ScriptAnalyzer, TableRegistry, Warning, WarningLevel};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use std::io::{self, Write};
use std::process::ExitCode;

use cli::{Args, OutputFormat};

/// Exit codes distinguish "nothing ran" (bad input) from "ran, but the
/// script itself had lineage errors" (spec.md §6, §7).
const EXIT_SUCCESS: u8 = 0;
const EXIT_STATEMENT_ERRORS: u8 = 1;
const EXIT_SCRIPT_FILE_NOT_FOUND: u8 = 2;
const EXIT_SCHEMA_FILE_NOT_FOUND: u8 = 3;
const EXIT_CORE_ERROR: u8 = 4;

fn main() -> ExitCode {
    let args = Args::parse();

    let script = match input::read_script(&args.script) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("flowscope: error: {err:#}");
            return ExitCode::from(EXIT_SCRIPT_FILE_NOT_FOUND);
        }
    };

    let schema_provider = match &args.schema {
        Some(path) => match schema::load_schema(path) {
            Ok(provider) => Some(provider),
            Err(err) => {
                eprintln!("flowscope: error: {err:#}");
                return ExitCode::from(EXIT_SCHEMA_FILE_NOT_FOUND);
            }
        },
        None => None,
    };

    match run(&args, &script, schema_provider.as_ref()) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("flowscope: error: {err:#}");
            ExitCode::from(EXIT_CORE_ERROR)
        }
    }
}

fn run(
    args: &Args,
    script: &str,
    schema_provider: Option<&flowscope_core::DictSchemaProvider>,
) -> Result<u8> {
    let mut config = if args.strict {
        AnalysisConfig::strict()
    } else {
        AnalysisConfig::default()
    };
    if let Some(max_depth) = args.max_depth {
        config.max_trace_depth = max_depth;
    }
    let max_depth = config.max_trace_depth;

    let analyzer = ScriptAnalyzer::new(
        schema_provider.map(|p| p as &dyn flowscope_core::SchemaProvider),
        config,
    );

    let result = analyzer
        .analyze(script)
        .map_err(|err| anyhow::anyhow!("{err}"))?;

    let colored = !args.no_color && io::stdout().is_terminal();
    if !args.no_warnings {
        print_warnings(result.warnings.as_slice(), colored);
    }

    if let Some(target) = &args.export {
        let value = output::export_graph(&result.registry);
        let text = serde_json::to_string_pretty(&value).context("failed to serialize export")?;
        std::fs::write(target, text)
            .with_context(|| format!("failed to write export file: {}", target.display()))?;
    }

    if let Some(spec) = &args.trace {
        print_trace(&result.registry, spec, max_depth)?;
    } else if let Some(spec) = &args.impact {
        print_impact(&result.registry, spec, max_depth)?;
    } else if let Some(spec) = &args.explain {
        print_explain(&result.registry, spec, max_depth)?;
    } else if args.list_tables {
        print_list_tables(&result.registry);
    } else {
        print_default_report(&result.registry, args, colored)?;
    }

    if result.has_errors() {
        Ok(EXIT_STATEMENT_ERRORS)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

fn split_table_column(spec: &str) -> Result<(&str, &str)> {
    spec.rsplit_once('.')
        .ok_or_else(|| anyhow::anyhow!("expected TABLE.COLUMN, got '{spec}'"))
}

fn print_trace(registry: &TableRegistry, spec: &str, max_depth: usize) -> Result<()> {
    let (table, column) = split_table_column(spec)?;
    let resolver = flowscope_core::TransitiveResolver::new(registry, max_depth);
    let paths = resolver.trace_to_source(table, column);
    if paths.is_empty() {
        println!("{table}.{column}: no lineage information available");
        return Ok(());
    }
    for (i, path) in paths.iter().enumerate() {
        let chain: Vec<String> = path.nodes.iter().map(|n| n.column.qualified_name()).collect();
        println!("path {} ({} hop(s)): {}", i + 1, path.hops(), chain.join(" -> "));
    }
    Ok(())
}

fn print_impact(registry: &TableRegistry, spec: &str, max_depth: usize) -> Result<()> {
    let (table, column) = split_table_column(spec)?;
    let resolver = flowscope_core::TransitiveResolver::new(registry, max_depth);
    let impacted = resolver.find_impact(table, column);
    if impacted.is_empty() {
        println!("{table}.{column}: no downstream columns");
        return Ok(());
    }

    let mut by_table: std::collections::BTreeMap<String, Vec<String>> = std::collections::BTreeMap::new();
    for col in impacted {
        by_table.entry(col.table.clone()).or_default().push(col.column.clone());
    }
    for (table_name, mut columns) in by_table {
        columns.sort();
        println!("{table_name}: {}", columns.join(", "));
    }
    Ok(())
}

fn print_explain(registry: &TableRegistry, spec: &str, max_depth: usize) -> Result<()> {
    let (table, column) = split_table_column(spec)?;
    let resolver = flowscope_core::TransitiveResolver::new(registry, max_depth);
    println!("{}", resolver.explain_calculation(table, column));
    Ok(())
}

fn print_list_tables(registry: &TableRegistry) {
    let mut sources = registry.source_tables();
    sources.sort_by(|a, b| a.name.cmp(&b.name));
    let mut derived = registry.derived_tables();
    derived.sort_by(|a, b| a.name.cmp(&b.name));

    println!("Source tables ({}):", sources.len());
    for table in sources {
        println!("  {} ({} column(s))", table.name, table.columns.len());
    }
    println!("Derived tables ({}):", derived.len());
    for table in derived {
        println!(
            "  {} ({} column(s)) [{}]",
            table.name,
            table.columns.len(),
            table.table_type.as_export_str()
        );
    }
}

fn print_default_report(registry: &TableRegistry, args: &Args, colored: bool) -> Result<()> {
    let text = match args.resolved_format() {
        OutputFormat::Pretty => output::format_pretty(registry, colored),
        OutputFormat::Json => output::json::format_json(registry, false),
        OutputFormat::Table => output::format_table(registry),
        OutputFormat::Graph => serde_json::to_string_pretty(&output::export_graph(registry))
            .context("failed to serialize graph")?,
    };
    write_stdout(&text)
}

fn write_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(text.as_bytes()).context("failed to write to stdout")?;
    if !text.ends_with('\n') {
        writeln!(stdout).ok();
    }
    Ok(())
}

fn print_warnings(warnings: &[Warning], colored: bool) {
    for warning in warnings {
        let label = match warning.level {
            WarningLevel::Error => {
                if colored {
                    "ERROR".red().to_string()
                } else {
                    "ERROR".to_string()
                }
            }
            WarningLevel::Warning => {
                if colored {
                    "WARN".yellow().to_string()
                } else {
                    "WARN".to_string()
                }
            }
            WarningLevel::Info => {
                if colored {
                    "INFO".blue().to_string()
                } else {
                    "INFO".to_string()
                }
            }
        };
        eprintln!("flowscope: [{label}] {}", warning.message);
    }
}
