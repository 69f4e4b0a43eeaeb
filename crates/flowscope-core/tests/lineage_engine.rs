//! End-to-end scenarios driving `ScriptAnalyzer` through the full pipeline:
//! split -> classify -> analyze -> registry -> transitive resolution.

use flowscope_core::{AnalysisConfig, ExpressionKind, ScriptAnalyzer};
use rstest::rstest;

fn analyze(sql: &str) -> flowscope_core::ScriptResult {
    ScriptAnalyzer::new(None, AnalysisConfig::default()).analyze(sql).unwrap()
}

#[test]
fn direct_copy_chain_traces_to_the_single_source() {
    let result = analyze(
        "CREATE TABLE t1 AS SELECT amount FROM orders;
         CREATE TABLE t2 AS SELECT amount * 2 AS doubled FROM t1;
         CREATE TABLE t3 AS SELECT doubled + 100 AS final FROM t2;",
    );
    assert!(!result.has_errors());

    let resolver = result.resolver();
    let paths = resolver.trace_to_source("t3", "final");
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].hops(), 3);
    let chain: Vec<String> = paths[0].nodes.iter().map(|n| n.column.qualified_name()).collect();
    assert_eq!(chain, vec!["t2.doubled", "t1.amount", "orders.amount"]);

    let mut impacted: Vec<String> = resolver
        .find_impact("orders", "amount")
        .into_iter()
        .map(|c| c.qualified_name())
        .collect();
    impacted.sort();
    assert_eq!(impacted, vec!["t1.amount", "t2.doubled", "t3.final"]);
}

#[test]
fn computed_expression_with_table_alias_keeps_both_operand_sources() {
    let result = analyze("CREATE TABLE t AS SELECT o.amount + o.tax AS total FROM orders o;");
    assert!(!result.has_errors());

    let t = result.registry.get_table("t").unwrap();
    let total = t.get_column("total").unwrap();
    assert_eq!(total.expression_kind, ExpressionKind::Computed);
    assert!(!total.is_aggregate);

    let mut sources: Vec<String> = total.sources.iter().map(|s| s.qualified_name()).collect();
    sources.sort();
    assert_eq!(sources, vec!["orders.amount", "orders.tax"]);
}

#[test]
fn repeated_inserts_accumulate_sources_and_erode_confidence() {
    let result = analyze(
        "CREATE TABLE sink AS SELECT amount FROM src1;
         INSERT INTO sink SELECT amount FROM src2;
         INSERT INTO sink SELECT amount FROM src3;",
    );
    assert!(!result.has_errors());

    let sink = result.registry.get_table("sink").unwrap();
    let amount = sink.get_column("amount").unwrap();
    let mut tables: Vec<&str> = amount.sources.iter().map(|s| s.table.as_str()).collect();
    tables.sort();
    assert_eq!(tables, vec!["src1", "src2", "src3"]);
    assert!(amount.confidence < 1.0);
}

#[test]
fn group_by_column_and_aggregate_are_flagged_distinctly() {
    let result = analyze(
        "CREATE TABLE s AS SELECT dept_id, AVG(salary) AS avg_sal FROM employees GROUP BY dept_id;",
    );
    assert!(!result.has_errors());

    let s = result.registry.get_table("s").unwrap();
    let dept_id = s.get_column("dept_id").unwrap();
    assert!(dept_id.is_group_by);
    assert_eq!(
        dept_id.sources.iter().map(|c| c.qualified_name()).collect::<Vec<_>>(),
        vec!["employees.dept_id"]
    );

    let avg_sal = s.get_column("avg_sal").unwrap();
    assert!(avg_sal.is_aggregate);
    assert_eq!(avg_sal.aggregate_function.map(|f| f.as_str()), Some("AVG"));
    assert_eq!(
        avg_sal.sources.iter().map(|c| c.qualified_name()).collect::<Vec<_>>(),
        vec!["employees.salary"]
    );
}

#[test]
fn cte_with_union_all_disappears_after_lineage_expansion() {
    let result = analyze(
        "WITH combined AS (SELECT id, name FROM t1 UNION ALL SELECT id, name FROM t2)
         CREATE TABLE r AS SELECT id, name FROM combined;",
    );
    assert!(!result.has_errors());
    assert!(!result.registry.has_table("combined"));

    let r = result.registry.get_table("r").unwrap();
    let mut id_sources: Vec<&str> = r.get_column("id").unwrap().sources.iter().map(|s| s.table.as_str()).collect();
    id_sources.sort();
    assert_eq!(id_sources, vec!["t1", "t2"]);

    let mut name_sources: Vec<&str> =
        r.get_column("name").unwrap().sources.iter().map(|s| s.table.as_str()).collect();
    name_sources.sort();
    assert_eq!(name_sources, vec!["t1", "t2"]);
}

#[test]
fn recursive_cte_hierarchy_traces_back_to_the_anchor_table_only() {
    let result = analyze(
        "WITH RECURSIVE h AS (
           SELECT emp_id, manager_id, 1 AS level FROM employees WHERE manager_id IS NULL
           UNION ALL
           SELECT e.emp_id, e.manager_id, h.level + 1 FROM employees e JOIN h ON e.manager_id = h.emp_id
         )
         CREATE TABLE r AS SELECT emp_id, level FROM h;",
    );
    assert!(!result.has_errors());
    assert!(!result.registry.has_table("h"));

    let r = result.registry.get_table("r").unwrap();
    let emp_id = r.get_column("emp_id").unwrap();
    assert!(emp_id.sources.iter().any(|s| s.table == "employees" && s.column == "emp_id"));

    let level = r.get_column("level").unwrap();
    assert!(level.sources.iter().any(|s| s.table == "employees"));
    assert!(!level.sources.iter().any(|s| s.table == "h"));
}

#[rstest]
#[case::empty_script("", true)]
#[case::single_literal_select("SELECT 1", false)]
#[case::whitespace_only("   \n\t  ", true)]
fn boundary_scripts_are_classified_as_errors_or_successes(#[case] sql: &str, #[case] expect_error: bool) {
    let outcome = ScriptAnalyzer::new(None, AnalysisConfig::default()).analyze(sql);
    assert_eq!(outcome.is_err(), expect_error);
}

#[test]
fn select_1_with_no_from_registers_no_tables() {
    let result = analyze("SELECT 1");
    assert!(!result.has_errors());
    assert_eq!(result.registry.all_tables().count(), 0);
}

#[test]
fn constant_only_projection_keeps_the_column_with_no_sources() {
    let result = analyze("CREATE TABLE totals AS SELECT 1 AS one FROM orders");
    assert!(!result.has_errors());
    let totals = result.registry.get_table("totals").unwrap();
    let one = totals.get_column("one").unwrap();
    assert!(one.sources.is_empty());
}

#[test]
fn wildcard_without_schema_and_no_expansion_succeeds_with_no_sources() {
    let mut config = AnalysisConfig::default();
    config.expand_wildcards = false;
    let result = ScriptAnalyzer::new(None, config)
        .analyze("CREATE TABLE totals AS SELECT * FROM orders")
        .unwrap();
    assert!(!result.has_errors());
}

#[test]
fn wildcard_without_schema_and_expansion_requested_fails() {
    let mut config = AnalysisConfig::default();
    config.expand_wildcards = true;
    let result = ScriptAnalyzer::new(None, config)
        .analyze("CREATE TABLE totals AS SELECT * FROM orders")
        .unwrap();
    assert!(result.has_errors());
}

#[test]
fn union_with_mismatched_column_names_uses_the_first_branchs_names() {
    let result = analyze(
        "CREATE TABLE r AS SELECT id, name AS label FROM t1 UNION ALL SELECT id, full_name FROM t2",
    );
    assert!(!result.has_errors());
    let r = result.registry.get_table("r").unwrap();
    assert!(r.has_column("label"));

    let label = r.get_column("label").unwrap();
    let mut tables: Vec<&str> = label.sources.iter().map(|s| s.table.as_str()).collect();
    tables.sort();
    assert_eq!(tables, vec!["t1", "t2"]);
}

#[test]
fn registering_the_same_external_table_twice_is_idempotent() {
    let result = analyze("SELECT * FROM orders; SELECT * FROM orders;");
    assert!(!result.has_errors());
    assert_eq!(result.registry.all_tables().filter(|t| t.name == "orders").count(), 1);
}

#[test]
fn table_name_lookup_is_case_insensitive() {
    let result = analyze("CREATE TABLE totals AS SELECT amount FROM Orders");
    assert!(!result.has_errors());
    assert!(result.registry.has_table("ORDERS"));
    assert!(result.registry.has_table(" orders "));
}

#[test]
fn analyzing_the_same_script_twice_produces_equal_registries() {
    let sql = "CREATE TABLE t AS SELECT amount FROM orders;";
    let first = analyze(sql);
    let second = analyze(sql);
    let t1 = first.registry.get_table("t").unwrap();
    let t2 = second.registry.get_table("t").unwrap();
    assert_eq!(t1.columns.keys().collect::<Vec<_>>(), t2.columns.keys().collect::<Vec<_>>());
    for (name, lineage) in &t1.columns {
        let other = t2.columns.get(name).unwrap();
        assert_eq!(lineage.sources.len(), other.sources.len());
        assert_eq!(lineage.confidence, other.confidence);
    }
}

#[test]
fn explain_is_consistent_with_trace() {
    let result = analyze(
        "CREATE TABLE t1 AS SELECT amount FROM orders;
         CREATE TABLE t2 AS SELECT amount * 2 AS doubled FROM t1;",
    );
    let resolver = result.resolver();
    let explanation = resolver.explain_calculation("t2", "doubled");
    assert!(explanation.contains("t1.amount") || explanation.contains("orders.amount"));

    let paths = resolver.trace_to_source("t2", "doubled");
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].target().unwrap().column.qualified_name(), "t2.doubled");
}
