//! Property-based checks of the universal invariants in spec.md §8: bounded
//! confidence, no leftover CTEs, and cycle-safe transitive resolution.

use flowscope_core::{AnalysisConfig, ScriptAnalyzer};
use proptest::prelude::*;

/// Builds a straight-line chain of `CREATE TABLE tN AS SELECT amount FROM
/// t(N-1)` statements `depth` long, rooted at a bare `orders` source.
fn chain_script(depth: usize) -> String {
    let mut sql = String::new();
    let mut prev = "orders".to_string();
    for i in 1..=depth {
        let current = format!("t{i}");
        sql.push_str(&format!("CREATE TABLE {current} AS SELECT amount FROM {prev};\n"));
        prev = current;
    }
    sql
}

proptest! {
    /// Every chain, regardless of length, analyzes cleanly and every
    /// `ColumnLineage.confidence` stays within `[0, 1]`.
    #[test]
    fn confidence_stays_in_unit_interval(depth in 1usize..12) {
        let result = ScriptAnalyzer::new(None, AnalysisConfig::default())
            .analyze(&chain_script(depth))
            .unwrap();
        prop_assert!(!result.has_errors());
        for table in result.registry.all_tables() {
            for lineage in table.columns.values() {
                prop_assert!(lineage.confidence >= 0.0 && lineage.confidence <= 1.0);
            }
        }
    }

    /// After analysis, no table of kind `Cte` survives in the Registry,
    /// regardless of how many CTEs a script's `WITH` clauses introduce.
    #[test]
    fn no_cte_tables_survive_analysis(cte_count in 1usize..6) {
        let mut ctes = Vec::new();
        for i in 0..cte_count {
            ctes.push(format!("c{i} AS (SELECT id FROM src{i})"));
        }
        let sql = format!(
            "CREATE TABLE out_final AS WITH {} SELECT id FROM c0;",
            ctes.join(", ")
        );
        let result = ScriptAnalyzer::new(None, AnalysisConfig::default()).analyze(&sql).unwrap();
        prop_assert!(!result.has_errors());
        for table in result.registry.all_tables() {
            prop_assert_ne!(table.table_type, flowscope_core::TableType::Cte);
        }
    }

    /// `trace_to_source` terminates (never diverges) within `max_depth` no
    /// matter how long the linear chain feeding the traced column is.
    #[test]
    fn trace_terminates_within_configured_depth(depth in 1usize..20) {
        let mut config = AnalysisConfig::default();
        config.max_trace_depth = 5;
        let result = ScriptAnalyzer::new(None, config).analyze(&chain_script(depth)).unwrap();
        prop_assert!(!result.has_errors());

        let resolver = result.resolver();
        let target = format!("t{depth}");
        let paths = resolver.trace_to_source(&target, "amount");
        for path in &paths {
            prop_assert!(path.hops() <= 5);
        }
    }

    /// `find_impact` on the root source recovers exactly every derived
    /// table in a linear chain, regardless of chain length.
    #[test]
    fn impact_recovers_the_whole_downstream_chain(depth in 1usize..10) {
        let result = ScriptAnalyzer::new(None, AnalysisConfig::default())
            .analyze(&chain_script(depth))
            .unwrap();
        prop_assert!(!result.has_errors());

        let resolver = result.resolver();
        let impacted = resolver.find_impact("orders", "amount");
        prop_assert_eq!(impacted.len(), depth);
    }
}

/// A hand-built cyclic Registry (t1 -> t2 -> t1) should never make
/// `trace_to_source` diverge -- the universal cycle-resistance invariant,
/// tested directly against the Registry rather than through SQL since
/// `sqlparser` itself cannot produce a genuinely cyclic CREATE chain.
#[test]
fn trace_to_source_resists_a_hand_built_cycle() {
    use flowscope_core::{ColumnLineage, ColumnRef, ExpressionKind, TableDefinition, TableRegistry, TableType, TransitiveResolver};

    let mut registry = TableRegistry::new();
    let mut t1 = TableDefinition::new("t1", TableType::Table);
    let mut amount = ColumnLineage::new("amount", ExpressionKind::Direct);
    amount.add_sources([ColumnRef::new("t2", "amount")]);
    t1.add_column(amount);

    let mut t2 = TableDefinition::new("t2", TableType::Table);
    let mut amount2 = ColumnLineage::new("amount", ExpressionKind::Direct);
    amount2.add_sources([ColumnRef::new("t1", "amount")]);
    t2.add_column(amount2);

    let mut warnings = flowscope_core::WarningCollector::new();
    registry.register_table(t1, &mut warnings).unwrap();
    registry.register_table(t2, &mut warnings).unwrap();

    let resolver = TransitiveResolver::new(&registry, 1000);
    let paths = resolver.trace_to_source("t1", "amount");
    assert!(!paths.is_empty());
    assert!(paths.iter().all(|p| p.hops() < 1000));
}
