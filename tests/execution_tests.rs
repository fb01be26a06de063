//! End-to-end execution tests
//!
//! Seed a table through the catalog, run a plan through the pipeline
//! driver, and validate the emitted batches with the output checkers:
//! - scan with a constant filter
//! - hash join on equal keys
//! - full sort of shuffled input
//! - aggregation sum
//! - index scan after an online build

use basalt::catalog::{Catalog, PUBLIC_NAMESPACE_OID};
use basalt::checker::{
    Checker, MultiChecker, NumChecker, OutputStore, SingleIntComparisonChecker,
    SingleIntJoinChecker, SingleIntSortChecker, SingleIntSumChecker,
};
use basalt::exec::processor;
use basalt::exec::table_iter::CmpOp;
use basalt::exec::ExecutionContext;
use basalt::index_builder::IndexBuilder;
use basalt::plan::{AggregateTerm, OutputSchema, PlanExpr, PlanNode, SortDirection};
use basalt::storage::table::{ColumnDef, TableSchema};
use basalt::txn::TransactionManager;
use basalt::value::{AggregateKind, SqlType, SqlValue};
use rand::seq::SliceRandom;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn setup() -> (TransactionManager, Catalog) {
    let mgr = TransactionManager::new();
    let catalog = Catalog::bootstrap(&mgr);
    (mgr, catalog)
}

/// Create `name(colA, colB)` and insert the given pairs.
fn seed_table(mgr: &TransactionManager, catalog: &Catalog, name: &str, rows: &[(i64, i64)]) {
    let txn = mgr.begin();
    let base = catalog.next_oid();
    let schema = TableSchema::new(vec![
        ColumnDef::new(base * 100 + 1, "colA", SqlType::Integer),
        ColumnDef::new(base * 100 + 2, "colB", SqlType::Integer),
    ]);
    let (_, table) = catalog.create_table(&txn, PUBLIC_NAMESPACE_OID, name, schema);
    for (a, b) in rows {
        table.insert(&txn, vec![SqlValue::integer(*a), SqlValue::integer(*b)]);
    }
    mgr.commit(&txn);
}

fn int_schema(names: &[&str]) -> OutputSchema {
    OutputSchema::new(names.iter().map(|n| ((*n).to_string(), SqlType::Integer)).collect())
}

/// Run the plan and validate every batch with the checker.
fn run_checked(
    mgr: &TransactionManager,
    catalog: &Catalog,
    plan: &PlanNode,
    schema: &OutputSchema,
    checker: Box<dyn Checker>,
) -> usize {
    let txn = mgr.begin();
    let ctx = ExecutionContext::new(Arc::clone(&txn), 2048);
    let store = OutputStore::new(schema, Arc::clone(ctx.pool()), checker);
    let emitted = processor::execute(plan, catalog, &ctx, store.callback()).expect("execution");
    store.finish().expect("checker verdict");
    mgr.commit(&txn);
    emitted
}

fn seq_scan(table: &str, predicate: Option<PlanExpr>, parallel: bool) -> PlanNode {
    PlanNode::SeqScan {
        table: table.into(),
        predicate,
        output: int_schema(&["colA", "colB"]),
        parallel,
    }
}

// ============================================================================
// Scan with constant filter
// ============================================================================

#[test]
fn test_scan_with_constant_filter() {
    let (mgr, catalog) = setup();
    let rows: Vec<(i64, i64)> = (0..1000).map(|i| (i, i * 10)).collect();
    seed_table(&mgr, &catalog, "test_1", &rows);

    let plan = PlanNode::Output {
        child: Box::new(seq_scan(
            "test_1",
            Some(PlanExpr::cmp(CmpOp::Eq, PlanExpr::col(0), PlanExpr::int(500))),
            false,
        )),
    };
    let schema = int_schema(&["colA", "colB"]);
    let checker = MultiChecker::new(vec![
        Box::new(NumChecker::new(1)),
        Box::new(SingleIntComparisonChecker::new(CmpOp::Eq, 0, 500)),
    ]);
    let emitted = run_checked(&mgr, &catalog, &plan, &schema, Box::new(checker));
    assert_eq!(emitted, 1);
}

#[test]
fn test_scan_with_range_filter_parallel() {
    let (mgr, catalog) = setup();
    let rows: Vec<(i64, i64)> = (0..10_000).map(|i| (i, 0)).collect();
    seed_table(&mgr, &catalog, "test_range", &rows);

    let plan = PlanNode::Output {
        child: Box::new(seq_scan(
            "test_range",
            Some(PlanExpr::Conjunction(vec![
                PlanExpr::cmp(CmpOp::Ge, PlanExpr::col(0), PlanExpr::int(100)),
                PlanExpr::cmp(CmpOp::Lt, PlanExpr::col(0), PlanExpr::int(600)),
            ])),
            true,
        )),
    };
    let schema = int_schema(&["colA", "colB"]);
    let checker = MultiChecker::new(vec![
        Box::new(NumChecker::new(500)),
        Box::new(SingleIntComparisonChecker::new(CmpOp::Ge, 0, 100)),
        Box::new(SingleIntComparisonChecker::new(CmpOp::Lt, 0, 600)),
    ]);
    run_checked(&mgr, &catalog, &plan, &schema, Box::new(checker));
}

// ============================================================================
// Hash join
// ============================================================================

#[test]
fn test_join_on_equal_keys() {
    let (mgr, catalog) = setup();
    let rows: Vec<(i64, i64)> = (0..100).map(|i| (i, i)).collect();
    seed_table(&mgr, &catalog, "join_left", &rows);
    seed_table(&mgr, &catalog, "join_right", &rows);

    let plan = PlanNode::Output {
        child: Box::new(PlanNode::HashJoin {
            left: Box::new(seq_scan("join_left", None, false)),
            right: Box::new(seq_scan("join_right", None, false)),
            left_keys: vec![0],
            right_keys: vec![0],
            output: int_schema(&["l.colA", "l.colB", "r.colA", "r.colB"]),
            parallel: false,
        }),
    };
    let schema = int_schema(&["l.colA", "l.colB", "r.colA", "r.colB"]);
    let checker = MultiChecker::new(vec![
        Box::new(NumChecker::new(100)),
        Box::new(SingleIntJoinChecker::new(0, 2)),
    ]);
    run_checked(&mgr, &catalog, &plan, &schema, Box::new(checker));
}

#[test]
fn test_parallel_join_matches_row_count() {
    let (mgr, catalog) = setup();
    // each left key matches two right rows
    let left: Vec<(i64, i64)> = (0..500).map(|i| (i, 0)).collect();
    let right: Vec<(i64, i64)> = (0..1000).map(|i| (i % 500, i)).collect();
    seed_table(&mgr, &catalog, "pjoin_left", &left);
    seed_table(&mgr, &catalog, "pjoin_right", &right);

    let plan = PlanNode::Output {
        child: Box::new(PlanNode::HashJoin {
            left: Box::new(seq_scan("pjoin_left", None, true)),
            right: Box::new(seq_scan("pjoin_right", None, false)),
            left_keys: vec![0],
            right_keys: vec![0],
            output: int_schema(&["l.colA", "l.colB", "r.colA", "r.colB"]),
            parallel: true,
        }),
    };
    let schema = int_schema(&["l.colA", "l.colB", "r.colA", "r.colB"]);
    let checker = MultiChecker::new(vec![
        Box::new(NumChecker::new(1000)),
        Box::new(SingleIntJoinChecker::new(0, 2)),
    ]);
    run_checked(&mgr, &catalog, &plan, &schema, Box::new(checker));
}

// ============================================================================
// Sort
// ============================================================================

#[test]
fn test_sort_ascending_over_shuffled_input() {
    let (mgr, catalog) = setup();
    let mut values: Vec<i64> = (0..10_000).collect();
    values.shuffle(&mut rand::thread_rng());
    let rows: Vec<(i64, i64)> = values.iter().map(|v| (*v, 0)).collect();
    seed_table(&mgr, &catalog, "sort_input", &rows);

    let plan = PlanNode::Output {
        child: Box::new(PlanNode::Sort {
            child: Box::new(seq_scan("sort_input", None, false)),
            sort_keys: vec![(0, SortDirection::Asc)],
            limit: None,
            parallel: false,
        }),
    };
    let schema = int_schema(&["colA", "colB"]);
    let checker = MultiChecker::new(vec![
        Box::new(NumChecker::new(10_000)),
        Box::new(SingleIntSortChecker::new(0)),
    ]);
    run_checked(&mgr, &catalog, &plan, &schema, Box::new(checker));
}

#[test]
fn test_parallel_topk_sort() {
    let (mgr, catalog) = setup();
    let mut values: Vec<i64> = (0..5000).collect();
    values.shuffle(&mut rand::thread_rng());
    let rows: Vec<(i64, i64)> = values.iter().map(|v| (*v, 0)).collect();
    seed_table(&mgr, &catalog, "topk_input", &rows);

    let plan = PlanNode::Output {
        child: Box::new(PlanNode::Sort {
            child: Box::new(seq_scan("topk_input", None, true)),
            sort_keys: vec![(0, SortDirection::Asc)],
            limit: Some(10),
            parallel: true,
        }),
    };
    let schema = int_schema(&["colA", "colB"]);
    let checker = MultiChecker::new(vec![
        Box::new(NumChecker::new(10)),
        Box::new(SingleIntSortChecker::new(0)),
        Box::new(SingleIntComparisonChecker::new(CmpOp::Lt, 0, 10)),
    ]);
    run_checked(&mgr, &catalog, &plan, &schema, Box::new(checker));
}

// ============================================================================
// Aggregation
// ============================================================================

#[test]
fn test_aggregation_sum() {
    let (mgr, catalog) = setup();
    let rows: Vec<(i64, i64)> = (1..=1000).map(|i| (i, 0)).collect();
    seed_table(&mgr, &catalog, "agg_input", &rows);

    let plan = PlanNode::Output {
        child: Box::new(PlanNode::Aggregate {
            child: Box::new(seq_scan("agg_input", None, false)),
            group_by: vec![],
            aggregates: vec![AggregateTerm { kind: AggregateKind::Sum, input: Some(0) }],
            output: int_schema(&["sum"]),
            parallel: false,
        }),
    };
    let schema = int_schema(&["sum"]);
    let checker = MultiChecker::new(vec![
        Box::new(NumChecker::new(1)),
        Box::new(SingleIntSumChecker::new(0, 500_500)),
    ]);
    run_checked(&mgr, &catalog, &plan, &schema, Box::new(checker));
}

#[test]
fn test_grouped_aggregation_parallel_matches_expected_totals() {
    let (mgr, catalog) = setup();
    let rows: Vec<(i64, i64)> = (0..4000).map(|i| (i, i % 4)).collect();
    seed_table(&mgr, &catalog, "group_input", &rows);

    let plan = PlanNode::Output {
        child: Box::new(PlanNode::Aggregate {
            child: Box::new(seq_scan("group_input", None, true)),
            group_by: vec![1],
            aggregates: vec![AggregateTerm { kind: AggregateKind::Count, input: Some(0) }],
            output: int_schema(&["colB", "count"]),
            parallel: true,
        }),
    };
    let schema = int_schema(&["colB", "count"]);
    let checker = MultiChecker::new(vec![
        Box::new(NumChecker::new(4)),
        Box::new(SingleIntComparisonChecker::new(CmpOp::Eq, 1, 1000)),
    ]);
    run_checked(&mgr, &catalog, &plan, &schema, Box::new(checker));
}

// ============================================================================
// Index scan
// ============================================================================

#[test]
fn test_index_scan_after_online_build() {
    let (mgr, catalog) = setup();
    let rows: Vec<(i64, i64)> = (0..200).map(|i| (i % 20, i)).collect();
    seed_table(&mgr, &catalog, "idx_input", &rows);

    let builder = IndexBuilder::new(&catalog, &mgr);
    let result = builder
        .create_index(
            basalt::catalog::DEFAULT_DATABASE_OID,
            "idx_input",
            "idx_input_colA",
            &["colA"],
            false,
        )
        .expect("online build");
    assert!(result.valid);

    let plan = PlanNode::Output {
        child: Box::new(PlanNode::IndexScan {
            table: "idx_input".into(),
            index: "idx_input_colA".into(),
            key: vec![SqlValue::integer(7)],
            predicate: None,
            output: int_schema(&["colA", "colB"]),
        }),
    };
    let schema = int_schema(&["colA", "colB"]);
    let checker = MultiChecker::new(vec![
        Box::new(NumChecker::new(10)),
        Box::new(SingleIntComparisonChecker::new(CmpOp::Eq, 0, 7)),
    ]);
    run_checked(&mgr, &catalog, &plan, &schema, Box::new(checker));
}
