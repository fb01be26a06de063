//! Pipeline driver.
//!
//! The execution entry point: lower the plan through the compiler, reject
//! it if any diagnostic was reported, then interpret the emitted module
//! against the runtime bridges (`exec::vm`). There is exactly one
//! execution semantics - the one the operator translators emitted.

use super::output::{OutputBuffer, OutputCallback};
use super::vm;
use super::{ExecutionContext, RuntimeError};
use crate::plan::PlanNode;
use crate::storage::index::Index;
use crate::storage::table::SqlTable;
use std::sync::Arc;
use tracing::debug;

/// Resolves the names a plan references to storage objects.
pub trait StorageProvider: Sync {
    fn table(&self, name: &str) -> Option<Arc<SqlTable>>;
    /// An index plus the table it covers.
    fn index(&self, name: &str) -> Option<(Arc<Index>, Arc<SqlTable>)>;
}

/// Plain map-backed provider for tests and embedded use.
#[derive(Default)]
pub struct StorageMap {
    tables: std::collections::HashMap<String, Arc<SqlTable>>,
    indexes: std::collections::HashMap<String, (Arc<Index>, Arc<SqlTable>)>,
}

impl StorageMap {
    pub fn new() -> Self {
        StorageMap::default()
    }

    pub fn add_table(&mut self, table: Arc<SqlTable>) {
        self.tables.insert(table.name().to_string(), table);
    }

    pub fn add_index(&mut self, name: impl Into<String>, index: Arc<Index>, table: Arc<SqlTable>) {
        self.indexes.insert(name.into(), (index, table));
    }
}

impl StorageProvider for StorageMap {
    fn table(&self, name: &str) -> Option<Arc<SqlTable>> {
        self.tables.get(name).cloned()
    }

    fn index(&self, name: &str) -> Option<(Arc<Index>, Arc<SqlTable>)> {
        self.indexes.get(name).cloned()
    }
}

/// Compile and execute a plan, streaming result batches through
/// `callback`. Returns the number of tuples emitted.
pub fn execute(
    plan: &PlanNode,
    storage: &dyn StorageProvider,
    ctx: &ExecutionContext,
    callback: OutputCallback,
) -> Result<usize, RuntimeError> {
    let compiled = crate::compiler::compile(plan);
    if !compiled.is_ok() {
        return Err(RuntimeError::CompileRejected(compiled.diagnostics.len()));
    }

    let child = match plan {
        PlanNode::Output { child } => child.as_ref(),
        other => other,
    };
    let layout = child.output_schema().row_layout();
    let out = OutputBuffer::new(layout, callback);

    let emitted = vm::run(&compiled, storage, ctx, out)?;
    debug!(tuples = emitted, "plan executed");
    Ok(emitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::table_iter::CmpOp;
    use crate::plan::{AggregateTerm, OutputSchema, PlanExpr, SortDirection};
    use crate::storage::table::{ColumnDef, TableSchema};
    use crate::txn::TransactionManager;
    use crate::value::{AggregateKind, SqlType, SqlValue};
    use std::sync::mpsc;

    fn seeded(n: i64) -> (TransactionManager, StorageMap) {
        let mgr = TransactionManager::new();
        let schema = TableSchema::new(vec![
            ColumnDef::new(1, "colA", SqlType::Integer),
            ColumnDef::new(2, "colB", SqlType::Integer),
        ]);
        let table = Arc::new(SqlTable::new("test_1", schema));
        let txn = mgr.begin();
        for i in 0..n {
            table.insert(&txn, vec![SqlValue::integer(i), SqlValue::integer(i % 10)]);
        }
        mgr.commit(&txn);
        let mut storage = StorageMap::new();
        storage.add_table(table);
        (mgr, storage)
    }

    fn int_schema(names: &[&str]) -> OutputSchema {
        OutputSchema::new(names.iter().map(|n| ((*n).to_string(), SqlType::Integer)).collect())
    }

    fn collect_rows(
        plan: &PlanNode,
        storage: &StorageMap,
        ctx: &ExecutionContext,
    ) -> Vec<Vec<SqlValue>> {
        let (tx, rx) = mpsc::channel();
        let layout = match plan {
            PlanNode::Output { child } => child.output_schema().row_layout(),
            other => other.output_schema().row_layout(),
        };
        let pool = Arc::clone(ctx.pool());
        let cb: OutputCallback = Box::new(move |bytes, n, ts| {
            for i in 0..n {
                let row = layout.decode_row(&bytes[i * ts..(i + 1) * ts], &pool);
                let _ = tx.send(row);
            }
        });
        execute(plan, storage, ctx, cb).expect("execution");
        rx.try_iter().collect()
    }

    #[test]
    fn test_scan_filter_emits_matching_row() {
        let (mgr, storage) = seeded(1000);
        let txn = mgr.begin();
        let ctx = ExecutionContext::new(Arc::clone(&txn), 512);
        let plan = PlanNode::Output {
            child: Box::new(PlanNode::SeqScan {
                table: "test_1".into(),
                predicate: Some(PlanExpr::cmp(CmpOp::Eq, PlanExpr::col(0), PlanExpr::int(500))),
                output: int_schema(&["colA", "colB"]),
                parallel: false,
            }),
        };
        let rows = collect_rows(&plan, &storage, &ctx);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], SqlValue::integer(500));
        mgr.commit(&txn);
    }

    #[test]
    fn test_parallel_hint_matches_serial_results() {
        let (mgr, storage) = seeded(5000);
        let txn = mgr.begin();
        let ctx = ExecutionContext::new(Arc::clone(&txn), 512);
        let sort = |parallel| PlanNode::Output {
            child: Box::new(PlanNode::Sort {
                child: Box::new(PlanNode::SeqScan {
                    table: "test_1".into(),
                    predicate: Some(PlanExpr::cmp(CmpOp::Lt, PlanExpr::col(0), PlanExpr::int(100))),
                    output: int_schema(&["colA", "colB"]),
                    parallel,
                }),
                sort_keys: vec![(0, SortDirection::Asc)],
                limit: None,
                parallel,
            }),
        };
        let decode = |rows: Vec<Vec<SqlValue>>| -> Vec<i64> {
            rows.iter().map(|r| r[0].as_integer().expect("int")).collect()
        };
        let serial = decode(collect_rows(&sort(false), &storage, &ctx));
        let par = decode(collect_rows(&sort(true), &storage, &ctx));
        assert_eq!(serial, par);
        assert_eq!(serial.len(), 100);
        assert!(serial.windows(2).all(|w| w[0] <= w[1]));
        mgr.commit(&txn);
    }

    #[test]
    fn test_grouped_aggregate_counts() {
        let (mgr, storage) = seeded(100);
        let txn = mgr.begin();
        let ctx = ExecutionContext::new(Arc::clone(&txn), 512);
        let plan = PlanNode::Output {
            child: Box::new(PlanNode::Aggregate {
                child: Box::new(PlanNode::SeqScan {
                    table: "test_1".into(),
                    predicate: None,
                    output: int_schema(&["colA", "colB"]),
                    parallel: false,
                }),
                group_by: vec![1],
                aggregates: vec![AggregateTerm { kind: AggregateKind::Count, input: Some(0) }],
                output: int_schema(&["colB", "count"]),
                parallel: false,
            }),
        };
        let rows = collect_rows(&plan, &storage, &ctx);
        assert_eq!(rows.len(), 10);
        assert!(rows.iter().all(|r| r[1] == SqlValue::integer(10)));
        mgr.commit(&txn);
    }

    #[test]
    fn test_cancellation_truncates_output() {
        let (mgr, storage) = seeded(100);
        let txn = mgr.begin();
        let ctx = ExecutionContext::new(Arc::clone(&txn), 512);
        ctx.cancel();
        let plan = PlanNode::Output {
            child: Box::new(PlanNode::SeqScan {
                table: "test_1".into(),
                predicate: None,
                output: int_schema(&["colA", "colB"]),
                parallel: false,
            }),
        };
        let cb: OutputCallback = Box::new(|_, _, _| panic!("no batches after cancellation"));
        let result = execute(&plan, &storage, &ctx, cb);
        assert!(matches!(result, Err(RuntimeError::Cancelled)));
        mgr.commit(&txn);
    }

    #[test]
    fn test_missing_table_is_a_runtime_error() {
        let (mgr, storage) = seeded(1);
        let txn = mgr.begin();
        let ctx = ExecutionContext::new(Arc::clone(&txn), 512);
        let plan = PlanNode::Output {
            child: Box::new(PlanNode::SeqScan {
                table: "missing".into(),
                predicate: None,
                output: int_schema(&["colA"]),
                parallel: false,
            }),
        };
        let cb: OutputCallback = Box::new(|_, _, _| {});
        assert!(matches!(
            execute(&plan, &storage, &ctx, cb),
            Err(RuntimeError::TableNotFound(_))
        ));
        mgr.commit(&txn);
    }
}
