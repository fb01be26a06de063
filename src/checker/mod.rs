//! Output validation framework.
//!
//! Checkers consume the tuple batches a plan emits and validate count,
//! comparison, join, sum and sort properties; `OutputStore` bridges the
//! raw `(bytes, num_tuples, tuple_size)` output callback to a checker by
//! decoding tuples per the plan's output schema.

use crate::exec::output::OutputCallback;
use crate::exec::row::RowLayout;
use crate::exec::table_iter::CmpOp;
use crate::exec::MemoryPool;
use crate::plan::OutputSchema;
use crate::value::{SqlType, SqlValue};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CheckError {
    #[error("expected {expected} output tuples, saw {actual}")]
    RowCountMismatch { expected: usize, actual: usize },

    #[error("row {row}: column {col} value {actual} fails {op:?} {rhs}")]
    ComparisonFailed {
        row: usize,
        col: usize,
        actual: String,
        op: CmpOp,
        rhs: i64,
    },

    #[error("row {row}: columns {col1} and {col2} differ ({left} vs {right})")]
    JoinMismatch {
        row: usize,
        col1: usize,
        col2: usize,
        left: String,
        right: String,
    },

    #[error("column {col} sums to {actual}, expected {expected}")]
    SumMismatch { col: usize, expected: i64, actual: i64 },

    #[error("row {row}: column {col} breaks the sort order ({prev} then {next})")]
    SortViolation {
        row: usize,
        col: usize,
        prev: String,
        next: String,
    },

    #[error("{0}")]
    Failed(String),
}

/// One validation capability over the output stream.
pub trait Checker: Send {
    /// Observe one batch of decoded tuples.
    fn process_batch(&mut self, rows: &[Vec<SqlValue>]) -> Result<(), CheckError>;

    /// Final verdict once the stream is complete.
    fn check_correctness(&self) -> Result<(), CheckError>;
}

// ----------------------------------------------------------------------
// Provided checkers
// ----------------------------------------------------------------------

/// Expects an exact total row count.
pub struct NumChecker {
    expected: usize,
    seen: usize,
}

impl NumChecker {
    pub fn new(expected: usize) -> Self {
        NumChecker { expected, seen: 0 }
    }
}

impl Checker for NumChecker {
    fn process_batch(&mut self, rows: &[Vec<SqlValue>]) -> Result<(), CheckError> {
        self.seen += rows.len();
        Ok(())
    }

    fn check_correctness(&self) -> Result<(), CheckError> {
        if self.seen == self.expected {
            Ok(())
        } else {
            Err(CheckError::RowCountMismatch { expected: self.expected, actual: self.seen })
        }
    }
}

/// Every row's integer column must satisfy `col <op> rhs`.
pub struct SingleIntComparisonChecker {
    op: CmpOp,
    col: usize,
    rhs: i64,
    row: usize,
    failure: Option<CheckError>,
}

impl SingleIntComparisonChecker {
    pub fn new(op: CmpOp, col: usize, rhs: i64) -> Self {
        SingleIntComparisonChecker { op, col, rhs, row: 0, failure: None }
    }
}

impl Checker for SingleIntComparisonChecker {
    fn process_batch(&mut self, rows: &[Vec<SqlValue>]) -> Result<(), CheckError> {
        for r in rows {
            let ok = r[self.col]
                .sql_cmp(&SqlValue::integer(self.rhs))
                .is_some_and(|ord| self.op.holds(ord));
            if !ok && self.failure.is_none() {
                let err = CheckError::ComparisonFailed {
                    row: self.row,
                    col: self.col,
                    actual: r[self.col].to_string(),
                    op: self.op,
                    rhs: self.rhs,
                };
                self.failure = Some(err.clone());
                return Err(err);
            }
            self.row += 1;
        }
        Ok(())
    }

    fn check_correctness(&self) -> Result<(), CheckError> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

/// Every row must carry equal values in the two join columns.
pub struct SingleIntJoinChecker {
    col1: usize,
    col2: usize,
    row: usize,
    failure: Option<CheckError>,
}

impl SingleIntJoinChecker {
    pub fn new(col1: usize, col2: usize) -> Self {
        SingleIntJoinChecker { col1, col2, row: 0, failure: None }
    }
}

impl Checker for SingleIntJoinChecker {
    fn process_batch(&mut self, rows: &[Vec<SqlValue>]) -> Result<(), CheckError> {
        for r in rows {
            let eq = r[self.col1]
                .sql_cmp(&r[self.col2])
                .is_some_and(|ord| ord.is_eq());
            if !eq && self.failure.is_none() {
                let err = CheckError::JoinMismatch {
                    row: self.row,
                    col1: self.col1,
                    col2: self.col2,
                    left: r[self.col1].to_string(),
                    right: r[self.col2].to_string(),
                };
                self.failure = Some(err.clone());
                return Err(err);
            }
            self.row += 1;
        }
        Ok(())
    }

    fn check_correctness(&self) -> Result<(), CheckError> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

/// Accumulates non-null values of one column; the final total must match.
pub struct SingleIntSumChecker {
    col: usize,
    expected: i64,
    acc: i64,
}

impl SingleIntSumChecker {
    pub fn new(col: usize, expected: i64) -> Self {
        SingleIntSumChecker { col, expected, acc: 0 }
    }
}

impl Checker for SingleIntSumChecker {
    fn process_batch(&mut self, rows: &[Vec<SqlValue>]) -> Result<(), CheckError> {
        for r in rows {
            if let Some(v) = r[self.col].as_integer() {
                self.acc = self.acc.wrapping_add(v);
            }
        }
        Ok(())
    }

    fn check_correctness(&self) -> Result<(), CheckError> {
        if self.acc == self.expected {
            Ok(())
        } else {
            Err(CheckError::SumMismatch {
                col: self.col,
                expected: self.expected,
                actual: self.acc,
            })
        }
    }
}

/// The column must be monotone nondecreasing across batches; nulls
/// compare equal only to nulls and sort first.
pub struct SingleIntSortChecker {
    col: usize,
    prev: Option<SqlValue>,
    row: usize,
    failure: Option<CheckError>,
}

impl SingleIntSortChecker {
    pub fn new(col: usize) -> Self {
        SingleIntSortChecker { col, prev: None, row: 0, failure: None }
    }
}

impl Checker for SingleIntSortChecker {
    fn process_batch(&mut self, rows: &[Vec<SqlValue>]) -> Result<(), CheckError> {
        for r in rows {
            let next = &r[self.col];
            if let Some(prev) = &self.prev {
                if prev.total_cmp(next).is_gt() && self.failure.is_none() {
                    let err = CheckError::SortViolation {
                        row: self.row,
                        col: self.col,
                        prev: prev.to_string(),
                        next: next.to_string(),
                    };
                    self.failure = Some(err.clone());
                    return Err(err);
                }
            }
            self.prev = Some(next.clone());
            self.row += 1;
        }
        Ok(())
    }

    fn check_correctness(&self) -> Result<(), CheckError> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

type RowPredicate = Box<dyn FnMut(&[SqlValue]) -> Result<(), CheckError> + Send>;
type FinalPredicate = Box<dyn Fn() -> Result<(), CheckError> + Send>;

/// User-supplied per-row and finalize predicates.
pub struct GenericChecker {
    per_row: RowPredicate,
    finalize: FinalPredicate,
}

impl GenericChecker {
    pub fn new(per_row: RowPredicate, finalize: FinalPredicate) -> Self {
        GenericChecker { per_row, finalize }
    }
}

impl Checker for GenericChecker {
    fn process_batch(&mut self, rows: &[Vec<SqlValue>]) -> Result<(), CheckError> {
        for r in rows {
            (self.per_row)(r)?;
        }
        Ok(())
    }

    fn check_correctness(&self) -> Result<(), CheckError> {
        (self.finalize)()
    }
}

/// Fans batches out to a list of child checkers.
pub struct MultiChecker {
    children: Vec<Box<dyn Checker>>,
}

impl MultiChecker {
    pub fn new(children: Vec<Box<dyn Checker>>) -> Self {
        MultiChecker { children }
    }
}

impl Checker for MultiChecker {
    fn process_batch(&mut self, rows: &[Vec<SqlValue>]) -> Result<(), CheckError> {
        for child in &mut self.children {
            child.process_batch(rows)?;
        }
        Ok(())
    }

    fn check_correctness(&self) -> Result<(), CheckError> {
        for child in &self.children {
            child.check_correctness()?;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Output store
// ----------------------------------------------------------------------

/// Decodes raw output batches per the output schema and feeds a checker.
pub struct OutputStore {
    layout: RowLayout,
    pool: Arc<MemoryPool>,
    checker: Arc<Mutex<Box<dyn Checker>>>,
    first_error: Arc<Mutex<Option<CheckError>>>,
}

impl OutputStore {
    pub fn new(schema: &OutputSchema, pool: Arc<MemoryPool>, checker: Box<dyn Checker>) -> Self {
        OutputStore {
            layout: layout_for(schema),
            pool,
            checker: Arc::new(Mutex::new(checker)),
            first_error: Arc::new(Mutex::new(None)),
        }
    }

    /// The callback to hand to plan execution.
    pub fn callback(&self) -> OutputCallback {
        let layout = self.layout.clone();
        let pool = Arc::clone(&self.pool);
        let checker = Arc::clone(&self.checker);
        let first_error = Arc::clone(&self.first_error);
        Box::new(move |bytes, n, tuple_size| {
            let rows: Vec<Vec<SqlValue>> = (0..n)
                .map(|i| layout.decode_row(&bytes[i * tuple_size..(i + 1) * tuple_size], &pool))
                .collect();
            if let Err(e) = checker.lock().process_batch(&rows) {
                let mut slot = first_error.lock();
                if slot.is_none() {
                    *slot = Some(e);
                }
            }
        })
    }

    /// The verdict: the first batch error if any, then the finalize check.
    pub fn finish(&self) -> Result<(), CheckError> {
        if let Some(e) = self.first_error.lock().clone() {
            return Err(e);
        }
        self.checker.lock().check_correctness()
    }
}

/// Tuple layout per the checker's type mapping: integral widths decode to
/// SqlInteger, BOOLEAN to SqlBool, DECIMAL to SqlReal, DATE to SqlDate,
/// VARCHAR to SqlStringVal.
fn layout_for(schema: &OutputSchema) -> RowLayout {
    let types = schema
        .columns()
        .iter()
        .map(|(_, t)| match t {
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => {
                SqlType::BigInt
            }
            other => *other,
        })
        .collect();
    RowLayout::new(types)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_rows(vals: &[i64]) -> Vec<Vec<SqlValue>> {
        vals.iter().map(|v| vec![SqlValue::integer(*v)]).collect()
    }

    #[test]
    fn test_num_checker() {
        let mut c = NumChecker::new(3);
        c.process_batch(&int_rows(&[1, 2])).expect("batch");
        assert!(c.check_correctness().is_err());
        c.process_batch(&int_rows(&[3])).expect("batch");
        assert!(c.check_correctness().is_ok());
    }

    #[test]
    fn test_comparison_checker() {
        let mut c = SingleIntComparisonChecker::new(CmpOp::Eq, 0, 500);
        c.process_batch(&int_rows(&[500, 500])).expect("batch");
        assert!(c.check_correctness().is_ok());
        assert!(c.process_batch(&int_rows(&[7])).is_err());
        assert!(c.check_correctness().is_err());
    }

    #[test]
    fn test_join_checker() {
        let mut c = SingleIntJoinChecker::new(0, 1);
        let good = vec![vec![SqlValue::integer(4), SqlValue::integer(4)]];
        c.process_batch(&good).expect("batch");
        assert!(c.check_correctness().is_ok());
        let bad = vec![vec![SqlValue::integer(4), SqlValue::integer(5)]];
        assert!(c.process_batch(&bad).is_err());
    }

    #[test]
    fn test_sum_checker_skips_nulls() {
        let mut c = SingleIntSumChecker::new(0, 6);
        let rows = vec![
            vec![SqlValue::integer(1)],
            vec![SqlValue::null_of(SqlType::Integer)],
            vec![SqlValue::integer(5)],
        ];
        c.process_batch(&rows).expect("batch");
        assert!(c.check_correctness().is_ok());
    }

    #[test]
    fn test_sort_checker_uses_configured_column() {
        let mut c = SingleIntSortChecker::new(1);
        let rows = vec![
            vec![SqlValue::integer(9), SqlValue::integer(1)],
            vec![SqlValue::integer(3), SqlValue::integer(2)],
        ];
        c.process_batch(&rows).expect("batch");
        assert!(c.check_correctness().is_ok());

        let bad = vec![vec![SqlValue::integer(0), SqlValue::integer(0)]];
        assert!(c.process_batch(&bad).is_err());
    }

    #[test]
    fn test_sort_checker_spans_batches() {
        let mut c = SingleIntSortChecker::new(0);
        c.process_batch(&int_rows(&[1, 2, 3])).expect("batch");
        assert!(c.process_batch(&int_rows(&[2])).is_err());
    }

    #[test]
    fn test_multi_checker_fans_out() {
        let mut c = MultiChecker::new(vec![
            Box::new(NumChecker::new(2)),
            Box::new(SingleIntSortChecker::new(0)),
        ]);
        c.process_batch(&int_rows(&[1, 5])).expect("batch");
        assert!(c.check_correctness().is_ok());

        let mut c = MultiChecker::new(vec![
            Box::new(NumChecker::new(1)),
            Box::new(SingleIntSortChecker::new(0)),
        ]);
        c.process_batch(&int_rows(&[1, 5])).expect("batch");
        assert!(matches!(
            c.check_correctness(),
            Err(CheckError::RowCountMismatch { .. })
        ));
    }

    #[test]
    fn test_generic_checker() {
        let mut c = GenericChecker::new(
            Box::new(|row| {
                if row[0].is_null() {
                    Err(CheckError::Failed("unexpected null".into()))
                } else {
                    Ok(())
                }
            }),
            Box::new(|| Ok(())),
        );
        c.process_batch(&int_rows(&[1])).expect("batch");
        assert!(c.process_batch(&[vec![SqlValue::null_of(SqlType::Integer)]]).is_err());
    }

    #[test]
    fn test_output_store_roundtrip() {
        let schema = OutputSchema::new(vec![("colA".into(), SqlType::Integer)]);
        let pool = Arc::new(MemoryPool::new());
        let store = OutputStore::new(&schema, Arc::clone(&pool), Box::new(NumChecker::new(2)));
        let mut cb = store.callback();

        let layout = layout_for(&schema);
        let mut buf = vec![0u8; layout.size() * 2];
        let size = layout.size();
        layout.encode_row(&[SqlValue::integer(10)], &mut buf[..size], &pool);
        layout.encode_row(&[SqlValue::integer(20)], &mut buf[size..], &pool);
        cb(&buf, 2, size);
        drop(cb);
        assert!(store.finish().is_ok());
    }
}
