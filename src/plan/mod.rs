//! Physical plan trees.
//!
//! A plan node is an immutable tree: each node owns its children and its
//! output schema (ordered `(name, type)` pairs). One translator instance
//! is paired with each node for the duration of a compilation; the same
//! tree also drives the runtime processor directly.

use crate::exec::row::RowLayout;
use crate::exec::table_iter::CmpOp;
use crate::value::{AggregateKind, SqlType, SqlValue};
use std::cmp::Ordering;

/// Ordered `(name, type)` pairs describing an operator's output tuples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    cols: Vec<(String, SqlType)>,
}

impl OutputSchema {
    pub fn new(cols: Vec<(String, SqlType)>) -> Self {
        OutputSchema { cols }
    }

    pub fn num_cols(&self) -> usize {
        self.cols.len()
    }

    pub fn columns(&self) -> &[(String, SqlType)] {
        &self.cols
    }

    pub fn col_type(&self, idx: usize) -> SqlType {
        self.cols[idx].1
    }

    pub fn col_types(&self) -> Vec<SqlType> {
        self.cols.iter().map(|(_, t)| *t).collect()
    }

    /// The tuple layout output batches use.
    pub fn row_layout(&self) -> RowLayout {
        RowLayout::new(self.col_types())
    }
}

/// Scalar expressions over a child's output attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanExpr {
    /// Attribute of the input row, by position.
    ColumnRef(usize),
    Constant(SqlValue),
    Compare {
        op: CmpOp,
        lhs: Box<PlanExpr>,
        rhs: Box<PlanExpr>,
    },
    Conjunction(Vec<PlanExpr>),
}

impl PlanExpr {
    pub fn col(idx: usize) -> PlanExpr {
        PlanExpr::ColumnRef(idx)
    }

    pub fn int(v: i64) -> PlanExpr {
        PlanExpr::Constant(SqlValue::integer(v))
    }

    pub fn cmp(op: CmpOp, lhs: PlanExpr, rhs: PlanExpr) -> PlanExpr {
        PlanExpr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Evaluate against one input row.
    pub fn eval(&self, row: &[SqlValue]) -> SqlValue {
        match self {
            PlanExpr::ColumnRef(idx) => row[*idx].clone(),
            PlanExpr::Constant(v) => v.clone(),
            PlanExpr::Compare { op, lhs, rhs } => {
                let l = lhs.eval(row);
                let r = rhs.eval(row);
                match l.sql_cmp(&r) {
                    Some(ord) => SqlValue::boolean(op.holds(ord)),
                    None => SqlValue::null_of(SqlType::Boolean),
                }
            }
            PlanExpr::Conjunction(parts) => {
                for p in parts {
                    if !p.eval_bool(row) {
                        return SqlValue::boolean(false);
                    }
                }
                SqlValue::boolean(true)
            }
        }
    }

    /// Truth test with SQL null collapsing to false.
    pub fn eval_bool(&self, row: &[SqlValue]) -> bool {
        match self.eval(row) {
            SqlValue::Bool(b) => b.is_true(),
            other => !other.is_null(),
        }
    }

    /// The predicate's conjuncts (a non-conjunction is one conjunct).
    pub fn conjuncts(&self) -> Vec<&PlanExpr> {
        match self {
            PlanExpr::Conjunction(parts) => parts.iter().collect(),
            other => vec![other],
        }
    }

    /// A conjunct is vectorizable when it compares one column against an
    /// integer constant. Returns `(column, op, constant)` normalized with
    /// the column on the left.
    pub fn as_vectorizable(&self) -> Option<(usize, CmpOp, i64)> {
        let PlanExpr::Compare { op, lhs, rhs } = self else {
            return None;
        };
        match (lhs.as_ref(), rhs.as_ref()) {
            (PlanExpr::ColumnRef(col), PlanExpr::Constant(c)) => {
                Some((*col, *op, c.as_integer()?))
            }
            (PlanExpr::Constant(c), PlanExpr::ColumnRef(col)) => {
                let flipped = match op {
                    CmpOp::Eq => CmpOp::Eq,
                    CmpOp::Ne => CmpOp::Ne,
                    CmpOp::Lt => CmpOp::Gt,
                    CmpOp::Le => CmpOp::Ge,
                    CmpOp::Gt => CmpOp::Lt,
                    CmpOp::Ge => CmpOp::Le,
                };
                Some((*col, flipped, c.as_integer()?))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn apply(self, ord: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

/// One aggregate term: the function and the input attribute it folds
/// (none for COUNT(*)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateTerm {
    pub kind: AggregateKind,
    pub input: Option<usize>,
}

/// Physical plan operators.
#[derive(Debug, Clone)]
pub enum PlanNode {
    SeqScan {
        table: String,
        predicate: Option<PlanExpr>,
        output: OutputSchema,
        parallel: bool,
    },
    IndexScan {
        table: String,
        index: String,
        /// Exact-match key values, in index key order.
        key: Vec<SqlValue>,
        predicate: Option<PlanExpr>,
        output: OutputSchema,
    },
    Filter {
        child: Box<PlanNode>,
        predicate: PlanExpr,
    },
    Projection {
        child: Box<PlanNode>,
        exprs: Vec<PlanExpr>,
        output: OutputSchema,
    },
    HashJoin {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        left_keys: Vec<usize>,
        right_keys: Vec<usize>,
        output: OutputSchema,
        parallel: bool,
    },
    Aggregate {
        child: Box<PlanNode>,
        group_by: Vec<usize>,
        aggregates: Vec<AggregateTerm>,
        output: OutputSchema,
        parallel: bool,
    },
    Sort {
        child: Box<PlanNode>,
        sort_keys: Vec<(usize, SortDirection)>,
        /// Top-K hint; None sorts everything.
        limit: Option<u64>,
        parallel: bool,
    },
    Output {
        child: Box<PlanNode>,
    },
}

impl PlanNode {
    pub fn children(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::SeqScan { .. } | PlanNode::IndexScan { .. } => vec![],
            PlanNode::Filter { child, .. }
            | PlanNode::Projection { child, .. }
            | PlanNode::Aggregate { child, .. }
            | PlanNode::Sort { child, .. }
            | PlanNode::Output { child } => vec![child],
            PlanNode::HashJoin { left, right, .. } => vec![left, right],
        }
    }

    /// The schema of tuples this operator emits.
    pub fn output_schema(&self) -> OutputSchema {
        match self {
            PlanNode::SeqScan { output, .. }
            | PlanNode::IndexScan { output, .. }
            | PlanNode::Projection { output, .. }
            | PlanNode::HashJoin { output, .. }
            | PlanNode::Aggregate { output, .. } => output.clone(),
            PlanNode::Filter { child, .. }
            | PlanNode::Sort { child, .. }
            | PlanNode::Output { child } => child.output_schema(),
        }
    }

    /// Pipeline breakers materialize their input before producing.
    pub fn is_pipeline_breaker(&self) -> bool {
        matches!(
            self,
            PlanNode::HashJoin { .. } | PlanNode::Aggregate { .. } | PlanNode::Sort { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_int_schema() -> OutputSchema {
        OutputSchema::new(vec![
            ("colA".into(), SqlType::Integer),
            ("colB".into(), SqlType::Integer),
        ])
    }

    #[test]
    fn test_expr_eval() {
        let row = vec![SqlValue::integer(500), SqlValue::integer(7)];
        let pred = PlanExpr::cmp(CmpOp::Eq, PlanExpr::col(0), PlanExpr::int(500));
        assert!(pred.eval_bool(&row));
        let pred = PlanExpr::cmp(CmpOp::Lt, PlanExpr::col(1), PlanExpr::int(7));
        assert!(!pred.eval_bool(&row));
    }

    #[test]
    fn test_null_comparison_is_false() {
        let row = vec![SqlValue::null_of(SqlType::Integer)];
        let pred = PlanExpr::cmp(CmpOp::Eq, PlanExpr::col(0), PlanExpr::int(0));
        assert!(!pred.eval_bool(&row));
    }

    #[test]
    fn test_vectorizable_classification() {
        let p = PlanExpr::cmp(CmpOp::Ge, PlanExpr::col(2), PlanExpr::int(10));
        assert_eq!(p.as_vectorizable(), Some((2, CmpOp::Ge, 10)));

        // constant on the left flips the operator
        let p = PlanExpr::cmp(CmpOp::Lt, PlanExpr::int(10), PlanExpr::col(2));
        assert_eq!(p.as_vectorizable(), Some((2, CmpOp::Gt, 10)));

        // column-to-column compare is not vectorizable
        let p = PlanExpr::cmp(CmpOp::Eq, PlanExpr::col(0), PlanExpr::col(1));
        assert_eq!(p.as_vectorizable(), None);
    }

    #[test]
    fn test_conjunction_splits_into_conjuncts() {
        let p = PlanExpr::Conjunction(vec![
            PlanExpr::cmp(CmpOp::Ge, PlanExpr::col(0), PlanExpr::int(1)),
            PlanExpr::cmp(CmpOp::Eq, PlanExpr::col(0), PlanExpr::col(1)),
        ]);
        assert_eq!(p.conjuncts().len(), 2);
        assert!(p.conjuncts()[0].as_vectorizable().is_some());
        assert!(p.conjuncts()[1].as_vectorizable().is_none());
    }

    #[test]
    fn test_breaker_classification() {
        let scan = PlanNode::SeqScan {
            table: "t".into(),
            predicate: None,
            output: two_int_schema(),
            parallel: false,
        };
        assert!(!scan.is_pipeline_breaker());
        let sort = PlanNode::Sort {
            child: Box::new(scan),
            sort_keys: vec![(0, SortDirection::Asc)],
            limit: None,
            parallel: false,
        };
        assert!(sort.is_pipeline_breaker());
    }

    #[test]
    fn test_schema_passthrough_for_filter_and_sort() {
        let scan = PlanNode::SeqScan {
            table: "t".into(),
            predicate: None,
            output: two_int_schema(),
            parallel: false,
        };
        let filter = PlanNode::Filter {
            child: Box::new(scan),
            predicate: PlanExpr::cmp(CmpOp::Gt, PlanExpr::col(0), PlanExpr::int(0)),
        };
        assert_eq!(filter.output_schema(), two_int_schema());
    }
}
