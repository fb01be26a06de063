//! Translator interface and the pipeline chain.
//!
//! A pipeline's translators live in a flat vector indexed by position
//! (children before parents, the head at index 0). The head drives: its
//! `produce` emits the pipeline's loop control flow and pushes each row
//! through the `consume` chain toward the root. Translators are addressed
//! by index, never by pointers into each other.

use super::codegen::CodeGen;
use crate::dsl::ast::{BinOp, ExprId, StmtId};
use crate::dsl::builtins::Builtin;
use crate::dsl::types::EngineKind;
use crate::exec::table_iter::CmpOp;
use crate::plan::PlanExpr;
use crate::value::SqlValue;

/// A query-state variable a breaker shares across pipelines. Declared in
/// the generated `main`, passed to pipeline functions as a pointer.
#[derive(Debug, Clone)]
pub struct StateVar {
    pub name: String,
    pub kind: EngineKind,
}

/// The per-row context a child hands its parent: one typed expression per
/// output attribute, plus the PCI variable when rows are still flowing
/// from a live vector (key-equality helpers read probe values through it).
pub struct RowCtx {
    pub attrs: Vec<ExprId>,
    pub pci_var: Option<String>,
}

pub trait OperatorTranslator {
    /// Query-state variables this operator owns.
    fn state_vars(&self) -> Vec<StateVar> {
        vec![]
    }

    /// Statements for the generated `main`, before any pipeline runs.
    fn setup(&mut self, _cg: &mut CodeGen) -> Vec<StmtId> {
        vec![]
    }

    /// Statements for the generated `main`, after every pipeline ran.
    fn teardown(&mut self, _cg: &mut CodeGen) -> Vec<StmtId> {
        vec![]
    }

    /// Emit the pipeline's driving control flow. Only the chain head is
    /// asked to produce.
    fn produce(&mut self, _chain: &mut TranslatorChain, _cg: &mut CodeGen) -> Vec<StmtId> {
        vec![]
    }

    /// Emit this operator's per-row body, forwarding to the parent via
    /// `chain.consume_parent(my_idx, ...)`.
    fn consume(
        &mut self,
        _chain: &mut TranslatorChain,
        _my_idx: usize,
        _cg: &mut CodeGen,
        _row: &RowCtx,
    ) -> Vec<StmtId> {
        vec![]
    }

    /// Statements closing this pipeline (breaker finalization).
    fn finalize(&mut self, _cg: &mut CodeGen) -> Vec<StmtId> {
        vec![]
    }

    /// Whether this operator materializes tuples, and whether the
    /// materialized form is a pointer into a runtime container.
    fn is_materializer(&self) -> (bool, bool) {
        (false, false)
    }
}

/// One pipeline's translators, children before parents.
pub struct TranslatorChain {
    slots: Vec<Option<Box<dyn OperatorTranslator>>>,
}

impl TranslatorChain {
    pub fn new(translators: Vec<Box<dyn OperatorTranslator>>) -> Self {
        TranslatorChain {
            slots: translators.into_iter().map(Some).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drive the pipeline: the head produces, the tail finalizes. A slot
    /// that is mid-call (re-entered) contributes nothing.
    pub fn drive(&mut self, cg: &mut CodeGen) -> Vec<StmtId> {
        if self.slots.is_empty() {
            return vec![];
        }
        let Some(mut head) = self.slots[0].take() else {
            return vec![];
        };
        let mut stmts = head.produce(self, cg);
        self.slots[0] = Some(head);

        let tail = self.slots.len() - 1;
        let Some(mut last) = self.slots[tail].take() else {
            return stmts;
        };
        stmts.extend(last.finalize(cg));
        self.slots[tail] = Some(last);
        stmts
    }

    /// Hand one row to the parent of the translator at `my_idx`.
    pub fn consume_parent(
        &mut self,
        my_idx: usize,
        cg: &mut CodeGen,
        row: &RowCtx,
    ) -> Vec<StmtId> {
        let idx = my_idx + 1;
        if idx >= self.slots.len() {
            return vec![];
        }
        let Some(mut t) = self.slots[idx].take() else {
            return vec![];
        };
        let stmts = t.consume(self, idx, cg, row);
        self.slots[idx] = Some(t);
        stmts
    }

    /// Collect the state/setup/teardown contributions of every translator.
    pub fn state_vars(&self) -> Vec<StateVar> {
        self.slots
            .iter()
            .flatten()
            .flat_map(|t| t.state_vars())
            .collect()
    }

    pub fn setup(&mut self, cg: &mut CodeGen) -> Vec<StmtId> {
        let mut stmts = Vec::new();
        for i in 0..self.slots.len() {
            if let Some(mut t) = self.slots[i].take() {
                stmts.extend(t.setup(cg));
                self.slots[i] = Some(t);
            }
        }
        stmts
    }

    pub fn teardown(&mut self, cg: &mut CodeGen) -> Vec<StmtId> {
        let mut stmts = Vec::new();
        for i in 0..self.slots.len() {
            if let Some(mut t) = self.slots[i].take() {
                stmts.extend(t.teardown(cg));
                self.slots[i] = Some(t);
            }
        }
        stmts
    }
}

/// Lower a scalar plan expression over the child's attribute expressions.
/// Comparisons over SQL values yield SqlBool; conjunctions combine the
/// truth-tested parts.
pub fn translate_scalar(cg: &mut CodeGen, expr: &PlanExpr, row: &RowCtx) -> ExprId {
    match expr {
        PlanExpr::ColumnRef(idx) => row.attrs[*idx],
        PlanExpr::Constant(v) => translate_constant(cg, v),
        PlanExpr::Compare { op, lhs, rhs } => {
            let l = translate_scalar(cg, lhs, row);
            let r = translate_scalar(cg, rhs, row);
            cg.binary(cmp_to_binop(*op), l, r)
        }
        PlanExpr::Conjunction(parts) => {
            let mut result: Option<ExprId> = None;
            for p in parts {
                let cond = translate_scalar(cg, p, row);
                let cond = cg.call(Builtin::SqlToBool, vec![cond]);
                result = Some(match result {
                    Some(acc) => cg.binary(BinOp::And, acc, cond),
                    None => cond,
                });
            }
            result.unwrap_or_else(|| cg.bool_lit(true))
        }
    }
}

/// Lower a constant into the SQL-value conversion call producing it.
pub fn translate_constant(cg: &mut CodeGen, v: &SqlValue) -> ExprId {
    match v {
        SqlValue::Integer(i) => {
            let lit = cg.int_lit(i.val);
            cg.call(Builtin::IntToSql, vec![lit])
        }
        SqlValue::Real(r) => {
            let lit = cg.float_lit(r.val);
            cg.call(Builtin::FloatToSql, vec![lit])
        }
        SqlValue::Bool(b) => {
            let lit = cg.bool_lit(b.val);
            cg.call(Builtin::BoolToSql, vec![lit])
        }
        // date/string constants do not appear in compiled predicates
        _ => {
            let lit = cg.int_lit(0);
            cg.call(Builtin::IntToSql, vec![lit])
        }
    }
}

pub fn cmp_to_binop(op: CmpOp) -> BinOp {
    match op {
        CmpOp::Eq => BinOp::Eq,
        CmpOp::Ne => BinOp::Ne,
        CmpOp::Lt => BinOp::Lt,
        CmpOp::Le => BinOp::Le,
        CmpOp::Gt => BinOp::Gt,
        CmpOp::Ge => BinOp::Ge,
    }
}

/// The vectorized filter intrinsic for a comparison operator.
pub fn filter_builtin(op: CmpOp) -> Builtin {
    match op {
        CmpOp::Eq => Builtin::FilterEq,
        CmpOp::Ne => Builtin::FilterNe,
        CmpOp::Lt => Builtin::FilterLt,
        CmpOp::Le => Builtin::FilterLe,
        CmpOp::Gt => Builtin::FilterGt,
        CmpOp::Ge => Builtin::FilterGe,
    }
}
