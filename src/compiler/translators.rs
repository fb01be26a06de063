//! One translator per physical operator kind.
//!
//! Conventions shared by every translator: the enclosing pipeline function
//! receives `exec_ctx: *ExecutionContext` plus every query-state variable
//! as a pointer parameter named after the variable; the generated `main`
//! owns the state by value, so setup/teardown there address it with `&`.

use super::codegen::CodeGen;
use super::translator::{
    filter_builtin, translate_constant, translate_scalar, OperatorTranslator, RowCtx, StateVar,
    TranslatorChain,
};
use crate::dsl::ast::{BinOp, ExprId, StmtId};
use crate::dsl::builtins::Builtin;
use crate::dsl::types::EngineKind;
use crate::exec::row::CELL_SIZE;
use crate::plan::{AggregateTerm, PlanExpr, SortDirection};
use crate::value::{AggregateKind, SqlType, SqlValue};

/// Parameter name of the execution context in every generated function.
pub const EXEC_CTX: &str = "exec_ctx";
/// Memory pool local in the generated `main`.
pub const MEM_POOL: &str = "mem_pool";
/// Thread-state container shared by parallel finalizers.
pub const TLS_VAR: &str = "tls";

fn cell_offset(idx: usize) -> i64 {
    (idx * CELL_SIZE) as i64
}

/// Declare per-attribute locals from typed getter calls and return their
/// ident expressions.
fn bind_attrs(cg: &mut CodeGen, values: Vec<(String, ExprId)>, out: &mut Vec<StmtId>) -> Vec<ExprId> {
    let mut attrs = Vec::with_capacity(values.len());
    for (name, init) in values {
        out.push(cg.decl(name.clone(), None, Some(init)));
        attrs.push(cg.ident(name));
    }
    attrs
}

// ======================================================================
// Sequential scan
// ======================================================================

pub struct SeqScanTranslator {
    table: String,
    predicate: Option<PlanExpr>,
    col_types: Vec<SqlType>,
}

impl SeqScanTranslator {
    pub fn new(table: String, predicate: Option<PlanExpr>, col_types: Vec<SqlType>) -> Self {
        SeqScanTranslator { table, predicate, col_types }
    }

    /// Split the predicate into vectorizable `(col, op, const)` conjuncts
    /// and the scalar rest.
    fn classify(&self) -> (Vec<(usize, crate::exec::table_iter::CmpOp, i64)>, Vec<PlanExpr>) {
        let mut vector = Vec::new();
        let mut scalar = Vec::new();
        if let Some(pred) = &self.predicate {
            for conjunct in pred.conjuncts() {
                match conjunct.as_vectorizable() {
                    Some(v) => vector.push(v),
                    None => scalar.push(conjunct.clone()),
                }
            }
        }
        (vector, scalar)
    }
}

impl OperatorTranslator for SeqScanTranslator {
    fn produce(&mut self, chain: &mut TranslatorChain, cg: &mut CodeGen) -> Vec<StmtId> {
        let (vector, scalar) = self.classify();
        let tvi = cg.fresh("tvi");
        let fm = cg.fresh("fm");
        let pci = cg.fresh("pci");
        let mut stmts = Vec::new();

        // var tvi: TableVectorIterator; @tableIterInit(&tvi, "t", exec_ctx)
        stmts.push(cg.decl_engine(&tvi, EngineKind::TableVectorIterator));
        let tvi_ref = {
            let id = cg.ident(&tvi);
            cg.addr_of(id)
        };
        let name = cg.str_lit(self.table.clone());
        let ctx = cg.ident(EXEC_CTX);
        let init = cg.call(Builtin::TableIterInit, vec![tvi_ref, name, ctx]);
        stmts.push(cg.expr_stmt(init));

        // vectorizable conjuncts become filter-manager clauses
        if !vector.is_empty() {
            stmts.push(cg.decl_engine(&fm, EngineKind::FilterManager));
            let fm_ref = {
                let id = cg.ident(&fm);
                cg.addr_of(id)
            };
            let init = cg.call(Builtin::FilterManagerInit, vec![fm_ref]);
            stmts.push(cg.expr_stmt(init));

            let mut insert_args = vec![{
                let id = cg.ident(&fm);
                cg.addr_of(id)
            }];
            for (col, op, val) in &vector {
                let fname = cg.fresh("filter_clause");
                let pci_ty = {
                    let base = cg.types.engine(EngineKind::ProjectedColumnsIterator);
                    cg.types.pointer_to(base)
                };
                let ret = cg.types.int32();
                let body = {
                    let p = cg.ident("pci");
                    let c = cg.int_lit(*col as i64);
                    let v = cg.int_lit(*val);
                    let call = cg.call(filter_builtin(*op), vec![p, c, v]);
                    vec![cg.ret(Some(call))]
                };
                cg.function(fname.clone(), vec![("pci".to_string(), pci_ty)], ret, body);
                insert_args.push(cg.ident(fname));
            }
            let insert = cg.call(Builtin::FilterManagerInsertFilter, insert_args);
            stmts.push(cg.expr_stmt(insert));
            let fm_ref = {
                let id = cg.ident(&fm);
                cg.addr_of(id)
            };
            let fin = cg.call(Builtin::FilterManagerFinalize, vec![fm_ref]);
            stmts.push(cg.expr_stmt(fin));
        }

        // per-vector body
        let mut vec_body = Vec::new();
        let get_pci = {
            let id = cg.ident(&tvi);
            let r = cg.addr_of(id);
            cg.call(Builtin::TableIterGetPCI, vec![r])
        };
        vec_body.push(cg.decl(&pci, None, Some(get_pci)));
        if !vector.is_empty() {
            let fm_ref = {
                let id = cg.ident(&fm);
                cg.addr_of(id)
            };
            let p = cg.ident(&pci);
            let run = cg.call(Builtin::FilterManagerRunFilters, vec![fm_ref, p]);
            vec_body.push(cg.expr_stmt(run));
            let p = cg.ident(&pci);
            let reset = cg.call(Builtin::PCIResetFiltered, vec![p]);
            vec_body.push(cg.expr_stmt(reset));
        }

        // per-row body
        let mut row_body = Vec::new();
        let bindings: Vec<(String, ExprId)> = self
            .col_types
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                let p = cg.ident(&pci);
                let idx = cg.int_lit(i as i64);
                (cg.fresh("attr"), cg.call(CodeGen::pci_getter(*ty), vec![p, idx]))
            })
            .collect();
        let attrs = bind_attrs(cg, bindings, &mut row_body);
        let row = RowCtx { attrs, pci_var: Some(pci.clone()) };

        let inner = chain.consume_parent(0, cg, &row);
        if scalar.is_empty() {
            row_body.extend(inner);
        } else {
            let pred = if scalar.len() == 1 {
                scalar[0].clone()
            } else {
                PlanExpr::Conjunction(scalar)
            };
            let cond = translate_scalar(cg, &pred, &row);
            row_body.push(cg.if_stmt(cond, inner));
        }

        // row loop, filtered when a filter manager ran
        let (has_next, advance) = if vector.is_empty() {
            (Builtin::PCIHasNext, Builtin::PCIAdvance)
        } else {
            (Builtin::PCIHasNextFiltered, Builtin::PCIAdvanceFiltered)
        };
        let p = cg.ident(&pci);
        let adv = cg.call(advance, vec![p]);
        row_body.push(cg.expr_stmt(adv));
        let p = cg.ident(&pci);
        let cond = cg.call(has_next, vec![p]);
        vec_body.push(cg.while_stmt(cond, row_body));

        // outer loop over vectors
        let tvi_ref = {
            let id = cg.ident(&tvi);
            cg.addr_of(id)
        };
        let cond = cg.call(Builtin::TableIterAdvance, vec![tvi_ref]);
        stmts.push(cg.while_stmt(cond, vec_body));

        let tvi_ref = {
            let id = cg.ident(&tvi);
            cg.addr_of(id)
        };
        let close = cg.call(Builtin::TableIterClose, vec![tvi_ref]);
        stmts.push(cg.expr_stmt(close));
        stmts
    }

    fn is_materializer(&self) -> (bool, bool) {
        (true, true)
    }
}

// ======================================================================
// Index scan
// ======================================================================

pub struct IndexScanTranslator {
    index: String,
    key: Vec<SqlValue>,
    predicate: Option<PlanExpr>,
    col_types: Vec<SqlType>,
}

impl IndexScanTranslator {
    pub fn new(
        index: String,
        key: Vec<SqlValue>,
        predicate: Option<PlanExpr>,
        col_types: Vec<SqlType>,
    ) -> Self {
        IndexScanTranslator { index, key, predicate, col_types }
    }
}

impl OperatorTranslator for IndexScanTranslator {
    fn produce(&mut self, chain: &mut TranslatorChain, cg: &mut CodeGen) -> Vec<StmtId> {
        let it = cg.fresh("index_iter");
        let key_row = cg.fresh("key_row");
        let row = cg.fresh("row");
        let mut stmts = Vec::new();

        stmts.push(cg.decl_engine(&it, EngineKind::IndexIterator));
        let it_ref = {
            let id = cg.ident(&it);
            cg.addr_of(id)
        };
        let name = cg.str_lit(self.index.clone());
        let ctx = cg.ident(EXEC_CTX);
        let init = cg.call(Builtin::IndexIteratorInit, vec![it_ref, name, ctx]);
        stmts.push(cg.expr_stmt(init));

        // fill the key projection, then position the iterator
        let get_key = {
            let id = cg.ident(&it);
            let r = cg.addr_of(id);
            cg.call(Builtin::IndexIteratorGetKeyRow, vec![r])
        };
        stmts.push(cg.decl(&key_row, None, Some(get_key)));
        for (i, v) in self.key.clone().iter().enumerate() {
            let kr = cg.ident(&key_row);
            let off = cg.int_lit(cell_offset(i));
            let val = translate_constant(cg, v);
            let write = cg.call(CodeGen::row_writer(v.sql_type()), vec![kr, off, val]);
            stmts.push(cg.expr_stmt(write));
        }
        let it_ref = {
            let id = cg.ident(&it);
            cg.addr_of(id)
        };
        let kr = cg.ident(&key_row);
        let buf = cg.ptr_cast("int8", kr);
        let scan = cg.call(Builtin::IndexIteratorScanKey, vec![it_ref, buf]);
        stmts.push(cg.expr_stmt(scan));

        // iterate matches
        let mut body = Vec::new();
        let get_row = {
            let id = cg.ident(&it);
            let r = cg.addr_of(id);
            cg.call(Builtin::IndexIteratorGetRow, vec![r])
        };
        body.push(cg.decl(&row, None, Some(get_row)));
        let bindings: Vec<(String, ExprId)> = self
            .col_types
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                let r = cg.ident(&row);
                let off = cg.int_lit(cell_offset(i));
                (cg.fresh("attr"), cg.call(CodeGen::row_reader(*ty), vec![r, off]))
            })
            .collect();
        let attrs = bind_attrs(cg, bindings, &mut body);
        let row_ctx = RowCtx { attrs, pci_var: None };

        let inner = chain.consume_parent(0, cg, &row_ctx);
        match self.predicate.clone() {
            Some(pred) => {
                let cond = translate_scalar(cg, &pred, &row_ctx);
                body.push(cg.if_stmt(cond, inner));
            }
            None => body.extend(inner),
        }

        let it_ref = {
            let id = cg.ident(&it);
            cg.addr_of(id)
        };
        let cond = cg.call(Builtin::IndexIteratorAdvance, vec![it_ref]);
        stmts.push(cg.while_stmt(cond, body));

        let it_ref = {
            let id = cg.ident(&it);
            cg.addr_of(id)
        };
        let free = cg.call(Builtin::IndexIteratorFree, vec![it_ref]);
        stmts.push(cg.expr_stmt(free));
        stmts
    }

    fn is_materializer(&self) -> (bool, bool) {
        (true, true)
    }
}

// ======================================================================
// Filter and projection
// ======================================================================

pub struct FilterTranslator {
    predicate: PlanExpr,
}

impl FilterTranslator {
    pub fn new(predicate: PlanExpr) -> Self {
        FilterTranslator { predicate }
    }
}

impl OperatorTranslator for FilterTranslator {
    fn consume(
        &mut self,
        chain: &mut TranslatorChain,
        my_idx: usize,
        cg: &mut CodeGen,
        row: &RowCtx,
    ) -> Vec<StmtId> {
        let inner = chain.consume_parent(my_idx, cg, row);
        let cond = translate_scalar(cg, &self.predicate.clone(), row);
        vec![cg.if_stmt(cond, inner)]
    }
}

pub struct ProjectionTranslator {
    exprs: Vec<PlanExpr>,
}

impl ProjectionTranslator {
    pub fn new(exprs: Vec<PlanExpr>) -> Self {
        ProjectionTranslator { exprs }
    }
}

impl OperatorTranslator for ProjectionTranslator {
    fn consume(
        &mut self,
        chain: &mut TranslatorChain,
        my_idx: usize,
        cg: &mut CodeGen,
        row: &RowCtx,
    ) -> Vec<StmtId> {
        let mut stmts = Vec::new();
        let bindings: Vec<(String, ExprId)> = self
            .exprs
            .clone()
            .iter()
            .map(|e| (cg.fresh("proj"), translate_scalar(cg, e, row)))
            .collect();
        let attrs = bind_attrs(cg, bindings, &mut stmts);
        let out = RowCtx { attrs, pci_var: row.pci_var.clone() };
        stmts.extend(chain.consume_parent(my_idx, cg, &out));
        stmts
    }
}

// ======================================================================
// Hash join
// ======================================================================

pub struct JoinBuildTranslator {
    jht: String,
    build_types: Vec<SqlType>,
    key_cols: Vec<usize>,
    parallel: bool,
}

impl JoinBuildTranslator {
    pub fn new(jht: String, build_types: Vec<SqlType>, key_cols: Vec<usize>, parallel: bool) -> Self {
        JoinBuildTranslator { jht, build_types, key_cols, parallel }
    }
}

impl OperatorTranslator for JoinBuildTranslator {
    fn state_vars(&self) -> Vec<StateVar> {
        vec![StateVar { name: self.jht.clone(), kind: EngineKind::JoinHashTable }]
    }

    fn setup(&mut self, cg: &mut CodeGen) -> Vec<StmtId> {
        let jht_ref = {
            let id = cg.ident(&self.jht);
            cg.addr_of(id)
        };
        let pool = cg.ident(MEM_POOL);
        let size = cg.int_lit((self.build_types.len() * CELL_SIZE) as i64);
        let init = cg.call(Builtin::JoinHashTableInit, vec![jht_ref, pool, size]);
        vec![cg.expr_stmt(init)]
    }

    fn teardown(&mut self, cg: &mut CodeGen) -> Vec<StmtId> {
        let jht_ref = {
            let id = cg.ident(&self.jht);
            cg.addr_of(id)
        };
        let free = cg.call(Builtin::JoinHashTableFree, vec![jht_ref]);
        vec![cg.expr_stmt(free)]
    }

    fn consume(
        &mut self,
        _chain: &mut TranslatorChain,
        _my_idx: usize,
        cg: &mut CodeGen,
        row: &RowCtx,
    ) -> Vec<StmtId> {
        let mut stmts = Vec::new();
        let hash_var = cg.fresh("hash_val");
        let row_var = cg.fresh("build_row");

        let key_args: Vec<ExprId> = self.key_cols.iter().map(|k| row.attrs[*k]).collect();
        let hash = cg.call(Builtin::Hash, key_args);
        stmts.push(cg.decl(&hash_var, None, Some(hash)));

        let jht = cg.ident(&self.jht);
        let h = cg.ident(&hash_var);
        let insert = cg.call(Builtin::JoinHashTableInsert, vec![jht, h]);
        stmts.push(cg.decl(&row_var, None, Some(insert)));

        for (i, ty) in self.build_types.clone().iter().enumerate() {
            let r = cg.ident(&row_var);
            let off = cg.int_lit(cell_offset(i));
            let write = cg.call(CodeGen::row_writer(*ty), vec![r, off, row.attrs[i]]);
            stmts.push(cg.expr_stmt(write));
        }
        stmts
    }

    fn finalize(&mut self, cg: &mut CodeGen) -> Vec<StmtId> {
        let jht = cg.ident(&self.jht);
        let call = if self.parallel {
            let tls = cg.ident(TLS_VAR);
            let off = cg.int_lit(0);
            cg.call(Builtin::JoinHashTableBuildParallel, vec![jht, tls, off])
        } else {
            cg.call(Builtin::JoinHashTableBuild, vec![jht])
        };
        vec![cg.expr_stmt(call)]
    }

    fn is_materializer(&self) -> (bool, bool) {
        (true, true)
    }
}

pub struct JoinProbeTranslator {
    jht: String,
    build_types: Vec<SqlType>,
    build_key_cols: Vec<usize>,
    probe_key_cols: Vec<usize>,
    probe_key_types: Vec<SqlType>,
}

impl JoinProbeTranslator {
    pub fn new(
        jht: String,
        build_types: Vec<SqlType>,
        build_key_cols: Vec<usize>,
        probe_key_cols: Vec<usize>,
        probe_key_types: Vec<SqlType>,
    ) -> Self {
        JoinProbeTranslator {
            jht,
            build_types,
            build_key_cols,
            probe_key_cols,
            probe_key_types,
        }
    }

    /// `(ctx, probe, entry) -> bool` helper comparing probe-side keys read
    /// through the live PCI against the materialized build row.
    fn emit_key_eq(&self, cg: &mut CodeGen, probe_from_pci: bool) -> String {
        let name = cg.fresh("join_key_eq");
        let u8p = cg.types.byte_ptr();
        let params = vec![
            ("ctx".to_string(), u8p),
            ("probe".to_string(), u8p),
            ("entry".to_string(), u8p),
        ];
        let ret = cg.types.bool_ty();
        let mut body = Vec::new();
        if probe_from_pci {
            let probe = cg.ident("probe");
            let pci = cg.ptr_cast("ProjectedColumnsIterator", probe);
            body.push(cg.decl("pci", None, Some(pci)));
            for ((pk, bk), ty) in self
                .probe_key_cols
                .iter()
                .zip(self.build_key_cols.iter())
                .zip(self.probe_key_types.iter())
            {
                let p = cg.ident("pci");
                let pidx = cg.int_lit(*pk as i64);
                let probe_val = cg.call(CodeGen::pci_getter(*ty), vec![p, pidx]);
                let e = cg.ident("entry");
                let off = cg.int_lit(cell_offset(*bk));
                let entry_val =
                    cg.call(CodeGen::row_reader(self.build_types[*bk]), vec![e, off]);
                let eq = cg.binary(BinOp::Eq, probe_val, entry_val);
                let eq = cg.call(Builtin::SqlToBool, vec![eq]);
                let cond = cg.not(eq);
                let f = cg.bool_lit(false);
                let ret_false = cg.ret(Some(f));
                body.push(cg.if_stmt(cond, vec![ret_false]));
            }
        }
        let t = cg.bool_lit(true);
        body.push(cg.ret(Some(t)));
        cg.function(name.clone(), params, ret, body);
        name
    }
}

impl OperatorTranslator for JoinProbeTranslator {
    fn consume(
        &mut self,
        chain: &mut TranslatorChain,
        my_idx: usize,
        cg: &mut CodeGen,
        row: &RowCtx,
    ) -> Vec<StmtId> {
        let mut stmts = Vec::new();
        let hash_var = cg.fresh("hash_val");
        let iter_var = cg.fresh("join_iter");
        let row_var = cg.fresh("build_row");

        let key_args: Vec<ExprId> = self.probe_key_cols.iter().map(|k| row.attrs[*k]).collect();
        let hash = cg.call(Builtin::Hash, key_args);
        stmts.push(cg.decl(&hash_var, None, Some(hash)));

        stmts.push(cg.decl_engine(&iter_var, EngineKind::JoinHashTableIterator));
        let it_ref = {
            let id = cg.ident(&iter_var);
            cg.addr_of(id)
        };
        let jht = cg.ident(&self.jht);
        let h = cg.ident(&hash_var);
        let init = cg.call(Builtin::JoinHashTableIterInit, vec![it_ref, jht, h]);
        stmts.push(cg.expr_stmt(init));

        let eq_fn = self.emit_key_eq(cg, row.pci_var.is_some());

        // match loop
        let mut body = Vec::new();
        let get_row = {
            let id = cg.ident(&iter_var);
            let r = cg.addr_of(id);
            cg.call(Builtin::JoinHashTableIterGetRow, vec![r])
        };
        body.push(cg.decl(&row_var, None, Some(get_row)));
        let bindings: Vec<(String, ExprId)> = self
            .build_types
            .clone()
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                let r = cg.ident(&row_var);
                let off = cg.int_lit(cell_offset(i));
                (cg.fresh("attr"), cg.call(CodeGen::row_reader(*ty), vec![r, off]))
            })
            .collect();
        let mut attrs = bind_attrs(cg, bindings, &mut body);
        attrs.extend(row.attrs.iter().copied());
        let out = RowCtx { attrs, pci_var: None };
        body.extend(chain.consume_parent(my_idx, cg, &out));

        let it_ref = {
            let id = cg.ident(&iter_var);
            cg.addr_of(id)
        };
        let eq = cg.ident(eq_fn);
        let ctx = {
            let e = cg.ident(EXEC_CTX);
            cg.ptr_cast("uint8", e)
        };
        let probe = match &row.pci_var {
            Some(pci) => {
                let p = cg.ident(pci.clone());
                cg.ptr_cast("uint8", p)
            }
            None => {
                let e = cg.ident(EXEC_CTX);
                cg.ptr_cast("uint8", e)
            }
        };
        let cond = cg.call(Builtin::JoinHashTableIterHasNext, vec![it_ref, eq, ctx, probe]);
        stmts.push(cg.while_stmt(cond, body));

        let it_ref = {
            let id = cg.ident(&iter_var);
            cg.addr_of(id)
        };
        let close = cg.call(Builtin::JoinHashTableIterClose, vec![it_ref]);
        stmts.push(cg.expr_stmt(close));
        stmts
    }
}

// ======================================================================
// Aggregation
// ======================================================================

/// Grouped aggregation payload: the aggregator state heads the payload
/// (two reserved cells, enough for the widest accumulator), group keys
/// follow one cell each.
fn agg_key_offset(i: usize) -> i64 {
    cell_offset(i + crate::exec::agg_ht::AGG_STATE_CELLS)
}

pub struct AggBuildTranslator {
    /// Hash-table name for grouped aggregation, aggregator state names for
    /// the global (no-group-by) form.
    aht: Option<String>,
    agg_vars: Vec<String>,
    group_by: Vec<usize>,
    group_types: Vec<SqlType>,
    aggregates: Vec<AggregateTerm>,
}

impl AggBuildTranslator {
    pub fn new(
        aht: Option<String>,
        agg_vars: Vec<String>,
        group_by: Vec<usize>,
        group_types: Vec<SqlType>,
        aggregates: Vec<AggregateTerm>,
    ) -> Self {
        AggBuildTranslator { aht, agg_vars, group_by, group_types, aggregates }
    }

    fn grouped_agg_kind(&self) -> EngineKind {
        CodeGen::aggregator_kind(self.aggregates[0].kind)
    }

    /// `(entry, probe) -> bool` key check for the hash-table lookup.
    fn emit_key_eq(&self, cg: &mut CodeGen, probe_from_pci: bool) -> String {
        let name = cg.fresh("agg_key_eq");
        let u8p = cg.types.byte_ptr();
        let params = vec![("entry".to_string(), u8p), ("probe".to_string(), u8p)];
        let ret = cg.types.bool_ty();
        let mut body = Vec::new();
        if probe_from_pci {
            let probe = cg.ident("probe");
            let pci = cg.ptr_cast("ProjectedColumnsIterator", probe);
            body.push(cg.decl("pci", None, Some(pci)));
            for (i, (col, ty)) in self.group_by.iter().zip(self.group_types.iter()).enumerate() {
                let p = cg.ident("pci");
                let pidx = cg.int_lit(*col as i64);
                let probe_val = cg.call(CodeGen::pci_getter(*ty), vec![p, pidx]);
                let e = cg.ident("entry");
                let off = cg.int_lit(agg_key_offset(i));
                let entry_val = cg.call(CodeGen::row_reader(*ty), vec![e, off]);
                let eq = cg.binary(BinOp::Eq, probe_val, entry_val);
                let eq = cg.call(Builtin::SqlToBool, vec![eq]);
                let cond = cg.not(eq);
                let f = cg.bool_lit(false);
                let ret_false = cg.ret(Some(f));
                body.push(cg.if_stmt(cond, vec![ret_false]));
            }
        }
        let t = cg.bool_lit(true);
        body.push(cg.ret(Some(t)));
        cg.function(name.clone(), params, ret, body);
        name
    }

    fn consume_global(&mut self, cg: &mut CodeGen, row: &RowCtx) -> Vec<StmtId> {
        let mut stmts = Vec::new();
        for (var, term) in self.agg_vars.clone().iter().zip(self.aggregates.clone().iter()) {
            let in_var = cg.fresh("agg_in");
            let input = match term.input {
                Some(col) => row.attrs[col],
                None => {
                    let z = cg.int_lit(0);
                    cg.call(Builtin::IntToSql, vec![z])
                }
            };
            stmts.push(cg.decl(&in_var, None, Some(input)));
            let agg = cg.ident(var);
            let iv = cg.ident(&in_var);
            let in_ref = cg.addr_of(iv);
            let adv = cg.call(Builtin::AggAdvance, vec![agg, in_ref]);
            stmts.push(cg.expr_stmt(adv));
        }
        stmts
    }

    fn consume_grouped(&mut self, cg: &mut CodeGen, row: &RowCtx) -> Vec<StmtId> {
        let aht = self.aht.clone().unwrap_or_default();
        let agg_kind = self.grouped_agg_kind();
        let mut stmts = Vec::new();
        let hash_var = cg.fresh("hash_val");
        let payload = cg.fresh("payload");

        let key_args: Vec<ExprId> = self.group_by.iter().map(|k| row.attrs[*k]).collect();
        let hash = cg.call(Builtin::Hash, key_args);
        stmts.push(cg.decl(&hash_var, None, Some(hash)));

        let eq_fn = self.emit_key_eq(cg, row.pci_var.is_some());
        let a = cg.ident(&aht);
        let h = cg.ident(&hash_var);
        let eq = cg.ident(eq_fn);
        let probe = match &row.pci_var {
            Some(pci) => {
                let p = cg.ident(pci.clone());
                cg.ptr_cast("uint8", p)
            }
            None => {
                let e = cg.ident(EXEC_CTX);
                cg.ptr_cast("uint8", e)
            }
        };
        let lookup = cg.call(Builtin::AggHashTableLookup, vec![a, h, eq, probe]);
        stmts.push(cg.decl(&payload, None, Some(lookup)));

        // miss: allocate, write keys, init the aggregator
        let mut miss = Vec::new();
        let a = cg.ident(&aht);
        let h = cg.ident(&hash_var);
        let insert = cg.call(Builtin::AggHashTableInsert, vec![a, h]);
        let p = cg.ident(&payload);
        miss.push(cg.assign(p, insert));
        for (i, (col, ty)) in self.group_by.iter().zip(self.group_types.iter()).enumerate() {
            let p = cg.ident(&payload);
            let off = cg.int_lit(agg_key_offset(i));
            let write = cg.call(CodeGen::row_writer(*ty), vec![p, off, row.attrs[*col]]);
            miss.push(cg.expr_stmt(write));
        }
        let p = cg.ident(&payload);
        let agg_ptr = cg.ptr_cast(agg_kind.name(), p);
        let init = cg.call(Builtin::AggInit, vec![agg_ptr]);
        miss.push(cg.expr_stmt(init));

        let p = cg.ident(&payload);
        let nil = cg.nil_lit();
        let is_miss = cg.binary(BinOp::Eq, p, nil);
        stmts.push(cg.if_stmt(is_miss, miss));

        // advance
        let in_var = cg.fresh("agg_in");
        let input = match self.aggregates[0].input {
            Some(col) => row.attrs[col],
            None => {
                let z = cg.int_lit(0);
                cg.call(Builtin::IntToSql, vec![z])
            }
        };
        stmts.push(cg.decl(&in_var, None, Some(input)));
        let p = cg.ident(&payload);
        let agg_ptr = cg.ptr_cast(agg_kind.name(), p);
        let iv = cg.ident(&in_var);
        let in_ref = cg.addr_of(iv);
        let adv = cg.call(Builtin::AggAdvance, vec![agg_ptr, in_ref]);
        stmts.push(cg.expr_stmt(adv));
        stmts
    }
}

impl OperatorTranslator for AggBuildTranslator {
    fn state_vars(&self) -> Vec<StateVar> {
        match &self.aht {
            Some(aht) => vec![StateVar { name: aht.clone(), kind: EngineKind::AggregationHashTable }],
            None => self
                .agg_vars
                .iter()
                .zip(self.aggregates.iter())
                .map(|(name, term)| StateVar {
                    name: name.clone(),
                    kind: CodeGen::aggregator_kind(term.kind),
                })
                .collect(),
        }
    }

    fn setup(&mut self, cg: &mut CodeGen) -> Vec<StmtId> {
        match self.aht.clone() {
            Some(aht) => {
                let a = {
                    let id = cg.ident(&aht);
                    cg.addr_of(id)
                };
                let pool = cg.ident(MEM_POOL);
                let cells = self.group_by.len() + crate::exec::agg_ht::AGG_STATE_CELLS;
                let size = cg.int_lit((cells * CELL_SIZE) as i64);
                let init = cg.call(Builtin::AggHashTableInit, vec![a, pool, size]);
                vec![cg.expr_stmt(init)]
            }
            None => {
                let refs: Vec<ExprId> = self
                    .agg_vars
                    .clone()
                    .iter()
                    .map(|v| {
                        let id = cg.ident(v);
                        cg.addr_of(id)
                    })
                    .collect();
                let init = cg.call(Builtin::AggInit, refs);
                vec![cg.expr_stmt(init)]
            }
        }
    }

    fn teardown(&mut self, cg: &mut CodeGen) -> Vec<StmtId> {
        match self.aht.clone() {
            Some(aht) => {
                let a = {
                    let id = cg.ident(&aht);
                    cg.addr_of(id)
                };
                let free = cg.call(Builtin::AggHashTableFree, vec![a]);
                vec![cg.expr_stmt(free)]
            }
            None => vec![],
        }
    }

    fn consume(
        &mut self,
        _chain: &mut TranslatorChain,
        _my_idx: usize,
        cg: &mut CodeGen,
        row: &RowCtx,
    ) -> Vec<StmtId> {
        if self.aht.is_some() {
            self.consume_grouped(cg, row)
        } else {
            self.consume_global(cg, row)
        }
    }

    fn is_materializer(&self) -> (bool, bool) {
        (true, true)
    }
}

pub struct AggScanTranslator {
    aht: Option<String>,
    agg_vars: Vec<String>,
    group_types: Vec<SqlType>,
    agg_kinds: Vec<AggregateKind>,
}

impl AggScanTranslator {
    pub fn new(
        aht: Option<String>,
        agg_vars: Vec<String>,
        group_types: Vec<SqlType>,
        agg_kinds: Vec<AggregateKind>,
    ) -> Self {
        AggScanTranslator { aht, agg_vars, group_types, agg_kinds }
    }
}

impl OperatorTranslator for AggScanTranslator {
    fn produce(&mut self, chain: &mut TranslatorChain, cg: &mut CodeGen) -> Vec<StmtId> {
        match self.aht.clone() {
            None => {
                // single result row from the global aggregators
                let mut stmts = Vec::new();
                let bindings: Vec<(String, ExprId)> = self
                    .agg_vars
                    .clone()
                    .iter()
                    .map(|v| {
                        let agg = cg.ident(v);
                        (cg.fresh("agg_res"), cg.call(Builtin::AggResult, vec![agg]))
                    })
                    .collect();
                let attrs = bind_attrs(cg, bindings, &mut stmts);
                let row = RowCtx { attrs, pci_var: None };
                stmts.extend(chain.consume_parent(0, cg, &row));
                stmts
            }
            Some(aht) => {
                let iter_var = cg.fresh("agg_iter");
                let row_var = cg.fresh("row");
                let agg_kind = CodeGen::aggregator_kind(self.agg_kinds[0]);
                let mut stmts = Vec::new();

                stmts.push(cg.decl_engine(&iter_var, EngineKind::AggregationHashTableIterator));
                let it_ref = {
                    let id = cg.ident(&iter_var);
                    cg.addr_of(id)
                };
                let a = cg.ident(&aht);
                let init = cg.call(Builtin::AggHashTableIterInit, vec![it_ref, a]);
                stmts.push(cg.expr_stmt(init));

                let mut body = Vec::new();
                let get_row = {
                    let id = cg.ident(&iter_var);
                    let r = cg.addr_of(id);
                    cg.call(Builtin::AggHashTableIterGetRow, vec![r])
                };
                body.push(cg.decl(&row_var, None, Some(get_row)));
                let mut bindings: Vec<(String, ExprId)> = self
                    .group_types
                    .clone()
                    .iter()
                    .enumerate()
                    .map(|(i, ty)| {
                        let r = cg.ident(&row_var);
                        let off = cg.int_lit(agg_key_offset(i));
                        (cg.fresh("attr"), cg.call(CodeGen::row_reader(*ty), vec![r, off]))
                    })
                    .collect();
                bindings.push({
                    let r = cg.ident(&row_var);
                    let agg_ptr = cg.ptr_cast(agg_kind.name(), r);
                    (cg.fresh("agg_res"), cg.call(Builtin::AggResult, vec![agg_ptr]))
                });
                let attrs = bind_attrs(cg, bindings, &mut body);
                let row = RowCtx { attrs, pci_var: None };
                body.extend(chain.consume_parent(0, cg, &row));
                let it_ref = {
                    let id = cg.ident(&iter_var);
                    cg.addr_of(id)
                };
                let next = cg.call(Builtin::AggHashTableIterNext, vec![it_ref]);
                body.push(cg.expr_stmt(next));

                let it_ref = {
                    let id = cg.ident(&iter_var);
                    cg.addr_of(id)
                };
                let cond = cg.call(Builtin::AggHashTableIterHasNext, vec![it_ref]);
                stmts.push(cg.while_stmt(cond, body));

                let it_ref = {
                    let id = cg.ident(&iter_var);
                    cg.addr_of(id)
                };
                let close = cg.call(Builtin::AggHashTableIterClose, vec![it_ref]);
                stmts.push(cg.expr_stmt(close));
                stmts
            }
        }
    }
}

// ======================================================================
// Sort
// ======================================================================

pub struct SortBuildTranslator {
    sorter: String,
    row_types: Vec<SqlType>,
    sort_keys: Vec<(usize, SortDirection)>,
    limit: Option<u64>,
    parallel: bool,
}

impl SortBuildTranslator {
    pub fn new(
        sorter: String,
        row_types: Vec<SqlType>,
        sort_keys: Vec<(usize, SortDirection)>,
        limit: Option<u64>,
        parallel: bool,
    ) -> Self {
        SortBuildTranslator { sorter, row_types, sort_keys, limit, parallel }
    }

    /// `(lhs, rhs) -> int32` comparator over the sort keys.
    fn emit_comparator(&self, cg: &mut CodeGen) -> String {
        let name = cg.fresh("sorter_compare");
        let u8p = cg.types.byte_ptr();
        let params = vec![("lhs".to_string(), u8p), ("rhs".to_string(), u8p)];
        let ret = cg.types.int32();
        let mut body = Vec::new();
        for (col, dir) in &self.sort_keys {
            let ty = self.row_types[*col];
            let (first, second) = match dir {
                SortDirection::Asc => (-1i64, 1i64),
                SortDirection::Desc => (1, -1),
            };
            let l = cg.ident("lhs");
            let off = cg.int_lit(cell_offset(*col));
            let lv = cg.call(CodeGen::row_reader(ty), vec![l, off]);
            let r = cg.ident("rhs");
            let off = cg.int_lit(cell_offset(*col));
            let rv = cg.call(CodeGen::row_reader(ty), vec![r, off]);
            let lt = cg.binary(BinOp::Lt, lv, rv);
            let lt = cg.call(Builtin::SqlToBool, vec![lt]);
            let f = cg.int_lit(first);
            let ret_first = cg.ret(Some(f));
            body.push(cg.if_stmt(lt, vec![ret_first]));

            let l = cg.ident("lhs");
            let off = cg.int_lit(cell_offset(*col));
            let lv = cg.call(CodeGen::row_reader(ty), vec![l, off]);
            let r = cg.ident("rhs");
            let off = cg.int_lit(cell_offset(*col));
            let rv = cg.call(CodeGen::row_reader(ty), vec![r, off]);
            let gt = cg.binary(BinOp::Lt, rv, lv);
            let gt = cg.call(Builtin::SqlToBool, vec![gt]);
            let s = cg.int_lit(second);
            let ret_second = cg.ret(Some(s));
            body.push(cg.if_stmt(gt, vec![ret_second]));
        }
        let z = cg.int_lit(0);
        body.push(cg.ret(Some(z)));
        cg.function(name.clone(), params, ret, body);
        name
    }
}

impl OperatorTranslator for SortBuildTranslator {
    fn state_vars(&self) -> Vec<StateVar> {
        vec![StateVar { name: self.sorter.clone(), kind: EngineKind::Sorter }]
    }

    fn setup(&mut self, cg: &mut CodeGen) -> Vec<StmtId> {
        let cmp = self.emit_comparator(cg);
        let s = {
            let id = cg.ident(&self.sorter);
            cg.addr_of(id)
        };
        let pool = cg.ident(MEM_POOL);
        let cmp = cg.ident(cmp);
        let size = cg.int_lit((self.row_types.len() * CELL_SIZE) as i64);
        let init = cg.call(Builtin::SorterInit, vec![s, pool, cmp, size]);
        vec![cg.expr_stmt(init)]
    }

    fn teardown(&mut self, cg: &mut CodeGen) -> Vec<StmtId> {
        let s = {
            let id = cg.ident(&self.sorter);
            cg.addr_of(id)
        };
        let free = cg.call(Builtin::SorterFree, vec![s]);
        vec![cg.expr_stmt(free)]
    }

    fn consume(
        &mut self,
        _chain: &mut TranslatorChain,
        _my_idx: usize,
        cg: &mut CodeGen,
        row: &RowCtx,
    ) -> Vec<StmtId> {
        let mut stmts = Vec::new();
        let row_var = cg.fresh("sort_row");
        let s = cg.ident(&self.sorter);
        let insert = cg.call(Builtin::SorterInsert, vec![s]);
        stmts.push(cg.decl(&row_var, None, Some(insert)));
        for (i, ty) in self.row_types.clone().iter().enumerate() {
            let r = cg.ident(&row_var);
            let off = cg.int_lit(cell_offset(i));
            let write = cg.call(CodeGen::row_writer(*ty), vec![r, off, row.attrs[i]]);
            stmts.push(cg.expr_stmt(write));
        }
        stmts
    }

    fn finalize(&mut self, cg: &mut CodeGen) -> Vec<StmtId> {
        let s = cg.ident(&self.sorter);
        // a top-k hint always takes the partitioned finalizer
        let call = match (self.parallel, self.limit) {
            (_, Some(k)) => {
                let tls = cg.ident(TLS_VAR);
                let off = cg.int_lit(0);
                let k = cg.int_lit(k as i64);
                cg.call(Builtin::SorterSortTopKParallel, vec![s, tls, off, k])
            }
            (true, None) => {
                let tls = cg.ident(TLS_VAR);
                let off = cg.int_lit(0);
                cg.call(Builtin::SorterSortParallel, vec![s, tls, off])
            }
            (false, None) => cg.call(Builtin::SorterSort, vec![s]),
        };
        vec![cg.expr_stmt(call)]
    }

    fn is_materializer(&self) -> (bool, bool) {
        (true, true)
    }
}

pub struct SortScanTranslator {
    sorter: String,
    row_types: Vec<SqlType>,
}

impl SortScanTranslator {
    pub fn new(sorter: String, row_types: Vec<SqlType>) -> Self {
        SortScanTranslator { sorter, row_types }
    }
}

impl OperatorTranslator for SortScanTranslator {
    fn produce(&mut self, chain: &mut TranslatorChain, cg: &mut CodeGen) -> Vec<StmtId> {
        let iter_var = cg.fresh("sort_iter");
        let row_var = cg.fresh("row");
        let mut stmts = Vec::new();

        stmts.push(cg.decl_engine(&iter_var, EngineKind::SorterIterator));
        let it_ref = {
            let id = cg.ident(&iter_var);
            cg.addr_of(id)
        };
        let s = cg.ident(&self.sorter);
        let init = cg.call(Builtin::SorterIterInit, vec![it_ref, s]);
        stmts.push(cg.expr_stmt(init));

        let mut body = Vec::new();
        let get_row = {
            let id = cg.ident(&iter_var);
            let r = cg.addr_of(id);
            cg.call(Builtin::SorterIterGetRow, vec![r])
        };
        body.push(cg.decl(&row_var, None, Some(get_row)));
        let bindings: Vec<(String, ExprId)> = self
            .row_types
            .clone()
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                let r = cg.ident(&row_var);
                let off = cg.int_lit(cell_offset(i));
                (cg.fresh("attr"), cg.call(CodeGen::row_reader(*ty), vec![r, off]))
            })
            .collect();
        let attrs = bind_attrs(cg, bindings, &mut body);
        let row = RowCtx { attrs, pci_var: None };
        body.extend(chain.consume_parent(0, cg, &row));
        let it_ref = {
            let id = cg.ident(&iter_var);
            cg.addr_of(id)
        };
        let next = cg.call(Builtin::SorterIterNext, vec![it_ref]);
        body.push(cg.expr_stmt(next));

        let it_ref = {
            let id = cg.ident(&iter_var);
            cg.addr_of(id)
        };
        let cond = cg.call(Builtin::SorterIterHasNext, vec![it_ref]);
        stmts.push(cg.while_stmt(cond, body));

        let it_ref = {
            let id = cg.ident(&iter_var);
            cg.addr_of(id)
        };
        let close = cg.call(Builtin::SorterIterClose, vec![it_ref]);
        stmts.push(cg.expr_stmt(close));
        stmts
    }
}

// ======================================================================
// Output
// ======================================================================

pub struct OutputTranslator {
    col_types: Vec<SqlType>,
}

impl OutputTranslator {
    pub fn new(col_types: Vec<SqlType>) -> Self {
        OutputTranslator { col_types }
    }
}

impl OperatorTranslator for OutputTranslator {
    fn consume(
        &mut self,
        _chain: &mut TranslatorChain,
        _my_idx: usize,
        cg: &mut CodeGen,
        row: &RowCtx,
    ) -> Vec<StmtId> {
        let mut stmts = Vec::new();
        let out_var = cg.fresh("out_row");
        let ctx = cg.ident(EXEC_CTX);
        let alloc = cg.call(Builtin::OutputAlloc, vec![ctx]);
        stmts.push(cg.decl(&out_var, None, Some(alloc)));
        // every column starts null; the copies below clear the flag for
        // non-null values at runtime
        for i in 0..self.col_types.len() {
            let ctx = cg.ident(EXEC_CTX);
            let idx = cg.int_lit(i as i64);
            let set_null = cg.call(Builtin::OutputSetNull, vec![ctx, idx]);
            stmts.push(cg.expr_stmt(set_null));
        }
        for (i, ty) in self.col_types.clone().iter().enumerate() {
            let o = cg.ident(&out_var);
            let off = cg.int_lit(cell_offset(i));
            let write = cg.call(CodeGen::row_writer(*ty), vec![o, off, row.attrs[i]]);
            stmts.push(cg.expr_stmt(write));
        }
        let ctx = cg.ident(EXEC_CTX);
        let adv = cg.call(Builtin::OutputAdvance, vec![ctx]);
        stmts.push(cg.expr_stmt(adv));
        stmts
    }

    fn finalize(&mut self, cg: &mut CodeGen) -> Vec<StmtId> {
        let ctx = cg.ident(EXEC_CTX);
        let fin = cg.call(Builtin::OutputFinalize, vec![ctx]);
        vec![cg.expr_stmt(fin)]
    }
}
