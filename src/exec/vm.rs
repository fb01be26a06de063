//! Compiled-module interpreter.
//!
//! Executes the DSL module a compilation produced: `main` owns the query
//! state, pipeline functions drive the loops, and every intrinsic call
//! lands on the runtime bridge it names (table vector iterators, filter
//! manager, join/aggregation hash tables, sorters, the output buffer).
//! Values are typed handles - engine objects live on a heap, container
//! rows travel as `RowRef`s, and opaque pointer casts pass handles
//! through unchanged.
//!
//! Helper functions whose emitted shape is canonical are compiled to
//! native closures before registration: vectorized filter clauses become
//! [`FilterManager`] filters and sorter comparators become
//! [`SortComparator`]s, so the hot paths run without re-entering the
//! interpreter. Key-equality helpers are interpreted per candidate, which
//! is also how the chain iterators are stepped.

use super::agg_ht::{read_payload_agg, write_payload_agg, AggregationHashTable, AggregationHashTableIterator};
use super::filter_manager::{FilterManager, VectorFilterFn};
use super::index_iter::IndexIterator;
use super::join_ht::{JoinHashTable, JoinHashTableIterator};
use super::output::OutputBuffer;
use super::row::{read_cell, write_cell, CELL_SIZE};
use super::sorter::{SortComparator, Sorter, SorterIterator};
use super::table_iter::{CmpOp, ProjectedColumnsIterator, TableVectorIterator};
use super::thread_state::{current_worker_index, ThreadStateContainer};
use super::{ExecutionContext, RuntimeError};
use crate::compiler::CompiledQuery;
use crate::dsl::ast::{BinOp, ExprId, ExprKind, FuncId, ImplicitCast, StmtId, StmtKind, UnaryOp};
use crate::dsl::builtins::Builtin;
use crate::dsl::types::{EngineKind, TypeKind};
use crate::exec::processor::StorageProvider;
use crate::plan::SortDirection;
use crate::value::{AggregateKind, Aggregator, SqlType, SqlValue};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

fn malformed(msg: impl Into<String>) -> RuntimeError {
    RuntimeError::Malformed(msg.into())
}

/// A tuple inside a runtime container, addressed without borrowing it.
#[derive(Debug, Clone)]
enum RowRef {
    JhtEntry { jht: usize, entry: u32 },
    AhtPayload { aht: usize, entry: u32 },
    SorterRow { sorter: usize, row: usize },
    Output,
    IndexKey { iter: usize },
    IndexRow { iter: usize },
}

/// Interpreter values: typed handles rather than raw memory.
#[derive(Debug, Clone)]
enum Value {
    Unit,
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    UInt(u64),
    Str(String),
    Sql(SqlValue),
    Fn(String),
    /// Engine object on the heap.
    Obj(usize),
    /// The projected-columns view of a live table vector iterator.
    Pci(usize),
    Row(RowRef),
    /// An aggregator resident at the head of a container payload.
    PayloadAgg { row: RowRef, kind: AggregateKind },
    ExecCtx,
    MemPool,
    Type(crate::dsl::types::TypeId),
}

/// Heap slots for engine objects.
enum Obj {
    Uninit(EngineKind),
    Vacant,
    Tvi(TableVectorIterator),
    Fm { fm: FilterManager, interpreted: Vec<String> },
    Jht(JoinHashTable),
    JhtIter { jht: usize, cur: JoinHashTableIterator },
    Aht(AggregationHashTable),
    AhtIter { aht: usize, cur: AggregationHashTableIterator },
    Sorter(Sorter),
    SorterIter { sorter: usize, cur: SorterIterator },
    IndexIter(IndexIterator),
    Agg(Aggregator),
    Tls,
}

enum Flow {
    Normal,
    Return(Value),
}

#[derive(Default)]
struct Frame {
    locals: HashMap<String, Value>,
}

/// Run a compiled module's `main` against storage, draining results into
/// `out`. Returns the number of tuples emitted.
///
/// Modules with diagnostics are rejected: the intrinsic dispatch relies
/// on the arities and types the analyzer verified.
pub fn run(
    compiled: &CompiledQuery,
    storage: &dyn StorageProvider,
    ctx: &ExecutionContext,
    out: OutputBuffer,
) -> Result<usize, RuntimeError> {
    if !compiled.is_ok() {
        return Err(RuntimeError::CompileRejected(compiled.diagnostics.len()));
    }
    let mut vm = Vm::new(compiled, storage, ctx, out);
    vm.call_function("main", vec![Value::ExecCtx])?;
    trace!(tuples = vm.out.num_emitted(), "module interpreted");
    Ok(vm.out.num_emitted())
}

struct Vm<'q> {
    compiled: &'q CompiledQuery,
    funcs: HashMap<String, FuncId>,
    storage: &'q dyn StorageProvider,
    ctx: &'q ExecutionContext,
    heap: Vec<Obj>,
    out: OutputBuffer,
}

impl<'q> Vm<'q> {
    fn new(
        compiled: &'q CompiledQuery,
        storage: &'q dyn StorageProvider,
        ctx: &'q ExecutionContext,
        out: OutputBuffer,
    ) -> Self {
        let funcs = compiled
            .module
            .functions
            .iter()
            .map(|&fid| (compiled.ast.func(fid).name.clone(), fid))
            .collect();
        Vm {
            compiled,
            funcs,
            storage,
            ctx,
            heap: Vec::new(),
            out,
        }
    }

    // ------------------------------------------------------------------
    // Function and statement execution
    // ------------------------------------------------------------------

    fn call_function(&mut self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let fid = *self
            .funcs
            .get(name)
            .ok_or_else(|| malformed(format!("call to unknown function '{name}'")))?;
        let func = self.compiled.ast.func(fid).clone();
        if func.params.len() != args.len() {
            return Err(malformed(format!("arity mismatch calling '{name}'")));
        }
        let mut frame = Frame::default();
        for ((pname, _), arg) in func.params.iter().zip(args) {
            frame.locals.insert(pname.clone(), arg);
        }
        match self.exec_stmt(func.body, &mut frame)? {
            Flow::Return(v) => Ok(v),
            Flow::Normal => Ok(Value::Unit),
        }
    }

    fn exec_stmt(&mut self, sid: StmtId, frame: &mut Frame) -> Result<Flow, RuntimeError> {
        let kind = self.compiled.ast.stmt(sid).kind.clone();
        match kind {
            StmtKind::Block(stmts) => {
                for s in stmts {
                    if let Flow::Return(v) = self.exec_stmt(s, frame)? {
                        return Ok(Flow::Return(v));
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::DeclVar { name, declared_ty, init } => {
                let value = match init {
                    Some(e) => self.eval(e, frame)?,
                    None => match declared_ty.map(|t| self.compiled.types.kind(t).clone()) {
                        Some(TypeKind::Engine(kind)) => {
                            self.heap.push(Obj::Uninit(kind));
                            Value::Obj(self.heap.len() - 1)
                        }
                        _ => Value::Unit,
                    },
                };
                frame.locals.insert(name, value);
                Ok(Flow::Normal)
            }
            StmtKind::Assign { dst, src } => {
                let ExprKind::Ident(name) = self.compiled.ast.expr(dst).kind.clone() else {
                    return Err(malformed("assignment target is not a variable"));
                };
                let value = self.eval(src, frame)?;
                frame.locals.insert(name, value);
                Ok(Flow::Normal)
            }
            StmtKind::Expr(e) => {
                self.eval(e, frame)?;
                Ok(Flow::Normal)
            }
            StmtKind::If { cond, then_block, else_block } => {
                if self.eval_truthy(cond, frame)? {
                    self.exec_stmt(then_block, frame)
                } else if let Some(e) = else_block {
                    self.exec_stmt(e, frame)
                } else {
                    Ok(Flow::Normal)
                }
            }
            StmtKind::While { cond, body } => {
                loop {
                    self.ctx.check_cancelled()?;
                    if !self.eval_truthy(cond, frame)? {
                        return Ok(Flow::Normal);
                    }
                    if let Flow::Return(v) = self.exec_stmt(body, frame)? {
                        return Ok(Flow::Return(v));
                    }
                }
            }
            StmtKind::Return(e) => {
                let v = match e {
                    Some(e) => self.eval(e, frame)?,
                    None => Value::Unit,
                };
                Ok(Flow::Return(v))
            }
        }
    }

    // ------------------------------------------------------------------
    // Expression evaluation
    // ------------------------------------------------------------------

    fn eval_truthy(&mut self, e: ExprId, frame: &mut Frame) -> Result<bool, RuntimeError> {
        match self.eval(e, frame)? {
            Value::Bool(b) => Ok(b),
            Value::Sql(SqlValue::Bool(b)) => Ok(b.is_true()),
            other => Err(malformed(format!("non-boolean condition: {other:?}"))),
        }
    }

    fn eval(&mut self, eid: ExprId, frame: &mut Frame) -> Result<Value, RuntimeError> {
        let kind = self.compiled.ast.expr(eid).kind.clone();
        match kind {
            ExprKind::IntLit(v) => Ok(Value::Int(v)),
            ExprKind::FloatLit(v) => Ok(Value::Float(v)),
            ExprKind::BoolLit(v) => Ok(Value::Bool(v)),
            ExprKind::NilLit => Ok(Value::Nil),
            ExprKind::StringLit(s) => Ok(Value::Str(s)),
            ExprKind::TypeRepr(t) => Ok(Value::Type(t)),
            ExprKind::Ident(name) => {
                if let Some(v) = frame.locals.get(&name) {
                    return Ok(v.clone());
                }
                if self.funcs.contains_key(&name) {
                    return Ok(Value::Fn(name));
                }
                Err(malformed(format!("undefined name '{name}'")))
            }
            // address-of and dereference collapse: handles are identity
            ExprKind::Unary { op: UnaryOp::AddressOf | UnaryOp::Deref, operand } => {
                self.eval(operand, frame)
            }
            ExprKind::Unary { op: UnaryOp::Not, operand } => {
                match self.eval(operand, frame)? {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    other => Err(malformed(format!("'!' over {other:?}"))),
                }
            }
            ExprKind::Unary { op: UnaryOp::Neg, operand } => {
                match self.eval(operand, frame)? {
                    Value::Int(v) => Ok(Value::Int(-v)),
                    Value::Float(v) => Ok(Value::Float(-v)),
                    other => Err(malformed(format!("'-' over {other:?}"))),
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.eval(lhs, frame)?;
                let r = self.eval(rhs, frame)?;
                binary_op(op, l, r)
            }
            ExprKind::Cast { cast: ImplicitCast::SqlBoolToBool, operand } => {
                match self.eval(operand, frame)? {
                    Value::Sql(SqlValue::Bool(b)) => Ok(Value::Bool(b.is_true())),
                    other => Err(malformed(format!("sql-bool cast over {other:?}"))),
                }
            }
            ExprKind::Call { callee, args } => {
                if let Some(builtin) = Builtin::from_name(&callee) {
                    return self.eval_builtin(builtin, &args, frame);
                }
                let mut evaluated = Vec::with_capacity(args.len());
                for a in args {
                    evaluated.push(self.eval(a, frame)?);
                }
                self.call_function(&callee, evaluated)
            }
        }
    }

    // ------------------------------------------------------------------
    // Intrinsic dispatch
    // ------------------------------------------------------------------

    fn eval_builtin(
        &mut self,
        builtin: Builtin,
        args: &[ExprId],
        frame: &mut Frame,
    ) -> Result<Value, RuntimeError> {
        use Builtin::*;
        let mut vals = Vec::with_capacity(args.len());
        for &a in args {
            vals.push(self.eval(a, frame)?);
        }

        match builtin {
            // ----------------------------------------------------------
            // Conversions
            // ----------------------------------------------------------
            BoolToSql => Ok(Value::Sql(SqlValue::boolean(as_bool(&vals[0])?))),
            IntToSql => Ok(Value::Sql(SqlValue::integer(as_int(&vals[0])?))),
            FloatToSql => Ok(Value::Sql(SqlValue::real(as_float(&vals[0])?))),
            DateToSql => {
                let (y, m, d) = (as_int(&vals[0])?, as_int(&vals[1])?, as_int(&vals[2])?);
                let v = NaiveDate::from_ymd_opt(y as i32, m as u32, d as u32)
                    .map_or_else(|| SqlValue::null_of(SqlType::Date), SqlValue::date);
                Ok(Value::Sql(v))
            }
            SqlToBool => match &vals[0] {
                Value::Sql(SqlValue::Bool(b)) => Ok(Value::Bool(b.is_true())),
                other => Err(malformed(format!("sqlToBool over {other:?}"))),
            },

            // ----------------------------------------------------------
            // Vectorized filters
            // ----------------------------------------------------------
            FilterEq | FilterNe | FilterLt | FilterLe | FilterGt | FilterGe => {
                let op = filter_cmp_op(builtin);
                let col = as_int(&vals[1])? as usize;
                let val = as_int(&vals[2])?;
                let pci = as_pci(&vals[0])?;
                let count = self.with_pci(pci, |p| p.filter_cmp(op, col, val))?;
                Ok(Value::Int(i64::from(count)))
            }

            // ----------------------------------------------------------
            // Table iteration
            // ----------------------------------------------------------
            TableIterInit => {
                let id = as_obj(&vals[0])?;
                let name = as_str(&vals[1])?;
                let table = self
                    .storage
                    .table(name)
                    .ok_or_else(|| RuntimeError::TableNotFound(name.to_string()))?;
                let tvi = TableVectorIterator::new(
                    table,
                    Arc::clone(self.ctx.txn()),
                    self.ctx.vector_size(),
                );
                self.heap[id] = Obj::Tvi(tvi);
                Ok(Value::Unit)
            }
            TableIterAdvance => {
                let id = as_obj(&vals[0])?;
                match &mut self.heap[id] {
                    Obj::Tvi(tvi) => Ok(Value::Bool(tvi.advance())),
                    _ => Err(malformed("expected a table vector iterator")),
                }
            }
            TableIterGetPCI => Ok(Value::Pci(as_obj(&vals[0])?)),
            TableIterClose => {
                let id = as_obj(&vals[0])?;
                self.heap[id] = Obj::Uninit(EngineKind::TableVectorIterator);
                Ok(Value::Unit)
            }
            TableIterParallel => Err(RuntimeError::Unsupported("tableIterParallel")),

            // ----------------------------------------------------------
            // Projected-columns iterator
            // ----------------------------------------------------------
            PCIHasNext => self.pci_bool(&vals[0], ProjectedColumnsIterator::has_next),
            PCIHasNextFiltered => {
                self.pci_bool(&vals[0], ProjectedColumnsIterator::has_next_filtered)
            }
            PCIAdvance => self.pci_unit(&vals[0], ProjectedColumnsIterator::advance),
            PCIAdvanceFiltered => {
                self.pci_unit(&vals[0], ProjectedColumnsIterator::advance_filtered)
            }
            PCIReset => self.pci_unit(&vals[0], ProjectedColumnsIterator::reset),
            PCIResetFiltered => self.pci_unit(&vals[0], ProjectedColumnsIterator::reset_filtered),
            PCIMatch => {
                let matched = as_bool(&vals[1])?;
                let pci = as_pci(&vals[0])?;
                self.with_pci(pci, |p| p.match_row(matched))?;
                Ok(Value::Unit)
            }
            PCIGetBool | PCIGetBoolNull | PCIGetTinyInt | PCIGetTinyIntNull | PCIGetSmallInt
            | PCIGetSmallIntNull | PCIGetInt | PCIGetIntNull | PCIGetBigInt | PCIGetBigIntNull
            | PCIGetReal | PCIGetRealNull | PCIGetDate | PCIGetDateNull | PCIGetVarchar
            | PCIGetVarcharNull => {
                let col = as_int(&vals[1])? as usize;
                let pci = as_pci(&vals[0])?;
                let v = self.with_pci(pci, |p| p.get(col).clone())?;
                Ok(Value::Sql(v))
            }

            // ----------------------------------------------------------
            // Hashing
            // ----------------------------------------------------------
            Hash => {
                let mut keys = Vec::with_capacity(vals.len());
                for v in &vals {
                    keys.push(as_sql(v)?.clone());
                }
                Ok(Value::UInt(hash_values(&keys)))
            }

            // ----------------------------------------------------------
            // Filter manager
            // ----------------------------------------------------------
            FilterManagerInit => {
                let id = as_obj(&vals[0])?;
                self.heap[id] = Obj::Fm { fm: FilterManager::new(), interpreted: Vec::new() };
                Ok(Value::Unit)
            }
            FilterManagerInsertFilter => {
                let id = as_obj(&vals[0])?;
                for v in &vals[1..] {
                    let name = as_fn(v)?.to_string();
                    let compiled = self.compile_filter_clause(&name);
                    match &mut self.heap[id] {
                        Obj::Fm { fm, interpreted } => match compiled {
                            Some(clause) => fm.insert_filter(clause),
                            None => interpreted.push(name),
                        },
                        _ => return Err(malformed("expected a filter manager")),
                    }
                }
                Ok(Value::Unit)
            }
            FilterManagerFinalize => {
                let id = as_obj(&vals[0])?;
                match &mut self.heap[id] {
                    Obj::Fm { fm, .. } => {
                        fm.finalize();
                        Ok(Value::Unit)
                    }
                    _ => Err(malformed("expected a filter manager")),
                }
            }
            FilterManagerRunFilters => {
                let id = as_obj(&vals[0])?;
                let pci = as_pci(&vals[1])?;
                let fm_obj = self.take_obj(id);
                let result = (|| {
                    let Obj::Fm { fm, interpreted } = &fm_obj else {
                        return Err(malformed("expected a filter manager"));
                    };
                    let mut count = self.with_pci(pci, |p| fm.run_filters(p))?;
                    for name in interpreted {
                        if count == 0 {
                            break;
                        }
                        let v = self.call_function(name, vec![Value::Pci(pci)])?;
                        count = as_int(&v)? as u32;
                    }
                    Ok(Value::Int(i64::from(count)))
                })();
                self.heap[id] = fm_obj;
                result
            }
            FilterManagerFree => {
                let id = as_obj(&vals[0])?;
                self.heap[id] = Obj::Uninit(EngineKind::FilterManager);
                Ok(Value::Unit)
            }

            // ----------------------------------------------------------
            // Aggregation hash table
            // ----------------------------------------------------------
            AggHashTableInit => {
                let id = as_obj(&vals[0])?;
                let size = as_int(&vals[2])? as usize;
                self.heap[id] = Obj::Aht(AggregationHashTable::new(size));
                Ok(Value::Unit)
            }
            AggHashTableInsert => {
                let id = as_obj(&vals[0])?;
                let hash = as_uint(&vals[1])?;
                match &mut self.heap[id] {
                    Obj::Aht(t) => {
                        let entry = t.insert(hash);
                        Ok(Value::Row(RowRef::AhtPayload { aht: id, entry }))
                    }
                    _ => Err(malformed("expected an aggregation hash table")),
                }
            }
            AggHashTableLookup => {
                let id = as_obj(&vals[0])?;
                let hash = as_uint(&vals[1])?;
                let eq = as_fn(&vals[2])?.to_string();
                let probe = vals[3].clone();
                let candidates = match &self.heap[id] {
                    Obj::Aht(t) => t.candidates(hash),
                    _ => return Err(malformed("expected an aggregation hash table")),
                };
                for entry in candidates {
                    let row = Value::Row(RowRef::AhtPayload { aht: id, entry });
                    let matched = self.call_function(&eq, vec![row.clone(), probe.clone()])?;
                    if as_bool(&matched)? {
                        return Ok(row);
                    }
                }
                Ok(Value::Nil)
            }
            AggHashTableFree => {
                let id = as_obj(&vals[0])?;
                self.heap[id] = Obj::Uninit(EngineKind::AggregationHashTable);
                Ok(Value::Unit)
            }
            AggHashTableIterInit => {
                let it = as_obj(&vals[0])?;
                let aht = as_obj(&vals[1])?;
                let cur = match &self.heap[aht] {
                    Obj::Aht(t) => t.cursor(),
                    _ => return Err(malformed("expected an aggregation hash table")),
                };
                self.heap[it] = Obj::AhtIter { aht, cur };
                Ok(Value::Unit)
            }
            AggHashTableIterHasNext => {
                let it = as_obj(&vals[0])?;
                let Obj::AhtIter { aht, cur } = &self.heap[it] else {
                    return Err(malformed("expected an aggregation iterator"));
                };
                let Obj::Aht(t) = &self.heap[*aht] else {
                    return Err(malformed("aggregation table was freed"));
                };
                Ok(Value::Bool(cur.has_next(t)))
            }
            AggHashTableIterNext => {
                let it = as_obj(&vals[0])?;
                match &mut self.heap[it] {
                    Obj::AhtIter { cur, .. } => {
                        cur.next();
                        Ok(Value::Unit)
                    }
                    _ => Err(malformed("expected an aggregation iterator")),
                }
            }
            AggHashTableIterGetRow => {
                let it = as_obj(&vals[0])?;
                match &self.heap[it] {
                    Obj::AhtIter { aht, cur } => Ok(Value::Row(RowRef::AhtPayload {
                        aht: *aht,
                        entry: cur.current_id(),
                    })),
                    _ => Err(malformed("expected an aggregation iterator")),
                }
            }
            AggHashTableIterClose => {
                let it = as_obj(&vals[0])?;
                self.heap[it] = Obj::Uninit(EngineKind::AggregationHashTableIterator);
                Ok(Value::Unit)
            }
            AggHashTableProcessBatch => Err(RuntimeError::Unsupported("aggHTProcessBatch")),
            AggHashTableMovePartitions => Err(RuntimeError::Unsupported("aggHTMovePartitions")),
            AggHashTableParallelPartitionedScan => {
                Err(RuntimeError::Unsupported("aggHTParallelPartScan"))
            }
            AggPartIterHasNext | AggPartIterNext | AggPartIterGetHash | AggPartIterGetRow => {
                Err(RuntimeError::Unsupported("aggPartIter"))
            }

            // ----------------------------------------------------------
            // Aggregators
            // ----------------------------------------------------------
            AggInit | AggReset => {
                for v in &vals {
                    self.agg_init(v)?;
                }
                Ok(Value::Unit)
            }
            AggAdvance => {
                let input = as_sql(&vals[1])?.clone();
                self.agg_update(&vals[0], |agg| agg.advance(&input))?;
                Ok(Value::Unit)
            }
            AggMerge => {
                let other = self.agg_read(&vals[1])?;
                self.agg_update(&vals[0], |agg| agg.merge(&other))?;
                Ok(Value::Unit)
            }
            AggResult => {
                let agg = self.agg_read(&vals[0])?;
                Ok(Value::Sql(agg.result()))
            }

            // ----------------------------------------------------------
            // Join hash table
            // ----------------------------------------------------------
            JoinHashTableInit => {
                let id = as_obj(&vals[0])?;
                let size = as_int(&vals[2])? as usize;
                self.heap[id] = Obj::Jht(JoinHashTable::new(size));
                Ok(Value::Unit)
            }
            JoinHashTableInsert => {
                let id = as_obj(&vals[0])?;
                let hash = as_uint(&vals[1])?;
                match &mut self.heap[id] {
                    Obj::Jht(t) => {
                        let entry = t.alloc_entry(hash);
                        Ok(Value::Row(RowRef::JhtEntry { jht: id, entry }))
                    }
                    _ => Err(malformed("expected a join hash table")),
                }
            }
            JoinHashTableBuild => {
                let id = as_obj(&vals[0])?;
                match &mut self.heap[id] {
                    Obj::Jht(t) => {
                        t.build();
                        Ok(Value::Unit)
                    }
                    _ => Err(malformed("expected a join hash table")),
                }
            }
            JoinHashTableBuildParallel => {
                let id = as_obj(&vals[0])?;
                let mut table = match self.take_obj(id) {
                    Obj::Jht(t) => t,
                    other => {
                        self.heap[id] = other;
                        return Err(malformed("expected a join hash table"));
                    }
                };
                parallel_join_build(&mut table);
                self.heap[id] = Obj::Jht(table);
                Ok(Value::Unit)
            }
            JoinHashTableFree => {
                let id = as_obj(&vals[0])?;
                self.heap[id] = Obj::Uninit(EngineKind::JoinHashTable);
                Ok(Value::Unit)
            }
            JoinHashTableIterInit => {
                let it = as_obj(&vals[0])?;
                let jht = as_obj(&vals[1])?;
                let hash = as_uint(&vals[2])?;
                let cur = match &self.heap[jht] {
                    Obj::Jht(t) => t.cursor(hash),
                    _ => return Err(malformed("expected a join hash table")),
                };
                self.heap[it] = Obj::JhtIter { jht, cur };
                Ok(Value::Unit)
            }
            JoinHashTableIterHasNext => {
                let it = as_obj(&vals[0])?;
                let eq = as_fn(&vals[1])?.to_string();
                let ctx_arg = vals[2].clone();
                let probe = vals[3].clone();
                loop {
                    let (jht, candidate) = match &mut self.heap[it] {
                        Obj::JhtIter { jht, cur } => (*jht, cur.next_candidate()),
                        _ => return Err(malformed("expected a join iterator")),
                    };
                    let Some(entry) = candidate else {
                        if let Obj::JhtIter { cur, .. } = &mut self.heap[it] {
                            cur.exhausted();
                        }
                        return Ok(Value::Bool(false));
                    };
                    let row = Value::Row(RowRef::JhtEntry { jht, entry });
                    let matched =
                        self.call_function(&eq, vec![ctx_arg.clone(), probe.clone(), row])?;
                    if as_bool(&matched)? {
                        if let Obj::JhtIter { cur, .. } = &mut self.heap[it] {
                            cur.found(entry);
                        }
                        return Ok(Value::Bool(true));
                    }
                }
            }
            JoinHashTableIterGetRow => {
                let it = as_obj(&vals[0])?;
                match &self.heap[it] {
                    Obj::JhtIter { jht, cur } => {
                        let entry = cur
                            .current()
                            .ok_or_else(|| malformed("join iterator has no current row"))?;
                        Ok(Value::Row(RowRef::JhtEntry { jht: *jht, entry }))
                    }
                    _ => Err(malformed("expected a join iterator")),
                }
            }
            JoinHashTableIterClose => {
                let it = as_obj(&vals[0])?;
                self.heap[it] = Obj::Uninit(EngineKind::JoinHashTableIterator);
                Ok(Value::Unit)
            }

            // ----------------------------------------------------------
            // Sorter
            // ----------------------------------------------------------
            SorterInit => {
                let id = as_obj(&vals[0])?;
                let cmp_name = as_fn(&vals[2])?.to_string();
                let size = as_int(&vals[3])? as usize;
                let cmp = self.compile_comparator(&cmp_name)?;
                self.heap[id] = Obj::Sorter(Sorter::new(cmp, size));
                Ok(Value::Unit)
            }
            SorterInsert => {
                let id = as_obj(&vals[0])?;
                match &mut self.heap[id] {
                    Obj::Sorter(s) => {
                        let row = s.alloc_input();
                        Ok(Value::Row(RowRef::SorterRow { sorter: id, row }))
                    }
                    _ => Err(malformed("expected a sorter")),
                }
            }
            SorterSort => {
                let id = as_obj(&vals[0])?;
                match &mut self.heap[id] {
                    Obj::Sorter(s) => {
                        s.sort();
                        Ok(Value::Unit)
                    }
                    _ => Err(malformed("expected a sorter")),
                }
            }
            SorterSortParallel | SorterSortTopKParallel => {
                let id = as_obj(&vals[0])?;
                let k = if builtin == SorterSortTopKParallel {
                    Some(as_int(&vals[3])? as u64)
                } else {
                    None
                };
                let mut sorter = match self.take_obj(id) {
                    Obj::Sorter(s) => s,
                    other => {
                        self.heap[id] = other;
                        return Err(malformed("expected a sorter"));
                    }
                };
                parallel_sort(&mut sorter, k);
                self.heap[id] = Obj::Sorter(sorter);
                Ok(Value::Unit)
            }
            SorterFree => {
                let id = as_obj(&vals[0])?;
                self.heap[id] = Obj::Uninit(EngineKind::Sorter);
                Ok(Value::Unit)
            }
            SorterIterInit => {
                let it = as_obj(&vals[0])?;
                let sorter = as_obj(&vals[1])?;
                let cur = match &self.heap[sorter] {
                    Obj::Sorter(s) => s.cursor(),
                    _ => return Err(malformed("expected a sorter")),
                };
                self.heap[it] = Obj::SorterIter { sorter, cur };
                Ok(Value::Unit)
            }
            SorterIterHasNext => {
                let it = as_obj(&vals[0])?;
                let Obj::SorterIter { sorter, cur } = &self.heap[it] else {
                    return Err(malformed("expected a sorter iterator"));
                };
                let Obj::Sorter(s) = &self.heap[*sorter] else {
                    return Err(malformed("sorter was freed"));
                };
                Ok(Value::Bool(cur.has_next(s)))
            }
            SorterIterNext => {
                let it = as_obj(&vals[0])?;
                match &mut self.heap[it] {
                    Obj::SorterIter { cur, .. } => {
                        cur.next();
                        Ok(Value::Unit)
                    }
                    _ => Err(malformed("expected a sorter iterator")),
                }
            }
            SorterIterGetRow => {
                let it = as_obj(&vals[0])?;
                match &self.heap[it] {
                    Obj::SorterIter { sorter, cur } => Ok(Value::Row(RowRef::SorterRow {
                        sorter: *sorter,
                        row: cur.position(),
                    })),
                    _ => Err(malformed("expected a sorter iterator")),
                }
            }
            SorterIterClose => {
                let it = as_obj(&vals[0])?;
                self.heap[it] = Obj::Uninit(EngineKind::SorterIterator);
                Ok(Value::Unit)
            }

            // ----------------------------------------------------------
            // Real-valued math
            // ----------------------------------------------------------
            ACos | ASin | ATan | Cos | Cot | Sin | Tan => {
                let v = as_sql(&vals[0])?;
                Ok(Value::Sql(trig(builtin, v)))
            }
            ATan2 => {
                let (a, b) = (as_sql(&vals[0])?, as_sql(&vals[1])?);
                let v = match (a.as_real(), b.as_real()) {
                    (Some(x), Some(y)) => SqlValue::real(x.atan2(y)),
                    _ => SqlValue::null_of(SqlType::Decimal),
                };
                Ok(Value::Sql(v))
            }

            // ----------------------------------------------------------
            // Output buffer
            // ----------------------------------------------------------
            OutputAlloc => {
                self.out.alloc();
                Ok(Value::Row(RowRef::Output))
            }
            OutputAdvance => {
                self.out.advance();
                Ok(Value::Unit)
            }
            OutputSetNull => {
                let col = as_int(&vals[1])? as usize;
                self.out.set_null(col);
                Ok(Value::Unit)
            }
            OutputFinalize => {
                self.out.finalize();
                Ok(Value::Unit)
            }

            // ----------------------------------------------------------
            // Index iteration
            // ----------------------------------------------------------
            IndexIteratorInit => {
                let id = as_obj(&vals[0])?;
                let name = as_str(&vals[1])?;
                let (index, table) = self
                    .storage
                    .index(name)
                    .ok_or_else(|| RuntimeError::IndexNotFound(name.to_string()))?;
                let mut iter =
                    IndexIterator::new(index, Arc::clone(&table), Arc::clone(self.ctx.txn()));
                for oid in table.schema().col_oids() {
                    iter.add_col(oid);
                }
                iter.init()?;
                self.heap[id] = Obj::IndexIter(iter);
                Ok(Value::Unit)
            }
            IndexIteratorGetKeyRow => {
                let id = as_obj(&vals[0])?;
                Ok(Value::Row(RowRef::IndexKey { iter: id }))
            }
            IndexIteratorScanKey => {
                let id = as_obj(&vals[0])?;
                match &mut self.heap[id] {
                    Obj::IndexIter(it) => {
                        it.scan_key();
                        Ok(Value::Unit)
                    }
                    _ => Err(malformed("expected an index iterator")),
                }
            }
            IndexIteratorAdvance => {
                let id = as_obj(&vals[0])?;
                match &mut self.heap[id] {
                    Obj::IndexIter(it) => Ok(Value::Bool(it.advance())),
                    _ => Err(malformed("expected an index iterator")),
                }
            }
            IndexIteratorGetRow => {
                let id = as_obj(&vals[0])?;
                Ok(Value::Row(RowRef::IndexRow { iter: id }))
            }
            IndexIteratorFree => {
                let id = as_obj(&vals[0])?;
                self.heap[id] = Obj::Uninit(EngineKind::IndexIterator);
                Ok(Value::Unit)
            }

            // ----------------------------------------------------------
            // Materialized row cells
            // ----------------------------------------------------------
            RowWriteBool | RowWriteInt | RowWriteReal | RowWriteDate | RowWriteVarchar => {
                let row = as_row(&vals[0])?.clone();
                let off = as_int(&vals[1])? as usize;
                let value = as_sql(&vals[2])?.clone();
                self.row_write(&row, off, &value)?;
                Ok(Value::Unit)
            }
            RowReadBool | RowReadInt | RowReadReal | RowReadDate | RowReadVarchar => {
                let row = as_row(&vals[0])?.clone();
                let off = as_int(&vals[1])? as usize;
                let ty = row_read_type(builtin);
                Ok(Value::Sql(self.row_read(&row, off, ty)?))
            }

            // ----------------------------------------------------------
            // Thread-local states
            // ----------------------------------------------------------
            TlsInit => {
                let id = as_obj(&vals[0])?;
                self.heap[id] = Obj::Tls;
                Ok(Value::Unit)
            }
            TlsFree => {
                let id = as_obj(&vals[0])?;
                self.heap[id] = Obj::Uninit(EngineKind::ThreadStateContainer);
                Ok(Value::Unit)
            }
            TlsReset | TlsIterate => Err(RuntimeError::Unsupported("tls worker hooks")),

            // ----------------------------------------------------------
            // Misc
            // ----------------------------------------------------------
            ExecCtxGetMemPool => Ok(Value::MemPool),
            SizeOf => Ok(Value::Int(CELL_SIZE as i64)),
            PtrCast => {
                let Value::Type(target) = &vals[0] else {
                    return Err(malformed("ptrCast target was not rewritten"));
                };
                let pointee = self
                    .compiled
                    .types
                    .pointee(*target)
                    .ok_or_else(|| malformed("ptrCast to a non-pointer"))?;
                if let TypeKind::Engine(kind) = self.compiled.types.kind(pointee) {
                    if let Some(agg) = agg_kind_of(*kind) {
                        let row = as_row(&vals[1])?.clone();
                        return Ok(Value::PayloadAgg { row, kind: agg });
                    }
                }
                // opaque casts pass the handle through
                Ok(vals[1].clone())
            }
        }
    }

    // ------------------------------------------------------------------
    // Heap and row access
    // ------------------------------------------------------------------

    fn take_obj(&mut self, id: usize) -> Obj {
        std::mem::replace(&mut self.heap[id], Obj::Vacant)
    }

    fn with_pci<R>(
        &mut self,
        tvi: usize,
        f: impl FnOnce(&mut ProjectedColumnsIterator) -> R,
    ) -> Result<R, RuntimeError> {
        match &mut self.heap[tvi] {
            Obj::Tvi(t) => match t.pci() {
                Some(pci) => Ok(f(pci)),
                None => Err(malformed("table iterator has no active vector")),
            },
            _ => Err(malformed("expected a table vector iterator")),
        }
    }

    fn pci_bool(
        &mut self,
        v: &Value,
        f: impl FnOnce(&ProjectedColumnsIterator) -> bool,
    ) -> Result<Value, RuntimeError> {
        let pci = as_pci(v)?;
        let b = self.with_pci(pci, |p| f(p))?;
        Ok(Value::Bool(b))
    }

    fn pci_unit(
        &mut self,
        v: &Value,
        f: impl FnOnce(&mut ProjectedColumnsIterator),
    ) -> Result<Value, RuntimeError> {
        let pci = as_pci(v)?;
        self.with_pci(pci, f)?;
        Ok(Value::Unit)
    }

    /// Mutable cell buffer of a container-resident row.
    fn bytes_mut(&mut self, row: &RowRef) -> Result<&mut [u8], RuntimeError> {
        match row {
            RowRef::JhtEntry { jht, entry } => match &mut self.heap[*jht] {
                Obj::Jht(t) => Ok(t.entry_mut(*entry)),
                _ => Err(malformed("join entry outlived its table")),
            },
            RowRef::AhtPayload { aht, entry } => match &mut self.heap[*aht] {
                Obj::Aht(t) => Ok(t.payload_mut(*entry)),
                _ => Err(malformed("payload outlived its table")),
            },
            RowRef::SorterRow { sorter, row } => match &mut self.heap[*sorter] {
                Obj::Sorter(s) => Ok(s.row_mut(*row)),
                _ => Err(malformed("sort row outlived its sorter")),
            },
            RowRef::Output => Ok(self.out.current()),
            RowRef::IndexKey { .. } | RowRef::IndexRow { .. } => {
                Err(malformed("projected rows are not raw cell buffers"))
            }
        }
    }

    fn row_write(&mut self, row: &RowRef, off: usize, value: &SqlValue) -> Result<(), RuntimeError> {
        match row {
            RowRef::IndexKey { iter } => match &mut self.heap[*iter] {
                Obj::IndexIter(it) => {
                    if let Some(key_row) = it.key_row_mut() {
                        key_row.set_by_offset(off, value);
                    }
                    Ok(())
                }
                _ => Err(malformed("expected an index iterator")),
            },
            RowRef::IndexRow { .. } => Err(malformed("index rows are read-only")),
            _ => {
                let pool = Arc::clone(self.ctx.pool());
                let bytes = self.bytes_mut(row)?;
                write_cell(bytes, off, value, &pool);
                Ok(())
            }
        }
    }

    fn row_read(&mut self, row: &RowRef, off: usize, ty: SqlType) -> Result<SqlValue, RuntimeError> {
        match row {
            RowRef::IndexKey { iter } => match &self.heap[*iter] {
                Obj::IndexIter(it) => Ok(it
                    .key_row()
                    .map_or_else(|| SqlValue::null_of(ty), |r| r.get_by_offset(off))),
                _ => Err(malformed("expected an index iterator")),
            },
            RowRef::IndexRow { iter } => match &self.heap[*iter] {
                Obj::IndexIter(it) => Ok(it
                    .row()
                    .map_or_else(|| SqlValue::null_of(ty), |r| r.get_by_offset(off))),
                _ => Err(malformed("expected an index iterator")),
            },
            _ => {
                let pool = Arc::clone(self.ctx.pool());
                let bytes = self.bytes_mut(row)?;
                Ok(read_cell(bytes, off, ty, &pool))
            }
        }
    }

    // ------------------------------------------------------------------
    // Aggregator access (state variables and payload-resident)
    // ------------------------------------------------------------------

    fn agg_init(&mut self, v: &Value) -> Result<(), RuntimeError> {
        match v {
            Value::Obj(id) => match &mut self.heap[*id] {
                Obj::Agg(a) => {
                    a.reset();
                    Ok(())
                }
                Obj::Uninit(kind) => {
                    let agg = agg_kind_of(*kind)
                        .map(Aggregator::new)
                        .ok_or_else(|| malformed("aggInit over a non-aggregator"))?;
                    self.heap[*id] = Obj::Agg(agg);
                    Ok(())
                }
                _ => Err(malformed("aggInit over a non-aggregator")),
            },
            Value::PayloadAgg { row, kind } => {
                let fresh = Aggregator::new(*kind);
                let row = row.clone();
                let bytes = self.bytes_mut(&row)?;
                write_payload_agg(bytes, 0, &fresh);
                Ok(())
            }
            other => Err(malformed(format!("aggInit over {other:?}"))),
        }
    }

    fn agg_read(&mut self, v: &Value) -> Result<Aggregator, RuntimeError> {
        match v {
            Value::Obj(id) => match &self.heap[*id] {
                Obj::Agg(a) => Ok(a.clone()),
                _ => Err(malformed("expected an aggregator")),
            },
            Value::PayloadAgg { row, kind } => {
                let (row, kind) = (row.clone(), *kind);
                let bytes = self.bytes_mut(&row)?;
                Ok(read_payload_agg(bytes, 0, kind))
            }
            other => Err(malformed(format!("expected an aggregator, got {other:?}"))),
        }
    }

    fn agg_update(
        &mut self,
        v: &Value,
        f: impl FnOnce(&mut Aggregator),
    ) -> Result<(), RuntimeError> {
        match v {
            Value::Obj(id) => match &mut self.heap[*id] {
                Obj::Agg(a) => {
                    f(a);
                    Ok(())
                }
                _ => Err(malformed("expected an aggregator")),
            },
            Value::PayloadAgg { row, kind } => {
                let (row, kind) = (row.clone(), *kind);
                let bytes = self.bytes_mut(&row)?;
                let mut agg = read_payload_agg(bytes, 0, kind);
                f(&mut agg);
                write_payload_agg(bytes, 0, &agg);
                Ok(())
            }
            other => Err(malformed(format!("expected an aggregator, got {other:?}"))),
        }
    }

    // ------------------------------------------------------------------
    // Canonical-helper compilation
    // ------------------------------------------------------------------

    /// A filter clause of the emitted shape
    /// `fun f(pci) { return @filterXX(pci, col, val) }` compiles to a
    /// native vectorized filter.
    fn compile_filter_clause(&self, name: &str) -> Option<VectorFilterFn> {
        let func = self.compiled.ast.func(*self.funcs.get(name)?);
        let StmtKind::Block(stmts) = &self.compiled.ast.stmt(func.body).kind else {
            return None;
        };
        let [only] = stmts.as_slice() else {
            return None;
        };
        let StmtKind::Return(Some(call)) = &self.compiled.ast.stmt(*only).kind else {
            return None;
        };
        let ExprKind::Call { callee, args } = &self.compiled.ast.expr(*call).kind else {
            return None;
        };
        let builtin = Builtin::from_name(callee)?;
        let op = match builtin {
            Builtin::FilterEq | Builtin::FilterNe | Builtin::FilterLt | Builtin::FilterLe
            | Builtin::FilterGt | Builtin::FilterGe => filter_cmp_op(builtin),
            _ => return None,
        };
        let [_, col, val] = args.as_slice() else {
            return None;
        };
        let ExprKind::IntLit(col) = self.compiled.ast.expr(*col).kind else {
            return None;
        };
        let ExprKind::IntLit(val) = self.compiled.ast.expr(*val).kind else {
            return None;
        };
        let col = col as usize;
        Some(Box::new(move |pci| pci.filter_cmp(op, col, val)))
    }

    /// A comparator of the emitted shape (per key: two mirrored
    /// `if (@sqlToBool((@rowReadT(lhs, off) < @rowReadT(rhs, off)))) return ±1`
    /// statements, then `return 0`) compiles to a native comparator.
    fn compile_comparator(&self, name: &str) -> Result<SortComparator, RuntimeError> {
        let fid = *self
            .funcs
            .get(name)
            .ok_or_else(|| malformed(format!("unknown comparator '{name}'")))?;
        let func = self.compiled.ast.func(fid).clone();
        let lhs_name = match func.params.as_slice() {
            [(lhs, _), _] => lhs.clone(),
            _ => return Err(malformed("comparator must take two rows")),
        };
        let StmtKind::Block(stmts) = &self.compiled.ast.stmt(func.body).kind else {
            return Err(malformed("comparator body is not a block"));
        };

        let mut keys: Vec<(usize, SqlType, SortDirection)> = Vec::new();
        for sid in stmts {
            match &self.compiled.ast.stmt(*sid).kind {
                StmtKind::Return(Some(e)) => {
                    match self.compiled.ast.expr(*e).kind {
                        ExprKind::IntLit(0) => {}
                        _ => return Err(malformed("unrecognized comparator epilogue")),
                    }
                }
                StmtKind::If { cond, then_block, .. } => {
                    let Some((first, off, ty)) = self.parse_comparator_cond(*cond, &lhs_name)
                    else {
                        return Err(malformed("unrecognized comparator clause"));
                    };
                    let Some(ret) = self.parse_return_lit(*then_block) else {
                        return Err(malformed("unrecognized comparator clause"));
                    };
                    // only the lhs-first clause of each mirrored pair
                    // defines the key; its return value is the direction
                    if first {
                        let dir = if ret < 0 { SortDirection::Asc } else { SortDirection::Desc };
                        keys.push((off, ty, dir));
                    }
                }
                _ => return Err(malformed("unrecognized comparator statement")),
            }
        }
        let pool = Arc::clone(self.ctx.pool());
        Ok(Arc::new(move |a: &[u8], b: &[u8]| {
            for (off, ty, dir) in &keys {
                let av = read_cell(a, *off, *ty, &pool);
                let bv = read_cell(b, *off, *ty, &pool);
                let ord = dir.apply(av.total_cmp(&bv));
                if !ord.is_eq() {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        }))
    }

    /// `@sqlToBool((@rowReadT(a, off) < @rowReadT(b, off)))` →
    /// (a is the lhs param, offset, cell type).
    fn parse_comparator_cond(&self, cond: ExprId, lhs_name: &str) -> Option<(bool, usize, SqlType)> {
        let ast = &self.compiled.ast;
        let ExprKind::Call { callee, args } = &ast.expr(cond).kind else {
            return None;
        };
        if Builtin::from_name(callee) != Some(Builtin::SqlToBool) {
            return None;
        }
        let ExprKind::Binary { op: BinOp::Lt, lhs, rhs } = ast.expr(*args.first()?).kind else {
            return None;
        };
        let (l_name, l_off, l_ty) = self.parse_row_read(lhs)?;
        let (_, r_off, _) = self.parse_row_read(rhs)?;
        if l_off != r_off {
            return None;
        }
        Some((l_name == lhs_name, l_off, l_ty))
    }

    fn parse_row_read(&self, e: ExprId) -> Option<(String, usize, SqlType)> {
        let ast = &self.compiled.ast;
        let ExprKind::Call { callee, args } = &ast.expr(e).kind else {
            return None;
        };
        let builtin = Builtin::from_name(callee)?;
        let ty = match builtin {
            Builtin::RowReadBool | Builtin::RowReadInt | Builtin::RowReadReal
            | Builtin::RowReadDate | Builtin::RowReadVarchar => row_read_type(builtin),
            _ => return None,
        };
        let [row, off] = args.as_slice() else {
            return None;
        };
        let ExprKind::Ident(name) = ast.expr(*row).kind.clone() else {
            return None;
        };
        let ExprKind::IntLit(off) = ast.expr(*off).kind else {
            return None;
        };
        Some((name, off as usize, ty))
    }

    fn parse_return_lit(&self, block: StmtId) -> Option<i64> {
        let ast = &self.compiled.ast;
        let StmtKind::Block(stmts) = &ast.stmt(block).kind else {
            return None;
        };
        let [only] = stmts.as_slice() else {
            return None;
        };
        let StmtKind::Return(Some(e)) = &ast.stmt(*only).kind else {
            return None;
        };
        match ast.expr(*e).kind {
            ExprKind::IntLit(v) => Some(v),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------
// Parallel finalizers: repartition the accumulated run across per-worker
// containers, then merge - the runtime realization of the worker pool
// behind the `…Parallel` intrinsics.
// ----------------------------------------------------------------------

fn parallel_sort(sorter: &mut Sorter, k: Option<u64>) {
    let rows = sorter.drain_rows();
    let cmp = sorter.comparator();
    let size = sorter.tuple_size();
    let tsc: ThreadStateContainer<Sorter> = ThreadStateContainer::new(num_cpus::get());
    rows.par_chunks(1024).for_each(|chunk| {
        tsc.with_state(
            current_worker_index(),
            || Sorter::new(Arc::clone(&cmp), size),
            |local| {
                for row in chunk {
                    let id = local.alloc_input();
                    local.row_mut(id).copy_from_slice(row);
                }
            },
        );
    });
    match k {
        Some(k) => sorter.sort_topk_parallel(tsc.drain(), k),
        None => sorter.sort_parallel(tsc.drain()),
    }
}

fn parallel_join_build(table: &mut JoinHashTable) {
    let entries = table.drain_entries();
    let size = table.tuple_size();
    let tsc: ThreadStateContainer<JoinHashTable> = ThreadStateContainer::new(num_cpus::get());
    entries.par_chunks(1024).for_each(|chunk| {
        tsc.with_state(
            current_worker_index(),
            || JoinHashTable::new(size),
            |local| {
                for (hash, data) in chunk {
                    local.push_entry(*hash, data.clone());
                }
            },
        );
    });
    table.build_parallel(tsc.drain());
}

// ----------------------------------------------------------------------
// Value plumbing
// ----------------------------------------------------------------------

fn as_bool(v: &Value) -> Result<bool, RuntimeError> {
    match v {
        Value::Bool(b) => Ok(*b),
        other => Err(malformed(format!("expected bool, got {other:?}"))),
    }
}

fn as_int(v: &Value) -> Result<i64, RuntimeError> {
    match v {
        Value::Int(i) => Ok(*i),
        other => Err(malformed(format!("expected integer, got {other:?}"))),
    }
}

fn as_uint(v: &Value) -> Result<u64, RuntimeError> {
    match v {
        Value::UInt(u) => Ok(*u),
        other => Err(malformed(format!("expected hash, got {other:?}"))),
    }
}

fn as_float(v: &Value) -> Result<f64, RuntimeError> {
    match v {
        Value::Float(f) => Ok(*f),
        other => Err(malformed(format!("expected float, got {other:?}"))),
    }
}

fn as_str(v: &Value) -> Result<&str, RuntimeError> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(malformed(format!("expected string literal, got {other:?}"))),
    }
}

fn as_sql(v: &Value) -> Result<&SqlValue, RuntimeError> {
    match v {
        Value::Sql(s) => Ok(s),
        other => Err(malformed(format!("expected SQL value, got {other:?}"))),
    }
}

fn as_fn(v: &Value) -> Result<&str, RuntimeError> {
    match v {
        Value::Fn(name) => Ok(name),
        other => Err(malformed(format!("expected function reference, got {other:?}"))),
    }
}

fn as_obj(v: &Value) -> Result<usize, RuntimeError> {
    match v {
        Value::Obj(id) => Ok(*id),
        other => Err(malformed(format!("expected engine object, got {other:?}"))),
    }
}

fn as_pci(v: &Value) -> Result<usize, RuntimeError> {
    match v {
        Value::Pci(id) => Ok(*id),
        other => Err(malformed(format!("expected projected-columns iterator, got {other:?}"))),
    }
}

fn as_row<'v>(v: &'v Value) -> Result<&'v RowRef, RuntimeError> {
    match v {
        Value::Row(r) => Ok(r),
        other => Err(malformed(format!("expected row pointer, got {other:?}"))),
    }
}

fn binary_op(op: BinOp, l: Value, r: Value) -> Result<Value, RuntimeError> {
    if let Some(cmp) = binop_to_cmp(op) {
        return match (&l, &r) {
            (Value::Sql(a), Value::Sql(b)) => Ok(match a.sql_cmp(b) {
                Some(ord) => Value::Sql(SqlValue::boolean(cmp.holds(ord))),
                None => Value::Sql(SqlValue::null_of(SqlType::Boolean)),
            }),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Bool(cmp.holds(a.cmp(b)))),
            (Value::UInt(a), Value::UInt(b)) => Ok(Value::Bool(cmp.holds(a.cmp(b)))),
            // null-pointer checks on lookup results
            (Value::Nil, Value::Nil) => Ok(Value::Bool(cmp == CmpOp::Eq)),
            (Value::Nil, _) | (_, Value::Nil) => Ok(Value::Bool(cmp == CmpOp::Ne)),
            _ => Err(malformed(format!("incomparable values {l:?} and {r:?}"))),
        };
    }
    match (op, &l, &r) {
        (BinOp::And, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a && *b)),
        (BinOp::Or, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),
        (BinOp::Add, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
        (BinOp::Sub, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(*b))),
        _ => Err(malformed(format!("operator {op:?} over {l:?} and {r:?}"))),
    }
}

fn binop_to_cmp(op: BinOp) -> Option<CmpOp> {
    let cmp = match op {
        BinOp::Eq => CmpOp::Eq,
        BinOp::Ne => CmpOp::Ne,
        BinOp::Lt => CmpOp::Lt,
        BinOp::Le => CmpOp::Le,
        BinOp::Gt => CmpOp::Gt,
        BinOp::Ge => CmpOp::Ge,
        _ => return None,
    };
    Some(cmp)
}

fn filter_cmp_op(builtin: Builtin) -> CmpOp {
    match builtin {
        Builtin::FilterEq => CmpOp::Eq,
        Builtin::FilterNe => CmpOp::Ne,
        Builtin::FilterLt => CmpOp::Lt,
        Builtin::FilterLe => CmpOp::Le,
        Builtin::FilterGt => CmpOp::Gt,
        _ => CmpOp::Ge,
    }
}

fn row_read_type(builtin: Builtin) -> SqlType {
    match builtin {
        Builtin::RowReadBool => SqlType::Boolean,
        Builtin::RowReadReal => SqlType::Decimal,
        Builtin::RowReadDate => SqlType::Date,
        Builtin::RowReadVarchar => SqlType::Varchar,
        _ => SqlType::BigInt,
    }
}

fn agg_kind_of(kind: EngineKind) -> Option<AggregateKind> {
    let agg = match kind {
        EngineKind::CountAggregate => AggregateKind::Count,
        EngineKind::CountStarAggregate => AggregateKind::CountStar,
        EngineKind::SumAggregate => AggregateKind::Sum,
        EngineKind::AvgAggregate => AggregateKind::Avg,
        EngineKind::MinAggregate => AggregateKind::Min,
        EngineKind::MaxAggregate => AggregateKind::Max,
        _ => return None,
    };
    Some(agg)
}

fn trig(builtin: Builtin, v: &SqlValue) -> SqlValue {
    let Some(x) = v.as_real() else {
        return SqlValue::null_of(SqlType::Decimal);
    };
    let y = match builtin {
        Builtin::ACos => x.acos(),
        Builtin::ASin => x.asin(),
        Builtin::ATan => x.atan(),
        Builtin::Cos => x.cos(),
        Builtin::Cot => 1.0 / x.tan(),
        Builtin::Sin => x.sin(),
        _ => x.tan(),
    };
    SqlValue::real(y)
}

/// The same mixing the compiled `@hash` contract promises: order-aware
/// combination of the per-value hashes.
fn hash_values(keys: &[SqlValue]) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for k in keys {
        h = h.rotate_left(17) ^ k.hash_value();
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::exec::output::OutputCallback;
    use crate::exec::processor::StorageMap;
    use crate::exec::row::RowLayout;
    use crate::plan::{OutputSchema, PlanExpr, PlanNode};
    use crate::storage::table::{ColumnDef, SqlTable, TableSchema};
    use crate::txn::TransactionManager;
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

    fn run_plan(plan: &PlanNode, storage: &StorageMap, ctx: &ExecutionContext) -> Vec<Vec<SqlValue>> {
        let compiled = compile(plan);
        assert!(compiled.is_ok(), "{:?}", compiled.diagnostics);
        let layout = match plan {
            PlanNode::Output { child } => child.output_schema().row_layout(),
            other => other.output_schema().row_layout(),
        };
        let (tx, rx) = mpsc::channel();
        let pool = Arc::clone(ctx.pool());
        let decode = layout.clone();
        let cb: OutputCallback = Box::new(move |bytes, n, ts| {
            for i in 0..n {
                let row = decode.decode_row(&bytes[i * ts..(i + 1) * ts], &pool);
                let _ = tx.send(row);
            }
        });
        let out = OutputBuffer::new(layout, cb);
        run(&compiled, storage, ctx, out).expect("interpretation");
        rx.try_iter().collect()
    }

    #[test]
    fn test_interprets_a_filtered_scan_module() {
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
        let rows = run_plan(&plan, &storage, &ctx);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], SqlValue::integer(500));
        mgr.commit(&txn);
    }

    #[test]
    fn test_compiled_filter_clause_is_native() {
        let (mgr, storage) = seeded(100);
        let txn = mgr.begin();
        let ctx = ExecutionContext::new(Arc::clone(&txn), 512);
        let plan = PlanNode::Output {
            child: Box::new(PlanNode::SeqScan {
                table: "test_1".into(),
                predicate: Some(PlanExpr::cmp(CmpOp::Lt, PlanExpr::col(0), PlanExpr::int(10))),
                output: int_schema(&["colA", "colB"]),
                parallel: false,
            }),
        };
        let compiled = compile(&plan);
        let out = OutputBuffer::new(RowLayout::new(vec![SqlType::Integer; 2]), Box::new(|_, _, _| {}));
        let vm = Vm::new(&compiled, &storage, &ctx, out);
        // the emitted clause is recognized and compiled, not interpreted
        let clause_name = vm
            .funcs
            .keys()
            .find(|k| k.starts_with("filter_clause"))
            .expect("emitted filter clause")
            .clone();
        assert!(vm.compile_filter_clause(&clause_name).is_some());
        mgr.commit(&txn);
    }

    #[test]
    fn test_comparator_compilation_orders_keys() {
        let (mgr, storage) = seeded(50);
        let txn = mgr.begin();
        let ctx = ExecutionContext::new(Arc::clone(&txn), 512);
        let plan = PlanNode::Output {
            child: Box::new(PlanNode::Sort {
                child: Box::new(PlanNode::SeqScan {
                    table: "test_1".into(),
                    predicate: None,
                    output: int_schema(&["colA", "colB"]),
                    parallel: false,
                }),
                sort_keys: vec![(1, SortDirection::Asc), (0, SortDirection::Desc)],
                limit: None,
                parallel: false,
            }),
        };
        let rows = run_plan(&plan, &storage, &ctx);
        assert_eq!(rows.len(), 50);
        // primary key ascending, secondary descending within groups
        let decoded: Vec<(i64, i64)> = rows
            .iter()
            .map(|r| {
                (
                    r[1].as_integer().expect("colB"),
                    r[0].as_integer().expect("colA"),
                )
            })
            .collect();
        assert!(decoded.windows(2).all(|w| {
            w[0].0 < w[1].0 || (w[0].0 == w[1].0 && w[0].1 >= w[1].1)
        }));
        mgr.commit(&txn);
    }

    #[test]
    fn test_index_scan_module_reads_through_the_iterator() {
        use crate::storage::index::{Index, IndexMetadata};

        let mgr = TransactionManager::new();
        let schema = TableSchema::new(vec![
            ColumnDef::new(1, "colA", SqlType::Integer),
            ColumnDef::new(2, "colB", SqlType::Integer),
        ]);
        let table = Arc::new(SqlTable::new("test_1", schema));
        let index = Arc::new(Index::new(IndexMetadata {
            name: "idx_test_1_colA".into(),
            key_oids: vec![1],
            key_types: vec![SqlType::Integer],
            unique: false,
        }));
        let txn = mgr.begin();
        for i in 0..40 {
            let slot = table.insert(
                &txn,
                vec![SqlValue::integer(i % 4), SqlValue::integer(i)],
            );
            index.insert(&[SqlValue::integer(i % 4)], slot);
        }
        mgr.commit(&txn);
        let mut storage = StorageMap::new();
        storage.add_table(Arc::clone(&table));
        storage.add_index("idx_test_1_colA", index, table);

        let txn = mgr.begin();
        let ctx = ExecutionContext::new(Arc::clone(&txn), 512);
        let plan = PlanNode::Output {
            child: Box::new(PlanNode::IndexScan {
                table: "test_1".into(),
                index: "idx_test_1_colA".into(),
                key: vec![SqlValue::integer(3)],
                predicate: None,
                output: int_schema(&["colA", "colB"]),
            }),
        };
        let rows = run_plan(&plan, &storage, &ctx);
        assert_eq!(rows.len(), 10);
        assert!(rows.iter().all(|r| r[0] == SqlValue::integer(3)));
        mgr.commit(&txn);
    }

    #[test]
    fn test_missing_table_surfaces_from_the_module() {
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
        let compiled = compile(&plan);
        assert!(compiled.is_ok());
        let out = OutputBuffer::new(RowLayout::new(vec![SqlType::Integer]), Box::new(|_, _, _| {}));
        let result = run(&compiled, &storage, &ctx, out);
        assert!(matches!(result, Err(RuntimeError::TableNotFound(_))));
        mgr.commit(&txn);
    }

    #[test]
    fn test_nil_comparisons() {
        let t = binary_op(BinOp::Eq, Value::Nil, Value::Nil).expect("eq");
        assert!(matches!(t, Value::Bool(true)));
        let f = binary_op(
            BinOp::Eq,
            Value::Row(RowRef::Output),
            Value::Nil,
        )
        .expect("eq");
        assert!(matches!(f, Value::Bool(false)));
        let t = binary_op(BinOp::Ne, Value::Row(RowRef::Output), Value::Nil).expect("ne");
        assert!(matches!(t, Value::Bool(true)));
    }
}
