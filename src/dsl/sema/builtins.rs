//! Calling contracts for every intrinsic.
//!
//! Each arm verifies arity and argument types, then records the call's
//! result type. On the first violation the arm reports one diagnostic and
//! bails, leaving the call unresolved.

use super::SemanticAnalyzer;
use crate::dsl::ast::{ExprId, ExprKind, ImplicitCast, UnaryOp};
use crate::dsl::builtins::Builtin;
use crate::dsl::errors::{Arity, DiagnosticKind};
use crate::dsl::types::{EngineKind, PrimKind, TypeCtx, TypeId};

/// A resolved call site, bundled so the checks below stay terse.
struct Site<'s> {
    call: ExprId,
    callee: &'s str,
    args: &'s [ExprId],
    tys: &'s [TypeId],
}

impl SemanticAnalyzer<'_> {
    pub(super) fn check_builtin_call(
        &mut self,
        call: ExprId,
        builtin: Builtin,
        callee: &str,
        args: &[ExprId],
    ) -> Option<TypeId> {
        // ptrCast and sizeOf rewrite their first argument before normal
        // resolution; everything else resolves arguments up front.
        match builtin {
            Builtin::PtrCast => return self.check_ptr_cast(call, callee, args),
            Builtin::SizeOf => return self.check_size_of(call, callee, args),
            _ => {}
        }

        let mut tys = Vec::with_capacity(args.len());
        for &a in args {
            tys.push(self.resolve_expr(a)?);
        }
        let site = Site { call, callee, args, tys: &tys };

        use Builtin::*;
        let result = match builtin {
            // ----------------------------------------------------------
            // Conversions
            // ----------------------------------------------------------
            BoolToSql => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_bool(&site, 0)?;
                self.types.engine(EngineKind::SqlBool)
            }
            IntToSql => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_integer(&site, 0)?;
                self.types.engine(EngineKind::SqlInteger)
            }
            FloatToSql => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_float(&site, 0)?;
                self.types.engine(EngineKind::SqlReal)
            }
            DateToSql => {
                self.want_arity(&site, Arity::Exact(3))?;
                for i in 0..3 {
                    self.want_integer(&site, i)?;
                }
                self.types.engine(EngineKind::SqlDate)
            }
            SqlToBool => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_value(&site, 0, EngineKind::SqlBool)?;
                self.types.bool_ty()
            }

            // ----------------------------------------------------------
            // Vectorized filters
            // ----------------------------------------------------------
            FilterEq | FilterNe | FilterLt | FilterLe | FilterGt | FilterGe => {
                self.want_arity(&site, Arity::Exact(3))?;
                self.want_ptr_to(&site, 0, EngineKind::ProjectedColumnsIterator)?;
                self.want_integer(&site, 1)?;
                self.want_integer(&site, 2)?;
                self.types.int32()
            }

            // ----------------------------------------------------------
            // Table iteration
            // ----------------------------------------------------------
            TableIterInit => {
                self.want_arity(&site, Arity::Exact(3))?;
                self.want_ptr_to(&site, 0, EngineKind::TableVectorIterator)?;
                self.want_string_lit(&site, 1)?;
                self.want_ptr_to(&site, 2, EngineKind::ExecutionContext)?;
                self.types.nil()
            }
            TableIterAdvance => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::TableVectorIterator)?;
                self.types.bool_ty()
            }
            TableIterGetPCI => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::TableVectorIterator)?;
                let pci = self.types.engine(EngineKind::ProjectedColumnsIterator);
                self.types.pointer_to(pci)
            }
            TableIterClose => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::TableVectorIterator)?;
                self.types.nil()
            }
            TableIterParallel => {
                self.want_arity(&site, Arity::Exact(4))?;
                self.want_string_lit(&site, 0)?;
                self.want_any_ptr(&site, 1)?;
                self.want_ptr_to(&site, 2, EngineKind::ThreadStateContainer)?;
                self.want_parallel_scan_fn(&site, 3)?;
                self.types.nil()
            }

            // ----------------------------------------------------------
            // Projected-columns iterator
            // ----------------------------------------------------------
            PCIHasNext | PCIHasNextFiltered => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::ProjectedColumnsIterator)?;
                self.types.bool_ty()
            }
            PCIAdvance | PCIAdvanceFiltered | PCIReset | PCIResetFiltered => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::ProjectedColumnsIterator)?;
                self.types.nil()
            }
            PCIMatch => {
                self.want_arity(&site, Arity::Exact(2))?;
                self.want_ptr_to(&site, 0, EngineKind::ProjectedColumnsIterator)?;
                self.coerce_condition_arg(&site, 1)?;
                self.types.nil()
            }
            PCIGetBool | PCIGetBoolNull => self.pci_getter(&site, EngineKind::SqlBool)?,
            PCIGetTinyInt | PCIGetTinyIntNull | PCIGetSmallInt | PCIGetSmallIntNull
            | PCIGetInt | PCIGetIntNull | PCIGetBigInt | PCIGetBigIntNull => {
                self.pci_getter(&site, EngineKind::SqlInteger)?
            }
            PCIGetReal | PCIGetRealNull => self.pci_getter(&site, EngineKind::SqlReal)?,
            PCIGetDate | PCIGetDateNull => self.pci_getter(&site, EngineKind::SqlDate)?,
            PCIGetVarchar | PCIGetVarcharNull => self.pci_getter(&site, EngineKind::SqlStringVal)?,

            // ----------------------------------------------------------
            // Hashing
            // ----------------------------------------------------------
            Hash => {
                self.want_arity(&site, Arity::AtLeast(1))?;
                for i in 0..site.args.len() {
                    self.want_sql_value(&site, i)?;
                }
                self.types.uint64()
            }

            // ----------------------------------------------------------
            // Filter manager
            // ----------------------------------------------------------
            FilterManagerInit | FilterManagerFinalize | FilterManagerFree => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::FilterManager)?;
                self.types.nil()
            }
            FilterManagerInsertFilter => {
                self.want_arity(&site, Arity::AtLeast(2))?;
                self.want_ptr_to(&site, 0, EngineKind::FilterManager)?;
                for i in 1..site.args.len() {
                    self.want_flavor_fn(&site, i, "(*ProjectedColumnsIterator)->int32", |t, params, ret| {
                        params.len() == 1
                            && t.is_pointer_to(params[0], EngineKind::ProjectedColumnsIterator)
                            && t.is_integer(ret)
                    })?;
                }
                self.types.nil()
            }
            FilterManagerRunFilters => {
                self.want_arity(&site, Arity::Exact(2))?;
                self.want_ptr_to(&site, 0, EngineKind::FilterManager)?;
                self.want_ptr_to(&site, 1, EngineKind::ProjectedColumnsIterator)?;
                self.types.nil()
            }

            // ----------------------------------------------------------
            // Aggregation hash table
            // ----------------------------------------------------------
            AggHashTableInit => {
                self.want_arity(&site, Arity::Exact(3))?;
                self.want_ptr_to(&site, 0, EngineKind::AggregationHashTable)?;
                self.want_ptr_to(&site, 1, EngineKind::MemoryPool)?;
                self.want_integer(&site, 2)?;
                self.types.nil()
            }
            AggHashTableInsert => {
                self.want_arity(&site, Arity::Exact(2))?;
                self.want_ptr_to(&site, 0, EngineKind::AggregationHashTable)?;
                self.want_prim(&site, 1, PrimKind::Uint64)?;
                self.types.byte_ptr()
            }
            AggHashTableLookup => {
                self.want_arity(&site, Arity::Exact(4))?;
                self.want_ptr_to(&site, 0, EngineKind::AggregationHashTable)?;
                self.want_prim(&site, 1, PrimKind::Uint64)?;
                self.want_flavor_fn(&site, 2, "(*entry,*probe)->bool", |t, params, ret| {
                    params.len() == 2
                        && params.iter().all(|p| t.is_pointer(*p))
                        && t.is_bool(ret)
                })?;
                self.want_any_ptr(&site, 3)?;
                self.types.byte_ptr()
            }
            AggHashTableProcessBatch => {
                self.want_arity(&site, Arity::Exact(7))?;
                self.want_ptr_to(&site, 0, EngineKind::AggregationHashTable)?;
                self.want_pci_double_ptr(&site, 1)?;
                for i in 2..6 {
                    self.want_flavor_fn(&site, i, "function", |_, _, _| true)?;
                }
                self.want_bool(&site, 6)?;
                self.types.nil()
            }
            AggHashTableMovePartitions => {
                self.want_arity(&site, Arity::Exact(4))?;
                self.want_ptr_to(&site, 0, EngineKind::AggregationHashTable)?;
                self.want_ptr_to(&site, 1, EngineKind::ThreadStateContainer)?;
                self.want_integer(&site, 2)?;
                self.want_flavor_fn(&site, 3, "merge function", |_, params, _| params.len() == 3)?;
                self.types.nil()
            }
            AggHashTableParallelPartitionedScan => {
                self.want_arity(&site, Arity::Exact(4))?;
                self.want_ptr_to(&site, 0, EngineKind::AggregationHashTable)?;
                self.want_any_ptr(&site, 1)?;
                self.want_ptr_to(&site, 2, EngineKind::ThreadStateContainer)?;
                self.want_flavor_fn(&site, 3, "scan function", |_, params, _| params.len() == 3)?;
                self.types.nil()
            }
            AggHashTableFree => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::AggregationHashTable)?;
                self.types.nil()
            }
            AggHashTableIterInit => {
                self.want_arity(&site, Arity::Exact(2))?;
                self.want_ptr_to(&site, 0, EngineKind::AggregationHashTableIterator)?;
                self.want_ptr_to(&site, 1, EngineKind::AggregationHashTable)?;
                self.types.nil()
            }
            AggHashTableIterHasNext => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::AggregationHashTableIterator)?;
                self.types.bool_ty()
            }
            AggHashTableIterNext | AggHashTableIterClose => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::AggregationHashTableIterator)?;
                self.types.nil()
            }
            AggHashTableIterGetRow => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::AggregationHashTableIterator)?;
                self.types.byte_ptr()
            }
            AggPartIterHasNext => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::AggOverflowPartIter)?;
                self.types.bool_ty()
            }
            AggPartIterNext => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::AggOverflowPartIter)?;
                self.types.nil()
            }
            AggPartIterGetHash => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::AggOverflowPartIter)?;
                self.types.uint64()
            }
            AggPartIterGetRow => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::AggOverflowPartIter)?;
                self.types.byte_ptr()
            }

            // ----------------------------------------------------------
            // Aggregators
            // ----------------------------------------------------------
            AggInit | AggReset => {
                self.want_arity(&site, Arity::AtLeast(1))?;
                for i in 0..site.args.len() {
                    self.want_agg_ptr(&site, i)?;
                }
                self.types.nil()
            }
            AggAdvance => {
                self.want_arity(&site, Arity::Exact(2))?;
                self.want_agg_ptr(&site, 0)?;
                self.want_sql_value_ptr(&site, 1)?;
                self.types.nil()
            }
            AggMerge => {
                self.want_arity(&site, Arity::Exact(2))?;
                self.want_agg_ptr(&site, 0)?;
                self.want_agg_ptr(&site, 1)?;
                if site.tys[0] != site.tys[1] {
                    let expected = self.types.display(site.tys[0]);
                    self.bad_arg(&site, 1, expected);
                    return None;
                }
                self.types.nil()
            }
            AggResult => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_agg_ptr(&site, 0)?;
                // Integer result for every aggregator kind; see DESIGN.md.
                self.types.engine(EngineKind::SqlInteger)
            }

            // ----------------------------------------------------------
            // Join hash table
            // ----------------------------------------------------------
            JoinHashTableInit => {
                self.want_arity(&site, Arity::Exact(3))?;
                self.want_ptr_to(&site, 0, EngineKind::JoinHashTable)?;
                self.want_ptr_to(&site, 1, EngineKind::MemoryPool)?;
                self.want_integer(&site, 2)?;
                self.types.nil()
            }
            JoinHashTableInsert => {
                self.want_arity(&site, Arity::Exact(2))?;
                self.want_ptr_to(&site, 0, EngineKind::JoinHashTable)?;
                self.want_prim(&site, 1, PrimKind::Uint64)?;
                self.types.byte_ptr()
            }
            JoinHashTableBuild => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::JoinHashTable)?;
                self.types.nil()
            }
            JoinHashTableBuildParallel => {
                self.want_arity(&site, Arity::Exact(3))?;
                self.want_ptr_to(&site, 0, EngineKind::JoinHashTable)?;
                self.want_ptr_to(&site, 1, EngineKind::ThreadStateContainer)?;
                self.want_integer(&site, 2)?;
                self.types.nil()
            }
            JoinHashTableFree => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::JoinHashTable)?;
                self.types.nil()
            }
            JoinHashTableIterInit => {
                self.want_arity(&site, Arity::Exact(3))?;
                self.want_ptr_to(&site, 0, EngineKind::JoinHashTableIterator)?;
                self.want_ptr_to(&site, 1, EngineKind::JoinHashTable)?;
                self.want_prim(&site, 2, PrimKind::Uint64)?;
                self.types.nil()
            }
            JoinHashTableIterHasNext => {
                self.want_arity(&site, Arity::Exact(4))?;
                self.want_ptr_to(&site, 0, EngineKind::JoinHashTableIterator)?;
                self.want_flavor_fn(&site, 1, "(*ctx,*probe,*entry)->bool", |t, params, ret| {
                    params.len() == 3
                        && params.iter().all(|p| t.is_pointer(*p))
                        && t.is_bool(ret)
                })?;
                self.want_any_ptr(&site, 2)?;
                self.want_any_ptr(&site, 3)?;
                self.types.bool_ty()
            }
            JoinHashTableIterGetRow => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::JoinHashTableIterator)?;
                self.types.byte_ptr()
            }
            JoinHashTableIterClose => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::JoinHashTableIterator)?;
                self.types.nil()
            }

            // ----------------------------------------------------------
            // Sorter
            // ----------------------------------------------------------
            SorterInit => {
                self.want_arity(&site, Arity::Exact(4))?;
                self.want_ptr_to(&site, 0, EngineKind::Sorter)?;
                self.want_ptr_to(&site, 1, EngineKind::MemoryPool)?;
                self.want_flavor_fn(&site, 2, "(*lhs,*rhs)->int32", |t, params, ret| {
                    params.len() == 2
                        && params.iter().all(|p| t.is_pointer(*p))
                        && t.is_integer(ret)
                })?;
                self.want_integer(&site, 3)?;
                self.types.nil()
            }
            SorterInsert => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::Sorter)?;
                self.types.byte_ptr()
            }
            SorterSort | SorterFree => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::Sorter)?;
                self.types.nil()
            }
            SorterSortParallel => {
                self.want_arity(&site, Arity::Exact(3))?;
                self.want_ptr_to(&site, 0, EngineKind::Sorter)?;
                self.want_ptr_to(&site, 1, EngineKind::ThreadStateContainer)?;
                self.want_integer(&site, 2)?;
                self.types.nil()
            }
            SorterSortTopKParallel => {
                self.want_arity(&site, Arity::Exact(4))?;
                self.want_ptr_to(&site, 0, EngineKind::Sorter)?;
                self.want_ptr_to(&site, 1, EngineKind::ThreadStateContainer)?;
                self.want_integer(&site, 2)?;
                self.want_integer(&site, 3)?;
                self.types.nil()
            }
            SorterIterInit => {
                self.want_arity(&site, Arity::Exact(2))?;
                self.want_ptr_to(&site, 0, EngineKind::SorterIterator)?;
                self.want_ptr_to(&site, 1, EngineKind::Sorter)?;
                self.types.nil()
            }
            SorterIterHasNext => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::SorterIterator)?;
                self.types.bool_ty()
            }
            SorterIterNext | SorterIterClose => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::SorterIterator)?;
                self.types.nil()
            }
            SorterIterGetRow => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::SorterIterator)?;
                self.types.byte_ptr()
            }

            // ----------------------------------------------------------
            // Real-valued math
            // ----------------------------------------------------------
            ACos | ASin | ATan | Cos | Cot | Sin | Tan => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_value(&site, 0, EngineKind::SqlReal)?;
                self.types.engine(EngineKind::SqlReal)
            }
            ATan2 => {
                self.want_arity(&site, Arity::Exact(2))?;
                self.want_value(&site, 0, EngineKind::SqlReal)?;
                self.want_value(&site, 1, EngineKind::SqlReal)?;
                self.types.engine(EngineKind::SqlReal)
            }

            // ----------------------------------------------------------
            // Output buffer
            // ----------------------------------------------------------
            OutputAlloc => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::ExecutionContext)?;
                self.types.byte_ptr()
            }
            OutputAdvance | OutputFinalize => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::ExecutionContext)?;
                self.types.nil()
            }
            OutputSetNull => {
                self.want_arity(&site, Arity::Exact(2))?;
                self.want_ptr_to(&site, 0, EngineKind::ExecutionContext)?;
                self.want_integer(&site, 1)?;
                self.types.nil()
            }

            // ----------------------------------------------------------
            // Index iteration
            // ----------------------------------------------------------
            IndexIteratorInit => {
                self.want_arity(&site, Arity::Exact(3))?;
                self.want_ptr_to(&site, 0, EngineKind::IndexIterator)?;
                self.want_string_lit(&site, 1)?;
                self.want_ptr_to(&site, 2, EngineKind::ExecutionContext)?;
                self.types.nil()
            }
            IndexIteratorGetKeyRow => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::IndexIterator)?;
                self.types.byte_ptr()
            }
            IndexIteratorScanKey => {
                self.want_arity(&site, Arity::Exact(2))?;
                self.want_ptr_to(&site, 0, EngineKind::IndexIterator)?;
                self.want_ptr_prim(&site, 1, PrimKind::Int8)?;
                self.types.nil()
            }
            IndexIteratorAdvance => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::IndexIterator)?;
                self.types.bool_ty()
            }
            IndexIteratorGetRow => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::IndexIterator)?;
                self.types.byte_ptr()
            }
            IndexIteratorFree => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::IndexIterator)?;
                self.types.nil()
            }

            // ----------------------------------------------------------
            // Materialized row cells
            // ----------------------------------------------------------
            RowWriteBool => self.row_write(&site, EngineKind::SqlBool)?,
            RowWriteInt => self.row_write(&site, EngineKind::SqlInteger)?,
            RowWriteReal => self.row_write(&site, EngineKind::SqlReal)?,
            RowWriteDate => self.row_write(&site, EngineKind::SqlDate)?,
            RowWriteVarchar => self.row_write(&site, EngineKind::SqlStringVal)?,
            RowReadBool => self.row_read(&site, EngineKind::SqlBool)?,
            RowReadInt => self.row_read(&site, EngineKind::SqlInteger)?,
            RowReadReal => self.row_read(&site, EngineKind::SqlReal)?,
            RowReadDate => self.row_read(&site, EngineKind::SqlDate)?,
            RowReadVarchar => self.row_read(&site, EngineKind::SqlStringVal)?,

            // ----------------------------------------------------------
            // Thread-local states
            // ----------------------------------------------------------
            TlsInit => {
                self.want_arity(&site, Arity::Exact(3))?;
                self.want_ptr_to(&site, 0, EngineKind::ThreadStateContainer)?;
                self.want_ptr_to(&site, 1, EngineKind::MemoryPool)?;
                self.want_integer(&site, 2)?;
                self.types.nil()
            }
            TlsReset => {
                self.want_arity(&site, Arity::Exact(5))?;
                self.want_ptr_to(&site, 0, EngineKind::ThreadStateContainer)?;
                self.want_integer(&site, 1)?;
                self.want_flavor_fn(&site, 2, "init function", |_, params, _| params.len() == 2)?;
                self.want_flavor_fn(&site, 3, "teardown function", |_, params, _| params.len() == 2)?;
                self.want_any_ptr(&site, 4)?;
                self.types.nil()
            }
            TlsIterate => {
                self.want_arity(&site, Arity::Exact(3))?;
                self.want_ptr_to(&site, 0, EngineKind::ThreadStateContainer)?;
                self.want_any_ptr(&site, 1)?;
                self.want_flavor_fn(&site, 2, "(*ctx,*state)->nil", |t, params, _| {
                    params.len() == 2 && params.iter().all(|p| t.is_pointer(*p))
                })?;
                self.types.nil()
            }
            TlsFree => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::ThreadStateContainer)?;
                self.types.nil()
            }

            // ----------------------------------------------------------
            // Misc
            // ----------------------------------------------------------
            ExecCtxGetMemPool => {
                self.want_arity(&site, Arity::Exact(1))?;
                self.want_ptr_to(&site, 0, EngineKind::ExecutionContext)?;
                let pool = self.types.engine(EngineKind::MemoryPool);
                self.types.pointer_to(pool)
            }
            SizeOf | PtrCast => unreachable!("rewritten before dispatch"),
        };

        Some(result)
    }

    // --------------------------------------------------------------
    // Pre-resolution rewrites
    // --------------------------------------------------------------

    /// `ptrCast(*T, e)`: the target arrives as a dereference expression
    /// because call-site grammar cannot tell a type from an expression.
    /// Rewrite it to a pointer-type representation, then require both
    /// sides to be pointers.
    fn check_ptr_cast(&mut self, call: ExprId, callee: &str, args: &[ExprId]) -> Option<TypeId> {
        let pos = self.ast.expr(call).pos;
        if args.len() != 2 {
            self.reporter.report(
                pos,
                DiagnosticKind::MismatchedArgCount {
                    callee: callee.to_string(),
                    expected: Arity::Exact(2),
                    got: args.len(),
                },
            );
            return None;
        }

        let target = self.rewrite_type_target(args[0], true);
        let Some(target) = target else {
            self.reporter.report(
                pos,
                DiagnosticKind::BadPointerCast {
                    from: "<malformed cast target>".to_string(),
                    to: "<pointer type>".to_string(),
                },
            );
            return None;
        };

        let input = self.resolve_expr(args[1])?;
        if !self.types.is_pointer(input) {
            let from = self.types.display(input);
            let to = self.types.display(target);
            self.reporter.report(pos, DiagnosticKind::BadPointerCast { from, to });
            return None;
        }
        Some(target)
    }

    /// `sizeOf(T)` accepts a type name or any expression; the result is
    /// always a uint32 byte count.
    fn check_size_of(&mut self, call: ExprId, callee: &str, args: &[ExprId]) -> Option<TypeId> {
        let pos = self.ast.expr(call).pos;
        if args.len() != 1 {
            self.reporter.report(
                pos,
                DiagnosticKind::MismatchedArgCount {
                    callee: callee.to_string(),
                    expected: Arity::Exact(1),
                    got: args.len(),
                },
            );
            return None;
        }
        if self.rewrite_type_target(args[0], false).is_none() {
            self.resolve_expr(args[0])?;
        }
        Some(self.types.uint32())
    }

    /// Rewrite a type-position argument into a `TypeRepr`. With
    /// `as_pointer`, the expected shape is a deref of a type name and the
    /// result is a pointer to that type; otherwise a bare type name maps
    /// to the type itself.
    fn rewrite_type_target(&mut self, arg: ExprId, as_pointer: bool) -> Option<TypeId> {
        let kind = self.ast.expr(arg).kind.clone();
        let ty = if as_pointer {
            let ExprKind::Unary { op: UnaryOp::Deref, operand } = kind else {
                return None;
            };
            let operand_kind = self.ast.expr(operand).kind.clone();
            let ExprKind::Ident(name) = operand_kind else {
                return None;
            };
            let base = self.types.lookup_named(&name)?;
            self.types.pointer_to(base)
        } else {
            let ExprKind::Ident(name) = kind else {
                return None;
            };
            self.types.lookup_named(&name)?
        };
        self.ast.expr_mut(arg).kind = ExprKind::TypeRepr(ty);
        self.ast.set_type(arg, ty);
        Some(ty)
    }

    // --------------------------------------------------------------
    // Shared family shapes
    // --------------------------------------------------------------

    fn pci_getter(&mut self, site: &Site<'_>, result: EngineKind) -> Option<TypeId> {
        self.want_arity(site, Arity::Exact(2))?;
        self.want_ptr_to(site, 0, EngineKind::ProjectedColumnsIterator)?;
        self.want_integer(site, 1)?;
        Some(self.types.engine(result))
    }

    fn row_write(&mut self, site: &Site<'_>, value: EngineKind) -> Option<TypeId> {
        self.want_arity(site, Arity::Exact(3))?;
        self.want_ptr_prim(site, 0, PrimKind::Uint8)?;
        self.want_integer(site, 1)?;
        self.want_value(site, 2, value)?;
        Some(self.types.nil())
    }

    fn row_read(&mut self, site: &Site<'_>, value: EngineKind) -> Option<TypeId> {
        self.want_arity(site, Arity::Exact(2))?;
        self.want_ptr_prim(site, 0, PrimKind::Uint8)?;
        self.want_integer(site, 1)?;
        Some(self.types.engine(value))
    }

    /// PCIMatch's condition: native bool passes through, SqlBool gets an
    /// implicit truth-test cast inserted into the call.
    fn coerce_condition_arg(&mut self, site: &Site<'_>, idx: usize) -> Option<()> {
        let ty = site.tys[idx];
        if self.types.is_bool(ty) {
            return Some(());
        }
        if self.types.is_specific(ty, EngineKind::SqlBool) {
            let cast = self.ast.alloc_expr(ExprKind::Cast {
                cast: ImplicitCast::SqlBoolToBool,
                operand: site.args[idx],
            });
            let bool_ty = self.types.bool_ty();
            self.ast.set_type(cast, bool_ty);
            if let ExprKind::Call { args, .. } = &mut self.ast.expr_mut(site.call).kind {
                args[idx] = cast;
            }
            return Some(());
        }
        self.bad_arg(site, idx, "bool".to_string());
        None
    }

    fn want_parallel_scan_fn(&mut self, site: &Site<'_>, idx: usize) -> Option<()> {
        let ty = site.tys[idx];
        let ok = self
            .types
            .function_shape(ty)
            .is_some_and(|(params, _)| {
                params.len() == 3
                    && self.types.is_pointer(params[0])
                    && self.types.is_pointer(params[1])
                    && self.types.is_pointer_to(params[2], EngineKind::TableVectorIterator)
            });
        if ok {
            return Some(());
        }
        let pos = self.ast.expr(site.call).pos;
        let actual = self.types.display(ty);
        self.reporter.report(pos, DiagnosticKind::BadParallelScanFunction { actual });
        None
    }

    // --------------------------------------------------------------
    // Primitive checks
    // --------------------------------------------------------------

    fn want_arity(&mut self, site: &Site<'_>, arity: Arity) -> Option<()> {
        let got = site.args.len();
        let ok = match arity {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
        };
        if ok {
            return Some(());
        }
        let pos = self.ast.expr(site.call).pos;
        self.reporter.report(
            pos,
            DiagnosticKind::MismatchedArgCount {
                callee: site.callee.to_string(),
                expected: arity,
                got,
            },
        );
        None
    }

    fn bad_arg(&mut self, site: &Site<'_>, idx: usize, expected: String) {
        let pos = self.ast.expr(site.call).pos;
        let actual = self.types.display(site.tys[idx]);
        self.reporter.report(
            pos,
            DiagnosticKind::BadArgType {
                callee: site.callee.to_string(),
                index: idx,
                expected,
                actual,
            },
        );
    }

    fn want_ptr_to(&mut self, site: &Site<'_>, idx: usize, kind: EngineKind) -> Option<()> {
        if self.types.is_pointer_to(site.tys[idx], kind) {
            return Some(());
        }
        self.bad_arg(site, idx, format!("*{}", kind.name()));
        None
    }

    fn want_ptr_prim(&mut self, site: &Site<'_>, idx: usize, prim: PrimKind) -> Option<()> {
        let ok = self
            .types
            .pointee(site.tys[idx])
            .is_some_and(|p| *self.types.kind(p) == crate::dsl::types::TypeKind::Prim(prim));
        if ok {
            return Some(());
        }
        self.bad_arg(site, idx, format!("*{}", prim.name()));
        None
    }

    fn want_any_ptr(&mut self, site: &Site<'_>, idx: usize) -> Option<()> {
        if self.types.is_pointer(site.tys[idx]) {
            return Some(());
        }
        self.bad_arg(site, idx, "<pointer>".to_string());
        None
    }

    fn want_bool(&mut self, site: &Site<'_>, idx: usize) -> Option<()> {
        if self.types.is_bool(site.tys[idx]) {
            return Some(());
        }
        self.bad_arg(site, idx, "bool".to_string());
        None
    }

    fn want_integer(&mut self, site: &Site<'_>, idx: usize) -> Option<()> {
        if self.types.is_integer(site.tys[idx]) {
            return Some(());
        }
        self.bad_arg(site, idx, "<integer>".to_string());
        None
    }

    fn want_float(&mut self, site: &Site<'_>, idx: usize) -> Option<()> {
        if self.types.is_float(site.tys[idx]) {
            return Some(());
        }
        self.bad_arg(site, idx, "<float>".to_string());
        None
    }

    fn want_prim(&mut self, site: &Site<'_>, idx: usize, prim: PrimKind) -> Option<()> {
        let want = self.types.prim(prim);
        if site.tys[idx] == want {
            return Some(());
        }
        self.bad_arg(site, idx, prim.name().to_string());
        None
    }

    fn want_value(&mut self, site: &Site<'_>, idx: usize, kind: EngineKind) -> Option<()> {
        if self.types.is_specific(site.tys[idx], kind) {
            return Some(());
        }
        self.bad_arg(site, idx, kind.name().to_string());
        None
    }

    fn want_string_lit(&mut self, site: &Site<'_>, idx: usize) -> Option<()> {
        if self.types.is_string_literal(site.tys[idx]) {
            return Some(());
        }
        self.bad_arg(site, idx, "<string literal>".to_string());
        None
    }

    fn want_sql_value(&mut self, site: &Site<'_>, idx: usize) -> Option<()> {
        if self.types.is_sql_value(site.tys[idx]) {
            return Some(());
        }
        let pos = self.ast.expr(site.call).pos;
        let actual = self.types.display(site.tys[idx]);
        self.reporter.report(
            pos,
            DiagnosticKind::NotASqlValue {
                callee: site.callee.to_string(),
                index: idx,
                actual,
            },
        );
        None
    }

    fn want_sql_value_ptr(&mut self, site: &Site<'_>, idx: usize) -> Option<()> {
        let ok = self
            .types
            .pointee(site.tys[idx])
            .is_some_and(|p| self.types.is_sql_value(p));
        if ok {
            return Some(());
        }
        let pos = self.ast.expr(site.call).pos;
        let actual = self.types.display(site.tys[idx]);
        self.reporter.report(
            pos,
            DiagnosticKind::NotASqlValue {
                callee: site.callee.to_string(),
                index: idx,
                actual,
            },
        );
        None
    }

    fn want_agg_ptr(&mut self, site: &Site<'_>, idx: usize) -> Option<()> {
        let ok = self
            .types
            .pointee(site.tys[idx])
            .is_some_and(|p| self.types.is_sql_aggregator(p));
        if ok {
            return Some(());
        }
        let pos = self.ast.expr(site.call).pos;
        let actual = self.types.display(site.tys[idx]);
        self.reporter.report(
            pos,
            DiagnosticKind::NotAnAggregator {
                callee: site.callee.to_string(),
                index: idx,
                actual,
            },
        );
        None
    }

    /// An argument that must be a function of a particular flavor. The
    /// predicate sees (types, params, return).
    fn want_flavor_fn(
        &mut self,
        site: &Site<'_>,
        idx: usize,
        expected: &str,
        pred: impl Fn(&TypeCtx, &[TypeId], TypeId) -> bool,
    ) -> Option<()> {
        let ty = site.tys[idx];
        let ok = self
            .types
            .function_shape(ty)
            .is_some_and(|(params, ret)| pred(self.types, params, ret));
        if ok {
            return Some(());
        }
        let pos = self.ast.expr(site.call).pos;
        let actual = self.types.display(ty);
        self.reporter.report(
            pos,
            DiagnosticKind::BadFunctionShape {
                callee: site.callee.to_string(),
                index: idx,
                expected: expected.to_string(),
                actual,
            },
        );
        None
    }

    /// ProcessBatch hands the iterator through a pointer-to-pointer.
    fn want_pci_double_ptr(&mut self, site: &Site<'_>, idx: usize) -> Option<()> {
        let ok = self
            .types
            .pointee(site.tys[idx])
            .and_then(|p| self.types.pointee(p))
            .is_some_and(|inner| self.types.is_specific(inner, EngineKind::ProjectedColumnsIterator));
        if ok {
            return Some(());
        }
        self.bad_arg(site, idx, "**ProjectedColumnsIterator".to_string());
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::dsl::ast::{AstArena, ExprId, ExprKind, UnaryOp};
    use crate::dsl::errors::{DiagnosticKind, ErrorReporter};
    use crate::dsl::types::{EngineKind, PrimKind, TypeCtx, TypeId};
    use crate::dsl::SemanticAnalyzer;

    /// Build a call whose arguments are pre-typed idents, run the
    /// analyzer, and hand back (result type, diagnostics).
    fn check(
        callee: &str,
        setup: impl FnOnce(&mut AstArena, &mut TypeCtx) -> Vec<ExprId>,
    ) -> (Option<TypeId>, Vec<DiagnosticKind>, TypeCtx) {
        let mut ast = AstArena::new();
        let mut types = TypeCtx::new();
        let args = setup(&mut ast, &mut types);
        let call = ast.alloc_expr(ExprKind::Call { callee: callee.into(), args });
        let mut reporter = ErrorReporter::new();
        let ty = SemanticAnalyzer::new(&mut ast, &mut types, &mut reporter).resolve_expr(call);
        let kinds = reporter.diagnostics().iter().map(|d| d.kind.clone()).collect();
        (ty, kinds, types)
    }

    fn typed_arg(ast: &mut AstArena, ty: TypeId) -> ExprId {
        let e = ast.alloc_expr(ExprKind::NilLit);
        ast.set_type(e, ty);
        e
    }

    fn ptr_arg(ast: &mut AstArena, types: &mut TypeCtx, kind: EngineKind) -> ExprId {
        let base = types.engine(kind);
        let ptr = types.pointer_to(base);
        typed_arg(ast, ptr)
    }

    #[test]
    fn test_table_iter_init_ok() {
        let (ty, errs, types) = check("tableIterInit", |ast, types| {
            let tvi = ptr_arg(ast, types, EngineKind::TableVectorIterator);
            let name = ast.alloc_expr(ExprKind::StringLit("test_1".into()));
            let ctx = ptr_arg(ast, types, EngineKind::ExecutionContext);
            vec![tvi, name, ctx]
        });
        assert!(errs.is_empty());
        assert!(ty.is_some_and(|t| types.is_nil(t)));
    }

    #[test]
    fn test_table_iter_init_wrong_arity() {
        let (ty, errs, _) = check("tableIterInit", |ast, types| {
            vec![ptr_arg(ast, types, EngineKind::TableVectorIterator)]
        });
        assert_eq!(ty, None);
        assert_eq!(errs.len(), 1);
        assert!(matches!(errs[0], DiagnosticKind::MismatchedArgCount { .. }));
    }

    #[test]
    fn test_table_iter_advance_result_is_bool() {
        let (ty, errs, types) = check("tableIterAdvance", |ast, types| {
            vec![ptr_arg(ast, types, EngineKind::TableVectorIterator)]
        });
        assert!(errs.is_empty());
        assert!(ty.is_some_and(|t| types.is_bool(t)));
    }

    #[test]
    fn test_table_iter_get_pci_result() {
        let (ty, errs, mut types) = check("tableIterGetPCI", |ast, types| {
            vec![ptr_arg(ast, types, EngineKind::TableVectorIterator)]
        });
        assert!(errs.is_empty());
        let pci = types.engine(EngineKind::ProjectedColumnsIterator);
        let want = types.pointer_to(pci);
        assert_eq!(ty, Some(want));
    }

    #[test]
    fn test_wrong_pointer_kind_is_bad_arg() {
        let (ty, errs, _) = check("tableIterAdvance", |ast, types| {
            vec![ptr_arg(ast, types, EngineKind::Sorter)]
        });
        assert_eq!(ty, None);
        assert!(matches!(errs[0], DiagnosticKind::BadArgType { index: 0, .. }));
    }

    #[test]
    fn test_filter_eq_contract() {
        let (ty, errs, mut types) = check("filterEq", |ast, types| {
            let pci = ptr_arg(ast, types, EngineKind::ProjectedColumnsIterator);
            let col = ast.alloc_expr(ExprKind::IntLit(0));
            let val = ast.alloc_expr(ExprKind::IntLit(500));
            vec![pci, col, val]
        });
        assert!(errs.is_empty());
        assert_eq!(ty, Some(types.int32()));
    }

    #[test]
    fn test_hash_requires_sql_values() {
        let (ty, errs, mut types) = check("hash", |ast, types| {
            let t = types.engine(EngineKind::SqlInteger);
            vec![typed_arg(ast, t)]
        });
        assert!(errs.is_empty());
        assert_eq!(ty, Some(types.uint64()));

        let (ty, errs, _) = check("hash", |ast, _| {
            vec![ast.alloc_expr(ExprKind::IntLit(3))]
        });
        assert_eq!(ty, None);
        assert!(matches!(errs[0], DiagnosticKind::NotASqlValue { index: 0, .. }));
    }

    #[test]
    fn test_hash_needs_at_least_one_arg() {
        let (ty, errs, _) = check("hash", |_, _| vec![]);
        assert_eq!(ty, None);
        assert!(matches!(errs[0], DiagnosticKind::MismatchedArgCount { .. }));
    }

    #[test]
    fn test_agg_advance() {
        let (ty, errs, types) = check("aggAdvance", |ast, types| {
            let agg = ptr_arg(ast, types, EngineKind::SumAggregate);
            let val = {
                let v = types.engine(EngineKind::SqlInteger);
                let p = types.pointer_to(v);
                typed_arg(ast, p)
            };
            vec![agg, val]
        });
        assert!(errs.is_empty());
        assert!(ty.is_some_and(|t| types.is_nil(t)));
    }

    #[test]
    fn test_agg_advance_rejects_non_aggregator() {
        let (ty, errs, _) = check("aggAdvance", |ast, types| {
            let not_agg = ptr_arg(ast, types, EngineKind::Sorter);
            let val = {
                let v = types.engine(EngineKind::SqlInteger);
                let p = types.pointer_to(v);
                typed_arg(ast, p)
            };
            vec![not_agg, val]
        });
        assert_eq!(ty, None);
        assert!(matches!(errs[0], DiagnosticKind::NotAnAggregator { index: 0, .. }));
    }

    #[test]
    fn test_agg_merge_requires_same_kind() {
        let (ty, errs, _) = check("aggMerge", |ast, types| {
            let a = ptr_arg(ast, types, EngineKind::SumAggregate);
            let b = ptr_arg(ast, types, EngineKind::MaxAggregate);
            vec![a, b]
        });
        assert_eq!(ty, None);
        assert!(matches!(errs[0], DiagnosticKind::BadArgType { index: 1, .. }));
    }

    #[test]
    fn test_agg_result_is_sql_integer() {
        let (ty, errs, mut types) = check("aggResult", |ast, types| {
            vec![ptr_arg(ast, types, EngineKind::CountAggregate)]
        });
        assert!(errs.is_empty());
        assert_eq!(ty, Some(types.engine(EngineKind::SqlInteger)));
    }

    #[test]
    fn test_join_ht_build_arity_is_exactly_one() {
        let (ty, errs, _) = check("joinHTBuild", |ast, types| {
            let a = ptr_arg(ast, types, EngineKind::JoinHashTable);
            let b = ptr_arg(ast, types, EngineKind::JoinHashTable);
            vec![a, b]
        });
        assert_eq!(ty, None);
        assert!(matches!(errs[0], DiagnosticKind::MismatchedArgCount { .. }));
    }

    #[test]
    fn test_join_ht_insert_wants_uint64_hash() {
        let (ty, errs, _) = check("joinHTInsert", |ast, types| {
            let jht = ptr_arg(ast, types, EngineKind::JoinHashTable);
            let hash = ast.alloc_expr(ExprKind::IntLit(1));
            vec![jht, hash]
        });
        // int64 literal is not a uint64 hash
        assert_eq!(ty, None);
        assert!(matches!(errs[0], DiagnosticKind::BadArgType { index: 1, .. }));

        let (ty, errs, mut types) = check("joinHTInsert", |ast, types| {
            let jht = ptr_arg(ast, types, EngineKind::JoinHashTable);
            let hash = typed_arg(ast, types.uint64());
            vec![jht, hash]
        });
        assert!(errs.is_empty());
        let want = types.byte_ptr();
        assert_eq!(ty, Some(want));
    }

    #[test]
    fn test_join_ht_iter_has_next_checks_eq_fn_shape() {
        let good_fn = |ast: &mut AstArena, types: &mut TypeCtx| {
            let p = types.byte_ptr();
            let b = types.bool_ty();
            let f = types.function(vec![p, p, p], b);
            typed_arg(ast, f)
        };
        let (ty, errs, _) = check("joinHTIterHasNext", |ast, types| {
            let it = ptr_arg(ast, types, EngineKind::JoinHashTableIterator);
            let f = good_fn(ast, types);
            let a = typed_arg(ast, types.byte_ptr());
            let b = typed_arg(ast, types.byte_ptr());
            vec![it, f, a, b]
        });
        assert!(errs.is_empty());
        assert!(ty.is_some());

        let (ty, errs, _) = check("joinHTIterHasNext", |ast, types| {
            let it = ptr_arg(ast, types, EngineKind::JoinHashTableIterator);
            let p = types.byte_ptr();
            let b = types.bool_ty();
            let two_params = types.function(vec![p, p], b);
            let f = typed_arg(ast, two_params);
            let a = typed_arg(ast, types.byte_ptr());
            let c = typed_arg(ast, types.byte_ptr());
            vec![it, f, a, c]
        });
        assert_eq!(ty, None);
        assert!(matches!(errs[0], DiagnosticKind::BadFunctionShape { index: 1, .. }));
    }

    #[test]
    fn test_sorter_init_contract() {
        let (ty, errs, types) = check("sorterInit", |ast, types| {
            let sorter = ptr_arg(ast, types, EngineKind::Sorter);
            let pool = ptr_arg(ast, types, EngineKind::MemoryPool);
            let p = types.byte_ptr();
            let i32t = types.int32();
            let cmp = types.function(vec![p, p], i32t);
            let cmp = typed_arg(ast, cmp);
            let size = ast.alloc_expr(ExprKind::IntLit(16));
            vec![sorter, pool, cmp, size]
        });
        assert!(errs.is_empty());
        assert!(ty.is_some_and(|t| types.is_nil(t)));
    }

    #[test]
    fn test_sorter_top_k_parallel_arity() {
        let (ty, errs, _) = check("sorterSortTopKParallel", |ast, types| {
            let sorter = ptr_arg(ast, types, EngineKind::Sorter);
            let tls = ptr_arg(ast, types, EngineKind::ThreadStateContainer);
            let off = ast.alloc_expr(ExprKind::IntLit(0));
            vec![sorter, tls, off]
        });
        assert_eq!(ty, None);
        assert!(matches!(errs[0], DiagnosticKind::MismatchedArgCount { .. }));
    }

    #[test]
    fn test_parallel_scan_function_shape() {
        let (ty, errs, _) = check("tableIterParallel", |ast, types| {
            let name = ast.alloc_expr(ExprKind::StringLit("t".into()));
            let qs = typed_arg(ast, types.byte_ptr());
            let tls = ptr_arg(ast, types, EngineKind::ThreadStateContainer);
            let p = types.byte_ptr();
            let tvi = types.engine(EngineKind::TableVectorIterator);
            let tvi_ptr = types.pointer_to(tvi);
            let nil = types.nil();
            let f = types.function(vec![p, p, tvi_ptr], nil);
            let f = typed_arg(ast, f);
            vec![name, qs, tls, f]
        });
        assert!(errs.is_empty(), "unexpected: {errs:?}");
        assert!(ty.is_some());

        let (ty, errs, _) = check("tableIterParallel", |ast, types| {
            let name = ast.alloc_expr(ExprKind::StringLit("t".into()));
            let qs = typed_arg(ast, types.byte_ptr());
            let tls = ptr_arg(ast, types, EngineKind::ThreadStateContainer);
            let p = types.byte_ptr();
            let nil = types.nil();
            let f = types.function(vec![p, p, p], nil);
            let f = typed_arg(ast, f);
            vec![name, qs, tls, f]
        });
        assert_eq!(ty, None);
        assert!(matches!(errs[0], DiagnosticKind::BadParallelScanFunction { .. }));
    }

    #[test]
    fn test_agg_ht_process_batch_wants_double_pointer() {
        let (ty, errs, _) = check("aggHTProcessBatch", |ast, types| {
            let aht = ptr_arg(ast, types, EngineKind::AggregationHashTable);
            // single pointer: wrong
            let pci = ptr_arg(ast, types, EngineKind::ProjectedColumnsIterator);
            let p = types.byte_ptr();
            let nil = types.nil();
            let f = types.function(vec![p], nil);
            let fns: Vec<_> = (0..4).map(|_| typed_arg(ast, f)).collect();
            let flag = ast.alloc_expr(ExprKind::BoolLit(false));
            let mut args = vec![aht, pci];
            args.extend(fns);
            args.push(flag);
            args
        });
        assert_eq!(ty, None);
        assert!(matches!(errs[0], DiagnosticKind::BadArgType { index: 1, .. }));

        let (ty, errs, _) = check("aggHTProcessBatch", |ast, types| {
            let aht = ptr_arg(ast, types, EngineKind::AggregationHashTable);
            let pci = types.engine(EngineKind::ProjectedColumnsIterator);
            let pp = types.pointer_to(pci);
            let ppp = types.pointer_to(pp);
            let pci2 = typed_arg(ast, ppp);
            let p = types.byte_ptr();
            let nil = types.nil();
            let f = types.function(vec![p], nil);
            let fns: Vec<_> = (0..4).map(|_| typed_arg(ast, f)).collect();
            let flag = ast.alloc_expr(ExprKind::BoolLit(false));
            let mut args = vec![aht, pci2];
            args.extend(fns);
            args.push(flag);
            args
        });
        assert!(errs.is_empty());
        assert!(ty.is_some());
    }

    #[test]
    fn test_pci_match_inserts_sql_bool_cast() {
        let mut ast = AstArena::new();
        let mut types = TypeCtx::new();
        let pci = {
            let base = types.engine(EngineKind::ProjectedColumnsIterator);
            let ptr = types.pointer_to(base);
            let e = ast.alloc_expr(ExprKind::NilLit);
            ast.set_type(e, ptr);
            e
        };
        let sql_bool = types.engine(EngineKind::SqlBool);
        let cond = ast.alloc_expr(ExprKind::NilLit);
        ast.set_type(cond, sql_bool);
        let call = ast.alloc_expr(ExprKind::Call {
            callee: "pciMatch".into(),
            args: vec![pci, cond],
        });
        let mut reporter = ErrorReporter::new();
        let ty = SemanticAnalyzer::new(&mut ast, &mut types, &mut reporter).resolve_expr(call);
        assert!(reporter.is_empty());
        assert!(ty.is_some());
        // the second argument is now a cast node wrapping the original
        if let ExprKind::Call { args, .. } = &ast.expr(call).kind {
            assert!(matches!(ast.expr(args[1]).kind, ExprKind::Cast { .. }));
        } else {
            panic!("call node changed kind");
        }
    }

    #[test]
    fn test_ptr_cast_rewrites_and_checks() {
        let mut ast = AstArena::new();
        let mut types = TypeCtx::new();
        // *SorterIterator target expressed as a deref, per the grammar
        let name = ast.alloc_expr(ExprKind::Ident("SorterIterator".into()));
        let target = ast.alloc_expr(ExprKind::Unary { op: UnaryOp::Deref, operand: name });
        let input = {
            let p = types.byte_ptr();
            let e = ast.alloc_expr(ExprKind::NilLit);
            ast.set_type(e, p);
            e
        };
        let call = ast.alloc_expr(ExprKind::Call {
            callee: "ptrCast".into(),
            args: vec![target, input],
        });
        let mut reporter = ErrorReporter::new();
        let ty = SemanticAnalyzer::new(&mut ast, &mut types, &mut reporter).resolve_expr(call);
        assert!(reporter.is_empty(), "{:?}", reporter.diagnostics());
        let si = types.engine(EngineKind::SorterIterator);
        let want = types.pointer_to(si);
        assert_eq!(ty, Some(want));
        assert!(matches!(ast.expr(target).kind, ExprKind::TypeRepr(_)));
    }

    #[test]
    fn test_ptr_cast_rejects_non_pointer_input() {
        let mut ast = AstArena::new();
        let mut types = TypeCtx::new();
        let name = ast.alloc_expr(ExprKind::Ident("Sorter".into()));
        let target = ast.alloc_expr(ExprKind::Unary { op: UnaryOp::Deref, operand: name });
        let input = ast.alloc_expr(ExprKind::IntLit(5));
        let call = ast.alloc_expr(ExprKind::Call {
            callee: "ptrCast".into(),
            args: vec![target, input],
        });
        let mut reporter = ErrorReporter::new();
        let ty = SemanticAnalyzer::new(&mut ast, &mut types, &mut reporter).resolve_expr(call);
        assert_eq!(ty, None);
        assert!(matches!(
            reporter.diagnostics()[0].kind,
            DiagnosticKind::BadPointerCast { .. }
        ));
    }

    #[test]
    fn test_size_of_accepts_type_names_and_exprs() {
        let (ty, errs, mut types) = check("sizeOf", |ast, _| {
            vec![ast.alloc_expr(ExprKind::Ident("JoinHashTable".into()))]
        });
        assert!(errs.is_empty());
        assert_eq!(ty, Some(types.uint32()));

        let (ty, errs, mut types) = check("sizeOf", |ast, _| {
            vec![ast.alloc_expr(ExprKind::IntLit(1))]
        });
        assert!(errs.is_empty());
        assert_eq!(ty, Some(types.uint32()));
    }

    #[test]
    fn test_unknown_builtin_reports() {
        let (ty, errs, _) = check("frobnicate", |_, _| vec![]);
        assert_eq!(ty, None);
        assert!(matches!(errs[0], DiagnosticKind::UnknownBuiltin { .. }));
    }

    #[test]
    fn test_exactly_one_diagnostic_per_bad_call() {
        // two violations in one call: only the first is reported
        let (ty, errs, _) = check("sorterInit", |ast, types| {
            let not_sorter = ptr_arg(ast, types, EngineKind::JoinHashTable);
            let not_pool = ptr_arg(ast, types, EngineKind::Sorter);
            let bad_cmp = ast.alloc_expr(ExprKind::IntLit(0));
            let size = ast.alloc_expr(ExprKind::BoolLit(true));
            vec![not_sorter, not_pool, bad_cmp, size]
        });
        assert_eq!(ty, None);
        assert_eq!(errs.len(), 1);
    }

    #[test]
    fn test_output_family() {
        let (ty, errs, mut types) = check("outputAlloc", |ast, types| {
            vec![ptr_arg(ast, types, EngineKind::ExecutionContext)]
        });
        assert!(errs.is_empty());
        let want = types.byte_ptr();
        assert_eq!(ty, Some(want));

        let (ty, errs, types) = check("outputSetNull", |ast, types| {
            let ctx = ptr_arg(ast, types, EngineKind::ExecutionContext);
            let idx = ast.alloc_expr(ExprKind::IntLit(2));
            vec![ctx, idx]
        });
        assert!(errs.is_empty());
        assert!(ty.is_some_and(|t| types.is_nil(t)));
    }

    #[test]
    fn test_trig_requires_sql_real() {
        let (ty, errs, mut types) = check("sin", |ast, types| {
            let r = types.engine(EngineKind::SqlReal);
            vec![typed_arg(ast, r)]
        });
        assert!(errs.is_empty());
        assert_eq!(ty, Some(types.engine(EngineKind::SqlReal)));

        let (ty, errs, _) = check("atan2", |ast, types| {
            let r = types.engine(EngineKind::SqlReal);
            let i = types.engine(EngineKind::SqlInteger);
            vec![typed_arg(ast, r), typed_arg(ast, i)]
        });
        assert_eq!(ty, None);
        assert!(matches!(errs[0], DiagnosticKind::BadArgType { index: 1, .. }));
    }

    #[test]
    fn test_row_cell_intrinsics() {
        let (ty, errs, types) = check("rowWriteInt", |ast, types| {
            let row = typed_arg(ast, types.byte_ptr());
            let off = ast.alloc_expr(ExprKind::IntLit(16));
            let v = types.engine(EngineKind::SqlInteger);
            let val = typed_arg(ast, v);
            vec![row, off, val]
        });
        assert!(errs.is_empty());
        assert!(ty.is_some_and(|t| types.is_nil(t)));

        let (ty, errs, mut types) = check("rowReadDate", |ast, types| {
            let row = typed_arg(ast, types.byte_ptr());
            let off = ast.alloc_expr(ExprKind::IntLit(0));
            vec![row, off]
        });
        assert!(errs.is_empty());
        assert_eq!(ty, Some(types.engine(EngineKind::SqlDate)));
    }

    #[test]
    fn test_index_iterator_scan_key_wants_byte_buffer() {
        let (ty, errs, _) = check("indexIteratorScanKey", |ast, types| {
            let it = ptr_arg(ast, types, EngineKind::IndexIterator);
            let i8t = types.prim(PrimKind::Int8);
            let buf = types.pointer_to(i8t);
            vec![it, typed_arg(ast, buf)]
        });
        assert!(errs.is_empty());
        assert!(ty.is_some());
    }
}
