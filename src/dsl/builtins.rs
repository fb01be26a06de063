//! Intrinsic functions recognized by the semantic analyzer.
//!
//! Every builtin has a hard-coded calling contract checked in
//! `sema::builtins`. Generated code refers to them by the `@`-prefixed
//! names in the table below.

/// The closed family of intrinsics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    // Value conversions
    /// Native bool to SqlBool: boolToSql(b) -> SqlBool
    BoolToSql,
    /// Native integer to SqlInteger: intToSql(i) -> SqlInteger
    IntToSql,
    /// Native float to SqlReal: floatToSql(f) -> SqlReal
    FloatToSql,
    /// Calendar triple to SqlDate: dateToSql(y, m, d) -> SqlDate
    DateToSql,
    /// SqlBool to native bool: sqlToBool(b) -> bool
    SqlToBool,

    // Vectorized filters over a projected-columns iterator
    /// filterEq(pci, col, val) -> int32 matched count
    FilterEq,
    FilterNe,
    FilterLt,
    FilterLe,
    FilterGt,
    FilterGe,

    // Table iteration
    /// tableIterInit(tvi, "table_name", exec_ctx)
    TableIterInit,
    /// tableIterAdvance(tvi) -> bool
    TableIterAdvance,
    /// tableIterGetPCI(tvi) -> *ProjectedColumnsIterator
    TableIterGetPCI,
    /// tableIterClose(tvi)
    TableIterClose,
    /// tableIterParallel("table_name", query_state, tls, scan_fn)
    TableIterParallel,

    // Projected-columns iterator
    PCIHasNext,
    PCIHasNextFiltered,
    PCIAdvance,
    PCIAdvanceFiltered,
    /// pciMatch(pci, cond) - marks the current tuple's selection bit
    PCIMatch,
    PCIReset,
    PCIResetFiltered,
    PCIGetBool,
    PCIGetTinyInt,
    PCIGetSmallInt,
    PCIGetInt,
    PCIGetBigInt,
    PCIGetReal,
    PCIGetDate,
    PCIGetVarchar,
    PCIGetBoolNull,
    PCIGetTinyIntNull,
    PCIGetSmallIntNull,
    PCIGetIntNull,
    PCIGetBigIntNull,
    PCIGetRealNull,
    PCIGetDateNull,
    PCIGetVarcharNull,

    /// hash(v...) -> uint64 over one or more SQL values
    Hash,

    // Filter manager
    FilterManagerInit,
    FilterManagerInsertFilter,
    FilterManagerFinalize,
    FilterManagerRunFilters,
    FilterManagerFree,

    // Aggregation hash table
    AggHashTableInit,
    AggHashTableInsert,
    AggHashTableLookup,
    AggHashTableProcessBatch,
    AggHashTableMovePartitions,
    AggHashTableParallelPartitionedScan,
    AggHashTableFree,
    AggHashTableIterInit,
    AggHashTableIterHasNext,
    AggHashTableIterNext,
    AggHashTableIterGetRow,
    AggHashTableIterClose,
    AggPartIterHasNext,
    AggPartIterNext,
    AggPartIterGetHash,
    AggPartIterGetRow,

    // Aggregators
    AggInit,
    AggAdvance,
    AggMerge,
    AggReset,
    AggResult,

    // Join hash table
    JoinHashTableInit,
    JoinHashTableInsert,
    JoinHashTableBuild,
    JoinHashTableBuildParallel,
    JoinHashTableFree,
    JoinHashTableIterInit,
    JoinHashTableIterHasNext,
    JoinHashTableIterGetRow,
    JoinHashTableIterClose,

    // Sorter
    SorterInit,
    SorterInsert,
    SorterSort,
    SorterSortParallel,
    SorterSortTopKParallel,
    SorterFree,
    SorterIterInit,
    SorterIterHasNext,
    SorterIterNext,
    SorterIterGetRow,
    SorterIterClose,

    // Real-valued math
    ACos,
    ASin,
    ATan,
    ATan2,
    Cos,
    Cot,
    Sin,
    Tan,

    // Output buffer
    OutputAlloc,
    OutputAdvance,
    OutputSetNull,
    OutputFinalize,

    // Index iteration
    IndexIteratorInit,
    IndexIteratorGetKeyRow,
    IndexIteratorScanKey,
    IndexIteratorAdvance,
    IndexIteratorGetRow,
    IndexIteratorFree,

    // Materialized row cells (offset addressed)
    RowWriteBool,
    RowWriteInt,
    RowWriteReal,
    RowWriteDate,
    RowWriteVarchar,
    RowReadBool,
    RowReadInt,
    RowReadReal,
    RowReadDate,
    RowReadVarchar,

    // Thread-local states
    TlsInit,
    TlsReset,
    TlsIterate,
    TlsFree,

    // Misc
    ExecCtxGetMemPool,
    SizeOf,
    PtrCast,
}

impl Builtin {
    /// The `@`-name generated code uses for this intrinsic.
    pub fn name(self) -> &'static str {
        match self {
            Builtin::BoolToSql => "boolToSql",
            Builtin::IntToSql => "intToSql",
            Builtin::FloatToSql => "floatToSql",
            Builtin::DateToSql => "dateToSql",
            Builtin::SqlToBool => "sqlToBool",
            Builtin::FilterEq => "filterEq",
            Builtin::FilterNe => "filterNe",
            Builtin::FilterLt => "filterLt",
            Builtin::FilterLe => "filterLe",
            Builtin::FilterGt => "filterGt",
            Builtin::FilterGe => "filterGe",
            Builtin::TableIterInit => "tableIterInit",
            Builtin::TableIterAdvance => "tableIterAdvance",
            Builtin::TableIterGetPCI => "tableIterGetPCI",
            Builtin::TableIterClose => "tableIterClose",
            Builtin::TableIterParallel => "tableIterParallel",
            Builtin::PCIHasNext => "pciHasNext",
            Builtin::PCIHasNextFiltered => "pciHasNextFiltered",
            Builtin::PCIAdvance => "pciAdvance",
            Builtin::PCIAdvanceFiltered => "pciAdvanceFiltered",
            Builtin::PCIMatch => "pciMatch",
            Builtin::PCIReset => "pciReset",
            Builtin::PCIResetFiltered => "pciResetFiltered",
            Builtin::PCIGetBool => "pciGetBool",
            Builtin::PCIGetTinyInt => "pciGetTinyInt",
            Builtin::PCIGetSmallInt => "pciGetSmallInt",
            Builtin::PCIGetInt => "pciGetInt",
            Builtin::PCIGetBigInt => "pciGetBigInt",
            Builtin::PCIGetReal => "pciGetReal",
            Builtin::PCIGetDate => "pciGetDate",
            Builtin::PCIGetVarchar => "pciGetVarchar",
            Builtin::PCIGetBoolNull => "pciGetBoolNull",
            Builtin::PCIGetTinyIntNull => "pciGetTinyIntNull",
            Builtin::PCIGetSmallIntNull => "pciGetSmallIntNull",
            Builtin::PCIGetIntNull => "pciGetIntNull",
            Builtin::PCIGetBigIntNull => "pciGetBigIntNull",
            Builtin::PCIGetRealNull => "pciGetRealNull",
            Builtin::PCIGetDateNull => "pciGetDateNull",
            Builtin::PCIGetVarcharNull => "pciGetVarcharNull",
            Builtin::Hash => "hash",
            Builtin::FilterManagerInit => "filterManagerInit",
            Builtin::FilterManagerInsertFilter => "filterManagerInsertFilter",
            Builtin::FilterManagerFinalize => "filterManagerFinalize",
            Builtin::FilterManagerRunFilters => "filterManagerRunFilters",
            Builtin::FilterManagerFree => "filterManagerFree",
            Builtin::AggHashTableInit => "aggHTInit",
            Builtin::AggHashTableInsert => "aggHTInsert",
            Builtin::AggHashTableLookup => "aggHTLookup",
            Builtin::AggHashTableProcessBatch => "aggHTProcessBatch",
            Builtin::AggHashTableMovePartitions => "aggHTMovePartitions",
            Builtin::AggHashTableParallelPartitionedScan => "aggHTParallelPartScan",
            Builtin::AggHashTableFree => "aggHTFree",
            Builtin::AggHashTableIterInit => "aggHTIterInit",
            Builtin::AggHashTableIterHasNext => "aggHTIterHasNext",
            Builtin::AggHashTableIterNext => "aggHTIterNext",
            Builtin::AggHashTableIterGetRow => "aggHTIterGetRow",
            Builtin::AggHashTableIterClose => "aggHTIterClose",
            Builtin::AggPartIterHasNext => "aggPartIterHasNext",
            Builtin::AggPartIterNext => "aggPartIterNext",
            Builtin::AggPartIterGetHash => "aggPartIterGetHash",
            Builtin::AggPartIterGetRow => "aggPartIterGetRow",
            Builtin::AggInit => "aggInit",
            Builtin::AggAdvance => "aggAdvance",
            Builtin::AggMerge => "aggMerge",
            Builtin::AggReset => "aggReset",
            Builtin::AggResult => "aggResult",
            Builtin::JoinHashTableInit => "joinHTInit",
            Builtin::JoinHashTableInsert => "joinHTInsert",
            Builtin::JoinHashTableBuild => "joinHTBuild",
            Builtin::JoinHashTableBuildParallel => "joinHTBuildParallel",
            Builtin::JoinHashTableFree => "joinHTFree",
            Builtin::JoinHashTableIterInit => "joinHTIterInit",
            Builtin::JoinHashTableIterHasNext => "joinHTIterHasNext",
            Builtin::JoinHashTableIterGetRow => "joinHTIterGetRow",
            Builtin::JoinHashTableIterClose => "joinHTIterClose",
            Builtin::SorterInit => "sorterInit",
            Builtin::SorterInsert => "sorterInsert",
            Builtin::SorterSort => "sorterSort",
            Builtin::SorterSortParallel => "sorterSortParallel",
            Builtin::SorterSortTopKParallel => "sorterSortTopKParallel",
            Builtin::SorterFree => "sorterFree",
            Builtin::SorterIterInit => "sorterIterInit",
            Builtin::SorterIterHasNext => "sorterIterHasNext",
            Builtin::SorterIterNext => "sorterIterNext",
            Builtin::SorterIterGetRow => "sorterIterGetRow",
            Builtin::SorterIterClose => "sorterIterClose",
            Builtin::ACos => "acos",
            Builtin::ASin => "asin",
            Builtin::ATan => "atan",
            Builtin::ATan2 => "atan2",
            Builtin::Cos => "cos",
            Builtin::Cot => "cot",
            Builtin::Sin => "sin",
            Builtin::Tan => "tan",
            Builtin::OutputAlloc => "outputAlloc",
            Builtin::OutputAdvance => "outputAdvance",
            Builtin::OutputSetNull => "outputSetNull",
            Builtin::OutputFinalize => "outputFinalize",
            Builtin::IndexIteratorInit => "indexIteratorInit",
            Builtin::IndexIteratorGetKeyRow => "indexIteratorGetKeyRow",
            Builtin::IndexIteratorScanKey => "indexIteratorScanKey",
            Builtin::IndexIteratorAdvance => "indexIteratorAdvance",
            Builtin::IndexIteratorGetRow => "indexIteratorGetRow",
            Builtin::IndexIteratorFree => "indexIteratorFree",
            Builtin::RowWriteBool => "rowWriteBool",
            Builtin::RowWriteInt => "rowWriteInt",
            Builtin::RowWriteReal => "rowWriteReal",
            Builtin::RowWriteDate => "rowWriteDate",
            Builtin::RowWriteVarchar => "rowWriteVarchar",
            Builtin::RowReadBool => "rowReadBool",
            Builtin::RowReadInt => "rowReadInt",
            Builtin::RowReadReal => "rowReadReal",
            Builtin::RowReadDate => "rowReadDate",
            Builtin::RowReadVarchar => "rowReadVarchar",
            Builtin::TlsInit => "tlsInit",
            Builtin::TlsReset => "tlsReset",
            Builtin::TlsIterate => "tlsIterate",
            Builtin::TlsFree => "tlsFree",
            Builtin::ExecCtxGetMemPool => "execCtxGetMemPool",
            Builtin::SizeOf => "sizeOf",
            Builtin::PtrCast => "ptrCast",
        }
    }

    /// Reverse lookup used when the analyzer meets a call expression.
    pub fn from_name(name: &str) -> Option<Builtin> {
        ALL.iter().copied().find(|b| b.name() == name)
    }
}

/// Every builtin, for reverse lookup and exhaustiveness tests.
pub const ALL: &[Builtin] = &[
    Builtin::BoolToSql,
    Builtin::IntToSql,
    Builtin::FloatToSql,
    Builtin::DateToSql,
    Builtin::SqlToBool,
    Builtin::FilterEq,
    Builtin::FilterNe,
    Builtin::FilterLt,
    Builtin::FilterLe,
    Builtin::FilterGt,
    Builtin::FilterGe,
    Builtin::TableIterInit,
    Builtin::TableIterAdvance,
    Builtin::TableIterGetPCI,
    Builtin::TableIterClose,
    Builtin::TableIterParallel,
    Builtin::PCIHasNext,
    Builtin::PCIHasNextFiltered,
    Builtin::PCIAdvance,
    Builtin::PCIAdvanceFiltered,
    Builtin::PCIMatch,
    Builtin::PCIReset,
    Builtin::PCIResetFiltered,
    Builtin::PCIGetBool,
    Builtin::PCIGetTinyInt,
    Builtin::PCIGetSmallInt,
    Builtin::PCIGetInt,
    Builtin::PCIGetBigInt,
    Builtin::PCIGetReal,
    Builtin::PCIGetDate,
    Builtin::PCIGetVarchar,
    Builtin::PCIGetBoolNull,
    Builtin::PCIGetTinyIntNull,
    Builtin::PCIGetSmallIntNull,
    Builtin::PCIGetIntNull,
    Builtin::PCIGetBigIntNull,
    Builtin::PCIGetRealNull,
    Builtin::PCIGetDateNull,
    Builtin::PCIGetVarcharNull,
    Builtin::Hash,
    Builtin::FilterManagerInit,
    Builtin::FilterManagerInsertFilter,
    Builtin::FilterManagerFinalize,
    Builtin::FilterManagerRunFilters,
    Builtin::FilterManagerFree,
    Builtin::AggHashTableInit,
    Builtin::AggHashTableInsert,
    Builtin::AggHashTableLookup,
    Builtin::AggHashTableProcessBatch,
    Builtin::AggHashTableMovePartitions,
    Builtin::AggHashTableParallelPartitionedScan,
    Builtin::AggHashTableFree,
    Builtin::AggHashTableIterInit,
    Builtin::AggHashTableIterHasNext,
    Builtin::AggHashTableIterNext,
    Builtin::AggHashTableIterGetRow,
    Builtin::AggHashTableIterClose,
    Builtin::AggPartIterHasNext,
    Builtin::AggPartIterNext,
    Builtin::AggPartIterGetHash,
    Builtin::AggPartIterGetRow,
    Builtin::AggInit,
    Builtin::AggAdvance,
    Builtin::AggMerge,
    Builtin::AggReset,
    Builtin::AggResult,
    Builtin::JoinHashTableInit,
    Builtin::JoinHashTableInsert,
    Builtin::JoinHashTableBuild,
    Builtin::JoinHashTableBuildParallel,
    Builtin::JoinHashTableFree,
    Builtin::JoinHashTableIterInit,
    Builtin::JoinHashTableIterHasNext,
    Builtin::JoinHashTableIterGetRow,
    Builtin::JoinHashTableIterClose,
    Builtin::SorterInit,
    Builtin::SorterInsert,
    Builtin::SorterSort,
    Builtin::SorterSortParallel,
    Builtin::SorterSortTopKParallel,
    Builtin::SorterFree,
    Builtin::SorterIterInit,
    Builtin::SorterIterHasNext,
    Builtin::SorterIterNext,
    Builtin::SorterIterGetRow,
    Builtin::SorterIterClose,
    Builtin::ACos,
    Builtin::ASin,
    Builtin::ATan,
    Builtin::ATan2,
    Builtin::Cos,
    Builtin::Cot,
    Builtin::Sin,
    Builtin::Tan,
    Builtin::OutputAlloc,
    Builtin::OutputAdvance,
    Builtin::OutputSetNull,
    Builtin::OutputFinalize,
    Builtin::IndexIteratorInit,
    Builtin::IndexIteratorGetKeyRow,
    Builtin::IndexIteratorScanKey,
    Builtin::IndexIteratorAdvance,
    Builtin::IndexIteratorGetRow,
    Builtin::IndexIteratorFree,
    Builtin::RowWriteBool,
    Builtin::RowWriteInt,
    Builtin::RowWriteReal,
    Builtin::RowWriteDate,
    Builtin::RowWriteVarchar,
    Builtin::RowReadBool,
    Builtin::RowReadInt,
    Builtin::RowReadReal,
    Builtin::RowReadDate,
    Builtin::RowReadVarchar,
    Builtin::TlsInit,
    Builtin::TlsReset,
    Builtin::TlsIterate,
    Builtin::TlsFree,
    Builtin::ExecCtxGetMemPool,
    Builtin::SizeOf,
    Builtin::PtrCast,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<&str> = ALL.iter().map(|b| b.name()).collect();
        assert_eq!(names.len(), ALL.len());
    }

    #[test]
    fn test_name_roundtrip() {
        for b in ALL {
            assert_eq!(Builtin::from_name(b.name()), Some(*b));
        }
        assert_eq!(Builtin::from_name("noSuchBuiltin"), None);
    }
}
