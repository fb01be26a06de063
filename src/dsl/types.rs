//! The DSL type universe.
//!
//! Types are interned in a [`TypeCtx`]: structurally identical types always
//! resolve to the same [`TypeId`], so handle equality is type identity.
//! The universe is closed - primitives, the opaque engine kinds, and the
//! pointer/function/array derivations are everything the analyzer will ever
//! see.

use crate::value::{AggregateKind, SqlType};
use std::collections::HashMap;

/// Machine-level primitive kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    Nil,
}

impl PrimKind {
    pub fn name(self) -> &'static str {
        match self {
            PrimKind::Bool => "bool",
            PrimKind::Int8 => "int8",
            PrimKind::Int16 => "int16",
            PrimKind::Int32 => "int32",
            PrimKind::Int64 => "int64",
            PrimKind::Uint8 => "uint8",
            PrimKind::Uint16 => "uint16",
            PrimKind::Uint32 => "uint32",
            PrimKind::Uint64 => "uint64",
            PrimKind::Float32 => "float32",
            PrimKind::Float64 => "float64",
            PrimKind::Nil => "nil",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            PrimKind::Int8
                | PrimKind::Int16
                | PrimKind::Int32
                | PrimKind::Int64
                | PrimKind::Uint8
                | PrimKind::Uint16
                | PrimKind::Uint32
                | PrimKind::Uint64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, PrimKind::Float32 | PrimKind::Float64)
    }
}

/// Opaque engine kinds: SQL values, aggregators, and the runtime containers
/// the intrinsics operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    SqlBool,
    SqlInteger,
    SqlReal,
    SqlStringVal,
    SqlDate,
    CountAggregate,
    CountStarAggregate,
    SumAggregate,
    AvgAggregate,
    MinAggregate,
    MaxAggregate,
    ProjectedColumnsIterator,
    TableVectorIterator,
    IndexIterator,
    JoinHashTable,
    JoinHashTableIterator,
    AggregationHashTable,
    AggregationHashTableIterator,
    AggOverflowPartIter,
    Sorter,
    SorterIterator,
    FilterManager,
    MemoryPool,
    ThreadStateContainer,
    ExecutionContext,
}

impl EngineKind {
    pub fn name(self) -> &'static str {
        match self {
            EngineKind::SqlBool => "SqlBool",
            EngineKind::SqlInteger => "SqlInteger",
            EngineKind::SqlReal => "SqlReal",
            EngineKind::SqlStringVal => "SqlStringVal",
            EngineKind::SqlDate => "SqlDate",
            EngineKind::CountAggregate => "CountAggregate",
            EngineKind::CountStarAggregate => "CountStarAggregate",
            EngineKind::SumAggregate => "SumAggregate",
            EngineKind::AvgAggregate => "AvgAggregate",
            EngineKind::MinAggregate => "MinAggregate",
            EngineKind::MaxAggregate => "MaxAggregate",
            EngineKind::ProjectedColumnsIterator => "ProjectedColumnsIterator",
            EngineKind::TableVectorIterator => "TableVectorIterator",
            EngineKind::IndexIterator => "IndexIterator",
            EngineKind::JoinHashTable => "JoinHashTable",
            EngineKind::JoinHashTableIterator => "JoinHashTableIterator",
            EngineKind::AggregationHashTable => "AggregationHashTable",
            EngineKind::AggregationHashTableIterator => "AggregationHashTableIterator",
            EngineKind::AggOverflowPartIter => "AggOverflowPartIter",
            EngineKind::Sorter => "Sorter",
            EngineKind::SorterIterator => "SorterIterator",
            EngineKind::FilterManager => "FilterManager",
            EngineKind::MemoryPool => "MemoryPool",
            EngineKind::ThreadStateContainer => "ThreadStateContainer",
            EngineKind::ExecutionContext => "ExecutionContext",
        }
    }

    pub fn from_name(name: &str) -> Option<EngineKind> {
        let kind = match name {
            "SqlBool" => EngineKind::SqlBool,
            "SqlInteger" => EngineKind::SqlInteger,
            "SqlReal" => EngineKind::SqlReal,
            "SqlStringVal" => EngineKind::SqlStringVal,
            "SqlDate" => EngineKind::SqlDate,
            "CountAggregate" => EngineKind::CountAggregate,
            "CountStarAggregate" => EngineKind::CountStarAggregate,
            "SumAggregate" => EngineKind::SumAggregate,
            "AvgAggregate" => EngineKind::AvgAggregate,
            "MinAggregate" => EngineKind::MinAggregate,
            "MaxAggregate" => EngineKind::MaxAggregate,
            "ProjectedColumnsIterator" => EngineKind::ProjectedColumnsIterator,
            "TableVectorIterator" => EngineKind::TableVectorIterator,
            "IndexIterator" => EngineKind::IndexIterator,
            "JoinHashTable" => EngineKind::JoinHashTable,
            "JoinHashTableIterator" => EngineKind::JoinHashTableIterator,
            "AggregationHashTable" => EngineKind::AggregationHashTable,
            "AggregationHashTableIterator" => EngineKind::AggregationHashTableIterator,
            "AggOverflowPartIter" => EngineKind::AggOverflowPartIter,
            "Sorter" => EngineKind::Sorter,
            "SorterIterator" => EngineKind::SorterIterator,
            "FilterManager" => EngineKind::FilterManager,
            "MemoryPool" => EngineKind::MemoryPool,
            "ThreadStateContainer" => EngineKind::ThreadStateContainer,
            "ExecutionContext" => EngineKind::ExecutionContext,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_sql_value(self) -> bool {
        matches!(
            self,
            EngineKind::SqlBool
                | EngineKind::SqlInteger
                | EngineKind::SqlReal
                | EngineKind::SqlStringVal
                | EngineKind::SqlDate
        )
    }

    pub fn is_aggregator(self) -> bool {
        matches!(
            self,
            EngineKind::CountAggregate
                | EngineKind::CountStarAggregate
                | EngineKind::SumAggregate
                | EngineKind::AvgAggregate
                | EngineKind::MinAggregate
                | EngineKind::MaxAggregate
        )
    }
}

/// Structural shape of a type. Interning key and stored representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Prim(PrimKind),
    Engine(EngineKind),
    Pointer(TypeId),
    Array(TypeId),
    Function(Vec<TypeId>, TypeId),
    StringLiteral,
}

/// Interned type handle. Equality is type identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

/// The per-compilation type universe.
///
/// Owns every type object created while compiling one query; handles stay
/// valid for the context's lifetime and never move.
#[derive(Debug, Default)]
pub struct TypeCtx {
    kinds: Vec<TypeKind>,
    interned: HashMap<TypeKind, TypeId>,
}

impl TypeCtx {
    pub fn new() -> Self {
        TypeCtx::default()
    }

    fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.interned.get(&kind) {
            return id;
        }
        let id = TypeId(self.kinds.len() as u32);
        self.kinds.push(kind.clone());
        self.interned.insert(kind, id);
        id
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.kinds[id.0 as usize]
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    pub fn prim(&mut self, p: PrimKind) -> TypeId {
        self.intern(TypeKind::Prim(p))
    }

    pub fn engine(&mut self, e: EngineKind) -> TypeId {
        self.intern(TypeKind::Engine(e))
    }

    pub fn pointer_to(&mut self, base: TypeId) -> TypeId {
        self.intern(TypeKind::Pointer(base))
    }

    pub fn array_of(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeKind::Array(elem))
    }

    pub fn function(&mut self, params: Vec<TypeId>, ret: TypeId) -> TypeId {
        self.intern(TypeKind::Function(params, ret))
    }

    pub fn string_literal(&mut self) -> TypeId {
        self.intern(TypeKind::StringLiteral)
    }

    pub fn nil(&mut self) -> TypeId {
        self.prim(PrimKind::Nil)
    }

    pub fn bool_ty(&mut self) -> TypeId {
        self.prim(PrimKind::Bool)
    }

    pub fn uint32(&mut self) -> TypeId {
        self.prim(PrimKind::Uint32)
    }

    pub fn uint64(&mut self) -> TypeId {
        self.prim(PrimKind::Uint64)
    }

    pub fn int32(&mut self) -> TypeId {
        self.prim(PrimKind::Int32)
    }

    pub fn int64(&mut self) -> TypeId {
        self.prim(PrimKind::Int64)
    }

    /// `*Uint8`, the opaque byte-row pointer every container hands out.
    pub fn byte_ptr(&mut self) -> TypeId {
        let b = self.prim(PrimKind::Uint8);
        self.pointer_to(b)
    }

    /// The runtime value type backing a column of the given SQL type.
    pub fn sql_value_of(&mut self, ty: SqlType) -> TypeId {
        let kind = match ty {
            SqlType::Boolean => EngineKind::SqlBool,
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => {
                EngineKind::SqlInteger
            }
            SqlType::Decimal => EngineKind::SqlReal,
            SqlType::Date => EngineKind::SqlDate,
            SqlType::Varchar => EngineKind::SqlStringVal,
        };
        self.engine(kind)
    }

    /// The aggregator engine kind for an aggregate function.
    pub fn aggregator_of(&mut self, kind: AggregateKind) -> TypeId {
        let e = match kind {
            AggregateKind::Count => EngineKind::CountAggregate,
            AggregateKind::CountStar => EngineKind::CountStarAggregate,
            AggregateKind::Sum => EngineKind::SumAggregate,
            AggregateKind::Avg => EngineKind::AvgAggregate,
            AggregateKind::Min => EngineKind::MinAggregate,
            AggregateKind::Max => EngineKind::MaxAggregate,
        };
        self.engine(e)
    }

    /// Resolve a type name appearing in generated code (`ptrCast`/`sizeOf`
    /// targets). Engine kinds and primitives only.
    pub fn lookup_named(&mut self, name: &str) -> Option<TypeId> {
        if let Some(e) = EngineKind::from_name(name) {
            return Some(self.engine(e));
        }
        let p = match name {
            "bool" => PrimKind::Bool,
            "int8" => PrimKind::Int8,
            "int16" => PrimKind::Int16,
            "int32" => PrimKind::Int32,
            "int64" => PrimKind::Int64,
            "uint8" => PrimKind::Uint8,
            "uint16" => PrimKind::Uint16,
            "uint32" => PrimKind::Uint32,
            "uint64" => PrimKind::Uint64,
            "float32" => PrimKind::Float32,
            "float64" => PrimKind::Float64,
            "nil" => PrimKind::Nil,
            _ => return None,
        };
        Some(self.prim(p))
    }

    // ------------------------------------------------------------------
    // Predicates
    // ------------------------------------------------------------------

    pub fn is_sql_value(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Engine(e) if e.is_sql_value())
    }

    pub fn is_sql_aggregator(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Engine(e) if e.is_aggregator())
    }

    pub fn is_integer(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Prim(p) if p.is_integer())
    }

    pub fn is_float(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Prim(p) if p.is_float())
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Pointer(_))
    }

    pub fn is_function(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Function(_, _))
    }

    pub fn is_bool(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Prim(PrimKind::Bool))
    }

    pub fn is_nil(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Prim(PrimKind::Nil))
    }

    pub fn is_string_literal(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::StringLiteral)
    }

    /// The pointee when `id` is a pointer, otherwise none.
    pub fn pointee(&self, id: TypeId) -> Option<TypeId> {
        match self.kind(id) {
            TypeKind::Pointer(base) => Some(*base),
            _ => None,
        }
    }

    /// Exact-identity test against a specific engine kind.
    pub fn is_specific(&self, id: TypeId, e: EngineKind) -> bool {
        matches!(self.kind(id), TypeKind::Engine(k) if *k == e)
    }

    /// Pointer whose pointee is exactly the given engine kind.
    pub fn is_pointer_to(&self, id: TypeId, e: EngineKind) -> bool {
        self.pointee(id).is_some_and(|p| self.is_specific(p, e))
    }

    pub fn function_shape(&self, id: TypeId) -> Option<(&[TypeId], TypeId)> {
        match self.kind(id) {
            TypeKind::Function(params, ret) => Some((params, *ret)),
            _ => None,
        }
    }

    /// Stable display name for diagnostics.
    pub fn display(&self, id: TypeId) -> String {
        match self.kind(id) {
            TypeKind::Prim(p) => p.name().to_string(),
            TypeKind::Engine(e) => e.name().to_string(),
            TypeKind::Pointer(base) => format!("*{}", self.display(*base)),
            TypeKind::Array(elem) => format!("[]{}", self.display(*elem)),
            TypeKind::Function(params, ret) => {
                let params: Vec<String> = params.iter().map(|p| self.display(*p)).collect();
                format!("({})->{}", params.join(","), self.display(*ret))
            }
            TypeKind::StringLiteral => "string".to_string(),
        }
    }
}
