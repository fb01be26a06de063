//! Shared codegen context.
//!
//! Owns the per-compilation AST arena and type universe, hands out fresh
//! names, and wraps node construction so translators read declaratively.

use crate::dsl::ast::{
    AstArena, BinOp, ExprId, ExprKind, FuncId, Function, StmtId, StmtKind, UnaryOp,
};
use crate::dsl::builtins::Builtin;
use crate::dsl::types::{EngineKind, TypeCtx, TypeId};
use crate::value::SqlType;

pub struct CodeGen {
    pub ast: AstArena,
    pub types: TypeCtx,
    /// Helper functions emitted so far, in emission order.
    pub helpers: Vec<FuncId>,
    counter: u32,
}

impl Default for CodeGen {
    fn default() -> Self {
        CodeGen {
            ast: AstArena::new(),
            types: TypeCtx::new(),
            helpers: Vec::new(),
            counter: 0,
        }
    }
}

impl CodeGen {
    pub fn new() -> Self {
        CodeGen::default()
    }

    /// A fresh identifier with the given prefix.
    pub fn fresh(&mut self, prefix: &str) -> String {
        let n = self.counter;
        self.counter += 1;
        format!("{prefix}_{n}")
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn int_lit(&mut self, v: i64) -> ExprId {
        self.ast.alloc_expr(ExprKind::IntLit(v))
    }

    pub fn float_lit(&mut self, v: f64) -> ExprId {
        self.ast.alloc_expr(ExprKind::FloatLit(v))
    }

    pub fn bool_lit(&mut self, v: bool) -> ExprId {
        self.ast.alloc_expr(ExprKind::BoolLit(v))
    }

    pub fn nil_lit(&mut self) -> ExprId {
        self.ast.alloc_expr(ExprKind::NilLit)
    }

    pub fn str_lit(&mut self, s: impl Into<String>) -> ExprId {
        self.ast.alloc_expr(ExprKind::StringLit(s.into()))
    }

    pub fn ident(&mut self, name: impl Into<String>) -> ExprId {
        self.ast.alloc_expr(ExprKind::Ident(name.into()))
    }

    pub fn addr_of(&mut self, operand: ExprId) -> ExprId {
        self.ast.alloc_expr(ExprKind::Unary { op: UnaryOp::AddressOf, operand })
    }

    pub fn not(&mut self, operand: ExprId) -> ExprId {
        self.ast.alloc_expr(ExprKind::Unary { op: UnaryOp::Not, operand })
    }

    pub fn binary(&mut self, op: BinOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.ast.alloc_expr(ExprKind::Binary { op, lhs, rhs })
    }

    /// A builtin call by enum, so callee names can't drift.
    pub fn call(&mut self, builtin: Builtin, args: Vec<ExprId>) -> ExprId {
        self.ast.alloc_expr(ExprKind::Call {
            callee: builtin.name().to_string(),
            args,
        })
    }

    /// A call to an emitted helper function.
    pub fn call_named(&mut self, name: impl Into<String>, args: Vec<ExprId>) -> ExprId {
        self.ast.alloc_expr(ExprKind::Call { callee: name.into(), args })
    }

    /// The `*TypeName` dereference shape `ptrCast` expects as its first
    /// argument.
    pub fn type_deref(&mut self, type_name: &str) -> ExprId {
        let ident = self.ident(type_name);
        self.ast.alloc_expr(ExprKind::Unary { op: UnaryOp::Deref, operand: ident })
    }

    /// `@ptrCast(*TypeName, expr)`
    pub fn ptr_cast(&mut self, type_name: &str, expr: ExprId) -> ExprId {
        let target = self.type_deref(type_name);
        self.call(Builtin::PtrCast, vec![target, expr])
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    pub fn decl(&mut self, name: impl Into<String>, ty: Option<TypeId>, init: Option<ExprId>) -> StmtId {
        self.ast.alloc_stmt(StmtKind::DeclVar {
            name: name.into(),
            declared_ty: ty,
            init,
        })
    }

    /// `var name: EngineKind` with no initializer.
    pub fn decl_engine(&mut self, name: impl Into<String>, kind: EngineKind) -> StmtId {
        let ty = self.types.engine(kind);
        self.decl(name, Some(ty), None)
    }

    pub fn expr_stmt(&mut self, e: ExprId) -> StmtId {
        self.ast.alloc_stmt(StmtKind::Expr(e))
    }

    pub fn assign(&mut self, dst: ExprId, src: ExprId) -> StmtId {
        self.ast.alloc_stmt(StmtKind::Assign { dst, src })
    }

    pub fn block(&mut self, stmts: Vec<StmtId>) -> StmtId {
        self.ast.alloc_stmt(StmtKind::Block(stmts))
    }

    pub fn if_stmt(&mut self, cond: ExprId, then: Vec<StmtId>) -> StmtId {
        let then_block = self.block(then);
        self.ast.alloc_stmt(StmtKind::If { cond, then_block, else_block: None })
    }

    pub fn while_stmt(&mut self, cond: ExprId, body: Vec<StmtId>) -> StmtId {
        let body = self.block(body);
        self.ast.alloc_stmt(StmtKind::While { cond, body })
    }

    pub fn ret(&mut self, e: Option<ExprId>) -> StmtId {
        self.ast.alloc_stmt(StmtKind::Return(e))
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    /// Emit a module-level function and remember it as a helper.
    pub fn function(
        &mut self,
        name: impl Into<String>,
        params: Vec<(String, TypeId)>,
        ret: TypeId,
        body: Vec<StmtId>,
    ) -> FuncId {
        let body = self.block(body);
        let fid = self.ast.alloc_func(Function {
            name: name.into(),
            params,
            ret,
            body,
        });
        self.helpers.push(fid);
        fid
    }

    // ------------------------------------------------------------------
    // SQL-type keyed helpers
    // ------------------------------------------------------------------

    /// The typed PCI getter for a column type.
    pub fn pci_getter(ty: SqlType) -> Builtin {
        match ty {
            SqlType::Boolean => Builtin::PCIGetBool,
            SqlType::TinyInt => Builtin::PCIGetTinyInt,
            SqlType::SmallInt => Builtin::PCIGetSmallInt,
            SqlType::Integer => Builtin::PCIGetInt,
            SqlType::BigInt => Builtin::PCIGetBigInt,
            SqlType::Decimal => Builtin::PCIGetReal,
            SqlType::Date => Builtin::PCIGetDate,
            SqlType::Varchar => Builtin::PCIGetVarchar,
        }
    }

    /// The row-cell writer for a column type.
    pub fn row_writer(ty: SqlType) -> Builtin {
        match ty {
            SqlType::Boolean => Builtin::RowWriteBool,
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => {
                Builtin::RowWriteInt
            }
            SqlType::Decimal => Builtin::RowWriteReal,
            SqlType::Date => Builtin::RowWriteDate,
            SqlType::Varchar => Builtin::RowWriteVarchar,
        }
    }

    /// The row-cell reader for a column type.
    pub fn row_reader(ty: SqlType) -> Builtin {
        match ty {
            SqlType::Boolean => Builtin::RowReadBool,
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => {
                Builtin::RowReadInt
            }
            SqlType::Decimal => Builtin::RowReadReal,
            SqlType::Date => Builtin::RowReadDate,
            SqlType::Varchar => Builtin::RowReadVarchar,
        }
    }

    /// The aggregator engine kind backing an aggregate function.
    pub fn aggregator_kind(kind: crate::value::AggregateKind) -> EngineKind {
        match kind {
            crate::value::AggregateKind::Count => EngineKind::CountAggregate,
            crate::value::AggregateKind::CountStar => EngineKind::CountStarAggregate,
            crate::value::AggregateKind::Sum => EngineKind::SumAggregate,
            crate::value::AggregateKind::Avg => EngineKind::AvgAggregate,
            crate::value::AggregateKind::Min => EngineKind::MinAggregate,
            crate::value::AggregateKind::Max => EngineKind::MaxAggregate,
        }
    }
}
