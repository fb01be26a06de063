//! AST for generated DSL code.
//!
//! Nodes live in a per-compilation [`AstArena`] and are addressed by index
//! handles; the whole region is dropped when compilation ends. Expressions
//! carry a resolved-type slot the semantic analyzer fills in (a `None`
//! after analysis means the expression poisoned).

use super::types::TypeId;

/// Source position of a generated node. Positions are synthetic (the code
/// was never parsed) but unique and ordered, which is all diagnostics need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pos(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    AddressOf,
    Deref,
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

/// Casts the analyzer inserts on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImplicitCast {
    SqlBoolToBool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    NilLit,
    StringLit(String),
    Ident(String),
    Unary { op: UnaryOp, operand: ExprId },
    Binary { op: BinOp, lhs: ExprId, rhs: ExprId },
    Call { callee: String, args: Vec<ExprId> },
    /// A type standing in expression position. Produced by the analyzer's
    /// ptrCast/sizeOf rewrite, never by translators.
    TypeRepr(TypeId),
    Cast { cast: ImplicitCast, operand: ExprId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
    /// Filled by the semantic analyzer; `None` after analysis = unresolved.
    pub ty: Option<TypeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `var name: T = init`
    DeclVar {
        name: String,
        declared_ty: Option<TypeId>,
        init: Option<ExprId>,
    },
    Assign { dst: ExprId, src: ExprId },
    Expr(ExprId),
    If {
        cond: ExprId,
        then_block: StmtId,
        else_block: Option<StmtId>,
    },
    While { cond: ExprId, body: StmtId },
    Block(Vec<StmtId>),
    Return(Option<ExprId>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Pos,
}

/// A function in the generated module (or a function literal argument).
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<(String, TypeId)>,
    pub ret: TypeId,
    pub body: StmtId,
}

/// The compiled module: driver and helper functions in emission order.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub functions: Vec<FuncId>,
}

/// Per-compilation node region.
#[derive(Debug, Default)]
pub struct AstArena {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    funcs: Vec<Function>,
    next_pos: u32,
}

impl AstArena {
    pub fn new() -> Self {
        AstArena::default()
    }

    /// The next unique synthetic position.
    pub fn fresh_pos(&mut self) -> Pos {
        let p = Pos(self.next_pos);
        self.next_pos += 1;
        p
    }

    pub fn alloc_expr(&mut self, kind: ExprKind) -> ExprId {
        let pos = self.fresh_pos();
        self.exprs.push(Expr { kind, pos, ty: None });
        ExprId(self.exprs.len() as u32 - 1)
    }

    pub fn alloc_stmt(&mut self, kind: StmtKind) -> StmtId {
        let pos = self.fresh_pos();
        self.stmts.push(Stmt { kind, pos });
        StmtId(self.stmts.len() as u32 - 1)
    }

    pub fn alloc_func(&mut self, func: Function) -> FuncId {
        self.funcs.push(func);
        FuncId(self.funcs.len() as u32 - 1)
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.0 as usize]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0 as usize]
    }

    pub fn func(&self, id: FuncId) -> &Function {
        &self.funcs[id.0 as usize]
    }

    pub fn set_type(&mut self, id: ExprId, ty: TypeId) {
        self.expr_mut(id).ty = Some(ty);
    }

    pub fn ty(&self, id: ExprId) -> Option<TypeId> {
        self.expr(id).ty
    }

    pub fn num_exprs(&self) -> usize {
        self.exprs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_are_unique_and_ordered() {
        let mut arena = AstArena::new();
        let a = arena.alloc_expr(ExprKind::IntLit(1));
        let b = arena.alloc_expr(ExprKind::IntLit(2));
        assert!(arena.expr(a).pos < arena.expr(b).pos);
    }

    #[test]
    fn test_type_slot_starts_unset() {
        let mut arena = AstArena::new();
        let e = arena.alloc_expr(ExprKind::BoolLit(true));
        assert_eq!(arena.ty(e), None);
    }
}
