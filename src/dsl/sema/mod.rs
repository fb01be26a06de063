//! Semantic analysis over generated DSL code.
//!
//! One pass per compilation: resolve every expression's type, check each
//! intrinsic call against its contract, and record diagnostics in the
//! shared reporter. A failed check leaves the node's type slot empty;
//! consumers treat unresolved as poisoning and do not re-report.

mod builtins;

use super::ast::{
    AstArena, BinOp, ExprId, ExprKind, FuncId, ImplicitCast, Module, StmtId, StmtKind, UnaryOp,
};
use super::builtins::Builtin;
use super::errors::{Arity, DiagnosticKind, ErrorReporter};
use super::types::{TypeCtx, TypeId};
use std::collections::HashMap;
use tracing::trace;

pub struct SemanticAnalyzer<'a> {
    ast: &'a mut AstArena,
    types: &'a mut TypeCtx,
    reporter: &'a mut ErrorReporter,
    scopes: Vec<HashMap<String, TypeId>>,
}

impl<'a> SemanticAnalyzer<'a> {
    pub fn new(
        ast: &'a mut AstArena,
        types: &'a mut TypeCtx,
        reporter: &'a mut ErrorReporter,
    ) -> Self {
        SemanticAnalyzer {
            ast,
            types,
            reporter,
            scopes: vec![HashMap::new()],
        }
    }

    /// Check a whole module. Function names are declared up front so
    /// drivers can reference helpers emitted after them.
    pub fn check_module(&mut self, module: &Module) {
        for &fid in &module.functions {
            let fty = self.function_type(fid);
            let name = self.ast.func(fid).name.clone();
            self.declare(name, fty);
        }
        for &fid in &module.functions {
            self.check_function(fid);
        }
        trace!(
            functions = module.functions.len(),
            diagnostics = self.reporter.len(),
            "semantic analysis finished"
        );
    }

    pub fn check_function(&mut self, fid: FuncId) {
        let func = self.ast.func(fid).clone();
        self.scopes.push(HashMap::new());
        for (name, ty) in &func.params {
            self.declare(name.clone(), *ty);
        }
        self.check_stmt(func.body);
        self.scopes.pop();
    }

    fn function_type(&mut self, fid: FuncId) -> TypeId {
        let func = self.ast.func(fid);
        let params: Vec<TypeId> = func.params.iter().map(|(_, t)| *t).collect();
        let ret = func.ret;
        self.types.function(params, ret)
    }

    fn declare(&mut self, name: String, ty: TypeId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, ty);
        }
    }

    fn lookup(&self, name: &str) -> Option<TypeId> {
        self.scopes.iter().rev().find_map(|s| s.get(name).copied())
    }

    fn check_stmt(&mut self, sid: StmtId) {
        let kind = self.ast.stmt(sid).kind.clone();
        match kind {
            StmtKind::DeclVar { name, declared_ty, init } => {
                let init_ty = init.and_then(|e| self.resolve_expr(e));
                let ty = declared_ty.or(init_ty);
                if let Some(ty) = ty {
                    self.declare(name, ty);
                }
            }
            StmtKind::Assign { dst, src } => {
                self.resolve_expr(dst);
                self.resolve_expr(src);
            }
            StmtKind::Expr(e) => {
                self.resolve_expr(e);
            }
            StmtKind::If { cond, then_block, else_block } => {
                self.check_condition(cond);
                self.check_stmt(then_block);
                if let Some(e) = else_block {
                    self.check_stmt(e);
                }
            }
            StmtKind::While { cond, body } => {
                self.check_condition(cond);
                self.check_stmt(body);
            }
            StmtKind::Block(stmts) => {
                self.scopes.push(HashMap::new());
                for s in stmts {
                    self.check_stmt(s);
                }
                self.scopes.pop();
            }
            StmtKind::Return(e) => {
                if let Some(e) = e {
                    self.resolve_expr(e);
                }
            }
        }
    }

    /// Conditions accept native bool and SqlBool (the runtime coerces the
    /// latter through its null-collapsing truth test).
    fn check_condition(&mut self, cond: ExprId) {
        let Some(ty) = self.resolve_expr(cond) else {
            return;
        };
        if !self.types.is_bool(ty) && !self.is_sql_bool(ty) {
            let pos = self.ast.expr(cond).pos;
            let actual = self.types.display(ty);
            self.reporter.report(pos, DiagnosticKind::NonBoolCondition { actual });
        }
    }

    fn is_sql_bool(&self, ty: TypeId) -> bool {
        self.types.is_specific(ty, super::types::EngineKind::SqlBool)
    }

    /// Resolve an expression's type, reporting at most one diagnostic for
    /// a problem rooted at this node. `None` means poisoned.
    pub fn resolve_expr(&mut self, eid: ExprId) -> Option<TypeId> {
        if let Some(ty) = self.ast.ty(eid) {
            return Some(ty);
        }
        let kind = self.ast.expr(eid).kind.clone();
        let ty = match kind {
            ExprKind::IntLit(_) => Some(self.types.int64()),
            ExprKind::FloatLit(_) => Some(self.types.prim(super::types::PrimKind::Float64)),
            ExprKind::BoolLit(_) => Some(self.types.bool_ty()),
            ExprKind::NilLit => Some(self.types.nil()),
            ExprKind::StringLit(_) => Some(self.types.string_literal()),
            ExprKind::Ident(name) => {
                let found = self.lookup(&name);
                if found.is_none() {
                    let pos = self.ast.expr(eid).pos;
                    self.reporter.report(pos, DiagnosticKind::UndefinedName { name });
                }
                found
            }
            ExprKind::Unary { op, operand } => self.resolve_unary(eid, op, operand),
            ExprKind::Binary { op, lhs, rhs } => self.resolve_binary(eid, op, lhs, rhs),
            ExprKind::Call { callee, args } => self.check_call(eid, &callee, &args),
            ExprKind::TypeRepr(t) => Some(t),
            ExprKind::Cast { cast, operand } => {
                self.resolve_expr(operand)?;
                match cast {
                    ImplicitCast::SqlBoolToBool => Some(self.types.bool_ty()),
                }
            }
        }?;
        self.ast.set_type(eid, ty);
        Some(ty)
    }

    fn resolve_unary(&mut self, eid: ExprId, op: UnaryOp, operand: ExprId) -> Option<TypeId> {
        let t = self.resolve_expr(operand)?;
        match op {
            UnaryOp::AddressOf => Some(self.types.pointer_to(t)),
            UnaryOp::Deref => {
                let pointee = self.types.pointee(t);
                if pointee.is_none() {
                    self.report_operand(eid, "*", t);
                }
                pointee
            }
            UnaryOp::Not => {
                if self.types.is_bool(t) {
                    Some(t)
                } else {
                    self.report_operand(eid, "!", t);
                    None
                }
            }
            UnaryOp::Neg => {
                if self.types.is_integer(t) || self.types.is_float(t) {
                    Some(t)
                } else {
                    self.report_operand(eid, "-", t);
                    None
                }
            }
        }
    }

    fn resolve_binary(&mut self, eid: ExprId, op: BinOp, lhs: ExprId, rhs: ExprId) -> Option<TypeId> {
        let lt = self.resolve_expr(lhs)?;
        let rt = self.resolve_expr(rhs)?;
        let both_numeric_prims = (self.types.is_integer(lt) && self.types.is_integer(rt))
            || (self.types.is_float(lt) && self.types.is_float(rt));
        let both_sql = self.types.is_sql_value(lt) && self.types.is_sql_value(rt) && lt == rt;

        if op.is_comparison() {
            if both_sql {
                return Some(self.types.engine(super::types::EngineKind::SqlBool));
            }
            // pointers compare against nil (lookup-miss checks)
            let ptr_nil = matches!(op, BinOp::Eq | BinOp::Ne)
                && ((self.types.is_pointer(lt) && self.types.is_nil(rt))
                    || (self.types.is_nil(lt) && self.types.is_pointer(rt)));
            if both_numeric_prims || ptr_nil || (lt == rt && !self.types.is_function(lt)) {
                return Some(self.types.bool_ty());
            }
        } else if op.is_arithmetic() {
            if both_numeric_prims {
                return Some(lt);
            }
            if both_sql {
                return Some(lt);
            }
        } else if op.is_logical() && self.types.is_bool(lt) && self.types.is_bool(rt) {
            return Some(lt);
        }

        self.report_operand(eid, op_name(op), lt);
        None
    }

    fn report_operand(&mut self, eid: ExprId, op: &str, actual: TypeId) {
        let pos = self.ast.expr(eid).pos;
        let actual = self.types.display(actual);
        self.reporter.report(
            pos,
            DiagnosticKind::BadOperandType { op: op.to_string(), actual },
        );
    }

    /// Dispatch a call: intrinsics go through the contract table, anything
    /// else must name a declared function.
    fn check_call(&mut self, eid: ExprId, callee: &str, args: &[ExprId]) -> Option<TypeId> {
        if let Some(builtin) = Builtin::from_name(callee) {
            return self.check_builtin_call(eid, builtin, callee, args);
        }

        let Some(fty) = self.lookup(callee) else {
            let pos = self.ast.expr(eid).pos;
            self.reporter.report(
                pos,
                DiagnosticKind::UnknownBuiltin { callee: callee.to_string() },
            );
            return None;
        };
        let Some((params, ret)) = self.types.function_shape(fty).map(|(p, r)| (p.to_vec(), r))
        else {
            let pos = self.ast.expr(eid).pos;
            self.reporter.report(
                pos,
                DiagnosticKind::UnknownBuiltin { callee: callee.to_string() },
            );
            return None;
        };

        if args.len() != params.len() {
            let pos = self.ast.expr(eid).pos;
            self.reporter.report(
                pos,
                DiagnosticKind::MismatchedArgCount {
                    callee: callee.to_string(),
                    expected: Arity::Exact(params.len()),
                    got: args.len(),
                },
            );
            return None;
        }
        for (i, (&arg, &want)) in args.iter().zip(params.iter()).enumerate() {
            let got = self.resolve_expr(arg)?;
            if got != want {
                let pos = self.ast.expr(eid).pos;
                self.reporter.report(
                    pos,
                    DiagnosticKind::BadArgType {
                        callee: callee.to_string(),
                        index: i,
                        expected: self.types.display(want),
                        actual: self.types.display(got),
                    },
                );
                return None;
            }
        }
        Some(ret)
    }
}

fn op_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Rem => "%",
        BinOp::And => "and",
        BinOp::Or => "or",
    }
}
