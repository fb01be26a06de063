//! Render generated DSL code back to source text.
//!
//! Used for debug logging and for structural assertions in compiler tests.
//! Builtin calls print with an `@` prefix, matching the names the analyzer
//! recognizes.

use super::ast::{AstArena, BinOp, ExprId, ExprKind, FuncId, Module, StmtId, StmtKind, UnaryOp};
use super::builtins::Builtin;
use super::types::TypeCtx;
use std::fmt::Write;

/// Pretty-print one module.
pub fn render_module(ast: &AstArena, types: &TypeCtx, module: &Module) -> String {
    let mut out = String::new();
    for &fid in &module.functions {
        render_function(ast, types, fid, &mut out);
        out.push('\n');
    }
    out
}

pub fn render_function(ast: &AstArena, types: &TypeCtx, fid: FuncId, out: &mut String) {
    let func = ast.func(fid);
    let params: Vec<String> = func
        .params
        .iter()
        .map(|(name, ty)| format!("{}: {}", name, types.display(*ty)))
        .collect();
    let _ = writeln!(
        out,
        "fun {}({}) -> {} {{",
        func.name,
        params.join(", "),
        types.display(func.ret)
    );
    render_stmt(ast, types, func.body, 1, out);
    out.push_str("}\n");
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn render_stmt(ast: &AstArena, types: &TypeCtx, sid: StmtId, depth: usize, out: &mut String) {
    match &ast.stmt(sid).kind {
        StmtKind::Block(stmts) => {
            for &s in stmts {
                render_stmt(ast, types, s, depth, out);
            }
        }
        StmtKind::DeclVar { name, declared_ty, init } => {
            indent(out, depth);
            let _ = write!(out, "var {name}");
            if let Some(ty) = declared_ty {
                let _ = write!(out, ": {}", types.display(*ty));
            }
            if let Some(e) = init {
                let _ = write!(out, " = {}", render_expr(ast, types, *e));
            }
            out.push('\n');
        }
        StmtKind::Assign { dst, src } => {
            indent(out, depth);
            let _ = writeln!(
                out,
                "{} = {}",
                render_expr(ast, types, *dst),
                render_expr(ast, types, *src)
            );
        }
        StmtKind::Expr(e) => {
            indent(out, depth);
            let _ = writeln!(out, "{}", render_expr(ast, types, *e));
        }
        StmtKind::If { cond, then_block, else_block } => {
            indent(out, depth);
            let _ = writeln!(out, "if ({}) {{", render_expr(ast, types, *cond));
            render_stmt(ast, types, *then_block, depth + 1, out);
            if let Some(e) = else_block {
                indent(out, depth);
                out.push_str("} else {\n");
                render_stmt(ast, types, *e, depth + 1, out);
            }
            indent(out, depth);
            out.push_str("}\n");
        }
        StmtKind::While { cond, body } => {
            indent(out, depth);
            let _ = writeln!(out, "for ({}) {{", render_expr(ast, types, *cond));
            render_stmt(ast, types, *body, depth + 1, out);
            indent(out, depth);
            out.push_str("}\n");
        }
        StmtKind::Return(e) => {
            indent(out, depth);
            match e {
                Some(e) => {
                    let _ = writeln!(out, "return {}", render_expr(ast, types, *e));
                }
                None => out.push_str("return\n"),
            }
        }
    }
}

pub fn render_expr(ast: &AstArena, types: &TypeCtx, eid: ExprId) -> String {
    match &ast.expr(eid).kind {
        ExprKind::IntLit(v) => v.to_string(),
        ExprKind::FloatLit(v) => format!("{v:?}"),
        ExprKind::BoolLit(v) => v.to_string(),
        ExprKind::NilLit => "nil".to_string(),
        ExprKind::StringLit(s) => format!("\"{s}\""),
        ExprKind::Ident(name) => name.clone(),
        ExprKind::Unary { op, operand } => {
            let inner = render_expr(ast, types, *operand);
            match op {
                UnaryOp::AddressOf => format!("&{inner}"),
                UnaryOp::Deref => format!("*{inner}"),
                UnaryOp::Not => format!("!{inner}"),
                UnaryOp::Neg => format!("-{inner}"),
            }
        }
        ExprKind::Binary { op, lhs, rhs } => format!(
            "({} {} {})",
            render_expr(ast, types, *lhs),
            bin_op_str(*op),
            render_expr(ast, types, *rhs)
        ),
        ExprKind::Call { callee, args } => {
            let rendered: Vec<String> =
                args.iter().map(|a| render_expr(ast, types, *a)).collect();
            let sigil = if Builtin::from_name(callee).is_some() { "@" } else { "" };
            format!("{sigil}{callee}({})", rendered.join(", "))
        }
        ExprKind::TypeRepr(t) => types.display(*t),
        ExprKind::Cast { operand, .. } => {
            format!("@sqlToBool({})", render_expr(ast, types, *operand))
        }
    }
}

fn bin_op_str(op: BinOp) -> &'static str {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::ast::Function;

    #[test]
    fn test_render_builtin_call_with_sigil() {
        let mut ast = AstArena::new();
        let mut types = TypeCtx::new();
        let tvi = ast.alloc_expr(ExprKind::Ident("tvi".into()));
        let addr = ast.alloc_expr(ExprKind::Unary {
            op: UnaryOp::AddressOf,
            operand: tvi,
        });
        let call = ast.alloc_expr(ExprKind::Call {
            callee: "tableIterAdvance".into(),
            args: vec![addr],
        });
        assert_eq!(render_expr(&ast, &mut types, call), "@tableIterAdvance(&tvi)");
    }

    #[test]
    fn test_render_function_skeleton() {
        let mut ast = AstArena::new();
        let mut types = TypeCtx::new();
        let ec = types.engine(crate::dsl::types::EngineKind::ExecutionContext);
        let ec_ptr = types.pointer_to(ec);
        let nil = types.nil();
        let body = ast.alloc_stmt(StmtKind::Block(vec![]));
        let fid = ast.alloc_func(Function {
            name: "pipeline_0".into(),
            params: vec![("exec_ctx".into(), ec_ptr)],
            ret: nil,
            body,
        });
        let mut out = String::new();
        render_function(&ast, &types, fid, &mut out);
        assert!(out.contains("fun pipeline_0(exec_ctx: *ExecutionContext) -> nil {"));
    }
}
