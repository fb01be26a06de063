//! # Operator DSL
//!
//! The typed intermediate language the query compiler lowers physical plans
//! into. The pieces mirror the compilation pipeline:
//!
//! ```text
//! Physical Plan
//!     ↓
//! [Translators]      → DSL AST (arena-allocated per compilation)
//!     ↓
//! [Semantic Analyzer]→ resolved types + diagnostics
//!     ↓
//! Pipeline driver functions
//! ```
//!
//! The type universe is closed: intrinsic calls are the only escape hatch
//! into the runtime, so the analyzer is a total match over the builtin
//! family.

pub mod ast;
pub mod builtins;
pub mod display;
pub mod errors;
pub mod sema;
pub mod types;

pub use ast::{AstArena, Expr, ExprId, ExprKind, Function, FuncId, Module, Pos, Stmt, StmtId, StmtKind};
pub use builtins::Builtin;
pub use errors::{Diagnostic, DiagnosticKind, ErrorReporter};
pub use sema::SemanticAnalyzer;
pub use types::{EngineKind, PrimKind, TypeCtx, TypeId, TypeKind};
