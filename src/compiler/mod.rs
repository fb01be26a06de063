//! # Query Compiler
//!
//! Lowers a physical plan to the operator DSL and type-checks the result.
//!
//! ## Pipeline Position
//!
//! ```text
//! Physical Plan -> [Pipeline Composer] -> [Translators] -> DSL Module
//!                                                              ↓
//!                                                  [Semantic Analyzer]
//! ```
//!
//! The emitted module contains any helper functions (filter clauses,
//! comparators, key-equality checks), one driver function per pipeline,
//! and a `main(exec_ctx)` that owns the query state, runs setup, invokes
//! the pipelines in order and tears the state down. A module with
//! diagnostics yields no executable artifact.

pub mod codegen;
pub mod pipeline;
pub mod translator;
pub mod translators;

pub use codegen::CodeGen;
pub use pipeline::{plan_is_parallel, plan_needs_thread_states, split_plan, PipelineSet};
pub use translator::{OperatorTranslator, RowCtx, StateVar, TranslatorChain};

use crate::dsl::ast::{AstArena, ExprId, Module};
use crate::dsl::builtins::Builtin;
use crate::dsl::display;
use crate::dsl::errors::{Diagnostic, ErrorReporter};
use crate::dsl::types::{EngineKind, TypeCtx};
use crate::dsl::SemanticAnalyzer;
use crate::plan::PlanNode;
use translators::{EXEC_CTX, MEM_POOL, TLS_VAR};
use tracing::debug;

/// Thread-state slot size the generated setup reserves per worker.
const TLS_STATE_SIZE: i64 = 64;

/// The result of one compilation: the generated module plus everything
/// needed to inspect it.
pub struct CompiledQuery {
    pub ast: AstArena,
    pub types: TypeCtx,
    pub module: Module,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompiledQuery {
    /// True when analysis produced no diagnostics.
    pub fn is_ok(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// The module rendered back to DSL source.
    pub fn render(&self) -> String {
        display::render_module(&self.ast, &self.types, &self.module)
    }
}

/// Compile a plan: split into pipelines, drive the translators, assemble
/// the module, then run semantic analysis over everything emitted.
pub fn compile(plan: &PlanNode) -> CompiledQuery {
    let mut cg = CodeGen::new();
    let mut set = split_plan(plan, &mut cg);
    let parallel = plan_needs_thread_states(plan);

    let state: Vec<StateVar> = set.chains.iter().flat_map(TranslatorChain::state_vars).collect();

    let ec_ptr = {
        let ec = cg.types.engine(EngineKind::ExecutionContext);
        cg.types.pointer_to(ec)
    };
    let tls_ptr = {
        let tsc = cg.types.engine(EngineKind::ThreadStateContainer);
        cg.types.pointer_to(tsc)
    };

    // one driver function per pipeline
    let mut pipeline_fns = Vec::new();
    for (i, chain) in set.chains.iter_mut().enumerate() {
        let body = chain.drive(&mut cg);
        let mut params = vec![(EXEC_CTX.to_string(), ec_ptr)];
        for sv in &state {
            let ty = {
                let base = cg.types.engine(sv.kind);
                cg.types.pointer_to(base)
            };
            params.push((sv.name.clone(), ty));
        }
        if parallel {
            params.push((TLS_VAR.to_string(), tls_ptr));
        }
        let name = format!("pipeline_{i}");
        let nil = cg.types.nil();
        cg.function(name.clone(), params, nil, body);
        pipeline_fns.push(name);
    }

    // main: state ownership, setup, pipeline calls, teardown
    let mut main_body = Vec::new();
    let pool = {
        let ctx = cg.ident(EXEC_CTX);
        cg.call(Builtin::ExecCtxGetMemPool, vec![ctx])
    };
    main_body.push(cg.decl(MEM_POOL, None, Some(pool)));
    for sv in &state {
        main_body.push(cg.decl_engine(sv.name.clone(), sv.kind));
    }
    if parallel {
        main_body.push(cg.decl_engine(TLS_VAR, EngineKind::ThreadStateContainer));
        let tls_ref = {
            let id = cg.ident(TLS_VAR);
            cg.addr_of(id)
        };
        let pool = cg.ident(MEM_POOL);
        let size = cg.int_lit(TLS_STATE_SIZE);
        let init = cg.call(Builtin::TlsInit, vec![tls_ref, pool, size]);
        main_body.push(cg.expr_stmt(init));
    }
    for chain in &mut set.chains {
        main_body.extend(chain.setup(&mut cg));
    }
    for name in &pipeline_fns {
        let mut args: Vec<ExprId> = vec![cg.ident(EXEC_CTX)];
        for sv in &state {
            let id = cg.ident(&sv.name);
            args.push(cg.addr_of(id));
        }
        if parallel {
            let id = cg.ident(TLS_VAR);
            args.push(cg.addr_of(id));
        }
        let call = cg.call_named(name.clone(), args);
        main_body.push(cg.expr_stmt(call));
    }
    for chain in &mut set.chains {
        main_body.extend(chain.teardown(&mut cg));
    }
    if parallel {
        let tls_ref = {
            let id = cg.ident(TLS_VAR);
            cg.addr_of(id)
        };
        let free = cg.call(Builtin::TlsFree, vec![tls_ref]);
        main_body.push(cg.expr_stmt(free));
    }
    let nil = cg.types.nil();
    cg.function("main", vec![(EXEC_CTX.to_string(), ec_ptr)], nil, main_body);

    let module = Module { functions: cg.helpers.clone() };

    let mut reporter = ErrorReporter::new();
    let mut ast = cg.ast;
    let mut types = cg.types;
    SemanticAnalyzer::new(&mut ast, &mut types, &mut reporter).check_module(&module);
    debug!(
        pipelines = pipeline_fns.len(),
        functions = module.functions.len(),
        diagnostics = reporter.len(),
        "plan compiled"
    );

    CompiledQuery {
        ast,
        types,
        module,
        diagnostics: reporter.diagnostics().to_vec(),
    }
}
