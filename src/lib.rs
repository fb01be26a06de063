//! # Basalt Execution Engine
//!
//! The execution engine of a relational database: physical plans are
//! lowered to a typed operator DSL, checked, and driven through
//! vectorized per-operator iterators over storage.
//!
//! ## Pipeline Architecture
//!
//! ### Compilation
//! ```text
//! Physical Plan
//!     ↓
//! [Pipeline Composer]           → maximal pipelines, split at breakers
//!     ↓
//! [Operator Translators]        → DSL AST (arena per compilation)
//!     ↓
//! [Semantic Analyzer]           → resolved types + diagnostics
//!     ↓
//! Driver functions (one per pipeline) + main
//! ```
//!
//! ### Execution
//! ```text
//! Compiled module → [exec::vm] interprets each intrinsic call
//!     ├── TableVectorIterator → ProjectedColumnsIterator vectors
//!     ├── FilterManager (vectorized conjuncts, natively compiled clauses)
//!     ├── JoinHashTable / AggregationHashTable / Sorter (breakers)
//!     └── OutputBuffer → OutputCallback batches → Checkers
//! ```
//!
//! ### Catalog & Online DDL
//! ```text
//! Catalog (pg_database, pg_namespace, pg_class, pg_attribute, pg_index)
//!     ├── Typed handles (projected-row entries, per transaction)
//!     └── IndexBuilder: T1 publish → quiescence barrier → T2 populate
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use basalt::exec::{processor, ExecutionContext};
//!
//! // compile, reject on diagnostics, interpret the emitted module
//! let ctx = ExecutionContext::new(txn, config.execution.vector_size);
//! processor::execute(&plan, &catalog, &ctx, callback)?;
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `value` | SQL runtime values + aggregate accumulators |
//! | `dsl` | operator DSL: types, AST, builtins, semantic analyzer |
//! | `plan` | physical plan trees and scalar expressions |
//! | `compiler` | translators, pipeline composer, codegen |
//! | `txn` | timestamp transactions + quiescence |
//! | `storage` | projected rows, tables, ordered indexes |
//! | `exec` | runtime bridges and the pipeline driver |
//! | `checker` | output validation framework |
//! | `catalog` | system catalogs and typed handles |
//! | `index_builder` | online CREATE/DROP INDEX coordinator |

pub mod catalog;
pub mod checker;
pub mod compiler;
pub mod config;
pub mod dsl;
pub mod exec;
pub mod index_builder;
pub mod plan;
pub mod storage;
pub mod txn;
pub mod value;

// Re-export the types most callers touch
pub use catalog::Catalog;
pub use checker::{Checker, OutputStore};
pub use compiler::{compile, CompiledQuery};
pub use config::Config;
pub use exec::{ExecutionContext, RuntimeError};
pub use index_builder::{IndexBuilder, IndexBuildError};
pub use plan::{OutputSchema, PlanExpr, PlanNode};
pub use txn::TransactionManager;
pub use value::{SqlType, SqlValue};
