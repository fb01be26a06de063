//! Query Execution Runtime
//!
//! The runtime bridges the compiled operator pipeline drives: vectorized
//! table iteration, join/aggregation hash tables, sorters, the output
//! buffer, and the execution context that ties one query run together.
//!
//! ## Design
//!
//! Cancellation is cooperative - drivers check the context's flag at
//! vector boundaries, in-flight operations complete, and the output buffer
//! keeps only fully flushed batches.

pub mod agg_ht;
pub mod filter_manager;
pub mod index_iter;
pub mod join_ht;
pub mod output;
pub mod processor;
pub mod row;
pub mod sorter;
pub mod table_iter;
pub mod thread_state;
pub mod vm;

pub use agg_ht::{AggOverflowPartIter, AggregationHashTable, AggregationHashTableIterator};
pub use filter_manager::FilterManager;
pub use index_iter::IndexIterator;
pub use join_ht::{JoinHashTable, JoinHashTableIterator};
pub use output::{OutputBuffer, OutputCallback};
pub use row::RowLayout;
pub use sorter::{Sorter, SorterIterator};
pub use table_iter::{ProjectedColumnsIterator, TableVectorIterator};
pub use thread_state::ThreadStateContainer;

use crate::txn::Transaction;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Runtime fault taxonomy. Every variant aborts the current transaction,
/// never the process.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    #[error("query was cancelled")]
    Cancelled,

    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    #[error("index '{0}' does not exist")]
    IndexNotFound(String),

    #[error("index iterator initialized without key columns")]
    EmptyIndexKey,

    #[error("plan failed to compile: {0} diagnostic(s) reported")]
    CompileRejected(usize),

    #[error("malformed generated program: {0}")]
    Malformed(String),

    #[error("intrinsic '{0}' requires the worker-pool host and is never emitted by this compiler")]
    Unsupported(&'static str),
}

#[derive(Default)]
struct StringInterner {
    vals: Vec<Arc<str>>,
    ids: HashMap<Arc<str>, u32>,
}

/// Tracked allocations plus the varlen arena row layouts point into.
#[derive(Default)]
pub struct MemoryPool {
    allocated: AtomicUsize,
    strings: Mutex<StringInterner>,
}

impl MemoryPool {
    pub fn new() -> Self {
        MemoryPool::default()
    }

    /// Intern a string payload, returning its stable handle.
    pub fn intern(&self, s: &str) -> u32 {
        let mut interner = self.strings.lock();
        if let Some(&id) = interner.ids.get(s) {
            return id;
        }
        let arc: Arc<str> = Arc::from(s);
        let id = interner.vals.len() as u32;
        interner.vals.push(Arc::clone(&arc));
        interner.ids.insert(arc, id);
        self.allocated.fetch_add(s.len(), Ordering::Relaxed);
        id
    }

    pub fn string(&self, id: u32) -> Option<Arc<str>> {
        self.strings.lock().vals.get(id as usize).cloned()
    }

    pub fn track(&self, bytes: usize) {
        self.allocated.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

/// Per-query execution state handed to every compiled plan.
pub struct ExecutionContext {
    pool: Arc<MemoryPool>,
    txn: Arc<Transaction>,
    vector_size: usize,
    cancelled: AtomicBool,
}

impl ExecutionContext {
    pub fn new(txn: Arc<Transaction>, vector_size: usize) -> Self {
        ExecutionContext {
            pool: Arc::new(MemoryPool::new()),
            txn,
            vector_size,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn pool(&self) -> &Arc<MemoryPool> {
        &self.pool
    }

    pub fn txn(&self) -> &Arc<Transaction> {
        &self.txn
    }

    pub fn vector_size(&self) -> usize {
        self.vector_size
    }

    /// Flip the cancellation flag; loops observe it at vector boundaries.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn check_cancelled(&self) -> Result<(), RuntimeError> {
        if self.is_cancelled() {
            Err(RuntimeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::TransactionManager;

    #[test]
    fn test_string_interning_is_stable() {
        let pool = MemoryPool::new();
        let a = pool.intern("hello");
        let b = pool.intern("hello");
        let c = pool.intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.string(a).as_deref(), Some("hello"));
        assert_eq!(pool.string(9999), None);
    }

    #[test]
    fn test_cancellation_flag() {
        let mgr = TransactionManager::new();
        let txn = mgr.begin();
        let ctx = ExecutionContext::new(Arc::clone(&txn), 2048);
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancel();
        assert!(matches!(ctx.check_cancelled(), Err(RuntimeError::Cancelled)));
        mgr.commit(&txn);
    }
}
