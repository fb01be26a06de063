//! Timestamp-ordered transactions.
//!
//! A thin transaction manager covering what the execution engine consumes
//! from the real MVCC layer: begin (optionally with an atomic begin
//! action), commit with post-commit actions, abort, and the oldest-active
//! start timestamp the online index builder quiesces on. The quiescence
//! wait is a condvar signaled whenever a transaction ends, with a poll
//! fallback so a missed signal cannot wedge a waiter.

use crate::storage::table::SqlTable;
use crate::storage::TupleSlot;
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

pub type Timestamp = u64;

/// Commit state of one row version boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// Stamped by a committed transaction.
    Committed(Timestamp),
    /// Written by the in-flight transaction with this id.
    Pending(Timestamp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Delete,
}

pub(crate) struct WriteRecord {
    pub table: Arc<SqlTable>,
    pub slot: TupleSlot,
    pub kind: WriteKind,
}

/// One in-flight transaction. The start timestamp doubles as the
/// transaction id; writes are stamped at commit.
pub struct Transaction {
    start_ts: Timestamp,
    writes: Mutex<Vec<WriteRecord>>,
    commit_actions: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl Transaction {
    fn new(start_ts: Timestamp) -> Self {
        Transaction {
            start_ts,
            writes: Mutex::new(Vec::new()),
            commit_actions: Mutex::new(Vec::new()),
        }
    }

    pub fn start_ts(&self) -> Timestamp {
        self.start_ts
    }

    /// Transaction id for pending-version ownership checks.
    pub fn id(&self) -> Timestamp {
        self.start_ts
    }

    /// Register a callback to run after this transaction commits.
    pub fn add_commit_action(&self, f: impl FnOnce() + Send + 'static) {
        self.commit_actions.lock().push(Box::new(f));
    }

    pub(crate) fn record_write(&self, table: Arc<SqlTable>, slot: TupleSlot, kind: WriteKind) {
        self.writes.lock().push(WriteRecord { table, slot, kind });
    }

    /// Row-version visibility under this transaction's snapshot.
    pub fn sees(&self, begin: Version, end: Option<Version>) -> bool {
        let begin_visible = match begin {
            Version::Pending(writer) => writer == self.id(),
            Version::Committed(ts) => self.start_ts >= ts,
        };
        if !begin_visible {
            return false;
        }
        match end {
            None => true,
            Some(Version::Pending(writer)) => writer != self.id(),
            Some(Version::Committed(ts)) => self.start_ts < ts,
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction").field("start_ts", &self.start_ts).finish()
    }
}

/// Hands out timestamps, tracks the active set, and stamps write sets at
/// commit.
pub struct TransactionManager {
    /// Next timestamp to hand out; also the upper bound on every issued one.
    clock: AtomicU64,
    active: Mutex<BTreeSet<Timestamp>>,
    ended: Condvar,
}

impl Default for TransactionManager {
    fn default() -> Self {
        TransactionManager {
            clock: AtomicU64::new(1),
            active: Mutex::new(BTreeSet::new()),
            ended: Condvar::new(),
        }
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        TransactionManager::default()
    }

    pub fn begin(&self) -> Arc<Transaction> {
        self.begin_inner(None::<fn()>)
    }

    /// Begin with an action that runs atomically with registration, before
    /// any other transaction can observe this one.
    pub fn begin_with_action(&self, action: impl FnOnce()) -> Arc<Transaction> {
        self.begin_inner(Some(action))
    }

    fn begin_inner(&self, action: Option<impl FnOnce()>) -> Arc<Transaction> {
        let mut active = self.active.lock();
        let start_ts = self.clock.fetch_add(1, Ordering::SeqCst);
        active.insert(start_ts);
        if let Some(action) = action {
            action();
        }
        drop(active);
        trace!(start_ts, "transaction begin");
        Arc::new(Transaction::new(start_ts))
    }

    /// Commit: stamp the write set with a fresh commit timestamp, retire
    /// the transaction, then run its commit actions.
    pub fn commit(&self, txn: &Transaction) -> Timestamp {
        let writes = std::mem::take(&mut *txn.writes.lock());
        let commit_ts;
        {
            let mut active = self.active.lock();
            commit_ts = self.clock.fetch_add(1, Ordering::SeqCst);
            for w in &writes {
                match w.kind {
                    WriteKind::Insert => w.table.stamp_insert(w.slot, commit_ts),
                    WriteKind::Delete => w.table.stamp_delete(w.slot, commit_ts),
                }
            }
            active.remove(&txn.start_ts);
            self.ended.notify_all();
        }
        let actions = std::mem::take(&mut *txn.commit_actions.lock());
        for action in actions {
            action();
        }
        debug!(start_ts = txn.start_ts, commit_ts, "transaction committed");
        commit_ts
    }

    /// Abort: undo the write set and retire the transaction. Commit
    /// actions are dropped.
    pub fn abort(&self, txn: &Transaction) {
        let writes = std::mem::take(&mut *txn.writes.lock());
        for w in writes.iter().rev() {
            match w.kind {
                WriteKind::Insert => w.table.rollback_insert(w.slot),
                WriteKind::Delete => w.table.rollback_delete(w.slot),
            }
        }
        let mut active = self.active.lock();
        active.remove(&txn.start_ts);
        self.ended.notify_all();
        drop(active);
        txn.commit_actions.lock().clear();
        debug!(start_ts = txn.start_ts, "transaction aborted");
    }

    /// Minimum start timestamp among in-flight transactions; the clock's
    /// current value when none are active. Monotonic non-decreasing as old
    /// transactions end.
    pub fn oldest_active_start_ts(&self) -> Timestamp {
        let active = self.active.lock();
        active
            .iter()
            .next()
            .copied()
            .unwrap_or_else(|| self.clock.load(Ordering::SeqCst))
    }

    /// Block until every transaction that started before `ts` has ended.
    pub fn wait_for_quiescence(&self, ts: Timestamp) {
        let mut active = self.active.lock();
        loop {
            let oldest = active
                .iter()
                .next()
                .copied()
                .unwrap_or_else(|| self.clock.load(Ordering::SeqCst));
            if oldest >= ts {
                return;
            }
            // Poll fallback bounds the wait even if a signal is missed.
            self.ended.wait_for(&mut active, Duration::from_millis(10));
        }
    }
}
