//! Vectorized table iteration.
//!
//! A `TableVectorIterator` cursors a table block range and hands out
//! `ProjectedColumnsIterator` vectors; each PCI carries a match vector the
//! vectorized filter primitives and `match_row` maintain, with filtered
//! iteration walking only surviving tuples.

use crate::storage::table::SqlTable;
use crate::txn::Transaction;
use crate::value::SqlValue;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

/// Comparison operators the vectorized filters support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn holds(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        }
    }
}

/// Cursor over one vector of rows with per-tuple match bits.
pub struct ProjectedColumnsIterator {
    rows: Vec<Vec<SqlValue>>,
    matches: Vec<bool>,
    pos: usize,
}

impl ProjectedColumnsIterator {
    pub fn new(rows: Vec<Vec<SqlValue>>) -> Self {
        let matches = vec![true; rows.len()];
        ProjectedColumnsIterator { rows, matches, pos: 0 }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_selected(&self) -> usize {
        self.matches.iter().filter(|m| **m).count()
    }

    // ------------------------------------------------------------------
    // Unfiltered iteration
    // ------------------------------------------------------------------

    pub fn has_next(&self) -> bool {
        self.pos < self.rows.len()
    }

    pub fn advance(&mut self) {
        self.pos += 1;
    }

    pub fn reset(&mut self) {
        self.pos = 0;
    }

    // ------------------------------------------------------------------
    // Filtered iteration (matched tuples only)
    // ------------------------------------------------------------------

    pub fn has_next_filtered(&self) -> bool {
        self.pos < self.rows.len()
    }

    pub fn advance_filtered(&mut self) {
        self.pos += 1;
        while self.pos < self.rows.len() && !self.matches[self.pos] {
            self.pos += 1;
        }
    }

    pub fn reset_filtered(&mut self) {
        self.pos = 0;
        while self.pos < self.rows.len() && !self.matches[self.pos] {
            self.pos += 1;
        }
    }

    /// AND the current tuple's match bit with `matched`.
    pub fn match_row(&mut self, matched: bool) {
        if self.pos < self.matches.len() {
            self.matches[self.pos] &= matched;
        }
    }

    /// Column value of the current tuple.
    pub fn get(&self, col: usize) -> &SqlValue {
        &self.rows[self.pos][col]
    }

    /// Vectorized compare of one column against an integer constant.
    /// Updates match bits and returns how many tuples still match.
    pub fn filter_cmp(&mut self, op: CmpOp, col: usize, val: i64) -> u32 {
        let rhs = SqlValue::integer(val);
        let mut count = 0;
        for (row, m) in self.rows.iter().zip(self.matches.iter_mut()) {
            if !*m {
                continue;
            }
            let keep = row[col]
                .sql_cmp(&rhs)
                .is_some_and(|ord| op.holds(ord));
            *m = keep;
            if keep {
                count += 1;
            }
        }
        count
    }

}

/// Outer scan cursor producing PCIs of at most `vector_size` tuples.
pub struct TableVectorIterator {
    table: Arc<SqlTable>,
    txn: Arc<Transaction>,
    vector_size: usize,
    next_block: u32,
    end_block: u32,
    buffered: VecDeque<Vec<SqlValue>>,
    current: Option<ProjectedColumnsIterator>,
}

impl TableVectorIterator {
    pub fn new(table: Arc<SqlTable>, txn: Arc<Transaction>, vector_size: usize) -> Self {
        let end_block = table.num_blocks();
        Self::with_block_range(table, txn, vector_size, 0, end_block)
    }

    /// Cursor over `[start_block, end_block)`; parallel scans partition at
    /// block granularity.
    pub fn with_block_range(
        table: Arc<SqlTable>,
        txn: Arc<Transaction>,
        vector_size: usize,
        start_block: u32,
        end_block: u32,
    ) -> Self {
        TableVectorIterator {
            table,
            txn,
            vector_size: vector_size.max(1),
            next_block: start_block,
            end_block,
            buffered: VecDeque::new(),
            current: None,
        }
    }

    /// Load the next vector. Returns false when the range is exhausted.
    pub fn advance(&mut self) -> bool {
        while self.buffered.len() < self.vector_size && self.next_block < self.end_block {
            let rows = self
                .table
                .scan_blocks(&self.txn, self.next_block, self.next_block + 1);
            self.buffered.extend(rows);
            self.next_block += 1;
        }
        if self.buffered.is_empty() {
            self.current = None;
            return false;
        }
        let take = self.buffered.len().min(self.vector_size);
        let rows: Vec<Vec<SqlValue>> = self.buffered.drain(..take).collect();
        self.current = Some(ProjectedColumnsIterator::new(rows));
        true
    }

    /// The vector loaded by the last successful `advance`.
    pub fn pci(&mut self) -> Option<&mut ProjectedColumnsIterator> {
        self.current.as_mut()
    }
}
