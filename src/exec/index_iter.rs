//! Index scan bridge.
//!
//! Owns two aligned projected rows: one laid out per the index key schema
//! (the caller fills it before `scan_key`), one per the requested table
//! columns (filled as the iterator advances over matching tuples). The
//! column-oid list must be non-empty before init.

use super::RuntimeError;
use crate::storage::index::Index;
use crate::storage::projected::ProjectedRow;
use crate::storage::table::SqlTable;
use crate::storage::TupleSlot;
use crate::txn::Transaction;
use std::sync::Arc;

pub struct IndexIterator {
    index: Arc<Index>,
    table: Arc<SqlTable>,
    txn: Arc<Transaction>,
    col_oids: Vec<u32>,
    key_row: Option<ProjectedRow>,
    table_row: Option<ProjectedRow>,
    matches: Vec<TupleSlot>,
    pos: usize,
}

impl IndexIterator {
    pub fn new(index: Arc<Index>, table: Arc<SqlTable>, txn: Arc<Transaction>) -> Self {
        IndexIterator {
            index,
            table,
            txn,
            col_oids: Vec::new(),
            key_row: None,
            table_row: None,
            matches: Vec::new(),
            pos: 0,
        }
    }

    /// Table columns the iterator materializes for each match.
    pub fn add_col(&mut self, col_oid: u32) {
        self.col_oids.push(col_oid);
    }

    /// Allocate the two projected-row buffers. Fails when no columns were
    /// requested.
    pub fn init(&mut self) -> Result<(), RuntimeError> {
        if self.col_oids.is_empty() {
            return Err(RuntimeError::EmptyIndexKey);
        }
        let key_init = self.index.metadata().key_initializer();
        self.key_row = Some(key_init.initialize_row());
        let row_init = self.table.schema().projection_initializer(&self.col_oids);
        self.table_row = Some(row_init.initialize_row());
        Ok(())
    }

    /// The key buffer the caller fills before `scan_key`.
    pub fn key_row_mut(&mut self) -> Option<&mut ProjectedRow> {
        self.key_row.as_mut()
    }

    pub fn key_row(&self) -> Option<&ProjectedRow> {
        self.key_row.as_ref()
    }

    /// Position on the tuples matching the key currently in the key row.
    pub fn scan_key(&mut self) {
        let Some(key_row) = &self.key_row else {
            return;
        };
        let key = key_row.to_values();
        self.matches = self.index.scan_key(&key);
        self.pos = 0;
    }

    /// Move to the next visible match, filling the table row.
    pub fn advance(&mut self) -> bool {
        let Some(table_row) = self.table_row.as_mut() else {
            return false;
        };
        while self.pos < self.matches.len() {
            let slot = self.matches[self.pos];
            self.pos += 1;
            if self.table.select(&self.txn, slot, table_row) {
                return true;
            }
        }
        false
    }

    /// The row materialized by the last successful `advance`.
    pub fn row(&self) -> Option<&ProjectedRow> {
        self.table_row.as_ref()
    }
}
