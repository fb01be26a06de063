//! Transactional in-memory tables.
//!
//! Rows carry version boundaries stamped by the transaction manager at
//! commit; readers filter by their snapshot. Inserts and deletes are
//! versioned. In-place column updates (catalog flag flips) overwrite the
//! current payload and are only performed on rows the writer created or
//! protocol-owns.

use super::projected::{ProjectedRow, ProjectedRowInitializer};
use super::{TupleSlot, BLOCK_CAPACITY};
use crate::txn::{Transaction, Version, WriteKind};
use crate::value::{SqlType, SqlValue};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub oid: u32,
    pub name: String,
    pub ty: SqlType,
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new(oid: u32, name: impl Into<String>, ty: SqlType) -> Self {
        ColumnDef { oid, name: name.into(), ty, nullable: true }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableSchema {
    cols: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(cols: Vec<ColumnDef>) -> Self {
        TableSchema { cols }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.cols
    }

    pub fn num_cols(&self) -> usize {
        self.cols.len()
    }

    pub fn col_oids(&self) -> Vec<u32> {
        self.cols.iter().map(|c| c.oid).collect()
    }

    pub fn col_types(&self) -> Vec<SqlType> {
        self.cols.iter().map(|c| c.ty).collect()
    }

    pub fn index_of_oid(&self, oid: u32) -> Option<usize> {
        self.cols.iter().position(|c| c.oid == oid)
    }

    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.cols.iter().position(|c| c.name == name)
    }

    /// Layout for a projection over a subset of this schema's columns.
    pub fn projection_initializer(&self, col_oids: &[u32]) -> ProjectedRowInitializer {
        let cols = col_oids
            .iter()
            .filter_map(|oid| {
                self.cols
                    .iter()
                    .find(|c| c.oid == *oid)
                    .map(|c| (c.oid, c.ty))
            })
            .collect();
        ProjectedRowInitializer::new(cols)
    }
}

struct RowVersion {
    values: Vec<SqlValue>,
    begin: Version,
    end: Option<Version>,
    /// Aborted inserts leave a dead stub so slots stay stable.
    dead: bool,
}

/// A heap table with snapshot-visible row versions.
pub struct SqlTable {
    name: String,
    schema: TableSchema,
    rows: RwLock<Vec<RowVersion>>,
}

impl SqlTable {
    pub fn new(name: impl Into<String>, schema: TableSchema) -> Self {
        SqlTable {
            name: name.into(),
            schema,
            rows: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Insert a row as a pending version owned by `txn`.
    pub fn insert(self: &Arc<Self>, txn: &Transaction, values: Vec<SqlValue>) -> TupleSlot {
        let mut rows = self.rows.write();
        rows.push(RowVersion {
            values,
            begin: Version::Pending(txn.id()),
            end: None,
            dead: false,
        });
        let slot = TupleSlot::from_row_index(rows.len() - 1);
        drop(rows);
        txn.record_write(Arc::clone(self), slot, WriteKind::Insert);
        slot
    }

    /// Delete a row: marks a pending end version owned by `txn`.
    pub fn delete(self: &Arc<Self>, txn: &Transaction, slot: TupleSlot) -> bool {
        let mut rows = self.rows.write();
        let Some(row) = rows.get_mut(slot.row_index()) else {
            return false;
        };
        if row.dead || row.end.is_some() || !txn.sees(row.begin, row.end) {
            return false;
        }
        row.end = Some(Version::Pending(txn.id()));
        drop(rows);
        txn.record_write(Arc::clone(self), slot, WriteKind::Delete);
        true
    }

    /// Fill a projected row from the tuple at `slot` if it is visible.
    pub fn select(&self, txn: &Transaction, slot: TupleSlot, out: &mut ProjectedRow) -> bool {
        let rows = self.rows.read();
        let Some(row) = rows.get(slot.row_index()) else {
            return false;
        };
        if row.dead || !txn.sees(row.begin, row.end) {
            return false;
        }
        for oid in out.col_oids() {
            if let Some(idx) = self.schema.index_of_oid(oid) {
                out.set(oid, &row.values[idx]);
            }
        }
        true
    }

    /// Clone every visible row, with its slot. Catalog lookups and index
    /// population scan this way.
    pub fn scan(&self, txn: &Transaction) -> Vec<(TupleSlot, Vec<SqlValue>)> {
        let rows = self.rows.read();
        rows.iter()
            .enumerate()
            .filter(|(_, r)| !r.dead && txn.sees(r.begin, r.end))
            .map(|(i, r)| (TupleSlot::from_row_index(i), r.values.clone()))
            .collect()
    }

    /// Visible rows in `[start_block, end_block)`, for vectorized scans.
    pub fn scan_blocks(
        &self,
        txn: &Transaction,
        start_block: u32,
        end_block: u32,
    ) -> Vec<Vec<SqlValue>> {
        let rows = self.rows.read();
        let lo = (start_block as usize) * BLOCK_CAPACITY;
        let hi = ((end_block as usize) * BLOCK_CAPACITY).min(rows.len());
        if lo >= hi {
            return Vec::new();
        }
        rows[lo..hi]
            .iter()
            .filter(|r| !r.dead && txn.sees(r.begin, r.end))
            .map(|r| r.values.clone())
            .collect()
    }

    pub fn num_blocks(&self) -> u32 {
        let len = self.rows.read().len();
        len.div_ceil(BLOCK_CAPACITY) as u32
    }

    /// Overwrite one column in place. Not versioned; callers own the row
    /// by protocol (catalog descriptor flags).
    pub fn update_in_place(&self, slot: TupleSlot, col_oid: u32, value: SqlValue) -> bool {
        let Some(idx) = self.schema.index_of_oid(col_oid) else {
            return false;
        };
        let mut rows = self.rows.write();
        let Some(row) = rows.get_mut(slot.row_index()) else {
            return false;
        };
        if row.dead {
            return false;
        }
        row.values[idx] = value;
        true
    }

    // ------------------------------------------------------------------
    // Commit/abort hooks, called by the transaction manager
    // ------------------------------------------------------------------

    pub(crate) fn stamp_insert(&self, slot: TupleSlot, commit_ts: u64) {
        let mut rows = self.rows.write();
        if let Some(row) = rows.get_mut(slot.row_index()) {
            row.begin = Version::Committed(commit_ts);
        }
    }

    pub(crate) fn stamp_delete(&self, slot: TupleSlot, commit_ts: u64) {
        let mut rows = self.rows.write();
        if let Some(row) = rows.get_mut(slot.row_index()) {
            row.end = Some(Version::Committed(commit_ts));
        }
    }

    pub(crate) fn rollback_insert(&self, slot: TupleSlot) {
        let mut rows = self.rows.write();
        if let Some(row) = rows.get_mut(slot.row_index()) {
            row.dead = true;
        }
    }

    pub(crate) fn rollback_delete(&self, slot: TupleSlot) {
        let mut rows = self.rows.write();
        if let Some(row) = rows.get_mut(slot.row_index()) {
            row.end = None;
        }
    }
}

impl std::fmt::Debug for SqlTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlTable")
            .field("name", &self.name)
            .field("cols", &self.schema.num_cols())
            .finish()
    }
}
