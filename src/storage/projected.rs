//! Projected rows.
//!
//! A projected row is a contiguous byte buffer holding a chosen subset of a
//! relation's columns, addressed through a column-id → offset map. Fixed
//! cells are 16 bytes (one null flag, payload 8-aligned); VARCHAR payloads
//! index into the row's own varlen store so a row stays self-contained.

use crate::value::{SqlDate, SqlType, SqlValue};
use std::collections::HashMap;
use std::sync::Arc;

/// Bytes per column cell: 1 null byte, 7 padding, 8 payload.
pub const CELL_SIZE: usize = 16;
const PAYLOAD_AT: usize = 8;

/// Precomputed layout for projected rows over one column list.
#[derive(Debug, Clone)]
pub struct ProjectedRowInitializer {
    cols: Vec<(u32, SqlType)>,
    offsets: HashMap<u32, usize>,
}

impl ProjectedRowInitializer {
    /// Layout for `(col_oid, type)` pairs in the given order.
    pub fn new(cols: Vec<(u32, SqlType)>) -> Self {
        let offsets = cols
            .iter()
            .enumerate()
            .map(|(i, (oid, _))| (*oid, i * CELL_SIZE))
            .collect();
        ProjectedRowInitializer { cols, offsets }
    }

    pub fn row_size(&self) -> usize {
        self.cols.len() * CELL_SIZE
    }

    pub fn num_cols(&self) -> usize {
        self.cols.len()
    }

    pub fn col_oids(&self) -> Vec<u32> {
        self.cols.iter().map(|(oid, _)| *oid).collect()
    }

    /// Allocate a row with every column null.
    pub fn initialize_row(&self) -> ProjectedRow {
        let mut buf = vec![0u8; self.row_size()];
        for i in 0..self.cols.len() {
            buf[i * CELL_SIZE] = 1; // null until set
        }
        ProjectedRow {
            buf,
            cols: self.cols.clone(),
            offsets: self.offsets.clone(),
            varlens: Vec::new(),
        }
    }
}

/// One materialized projection of a tuple.
#[derive(Debug, Clone)]
pub struct ProjectedRow {
    buf: Vec<u8>,
    cols: Vec<(u32, SqlType)>,
    offsets: HashMap<u32, usize>,
    varlens: Vec<Arc<str>>,
}

impl ProjectedRow {
    pub fn num_cols(&self) -> usize {
        self.cols.len()
    }

    pub fn col_oids(&self) -> Vec<u32> {
        self.cols.iter().map(|(oid, _)| *oid).collect()
    }

    pub fn col_type(&self, col_oid: u32) -> Option<SqlType> {
        self.cols.iter().find(|(oid, _)| *oid == col_oid).map(|(_, t)| *t)
    }

    /// Byte offset of a column within the buffer.
    pub fn offset_of(&self, col_oid: u32) -> Option<usize> {
        self.offsets.get(&col_oid).copied()
    }

    pub fn is_null(&self, col_oid: u32) -> bool {
        match self.offset_of(col_oid) {
            Some(off) => self.buf[off] != 0,
            None => true,
        }
    }

    pub fn set_null(&mut self, col_oid: u32) {
        if let Some(off) = self.offset_of(col_oid) {
            self.buf[off] = 1;
        }
    }

    /// Store a value into a column. Values of the wrong shape for the
    /// column type are stored as null.
    pub fn set(&mut self, col_oid: u32, value: &SqlValue) {
        let Some(off) = self.offset_of(col_oid) else {
            return;
        };
        if value.is_null() {
            self.buf[off] = 1;
            return;
        }
        let payload: i64 = match value {
            SqlValue::Bool(v) => i64::from(v.val),
            SqlValue::Integer(v) => v.val,
            SqlValue::Real(v) => v.val.to_bits() as i64,
            SqlValue::Date(v) => i64::from(v.days()),
            SqlValue::String(v) => {
                self.varlens.push(Arc::clone(&v.val));
                (self.varlens.len() - 1) as i64
            }
        };
        self.buf[off] = 0;
        self.buf[off + PAYLOAD_AT..off + CELL_SIZE].copy_from_slice(&payload.to_le_bytes());
    }

    /// Read a column back as a value of its declared type.
    pub fn get(&self, col_oid: u32) -> SqlValue {
        let ty = match self.col_type(col_oid) {
            Some(t) => t,
            None => return SqlValue::null_of(SqlType::Integer),
        };
        let Some(off) = self.offset_of(col_oid) else {
            return SqlValue::null_of(ty);
        };
        if self.buf[off] != 0 {
            return SqlValue::null_of(ty);
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.buf[off + PAYLOAD_AT..off + CELL_SIZE]);
        let payload = i64::from_le_bytes(raw);
        match ty {
            SqlType::Boolean => SqlValue::boolean(payload != 0),
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => {
                SqlValue::integer(payload)
            }
            SqlType::Decimal => SqlValue::real(f64::from_bits(payload as u64)),
            SqlType::Date => SqlValue::Date(SqlDate::from_days(payload as i32)),
            SqlType::Varchar => match self.varlens.get(payload as usize) {
                Some(s) => SqlValue::string(Arc::clone(s)),
                None => SqlValue::null_of(SqlType::Varchar),
            },
        }
    }

    pub fn get_integer(&self, col_oid: u32) -> Option<i64> {
        self.get(col_oid).as_integer()
    }

    /// The column whose cell starts at byte `off`, if any.
    pub fn col_at_offset(&self, off: usize) -> Option<u32> {
        if off % CELL_SIZE != 0 {
            return None;
        }
        self.cols.get(off / CELL_SIZE).map(|(oid, _)| *oid)
    }

    /// Offset-addressed store, for callers holding the row as an opaque
    /// cell buffer.
    pub fn set_by_offset(&mut self, off: usize, value: &SqlValue) {
        if let Some(oid) = self.col_at_offset(off) {
            self.set(oid, value);
        }
    }

    /// Offset-addressed load.
    pub fn get_by_offset(&self, off: usize) -> SqlValue {
        match self.col_at_offset(off) {
            Some(oid) => self.get(oid),
            None => SqlValue::null_of(SqlType::Integer),
        }
    }

    /// All columns in layout order.
    pub fn to_values(&self) -> Vec<SqlValue> {
        self.cols.iter().map(|(oid, _)| self.get(*oid)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_col_init() -> ProjectedRowInitializer {
        ProjectedRowInitializer::new(vec![(5001, SqlType::Integer), (5002, SqlType::Varchar)])
    }

    #[test]
    fn test_fresh_row_is_all_null() {
        let row = two_col_init().initialize_row();
        assert!(row.is_null(5001));
        assert!(row.is_null(5002));
    }

    #[test]
    fn test_set_get_roundtrip() {
        let mut row = two_col_init().initialize_row();
        row.set(5001, &SqlValue::integer(828));
        row.set(5002, &SqlValue::string("pg_default"));
        assert_eq!(row.get_integer(5001), Some(828));
        assert_eq!(row.get(5002).as_str(), Some("pg_default"));
    }

    #[test]
    fn test_offsets_follow_column_order() {
        let init = two_col_init();
        let row = init.initialize_row();
        assert_eq!(row.offset_of(5001), Some(0));
        assert_eq!(row.offset_of(5002), Some(CELL_SIZE));
        assert_eq!(init.row_size(), 2 * CELL_SIZE);
    }

    #[test]
    fn test_real_and_date_payloads() {
        let init = ProjectedRowInitializer::new(vec![(1, SqlType::Decimal), (2, SqlType::Date)]);
        let mut row = init.initialize_row();
        row.set(1, &SqlValue::real(2.5));
        row.set(2, &SqlValue::Date(SqlDate::from_days(738000)));
        assert_eq!(row.get(1).as_real(), Some(2.5));
        assert_eq!(row.get(2), SqlValue::Date(SqlDate::from_days(738000)));
    }

    #[test]
    fn test_set_null_overwrites() {
        let mut row = two_col_init().initialize_row();
        row.set(5001, &SqlValue::integer(1));
        row.set_null(5001);
        assert!(row.is_null(5001));
        assert!(row.get(5001).is_null());
    }

    #[test]
    fn test_unknown_column_reads_null() {
        let row = two_col_init().initialize_row();
        assert!(row.get(9999).is_null());
    }

    #[test]
    fn test_offset_addressed_access() {
        let mut row = two_col_init().initialize_row();
        row.set_by_offset(0, &SqlValue::integer(828));
        row.set_by_offset(CELL_SIZE, &SqlValue::string("x"));
        assert_eq!(row.get_by_offset(0).as_integer(), Some(828));
        assert_eq!(row.get_by_offset(CELL_SIZE).as_str(), Some("x"));
        assert_eq!(row.get_integer(5001), Some(828));
        // misaligned or out-of-range offsets read null
        assert!(row.get_by_offset(3).is_null());
        assert!(row.get_by_offset(10 * CELL_SIZE).is_null());
    }
}
