//! Positional tuple layout for runtime containers and output batches.
//!
//! Same 16-byte cell shape as projected rows, addressed by column position
//! instead of column oid. VARCHAR payloads are handles into the memory
//! pool's string arena, so entries can live in flat byte buffers inside
//! hash tables and sorter runs.

use super::MemoryPool;
use crate::value::{SqlDate, SqlType, SqlValue};

pub use crate::storage::projected::CELL_SIZE;

const PAYLOAD_AT: usize = 8;

/// Write one value into the cell starting at byte `off`.
pub fn write_cell(buf: &mut [u8], off: usize, value: &SqlValue, pool: &MemoryPool) {
    if value.is_null() {
        buf[off] = 1;
        return;
    }
    let payload: i64 = match value {
        SqlValue::Bool(v) => i64::from(v.val),
        SqlValue::Integer(v) => v.val,
        SqlValue::Real(v) => v.val.to_bits() as i64,
        SqlValue::Date(v) => i64::from(v.days()),
        SqlValue::String(v) => i64::from(pool.intern(&v.val)),
    };
    buf[off] = 0;
    buf[off + PAYLOAD_AT..off + CELL_SIZE].copy_from_slice(&payload.to_le_bytes());
}

/// Read the cell starting at byte `off` as a value of `ty`.
pub fn read_cell(buf: &[u8], off: usize, ty: SqlType, pool: &MemoryPool) -> SqlValue {
    if buf[off] != 0 {
        return SqlValue::null_of(ty);
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[off + PAYLOAD_AT..off + CELL_SIZE]);
    let payload = i64::from_le_bytes(raw);
    match ty {
        SqlType::Boolean => SqlValue::boolean(payload != 0),
        SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => {
            SqlValue::integer(payload)
        }
        SqlType::Decimal => SqlValue::real(f64::from_bits(payload as u64)),
        SqlType::Date => SqlValue::Date(SqlDate::from_days(payload as i32)),
        SqlType::Varchar => match pool.string(payload as u32) {
            Some(s) => SqlValue::string(s),
            None => SqlValue::null_of(SqlType::Varchar),
        },
    }
}

/// Integer-cell shorthand for accumulator state; `None` stores null.
pub fn write_int_cell(buf: &mut [u8], off: usize, value: Option<i64>) {
    match value {
        Some(v) => {
            buf[off] = 0;
            buf[off + PAYLOAD_AT..off + CELL_SIZE].copy_from_slice(&v.to_le_bytes());
        }
        None => buf[off] = 1,
    }
}

pub fn read_int_cell(buf: &[u8], off: usize) -> Option<i64> {
    if buf[off] != 0 {
        return None;
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[off + PAYLOAD_AT..off + CELL_SIZE]);
    Some(i64::from_le_bytes(raw))
}

/// Fixed layout over an ordered column-type list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLayout {
    types: Vec<SqlType>,
}

impl RowLayout {
    pub fn new(types: Vec<SqlType>) -> Self {
        RowLayout { types }
    }

    pub fn num_cols(&self) -> usize {
        self.types.len()
    }

    pub fn types(&self) -> &[SqlType] {
        &self.types
    }

    pub fn col_type(&self, idx: usize) -> SqlType {
        self.types[idx]
    }

    /// Byte size of one tuple.
    pub fn size(&self) -> usize {
        self.types.len() * CELL_SIZE
    }

    pub fn offset(&self, idx: usize) -> usize {
        idx * CELL_SIZE
    }

    pub fn set_null(&self, buf: &mut [u8], idx: usize) {
        buf[self.offset(idx)] = 1;
    }

    pub fn is_null(&self, buf: &[u8], idx: usize) -> bool {
        buf[self.offset(idx)] != 0
    }

    /// Write one value into its cell.
    pub fn write(&self, buf: &mut [u8], idx: usize, value: &SqlValue, pool: &MemoryPool) {
        write_cell(buf, self.offset(idx), value, pool);
    }

    /// Read one cell back as a value of the column's type.
    pub fn read(&self, buf: &[u8], idx: usize, pool: &MemoryPool) -> SqlValue {
        read_cell(buf, self.offset(idx), self.types[idx], pool)
    }

    pub fn encode_row(&self, values: &[SqlValue], buf: &mut [u8], pool: &MemoryPool) {
        for (i, v) in values.iter().enumerate() {
            self.write(buf, i, v, pool);
        }
    }

    pub fn decode_row(&self, buf: &[u8], pool: &MemoryPool) -> Vec<SqlValue> {
        (0..self.types.len()).map(|i| self.read(buf, i, pool)).collect()
    }
}
