//! # SQL Value Type System
//!
//! Runtime-level SQL values: `SqlBool`, `SqlInteger`, `SqlReal`, `SqlDate`,
//! `SqlStringVal`. Every value carries a null flag next to its payload, and
//! the tagged [`SqlValue`] union moves them through operators, hash tables
//! and output batches.
//!
//! ## Usage
//!
//! ```rust
//! use basalt::value::{SqlValue, SqlType};
//!
//! let v = SqlValue::integer(42);
//! assert_eq!(v.sql_type(), SqlType::Integer);
//! assert!(!v.is_null());
//!
//! let n = SqlValue::null_of(SqlType::Integer);
//! assert!(n.is_null());
//! ```

pub mod aggregates;

pub use aggregates::{AggregateKind, Aggregator};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Column types understood by the engine's plans and catalogs.
///
/// The four integral widths all decode to [`SqlValue::Integer`] at runtime;
/// the width only matters for schema layout and catalog metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlType {
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Boolean,
    Decimal,
    Date,
    Varchar,
}

impl SqlType {
    /// True for the integral family (TINYINT through BIGINT).
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt
        )
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlType::TinyInt => "TINYINT",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Decimal => "DECIMAL",
            SqlType::Date => "DATE",
            SqlType::Varchar => "VARCHAR",
        };
        f.write_str(name)
    }
}

/// Three-valued SQL boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlBool {
    pub is_null: bool,
    pub val: bool,
}

impl SqlBool {
    pub fn new(val: bool) -> Self {
        SqlBool { is_null: false, val }
    }

    pub fn null() -> Self {
        SqlBool { is_null: true, val: false }
    }

    /// Null collapses to false, matching WHERE-clause semantics.
    pub fn is_true(self) -> bool {
        !self.is_null && self.val
    }
}

/// Nullable 64-bit integer payload shared by all integral column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlInteger {
    pub is_null: bool,
    pub val: i64,
}

impl SqlInteger {
    pub fn new(val: i64) -> Self {
        SqlInteger { is_null: false, val }
    }

    pub fn null() -> Self {
        SqlInteger { is_null: true, val: 0 }
    }
}

/// Nullable double-precision real.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SqlReal {
    pub is_null: bool,
    pub val: f64,
}

impl SqlReal {
    pub fn new(val: f64) -> Self {
        SqlReal { is_null: false, val }
    }

    pub fn null() -> Self {
        SqlReal { is_null: true, val: 0.0 }
    }
}

/// Nullable calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlDate {
    pub is_null: bool,
    pub val: NaiveDate,
}

impl SqlDate {
    pub fn new(val: NaiveDate) -> Self {
        SqlDate { is_null: false, val }
    }

    pub fn null() -> Self {
        SqlDate {
            is_null: true,
            val: NaiveDate::default(),
        }
    }

    /// Days since the Common Era, the engine's on-wire date encoding.
    pub fn days(&self) -> i32 {
        self.val.num_days_from_ce()
    }

    pub fn from_days(days: i32) -> Self {
        match NaiveDate::from_num_days_from_ce_opt(days) {
            Some(d) => SqlDate::new(d),
            None => SqlDate::null(),
        }
    }
}

/// Nullable string value. Payloads are shared, cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStringVal {
    pub is_null: bool,
    pub val: Arc<str>,
}

impl SqlStringVal {
    pub fn new(val: impl Into<Arc<str>>) -> Self {
        SqlStringVal { is_null: false, val: val.into() }
    }

    pub fn null() -> Self {
        SqlStringVal { is_null: true, val: Arc::from("") }
    }
}

/// Tagged union over the five runtime value types.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Bool(SqlBool),
    Integer(SqlInteger),
    Real(SqlReal),
    Date(SqlDate),
    String(SqlStringVal),
}

impl SqlValue {
    pub fn boolean(v: bool) -> Self {
        SqlValue::Bool(SqlBool::new(v))
    }

    pub fn integer(v: i64) -> Self {
        SqlValue::Integer(SqlInteger::new(v))
    }

    pub fn real(v: f64) -> Self {
        SqlValue::Real(SqlReal::new(v))
    }

    pub fn date(v: NaiveDate) -> Self {
        SqlValue::Date(SqlDate::new(v))
    }

    pub fn string(v: impl Into<Arc<str>>) -> Self {
        SqlValue::String(SqlStringVal::new(v))
    }

    /// The null value of the given column type.
    pub fn null_of(ty: SqlType) -> Self {
        match ty {
            SqlType::Boolean => SqlValue::Bool(SqlBool::null()),
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => {
                SqlValue::Integer(SqlInteger::null())
            }
            SqlType::Decimal => SqlValue::Real(SqlReal::null()),
            SqlType::Date => SqlValue::Date(SqlDate::null()),
            SqlType::Varchar => SqlValue::String(SqlStringVal::null()),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            SqlValue::Bool(v) => v.is_null,
            SqlValue::Integer(v) => v.is_null,
            SqlValue::Real(v) => v.is_null,
            SqlValue::Date(v) => v.is_null,
            SqlValue::String(v) => v.is_null,
        }
    }

    /// The runtime type tag. Integral widths are collapsed to `Integer`.
    pub fn sql_type(&self) -> SqlType {
        match self {
            SqlValue::Bool(_) => SqlType::Boolean,
            SqlValue::Integer(_) => SqlType::Integer,
            SqlValue::Real(_) => SqlType::Decimal,
            SqlValue::Date(_) => SqlType::Date,
            SqlValue::String(_) => SqlType::Varchar,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) if !v.is_null => Some(v.val),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            SqlValue::Real(v) if !v.is_null => Some(v.val),
            SqlValue::Integer(v) if !v.is_null => Some(v.val as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::String(v) if !v.is_null => Some(&v.val),
            _ => None,
        }
    }

    /// SQL comparison: `None` when either side is null or the payloads are
    /// of incomparable types.
    pub fn sql_cmp(&self, other: &SqlValue) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        match (self, other) {
            (SqlValue::Bool(a), SqlValue::Bool(b)) => Some(a.val.cmp(&b.val)),
            (SqlValue::Integer(a), SqlValue::Integer(b)) => Some(a.val.cmp(&b.val)),
            (SqlValue::Real(a), SqlValue::Real(b)) => a.val.partial_cmp(&b.val),
            (SqlValue::Integer(a), SqlValue::Real(b)) => (a.val as f64).partial_cmp(&b.val),
            (SqlValue::Real(a), SqlValue::Integer(b)) => a.val.partial_cmp(&(b.val as f64)),
            (SqlValue::Date(a), SqlValue::Date(b)) => Some(a.val.cmp(&b.val)),
            (SqlValue::String(a), SqlValue::String(b)) => Some(a.val.cmp(&b.val)),
            _ => None,
        }
    }

    /// Total order used by sorters: nulls first, then payload order.
    pub fn total_cmp(&self, other: &SqlValue) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.sql_cmp(other).unwrap_or(Ordering::Equal),
        }
    }

    /// Stable 64-bit hash over the payload. Null hashes to a fixed seed so
    /// grouping treats nulls as one group.
    pub fn hash_value(&self) -> u64 {
        const NULL_SEED: u64 = 0x6e75_6c6c_7365_6564;
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        if self.is_null() {
            NULL_SEED.hash(&mut hasher);
        } else {
            match self {
                SqlValue::Bool(v) => v.val.hash(&mut hasher),
                SqlValue::Integer(v) => v.val.hash(&mut hasher),
                SqlValue::Real(v) => v.val.to_bits().hash(&mut hasher),
                SqlValue::Date(v) => v.days().hash(&mut hasher),
                SqlValue::String(v) => v.val.hash(&mut hasher),
            }
        }
        hasher.finish()
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("NULL");
        }
        match self {
            SqlValue::Bool(v) => write!(f, "{}", v.val),
            SqlValue::Integer(v) => write!(f, "{}", v.val),
            SqlValue::Real(v) => write!(f, "{}", v.val),
            SqlValue::Date(v) => write!(f, "{}", v.val),
            SqlValue::String(v) => write!(f, "'{}'", v.val),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_flags() {
        assert!(SqlValue::null_of(SqlType::Integer).is_null());
        assert!(SqlValue::null_of(SqlType::Varchar).is_null());
        assert!(!SqlValue::integer(0).is_null());
    }

    #[test]
    fn test_sql_cmp_null_is_incomparable() {
        let null = SqlValue::null_of(SqlType::Integer);
        let one = SqlValue::integer(1);
        assert_eq!(null.sql_cmp(&one), None);
        assert_eq!(one.sql_cmp(&null), None);
        assert_eq!(one.sql_cmp(&SqlValue::integer(2)), Some(Ordering::Less));
    }

    #[test]
    fn test_total_cmp_orders_nulls_first() {
        let null = SqlValue::null_of(SqlType::Integer);
        let zero = SqlValue::integer(0);
        assert_eq!(null.total_cmp(&zero), Ordering::Less);
        assert_eq!(null.total_cmp(&null), Ordering::Equal);
    }

    #[test]
    fn test_mixed_numeric_compare() {
        let i = SqlValue::integer(3);
        let r = SqlValue::real(3.5);
        assert_eq!(i.sql_cmp(&r), Some(Ordering::Less));
        assert_eq!(r.sql_cmp(&i), Some(Ordering::Greater));
    }

    #[test]
    fn test_hash_groups_nulls_together() {
        let a = SqlValue::null_of(SqlType::Integer);
        let b = SqlValue::null_of(SqlType::Integer);
        assert_eq!(a.hash_value(), b.hash_value());
        assert_eq!(SqlValue::integer(7).hash_value(), SqlValue::integer(7).hash_value());
    }

    #[test]
    fn test_date_day_roundtrip() {
        let d = SqlDate::new(NaiveDate::from_ymd_opt(2020, 2, 29).expect("valid date"));
        let back = SqlDate::from_days(d.days());
        assert_eq!(back.val, d.val);
    }
}
