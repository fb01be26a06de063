//! Ordered key index.
//!
//! Consumed through the same narrow contract the real tree implementations
//! expose: non-unique insert, unique insert that fails fast on a
//! duplicate, and an exact-key scan yielding tuple slots.

use super::{ProjectedRowInitializer, TupleSlot};
use crate::value::{SqlType, SqlValue};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A key column value with the total order the index sorts by.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue(pub SqlValue);

impl Eq for KeyValue {}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Static description of one index.
#[derive(Debug, Clone)]
pub struct IndexMetadata {
    pub name: String,
    /// Table column oids making up the key, in key order.
    pub key_oids: Vec<u32>,
    pub key_types: Vec<SqlType>,
    pub unique: bool,
}

impl IndexMetadata {
    /// Layout of the index's key projection.
    pub fn key_initializer(&self) -> ProjectedRowInitializer {
        let cols = self
            .key_oids
            .iter()
            .zip(self.key_types.iter())
            .map(|(oid, ty)| (*oid, *ty))
            .collect();
        ProjectedRowInitializer::new(cols)
    }
}

/// In-memory ordered index over composite keys.
pub struct Index {
    metadata: IndexMetadata,
    map: RwLock<BTreeMap<Vec<KeyValue>, Vec<TupleSlot>>>,
}

impl Index {
    pub fn new(metadata: IndexMetadata) -> Self {
        Index {
            metadata,
            map: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    fn to_key(values: &[SqlValue]) -> Vec<KeyValue> {
        values.iter().cloned().map(KeyValue).collect()
    }

    /// Insert a key/slot pair. Never fails.
    pub fn insert(&self, key: &[SqlValue], slot: TupleSlot) -> bool {
        let mut map = self.map.write();
        map.entry(Self::to_key(key)).or_default().push(slot);
        true
    }

    /// Insert a key/slot pair, failing if the key is already present.
    pub fn insert_unique(&self, key: &[SqlValue], slot: TupleSlot) -> bool {
        let mut map = self.map.write();
        let entry = map.entry(Self::to_key(key)).or_default();
        if !entry.is_empty() {
            return false;
        }
        entry.push(slot);
        true
    }

    /// All slots stored under an exact key.
    pub fn scan_key(&self, key: &[SqlValue]) -> Vec<TupleSlot> {
        let map = self.map.read();
        map.get(&Self::to_key(key)).cloned().unwrap_or_default()
    }

    /// Number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.map.read().len()
    }

    /// Number of stored entries.
    pub fn entry_count(&self) -> usize {
        self.map.read().values().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.metadata.name)
            .field("unique", &self.metadata.unique)
            .finish()
    }
}
