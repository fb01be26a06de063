//! Aggregation hash table.
//!
//! Payloads are fixed-size byte rows: the aggregator state heads the
//! payload (two reserved cells, enough for the widest accumulator), group
//! keys follow one cell each. The serial path is lookup-or-insert; the
//! parallel path moves per-worker tables into hash-partitioned overflow
//! lists, then scans the partitions independently. The result-phase
//! iterator is a detached cursor resolved against the table per call,
//! matching the `aggHTIterInit(iter, aht)` intrinsic shape.

use super::row::{read_int_cell, write_int_cell, CELL_SIZE};
use crate::value::{AggregateKind, Aggregator};
use rayon::prelude::*;
use std::collections::HashMap;

/// Cells reserved for one aggregator's state at the head of a payload.
pub const AGG_STATE_CELLS: usize = 2;

/// Partition count for the parallel path; hashes partition by top byte.
pub const NUM_PARTITIONS: usize = 256;

fn partition_of(hash: u64) -> usize {
    (hash >> 56) as usize
}

/// Decode the aggregator state stored at byte offset `at`.
pub fn read_payload_agg(buf: &[u8], at: usize, kind: AggregateKind) -> Aggregator {
    let cell = |i: usize| read_int_cell(buf, at + i * CELL_SIZE);
    match kind {
        AggregateKind::Count => Aggregator::Count { n: cell(0).unwrap_or(0) },
        AggregateKind::CountStar => Aggregator::CountStar { n: cell(0).unwrap_or(0) },
        AggregateKind::Sum => match cell(0) {
            Some(sum) => Aggregator::Sum { seen: true, sum },
            None => Aggregator::Sum { seen: false, sum: 0 },
        },
        AggregateKind::Avg => Aggregator::Avg {
            sum: cell(0).unwrap_or(0),
            n: cell(1).unwrap_or(0),
        },
        AggregateKind::Min => Aggregator::Min { cur: cell(0) },
        AggregateKind::Max => Aggregator::Max { cur: cell(0) },
    }
}

/// Encode an aggregator's state at byte offset `at`.
pub fn write_payload_agg(buf: &mut [u8], at: usize, agg: &Aggregator) {
    let mut put = |i: usize, v: Option<i64>| write_int_cell(buf, at + i * CELL_SIZE, v);
    match agg {
        Aggregator::Count { n } | Aggregator::CountStar { n } => put(0, Some(*n)),
        Aggregator::Sum { seen, sum } => put(0, seen.then_some(*sum)),
        Aggregator::Avg { sum, n } => {
            put(0, Some(*sum));
            put(1, Some(*n));
        }
        Aggregator::Min { cur } | Aggregator::Max { cur } => put(0, *cur),
    }
}

struct Entry {
    hash: u64,
    payload: Box<[u8]>,
}

pub struct AggregationHashTable {
    payload_size: usize,
    entries: Vec<Entry>,
    index: HashMap<u64, Vec<u32>>,
    partitions: Vec<Vec<Entry>>,
}

impl AggregationHashTable {
    pub fn new(payload_size: usize) -> Self {
        AggregationHashTable {
            payload_size,
            entries: Vec::new(),
            index: HashMap::new(),
            partitions: Vec::new(),
        }
    }

    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Entry ids hashed to `hash`; the caller runs the key check.
    pub fn candidates(&self, hash: u64) -> Vec<u32> {
        self.index.get(&hash).cloned().unwrap_or_default()
    }

    /// Find the entry for `hash` whose payload passes the key check.
    pub fn lookup(&self, hash: u64, mut key_eq: impl FnMut(&[u8]) -> bool) -> Option<u32> {
        self.candidates(hash)
            .into_iter()
            .find(|&id| key_eq(&self.entries[id as usize].payload))
    }

    /// Allocate a zeroed payload for `hash` and return its id.
    pub fn insert(&mut self, hash: u64) -> u32 {
        let id = self.entries.len() as u32;
        self.entries.push(Entry {
            hash,
            payload: vec![0u8; self.payload_size].into_boxed_slice(),
        });
        self.index.entry(hash).or_default().push(id);
        id
    }

    pub fn payload(&self, id: u32) -> &[u8] {
        &self.entries[id as usize].payload
    }

    pub fn payload_mut(&mut self, id: u32) -> &mut [u8] {
        &mut self.entries[id as usize].payload
    }

    pub fn cursor(&self) -> AggregationHashTableIterator {
        AggregationHashTableIterator { pos: 0 }
    }

    // ------------------------------------------------------------------
    // Parallel path
    // ------------------------------------------------------------------

    /// Move per-worker tables' entries into this table's overflow
    /// partitions, grouped by hash prefix.
    pub fn move_partitions(&mut self, locals: Vec<AggregationHashTable>) {
        if self.partitions.is_empty() {
            self.partitions = (0..NUM_PARTITIONS).map(|_| Vec::new()).collect();
        }
        for local in locals {
            for entry in local.entries {
                self.partitions[partition_of(entry.hash)].push(entry);
            }
        }
    }

    pub fn num_partitioned_entries(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    /// Scan every non-empty overflow partition in parallel. `build` folds
    /// one partition's entries into a fresh table; results come back in
    /// partition order.
    pub fn parallel_partitioned_scan<F>(&mut self, build: F) -> Vec<AggregationHashTable>
    where
        F: Fn(AggOverflowPartIter<'_>) -> AggregationHashTable + Sync,
    {
        let partitions = std::mem::take(&mut self.partitions);
        partitions
            .par_iter()
            .filter(|p| !p.is_empty())
            .map(|p| build(AggOverflowPartIter { entries: p, pos: 0 }))
            .collect()
    }
}

/// Cursor over the entries of one overflow partition.
pub struct AggOverflowPartIter<'a> {
    entries: &'a [Entry],
    pos: usize,
}

impl AggOverflowPartIter<'_> {
    pub fn has_next(&self) -> bool {
        self.pos < self.entries.len()
    }

    pub fn next(&mut self) {
        self.pos += 1;
    }

    pub fn get_hash(&self) -> u64 {
        self.entries[self.pos].hash
    }

    pub fn get_row(&self) -> &[u8] {
        &self.entries[self.pos].payload
    }
}

/// Detached entry cursor for the result phase.
pub struct AggregationHashTableIterator {
    pos: usize,
}

impl AggregationHashTableIterator {
    pub fn has_next(&self, table: &AggregationHashTable) -> bool {
        self.pos < table.entries.len()
    }

    pub fn next(&mut self) {
        self.pos += 1;
    }

    pub fn get_row<'t>(&self, table: &'t AggregationHashTable) -> &'t [u8] {
        &table.entries[self.pos].payload
    }

    /// Entry id at the cursor.
    pub fn current_id(&self) -> u32 {
        self.pos as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_u64(buf: &mut [u8], at: usize, v: u64) {
        buf[at..at + 8].copy_from_slice(&v.to_le_bytes());
    }

    fn get_u64(buf: &[u8], at: usize) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&buf[at..at + 8]);
        u64::from_le_bytes(raw)
    }

    #[test]
    fn test_lookup_miss_then_hit() {
        let mut aht = AggregationHashTable::new(16);
        assert!(aht.lookup(42, |_| true).is_none());
        let id = aht.insert(42);
        put_u64(aht.payload_mut(id), 0, 7);
        let found = aht.lookup(42, |p| get_u64(p, 0) == 7);
        assert_eq!(found, Some(id));
        assert!(aht.lookup(42, |p| get_u64(p, 0) == 8).is_none());
        assert_eq!(aht.candidates(42), vec![id]);
    }

    #[test]
    fn test_group_accumulation() {
        let mut aht = AggregationHashTable::new(16);
        // payload: [key, count]
        for v in 0..100u64 {
            let key = v % 7;
            let id = match aht.lookup(key, |p| get_u64(p, 0) == key) {
                Some(id) => id,
                None => {
                    let id = aht.insert(key);
                    put_u64(aht.payload_mut(id), 0, key);
                    id
                }
            };
            let count = get_u64(aht.payload(id), 8);
            put_u64(aht.payload_mut(id), 8, count + 1);
        }
        assert_eq!(aht.num_entries(), 7);

        let mut total = 0;
        let mut it = aht.cursor();
        while it.has_next(&aht) {
            total += get_u64(it.get_row(&aht), 8);
            it.next();
        }
        assert_eq!(total, 100);
    }

    #[test]
    fn test_payload_agg_state_roundtrip() {
        let mut buf = vec![0u8; AGG_STATE_CELLS * CELL_SIZE];
        let fresh = Aggregator::new(AggregateKind::Sum);
        write_payload_agg(&mut buf, 0, &fresh);
        assert_eq!(read_payload_agg(&buf, 0, AggregateKind::Sum).result(),
            crate::value::SqlValue::null_of(crate::value::SqlType::Integer));

        let mut agg = read_payload_agg(&buf, 0, AggregateKind::Sum);
        agg.advance(&crate::value::SqlValue::integer(41));
        agg.advance(&crate::value::SqlValue::integer(1));
        write_payload_agg(&mut buf, 0, &agg);
        let back = read_payload_agg(&buf, 0, AggregateKind::Sum);
        assert_eq!(back.result(), crate::value::SqlValue::integer(42));

        // avg uses both state cells
        let mut avg = Aggregator::new(AggregateKind::Avg);
        avg.advance(&crate::value::SqlValue::integer(10));
        avg.advance(&crate::value::SqlValue::integer(20));
        write_payload_agg(&mut buf, 0, &avg);
        let back = read_payload_agg(&buf, 0, AggregateKind::Avg);
        assert_eq!(back.result(), crate::value::SqlValue::integer(15));
    }

    #[test]
    fn test_partition_move_and_parallel_scan() {
        let mut global = AggregationHashTable::new(16);
        let mut locals = Vec::new();
        for t in 0..4u64 {
            let mut local = AggregationHashTable::new(16);
            for i in 0..50u64 {
                let key = (t * 50 + i) % 13;
                let hash = key << 56 | key; // spread across partitions by key
                let id = local.insert(hash);
                put_u64(local.payload_mut(id), 0, key);
                put_u64(local.payload_mut(id), 8, 1);
            }
            locals.push(local);
        }
        global.move_partitions(locals);
        assert_eq!(global.num_partitioned_entries(), 200);

        let merged = global.parallel_partitioned_scan(|mut part| {
            let mut out = AggregationHashTable::new(16);
            while part.has_next() {
                let hash = part.get_hash();
                let key = get_u64(part.get_row(), 0);
                let add = get_u64(part.get_row(), 8);
                let id = match out.lookup(hash, |p| get_u64(p, 0) == key) {
                    Some(id) => id,
                    None => {
                        let id = out.insert(hash);
                        let row = part.get_row().to_vec();
                        out.payload_mut(id).copy_from_slice(&row);
                        put_u64(out.payload_mut(id), 8, 0);
                        id
                    }
                };
                let count = get_u64(out.payload(id), 8);
                put_u64(out.payload_mut(id), 8, count + add);
                part.next();
            }
            out
        });

        let groups: usize = merged.iter().map(AggregationHashTable::num_entries).sum();
        assert_eq!(groups, 13);
        let total: u64 = merged
            .iter()
            .flat_map(|t| {
                let mut counts = Vec::new();
                let mut it = t.cursor();
                while it.has_next(t) {
                    counts.push(get_u64(it.get_row(t), 8));
                    it.next();
                }
                counts
            })
            .sum();
        assert_eq!(total, 200);
    }
}
