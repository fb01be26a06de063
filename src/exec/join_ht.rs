//! Join hash table.
//!
//! Build side inserts fixed-size entries keyed by hash; `build` freezes
//! the chains. The probe-side iterator is a detached cursor over one hash
//! chain, stepped under a caller-supplied key-equality check (hash
//! collisions make the check mandatory) and resolved against the table
//! per call - the `joinHTIterInit(iter, jht, hash)` intrinsic shape.
//! Parallel builds merge per-worker tables before chaining.

use std::collections::HashMap;

struct Entry {
    hash: u64,
    data: Box<[u8]>,
}

pub struct JoinHashTable {
    tuple_size: usize,
    entries: Vec<Entry>,
    chains: HashMap<u64, Vec<u32>>,
    built: bool,
}

impl JoinHashTable {
    pub fn new(tuple_size: usize) -> Self {
        JoinHashTable {
            tuple_size,
            entries: Vec::new(),
            chains: HashMap::new(),
            built: false,
        }
    }

    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Reserve a zeroed entry for `hash`; the caller writes through
    /// `entry_mut`.
    pub fn alloc_entry(&mut self, hash: u64) -> u32 {
        debug_assert!(!self.built, "insert after build");
        self.entries.push(Entry {
            hash,
            data: vec![0u8; self.tuple_size].into_boxed_slice(),
        });
        self.entries.len() as u32 - 1
    }

    pub fn entry_mut(&mut self, id: u32) -> &mut [u8] {
        &mut self.entries[id as usize].data
    }

    pub fn entry(&self, id: u32) -> &[u8] {
        &self.entries[id as usize].data
    }

    /// Take the pending entries out, leaving the table empty. Parallel
    /// finalizers repartition them across per-worker tables.
    pub fn drain_entries(&mut self) -> Vec<(u64, Box<[u8]>)> {
        debug_assert!(!self.built, "drain after build");
        std::mem::take(&mut self.entries)
            .into_iter()
            .map(|e| (e.hash, e.data))
            .collect()
    }

    /// Re-insert a drained entry.
    pub fn push_entry(&mut self, hash: u64, data: Box<[u8]>) {
        debug_assert_eq!(data.len(), self.tuple_size);
        self.entries.push(Entry { hash, data });
    }

    /// Freeze the chains. Idempotent.
    pub fn build(&mut self) {
        if self.built {
            return;
        }
        let mut chains: HashMap<u64, Vec<u32>> = HashMap::with_capacity(self.entries.len());
        for (i, e) in self.entries.iter().enumerate() {
            chains.entry(e.hash).or_default().push(i as u32);
        }
        self.chains = chains;
        self.built = true;
    }

    /// Merge per-worker tables into this one, then build.
    pub fn build_parallel(&mut self, locals: Vec<JoinHashTable>) {
        for mut local in locals {
            debug_assert_eq!(local.tuple_size, self.tuple_size);
            self.entries.append(&mut local.entries);
        }
        self.build();
    }

    /// Entry ids chained under `hash`. Empty when unbuilt or no match.
    pub fn chain_ids(&self, hash: u64) -> Vec<u32> {
        self.chains.get(&hash).cloned().unwrap_or_default()
    }

    /// Cursor over the chain for `hash`.
    pub fn cursor(&self, hash: u64) -> JoinHashTableIterator {
        JoinHashTableIterator {
            ids: self.chain_ids(hash),
            pos: 0,
            current: None,
        }
    }
}

/// Detached cursor over one hash chain. Drivers step candidates and mark
/// the match; `has_next` wraps the two for native callers.
pub struct JoinHashTableIterator {
    ids: Vec<u32>,
    pos: usize,
    current: Option<u32>,
}

impl JoinHashTableIterator {
    /// The next unexamined entry id in the chain.
    pub fn next_candidate(&mut self) -> Option<u32> {
        let id = self.ids.get(self.pos).copied();
        if id.is_some() {
            self.pos += 1;
        }
        id
    }

    /// Mark a candidate as the current match.
    pub fn found(&mut self, id: u32) {
        self.current = Some(id);
    }

    /// Clear the match (chain exhausted).
    pub fn exhausted(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<u32> {
        self.current
    }

    /// Advance to the next entry whose key matches; the matched row stays
    /// readable through `get_row` until the next call.
    pub fn has_next(&mut self, table: &JoinHashTable, mut key_eq: impl FnMut(&[u8]) -> bool) -> bool {
        while let Some(id) = self.next_candidate() {
            if key_eq(table.entry(id)) {
                self.found(id);
                return true;
            }
        }
        self.exhausted();
        false
    }

    pub fn get_row<'t>(&self, table: &'t JoinHashTable) -> &'t [u8] {
        match self.current {
            Some(id) => table.entry(id),
            None => &[],
        }
    }
}
