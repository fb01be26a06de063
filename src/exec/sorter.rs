//! Tuple sorter.
//!
//! Append-only run of fixed-size tuples ordered by a caller-supplied
//! comparator at sort time. Parallel variants gather per-worker runs and
//! sort with rayon; the top-k variant truncates after the sort, keeping
//! only the k smallest under the comparator. The iterator is a detached
//! cursor resolved against the sorter on every call, matching the
//! `sorterIterInit(iter, sorter)` intrinsic shape.

use rayon::prelude::*;
use std::cmp::Ordering;
use std::sync::Arc;

pub type SortComparator = Arc<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>;

pub struct Sorter {
    tuple_size: usize,
    cmp: SortComparator,
    data: Vec<Box<[u8]>>,
    sorted: bool,
}

impl Sorter {
    pub fn new(cmp: SortComparator, tuple_size: usize) -> Self {
        Sorter {
            tuple_size,
            cmp,
            data: Vec::new(),
            sorted: false,
        }
    }

    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    pub fn comparator(&self) -> SortComparator {
        Arc::clone(&self.cmp)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Reserve space for one input tuple; the caller writes through
    /// `row_mut`.
    pub fn alloc_input(&mut self) -> usize {
        debug_assert!(!self.sorted, "insert after sort");
        self.data.push(vec![0u8; self.tuple_size].into_boxed_slice());
        self.data.len() - 1
    }

    pub fn row_mut(&mut self, idx: usize) -> &mut [u8] {
        &mut self.data[idx]
    }

    pub fn row(&self, idx: usize) -> &[u8] {
        &self.data[idx]
    }

    /// Take the pending run out, leaving the sorter empty. Parallel
    /// finalizers repartition the run across per-worker sorters.
    pub fn drain_rows(&mut self) -> Vec<Box<[u8]>> {
        std::mem::take(&mut self.data)
    }

    pub fn sort(&mut self) {
        let cmp = Arc::clone(&self.cmp);
        self.data.sort_by(|a, b| cmp(a, b));
        self.sorted = true;
    }

    /// Gather per-worker runs, then sort the union in parallel.
    pub fn sort_parallel(&mut self, locals: Vec<Sorter>) {
        for mut local in locals {
            debug_assert_eq!(local.tuple_size, self.tuple_size);
            self.data.append(&mut local.data);
        }
        let cmp = Arc::clone(&self.cmp);
        self.data.par_sort_by(|a, b| cmp(a, b));
        self.sorted = true;
    }

    /// Parallel sort keeping only the k smallest tuples.
    pub fn sort_topk_parallel(&mut self, locals: Vec<Sorter>, k: u64) {
        self.sort_parallel(locals);
        self.data.truncate(k as usize);
    }

    pub fn cursor(&self) -> SorterIterator {
        SorterIterator { pos: 0 }
    }
}

/// Cursor over sorted tuples; resolved against the sorter per call.
pub struct SorterIterator {
    pos: usize,
}

impl SorterIterator {
    pub fn has_next(&self, sorter: &Sorter) -> bool {
        self.pos < sorter.data.len()
    }

    pub fn next(&mut self) {
        self.pos += 1;
    }

    pub fn get_row<'s>(&self, sorter: &'s Sorter) -> &'s [u8] {
        &sorter.data[self.pos]
    }

    /// Current position, for callers addressing rows by index.
    pub fn position(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u64_cmp() -> SortComparator {
        Arc::new(|a: &[u8], b: &[u8]| {
            let mut x = [0u8; 8];
            let mut y = [0u8; 8];
            x.copy_from_slice(&a[..8]);
            y.copy_from_slice(&b[..8]);
            u64::from_le_bytes(x).cmp(&u64::from_le_bytes(y))
        })
    }

    fn fill(sorter: &mut Sorter, values: impl IntoIterator<Item = u64>) {
        for v in values {
            let id = sorter.alloc_input();
            sorter.row_mut(id).copy_from_slice(&v.to_le_bytes());
        }
    }

    fn collect(sorter: &Sorter) -> Vec<u64> {
        let mut out = Vec::new();
        let mut it = sorter.cursor();
        while it.has_next(sorter) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&it.get_row(sorter)[..8]);
            out.push(u64::from_le_bytes(raw));
            it.next();
        }
        out
    }

    #[test]
    fn test_sort_orders_tuples() {
        let mut sorter = Sorter::new(u64_cmp(), 8);
        fill(&mut sorter, [5, 1, 4, 2, 3]);
        sorter.sort();
        assert_eq!(collect(&sorter), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_parallel_sort_merges_runs() {
        let mut global = Sorter::new(u64_cmp(), 8);
        let mut locals = Vec::new();
        for t in 0..4u64 {
            let mut local = Sorter::new(u64_cmp(), 8);
            fill(&mut local, (0..250).map(|i| (i * 4 + t) % 1000));
            locals.push(local);
        }
        global.sort_parallel(locals);
        let out = collect(&global);
        assert_eq!(out.len(), 1000);
        assert!(out.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_topk_keeps_smallest() {
        let mut global = Sorter::new(u64_cmp(), 8);
        let mut local = Sorter::new(u64_cmp(), 8);
        fill(&mut local, (0..100).rev());
        global.sort_topk_parallel(vec![local], 10);
        assert_eq!(collect(&global), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_drain_rows_empties_the_run() {
        let mut sorter = Sorter::new(u64_cmp(), 8);
        fill(&mut sorter, [3, 1, 2]);
        let rows = sorter.drain_rows();
        assert_eq!(rows.len(), 3);
        assert!(sorter.is_empty());
    }

    #[test]
    fn test_empty_sorter_iterates_nothing() {
        let mut sorter = Sorter::new(u64_cmp(), 8);
        sorter.sort();
        assert!(!sorter.cursor().has_next(&sorter));
    }
}
