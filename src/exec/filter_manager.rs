//! Vectorized filter manager.
//!
//! Collects the vectorizable conjuncts of a scan predicate as functions
//! over a PCI. Each filter narrows the match vector and reports the
//! surviving count; `run_filters` applies them in insertion order.

use super::table_iter::ProjectedColumnsIterator;

pub type VectorFilterFn = Box<dyn Fn(&mut ProjectedColumnsIterator) -> u32 + Send + Sync>;

#[derive(Default)]
pub struct FilterManager {
    filters: Vec<VectorFilterFn>,
    finalized: bool,
}

impl FilterManager {
    pub fn new() -> Self {
        FilterManager::default()
    }

    pub fn insert_filter(&mut self, f: VectorFilterFn) {
        debug_assert!(!self.finalized, "insert after finalize");
        self.filters.push(f);
    }

    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn num_filters(&self) -> usize {
        self.filters.len()
    }

    /// Apply every filter; returns the tuples still matching.
    pub fn run_filters(&self, pci: &mut ProjectedColumnsIterator) -> u32 {
        let mut last = pci.num_selected() as u32;
        for f in &self.filters {
            last = f(pci);
            if last == 0 {
                break;
            }
        }
        last
    }
}
