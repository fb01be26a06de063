//! Per-worker state slots for parallel phases.
//!
//! A container holds one slot per worker; a worker lazily initializes its
//! slot on first touch and the coordinator drains every populated slot
//! when the phase ends (hash-table merge, sorter gather).

use parking_lot::Mutex;

pub struct ThreadStateContainer<S> {
    slots: Vec<Mutex<Option<S>>>,
}

impl<S> ThreadStateContainer<S> {
    pub fn new(num_threads: usize) -> Self {
        let slots = (0..num_threads.max(1)).map(|_| Mutex::new(None)).collect();
        ThreadStateContainer { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Run `f` over the worker's state, creating it with `init` on first
    /// touch. `thread_idx` wraps, so callers can pass any stable worker id.
    pub fn with_state<R>(
        &self,
        thread_idx: usize,
        init: impl FnOnce() -> S,
        f: impl FnOnce(&mut S) -> R,
    ) -> R {
        let slot = &self.slots[thread_idx % self.slots.len()];
        let mut guard = slot.lock();
        let state = guard.get_or_insert_with(init);
        f(state)
    }

    /// Take every populated state out of the container.
    pub fn drain(&self) -> Vec<S> {
        self.slots.iter().filter_map(|s| s.lock().take()).collect()
    }

    /// Visit every populated state in place.
    pub fn for_each(&self, mut f: impl FnMut(&mut S)) {
        for slot in &self.slots {
            if let Some(state) = slot.lock().as_mut() {
                f(state);
            }
        }
    }
}

/// The worker index rayon reports, or slot 0 outside a pool.
pub fn current_worker_index() -> usize {
    rayon::current_thread_index().unwrap_or(0)
}
