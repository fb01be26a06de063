//! Query output buffer.
//!
//! A growable batch of tuples laid out per the plan's output schema.
//! `alloc` hands out the next tuple's cell space (flushing a full batch
//! first), `advance` commits it, `finalize` flushes the remainder. The
//! callback receives `(bytes, num_tuples, tuple_size)` per flushed batch;
//! on cancellation the unflushed tail is simply dropped.

use super::row::RowLayout;

/// Tuples per flushed batch.
pub const BATCH_CAPACITY: usize = 256;

pub type OutputCallback = Box<dyn FnMut(&[u8], usize, usize)>;

pub struct OutputBuffer {
    layout: RowLayout,
    buf: Vec<u8>,
    count: usize,
    emitted: usize,
    callback: OutputCallback,
}

impl OutputBuffer {
    pub fn new(layout: RowLayout, callback: OutputCallback) -> Self {
        let tuple_size = layout.size();
        OutputBuffer {
            layout,
            buf: vec![0u8; tuple_size * BATCH_CAPACITY],
            count: 0,
            emitted: 0,
            callback,
        }
    }

    pub fn layout(&self) -> &RowLayout {
        &self.layout
    }

    /// Total tuples flushed through the callback.
    pub fn num_emitted(&self) -> usize {
        self.emitted
    }

    fn tuple_size(&self) -> usize {
        self.layout.size()
    }

    /// Cell space for the next tuple. Flushes first when the batch is
    /// full, so the returned slice is always writable.
    pub fn alloc(&mut self) -> &mut [u8] {
        if self.count == BATCH_CAPACITY {
            self.flush();
        }
        let ts = self.tuple_size();
        let start = self.count * ts;
        let slice = &mut self.buf[start..start + ts];
        // fresh tuples start all-null
        for col in 0..self.layout.num_cols() {
            slice[col * super::row::CELL_SIZE] = 1;
        }
        slice
    }

    /// The current (allocated, not yet advanced) tuple's buffer.
    pub fn current(&mut self) -> &mut [u8] {
        let ts = self.tuple_size();
        let start = self.count * ts;
        &mut self.buf[start..start + ts]
    }

    /// Null out one column of the current tuple.
    pub fn set_null(&mut self, col: usize) {
        let ts = self.tuple_size();
        let start = self.count * ts;
        self.layout.set_null(&mut self.buf[start..start + ts], col);
    }

    /// Commit the current tuple.
    pub fn advance(&mut self) {
        self.count += 1;
        if self.count == BATCH_CAPACITY {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.count == 0 {
            return;
        }
        let ts = self.tuple_size();
        (self.callback)(&self.buf[..self.count * ts], self.count, ts);
        self.emitted += self.count;
        self.count = 0;
    }

    /// Flush whatever is buffered.
    pub fn finalize(&mut self) {
        self.flush();
    }

    /// Drop the unflushed tail (cancellation path).
    pub fn discard_pending(&mut self) {
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MemoryPool;
    use crate::value::{SqlType, SqlValue};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn int_layout() -> RowLayout {
        RowLayout::new(vec![SqlType::Integer])
    }

    #[test]
    fn test_batches_flush_at_capacity() {
        let batches: Rc<RefCell<Vec<usize>>> = Rc::new(RefCell::new(Vec::new()));
        let b2 = Rc::clone(&batches);
        let pool = MemoryPool::new();
        let layout = int_layout();
        let mut out = OutputBuffer::new(
            layout.clone(),
            Box::new(move |_, n, _| b2.borrow_mut().push(n)),
        );

        for i in 0..600i64 {
            let buf = out.alloc();
            layout.write(buf, 0, &SqlValue::integer(i), &pool);
            out.advance();
        }
        out.finalize();

        assert_eq!(out.num_emitted(), 600);
        assert_eq!(*batches.borrow(), vec![BATCH_CAPACITY, BATCH_CAPACITY, 88]);
    }

    #[test]
    fn test_tuples_roundtrip_through_callback() {
        let seen: Rc<RefCell<Vec<i64>>> = Rc::new(RefCell::new(Vec::new()));
        let s2 = Rc::clone(&seen);
        let pool = Rc::new(MemoryPool::new());
        let p2 = Rc::clone(&pool);
        let layout = int_layout();
        let l2 = layout.clone();
        let mut out = OutputBuffer::new(
            layout.clone(),
            Box::new(move |bytes, n, ts| {
                for i in 0..n {
                    let row = l2.decode_row(&bytes[i * ts..(i + 1) * ts], &p2);
                    s2.borrow_mut().push(row[0].as_integer().unwrap_or(-1));
                }
            }),
        );

        for i in 0..10i64 {
            let buf = out.alloc();
            layout.write(buf, 0, &SqlValue::integer(i), &pool);
            out.advance();
        }
        out.finalize();
        assert_eq!(*seen.borrow(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_set_null_marks_current_tuple() {
        let nulls: Rc<RefCell<usize>> = Rc::new(RefCell::new(0));
        let n2 = Rc::clone(&nulls);
        let pool = MemoryPool::new();
        let layout = int_layout();
        let l2 = layout.clone();
        let mut out = OutputBuffer::new(
            layout.clone(),
            Box::new(move |bytes, n, ts| {
                let p = MemoryPool::new();
                for i in 0..n {
                    if l2.decode_row(&bytes[i * ts..(i + 1) * ts], &p)[0].is_null() {
                        *n2.borrow_mut() += 1;
                    }
                }
            }),
        );

        let buf = out.alloc();
        layout.write(buf, 0, &SqlValue::integer(1), &pool);
        out.advance();
        out.alloc();
        out.set_null(0);
        out.advance();
        out.finalize();
        assert_eq!(*nulls.borrow(), 1);
    }

    #[test]
    fn test_discard_pending_drops_tail() {
        let flushed: Rc<RefCell<usize>> = Rc::new(RefCell::new(0));
        let f2 = Rc::clone(&flushed);
        let layout = int_layout();
        let mut out = OutputBuffer::new(layout, Box::new(move |_, n, _| *f2.borrow_mut() += n));

        for _ in 0..10 {
            out.alloc();
            out.advance();
        }
        out.discard_pending();
        out.finalize();
        assert_eq!(*flushed.borrow(), 0);
        assert_eq!(out.num_emitted(), 0);
    }
}
