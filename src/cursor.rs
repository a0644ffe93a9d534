//! Source cursor.

use std::collections::VecDeque;
use std::mem;

use crate::source::BatchSource;

/// Outcome of a cursor refill.
#[derive(Debug)]
pub(crate) enum Fill<E> {
    /// A non-empty batch has been pulled.
    Ready,
    /// The pull attempt failed. The source is kept and may be pulled again.
    Failed(E),
    /// The source has no more values or has been released.
    Exhausted,
}

/// Cursor over a single source.
/// Holds the most recently pulled batch and releases the source exactly once, at the latest when dropped.
pub(crate) struct Cursor<S: BatchSource> {
    source: S,
    // current batch, the head is the front element
    values: VecDeque<S::Item>,
    exhausted: bool,
    released: bool,
}

impl<S: BatchSource> Cursor<S> {
    pub fn new(source: S) -> Self {
        Cursor {
            source,
            values: VecDeque::new(),
            exhausted: false,
            released: false,
        }
    }

    /// Returns the current head value.
    pub fn head(&self) -> Option<&S::Item> {
        self.values.front()
    }

    /// Consumes the current head value.
    pub fn pop(&mut self) -> Option<S::Item> {
        self.values.pop_front()
    }

    /// Checks whether the current batch is consumed.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Checks whether the cursor has nothing to pull from anymore.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Replaces the consumed batch with the next non-empty one.
    pub fn fill(&mut self) -> Fill<S::Error> {
        // the consumed batch buffer is reused, both conversions keep the allocation
        let mut values = Vec::from(mem::take(&mut self.values));
        values.clear();

        let fill = self.pull_into(&mut values);
        self.values = VecDeque::from(values);

        return fill;
    }

    /// Pulls the next non-empty batch straight into `out`, skipping empty batches.
    pub fn pull_into(&mut self, out: &mut Vec<S::Item>) -> Fill<S::Error> {
        if self.exhausted {
            return Fill::Exhausted;
        }

        let start = out.len();
        loop {
            match self.source.pull(out) {
                Some(Ok(())) if out.len() == start => continue,
                Some(Ok(())) => return Fill::Ready,
                Some(Err(err)) => {
                    out.truncate(start);
                    return Fill::Failed(err);
                }
                None => {
                    out.truncate(start);
                    self.exhausted = true;
                    self.release();
                    return Fill::Exhausted;
                }
            }
        }
    }

    /// Moves up to `limit` values of the current batch to `out` keeping their order.
    pub fn drain_into(&mut self, out: &mut Vec<S::Item>, limit: usize) {
        let count = limit.min(self.values.len());
        out.extend(self.values.drain(..count));
    }

    /// Releases the underlying source unless it has already been released.
    /// The source is not pulled anymore, values of the current batch are kept.
    pub fn release(&mut self) {
        self.exhausted = true;
        if !self.released {
            self.released = true;
            self.source.release();
        }
    }
}

impl<S: BatchSource> Drop for Cursor<S> {
    fn drop(&mut self) {
        self.release();
    }
}
