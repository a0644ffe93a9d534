//! Batching adapters.

use crate::cursor::{Cursor, Fill};
use crate::source::BatchSource;

/// Default number of values buffered from a single-value source per batch.
pub const DEFAULT_BATCH_SIZE: usize = 128;

/// Batching adapter. Groups values of a single-value source into batches limited by values count.
/// A final partial batch is flushed when the source is exhausted.
pub struct Batched<I, E> {
    inner: Option<I>,
    batch_size: usize,
    // error met after some values were already buffered, reported on the next pull
    pending: Option<E>,
}

impl<I, T, E> Batched<I, E>
where
    I: Iterator<Item = Result<T, E>>,
{
    /// Creates a batching adapter.
    ///
    /// # Arguments
    /// * `source` - Single-value source
    /// * `batch_size` - Maximum number of values in a batch
    pub fn new<S>(source: S, batch_size: usize) -> Self
    where
        S: IntoIterator<IntoIter = I>,
    {
        Batched {
            inner: Some(source.into_iter()),
            batch_size: batch_size.max(1),
            pending: None,
        }
    }
}

impl<I, T, E> BatchSource for Batched<I, E>
where
    I: Iterator<Item = Result<T, E>>,
{
    type Item = T;
    type Error = E;

    fn pull(&mut self, batch: &mut Vec<Self::Item>) -> Option<Result<(), Self::Error>> {
        if let Some(err) = self.pending.take() {
            return Some(Err(err));
        }

        let inner = self.inner.as_mut()?;
        let start = batch.len();

        while batch.len() - start < self.batch_size {
            match inner.next() {
                Some(Ok(value)) => batch.push(value),
                Some(Err(err)) if batch.len() == start => return Some(Err(err)),
                Some(Err(err)) => {
                    self.pending = Some(err);
                    break;
                }
                None => {
                    self.inner = None;
                    break;
                }
            }
        }

        if batch.len() == start {
            None
        } else {
            Some(Ok(()))
        }
    }

    fn release(&mut self) {
        self.inner = None;
    }
}

/// Adapter for sources producing ready-made batches.
pub struct Batches<I> {
    inner: Option<I>,
}

impl<I> Batches<I> {
    pub fn new<S>(source: S) -> Self
    where
        S: IntoIterator<IntoIter = I>,
    {
        Batches {
            inner: Some(source.into_iter()),
        }
    }
}

impl<I, B, E> BatchSource for Batches<I>
where
    I: Iterator<Item = Result<B, E>>,
    B: IntoIterator,
{
    type Item = B::Item;
    type Error = E;

    fn pull(&mut self, batch: &mut Vec<Self::Item>) -> Option<Result<(), Self::Error>> {
        match self.inner.as_mut()?.next() {
            Some(Ok(values)) => {
                batch.extend(values);
                Some(Ok(()))
            }
            Some(Err(err)) => Some(Err(err)),
            None => {
                self.inner = None;
                None
            }
        }
    }

    fn release(&mut self) {
        self.inner = None;
    }
}

/// Un-batching adapter. Turns a batch source into an iterator of single values.
/// The source is released once it is exhausted or the adapter is dropped.
pub struct Unbatched<S: BatchSource> {
    cursor: Cursor<S>,
}

impl<S: BatchSource> Unbatched<S> {
    pub fn new(source: S) -> Self {
        Unbatched {
            cursor: Cursor::new(source),
        }
    }

    /// Releases the underlying source. Values of the current batch are still yielded.
    pub fn release(&mut self) {
        self.cursor.release();
    }
}

impl<S: BatchSource> Iterator for Unbatched<S> {
    type Item = Result<S::Item, S::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_empty() {
            match self.cursor.fill() {
                Fill::Ready => {}
                Fill::Failed(err) => return Some(Err(err)),
                Fill::Exhausted => return None,
            }
        }

        return self.cursor.pop().map(Ok);
    }
}
