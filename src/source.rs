//! Batch source interface.

/// A lazily produced, ordered sequence of values pulled in batches.
///
/// Values of every source taking part in a merge must be ordered under the comparison function of that merge,
/// otherwise the merge result is undefined.
pub trait BatchSource {
    type Item;
    type Error;

    /// Appends the next batch of values to `batch`.
    ///
    /// Returns `Some(Ok(()))` if a batch has been pulled (it may be empty), `Some(Err(err))` if this pull attempt
    /// failed and `None` if the source is exhausted. Values appended alongside an error are discarded.
    /// A failed source may be pulled again.
    fn pull(&mut self, batch: &mut Vec<Self::Item>) -> Option<Result<(), Self::Error>>;

    /// Releases resources held by the source.
    /// Merges call it exactly once per source, whether the source has been drained or not.
    fn release(&mut self) {}
}

impl<S> BatchSource for Box<S>
where
    S: BatchSource + ?Sized,
{
    type Item = S::Item;
    type Error = S::Error;

    fn pull(&mut self, batch: &mut Vec<Self::Item>) -> Option<Result<(), Self::Error>> {
        (**self).pull(batch)
    }

    fn release(&mut self) {
        (**self).release()
    }
}
