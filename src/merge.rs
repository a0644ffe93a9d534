//! K-way merger.

use log;
use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::buffer::{Batched, Batches, Unbatched, DEFAULT_BATCH_SIZE};
use crate::merger::Strategy;
use crate::source::BatchSource;

/// Merger configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// Batch size must hold at least one value.
    InvalidBatchSize(usize),
}

impl Error for MergeError {}

impl Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            MergeError::InvalidBatchSize(size) => write!(f, "invalid batch size: {}", size),
        }
    }
}

/// Merge of sorted batch sources.
///
/// Produces merged values in batches. A batch returned by [`Merge::next_batch`] is a view into an internal buffer
/// that is overwritten on the next call. Every source is released exactly once, when it is exhausted or when the merge
/// is released or dropped.
pub struct Merge<S: BatchSource, F> {
    strategy: Strategy<S, F>,
    batch: Vec<S::Item>,
}

impl<S, F> Merge<S, F>
where
    S: BatchSource,
    F: Fn(&S::Item, &S::Item) -> Ordering,
{
    fn new(sources: Vec<S>, compare: F, batch_size: usize) -> Self {
        Merge {
            strategy: Strategy::new(sources, compare, batch_size),
            batch: Vec::with_capacity(batch_size),
        }
    }

    /// Returns the next batch of merged values.
    /// A source error is returned as is, the failed source is pulled again on the next call.
    pub fn next_batch(&mut self) -> Option<Result<&[S::Item], S::Error>> {
        self.batch.clear();

        return match self.strategy.pull(&mut self.batch)? {
            Ok(()) => Some(Ok(self.batch.as_slice())),
            Err(err) => Some(Err(err)),
        };
    }

    /// Stops the merge releasing every source. Subsequent calls return `None`.
    pub fn release(&mut self) {
        self.strategy.release();
        self.strategy = Strategy::Empty;
    }
}

impl<S, F> BatchSource for Merge<S, F>
where
    S: BatchSource,
    F: Fn(&S::Item, &S::Item) -> Ordering,
{
    type Item = S::Item;
    type Error = S::Error;

    fn pull(&mut self, batch: &mut Vec<Self::Item>) -> Option<Result<(), Self::Error>> {
        self.strategy.pull(batch)
    }

    fn release(&mut self) {
        Merge::release(self);
    }
}

/// Merge of sorted sources producing values one by one.
pub type MergeIter<S, F> = Unbatched<Merge<S, F>>;

/// Merger builder. Provides methods for [`Merger`] initialization.
#[derive(Debug, Clone)]
pub struct MergerBuilder {
    /// Number of values buffered from a source per pull.
    batch_size: usize,
}

impl MergerBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        MergerBuilder::default()
    }

    /// Builds a [`Merger`] instance using provided configuration.
    pub fn build(self) -> Result<Merger, MergeError> {
        Merger::new(self.batch_size)
    }

    /// Sets number of values buffered from a source per pull.
    pub fn with_batch_size(mut self, batch_size: usize) -> MergerBuilder {
        self.batch_size = batch_size;
        return self;
    }
}

impl Default for MergerBuilder {
    fn default() -> Self {
        MergerBuilder {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// K-way merger.
///
/// Picks the merge strategy by the number of sources: no sources produce nothing, a single source is passed through,
/// two sources are merged directly comparing their heads and more sources are merged using a loser tree.
#[derive(Debug, Clone, Copy)]
pub struct Merger {
    batch_size: usize,
}

impl Merger {
    /// Creates a new merger instance.
    ///
    /// # Arguments
    /// * `batch_size` - Number of values buffered from a source per pull. Must be positive.
    pub fn new(batch_size: usize) -> Result<Self, MergeError> {
        if batch_size == 0 {
            return Err(MergeError::InvalidBatchSize(batch_size));
        }

        log::debug!("initializing merger (batch size: {})", batch_size);

        return Ok(Merger { batch_size });
    }

    /// Returns number of values buffered from a source per pull.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Merges sorted sources into a single sorted iterator.
    ///
    /// # Arguments
    /// * `sources` - Sources to be merged, each sorted in ascending order
    pub fn merge<I, C, T, E>(&self, sources: I) -> MergeIter<Batched<C::IntoIter, E>, impl Fn(&T, &T) -> Ordering>
    where
        T: Ord,
        I: IntoIterator<Item = C>,
        C: IntoIterator<Item = Result<T, E>>,
    {
        self.merge_by(sources, T::cmp)
    }

    /// Merges sources sorted by a custom compare function into a single sorted iterator.
    ///
    /// # Arguments
    /// * `sources` - Sources to be merged, each sorted by `compare`
    /// * `compare` - Function to be used to compare values
    pub fn merge_by<I, C, T, E, F>(&self, sources: I, compare: F) -> MergeIter<Batched<C::IntoIter, E>, F>
    where
        I: IntoIterator<Item = C>,
        C: IntoIterator<Item = Result<T, E>>,
        F: Fn(&T, &T) -> Ordering,
    {
        let sources = Vec::from_iter(sources.into_iter().map(|source| Batched::new(source, self.batch_size)));
        return Unbatched::new(Merge::new(sources, compare, self.batch_size));
    }

    /// Merges sources of key-value pairs sorted by key into a single iterator sorted by key.
    pub fn merge_pairs<I, C, K, V, E>(
        &self,
        sources: I,
    ) -> MergeIter<Batched<C::IntoIter, E>, impl Fn(&(K, V), &(K, V)) -> Ordering>
    where
        K: Ord,
        I: IntoIterator<Item = C>,
        C: IntoIterator<Item = Result<(K, V), E>>,
    {
        self.merge_pairs_by(sources, K::cmp)
    }

    /// Merges sources of key-value pairs sorted by a custom key compare function.
    /// Values take no part in comparisons.
    ///
    /// # Arguments
    /// * `sources` - Sources to be merged, each sorted by key
    /// * `compare` - Function to be used to compare keys
    pub fn merge_pairs_by<I, C, K, V, E, F>(
        &self,
        sources: I,
        compare: F,
    ) -> MergeIter<Batched<C::IntoIter, E>, impl Fn(&(K, V), &(K, V)) -> Ordering>
    where
        I: IntoIterator<Item = C>,
        C: IntoIterator<Item = Result<(K, V), E>>,
        F: Fn(&K, &K) -> Ordering,
    {
        self.merge_by(sources, move |a: &(K, V), b: &(K, V)| compare(&a.0, &b.0))
    }

    /// Merges sources producing sorted batches. Returns a merge producing merged batches.
    pub fn merge_batches<I, C, B, T, E>(&self, sources: I) -> Merge<Batches<C::IntoIter>, impl Fn(&T, &T) -> Ordering>
    where
        T: Ord,
        I: IntoIterator<Item = C>,
        C: IntoIterator<Item = Result<B, E>>,
        B: IntoIterator<Item = T>,
    {
        self.merge_batches_by(sources, T::cmp)
    }

    /// Merges sources producing batches sorted by a custom compare function.
    /// Values of every source, across its batches, must be sorted by `compare`.
    ///
    /// # Arguments
    /// * `sources` - Sources to be merged
    /// * `compare` - Function to be used to compare values
    pub fn merge_batches_by<I, C, B, T, E, F>(&self, sources: I, compare: F) -> Merge<Batches<C::IntoIter>, F>
    where
        I: IntoIterator<Item = C>,
        C: IntoIterator<Item = Result<B, E>>,
        B: IntoIterator<Item = T>,
        F: Fn(&T, &T) -> Ordering,
    {
        let sources = Vec::from_iter(sources.into_iter().map(Batches::new));
        return Merge::new(sources, compare, self.batch_size);
    }

    /// Merges arbitrary batch sources. Use boxed sources to merge sources of different types.
    pub fn merge_sources<I, S, F>(&self, sources: I, compare: F) -> Merge<S, F>
    where
        I: IntoIterator<Item = S>,
        S: BatchSource,
        F: Fn(&S::Item, &S::Item) -> Ordering,
    {
        Merge::new(Vec::from_iter(sources), compare, self.batch_size)
    }
}

impl Default for Merger {
    fn default() -> Self {
        Merger {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Merges sorted sources using the default batch size. See [`Merger::merge`].
pub fn merge<I, C, T, E>(sources: I) -> MergeIter<Batched<C::IntoIter, E>, impl Fn(&T, &T) -> Ordering>
where
    T: Ord,
    I: IntoIterator<Item = C>,
    C: IntoIterator<Item = Result<T, E>>,
{
    Merger::default().merge(sources)
}

/// Merges sources sorted by `compare` using the default batch size. See [`Merger::merge_by`].
pub fn merge_by<I, C, T, E, F>(sources: I, compare: F) -> MergeIter<Batched<C::IntoIter, E>, F>
where
    I: IntoIterator<Item = C>,
    C: IntoIterator<Item = Result<T, E>>,
    F: Fn(&T, &T) -> Ordering,
{
    Merger::default().merge_by(sources, compare)
}

/// Merges key-value pair sources sorted by key. See [`Merger::merge_pairs`].
pub fn merge_pairs<I, C, K, V, E>(
    sources: I,
) -> MergeIter<Batched<C::IntoIter, E>, impl Fn(&(K, V), &(K, V)) -> Ordering>
where
    K: Ord,
    I: IntoIterator<Item = C>,
    C: IntoIterator<Item = Result<(K, V), E>>,
{
    Merger::default().merge_pairs(sources)
}

/// Merges key-value pair sources sorted by `compare` applied to keys. See [`Merger::merge_pairs_by`].
pub fn merge_pairs_by<I, C, K, V, E, F>(
    sources: I,
    compare: F,
) -> MergeIter<Batched<C::IntoIter, E>, impl Fn(&(K, V), &(K, V)) -> Ordering>
where
    I: IntoIterator<Item = C>,
    C: IntoIterator<Item = Result<(K, V), E>>,
    F: Fn(&K, &K) -> Ordering,
{
    Merger::default().merge_pairs_by(sources, compare)
}

/// Merges sources of sorted batches. See [`Merger::merge_batches`].
pub fn merge_batches<I, C, B, T, E>(sources: I) -> Merge<Batches<C::IntoIter>, impl Fn(&T, &T) -> Ordering>
where
    T: Ord,
    I: IntoIterator<Item = C>,
    C: IntoIterator<Item = Result<B, E>>,
    B: IntoIterator<Item = T>,
{
    Merger::default().merge_batches(sources)
}

/// Merges sources of batches sorted by `compare`. See [`Merger::merge_batches_by`].
pub fn merge_batches_by<I, C, B, T, E, F>(sources: I, compare: F) -> Merge<Batches<C::IntoIter>, F>
where
    I: IntoIterator<Item = C>,
    C: IntoIterator<Item = Result<B, E>>,
    B: IntoIterator<Item = T>,
    F: Fn(&T, &T) -> Ordering,
{
    Merger::default().merge_batches_by(sources, compare)
}

#[cfg(test)]
mod test {
    use std::cell::Cell;
    use std::cmp::Ordering;
    use std::convert::Infallible;
    use std::error::Error;
    use std::io::{self, ErrorKind};
    use std::rc::Rc;

    use rand::Rng;
    use rstest::*;

    use super::{merge, merge_batches, merge_pairs, MergeError, Merger, MergerBuilder};
    use crate::source::BatchSource;

    struct Counted {
        values: std::vec::IntoIter<i32>,
        releases: Rc<Cell<usize>>,
    }

    impl BatchSource for Counted {
        type Item = i32;
        type Error = Infallible;

        fn pull(&mut self, batch: &mut Vec<i32>) -> Option<Result<(), Infallible>> {
            batch.push(self.values.next()?);
            Some(Ok(()))
        }

        fn release(&mut self) {
            self.releases.set(self.releases.get() + 1);
        }
    }

    fn ascending(a: &i32, b: &i32) -> Ordering {
        a.cmp(b)
    }

    fn stalling(values: std::ops::Range<i32>, stall_at: i32) -> impl Iterator<Item = Result<i32, io::Error>> {
        values.flat_map(move |value| {
            let stall = (value == stall_at).then(|| Err(io::Error::new(ErrorKind::Other, "test error")));
            stall.into_iter().chain([Ok(value)])
        })
    }

    #[rstest]
    #[case(
        vec![],
        vec![],
    )]
    #[case(
        vec![
            vec![],
            vec![]
        ],
        vec![],
    )]
    #[case(
        vec![
            vec![Ok(4), Ok(5), Ok(7)],
            vec![Ok(1), Ok(6)],
            vec![Ok(3)],
            vec![],
        ],
        vec![Ok(1), Ok(3), Ok(4), Ok(5), Ok(6), Ok(7)],
    )]
    #[case(
        vec![
            vec![Result::Err(io::Error::new(ErrorKind::Other, "test error"))]
        ],
        vec![
            Result::Err(io::Error::new(ErrorKind::Other, "test error"))
        ],
    )]
    #[case(
        vec![
            vec![Ok(3), Result::Err(io::Error::new(ErrorKind::Other, "test error"))],
            vec![Ok(1), Ok(2)],
        ],
        vec![
            Ok(1),
            Ok(2),
            Ok(3),
            Result::Err(io::Error::new(ErrorKind::Other, "test error")),
        ],
    )]
    #[case(
        vec![
            vec![Ok(3), Result::Err(io::Error::new(ErrorKind::Other, "test error")), Ok(8)],
            vec![Ok(1), Ok(9)],
            vec![Ok(2), Ok(4)],
        ],
        vec![
            Ok(1),
            Ok(2),
            Ok(3),
            Result::Err(io::Error::new(ErrorKind::Other, "test error")),
            Ok(4),
            Ok(8),
            Ok(9),
        ],
    )]
    fn test_merger(
        #[case] sources: Vec<Vec<Result<i32, io::Error>>>,
        #[case] expected_result: Vec<Result<i32, io::Error>>,
    ) {
        let actual_result: Vec<Result<i32, io::Error>> = merge(sources).collect();
        assert!(
            compare_vectors_of_result::<_, io::Error>(&actual_result, &expected_result),
            "actual={:?}, expected={:?}",
            actual_result,
            expected_result
        );
    }

    #[rstest]
    fn test_merge_counts(#[values(1, 3, 128)] batch_size: usize) {
        let merger = MergerBuilder::new().with_batch_size(batch_size).build().unwrap();

        for n in 0..10 {
            let sources = Vec::from_iter((0..n).map(|i| (0..i).map(Ok::<_, io::Error>)));
            let mut expected = Vec::from_iter((0..n).flat_map(|i| 0..i));
            expected.sort();

            let actual: Vec<i32> = merger.merge(sources).map(Result::unwrap).collect();
            assert_eq!(actual, expected, "sources={}", n);
        }
    }

    #[rstest]
    #[case(vec![0, 3], vec![2, 5], vec![0, 2, 3, 5])]
    #[case(vec![2, 5], vec![0, 3], vec![0, 2, 3, 5])]
    fn test_merge_interleaved(#[case] s1: Vec<i32>, #[case] s2: Vec<i32>, #[case] expected: Vec<i32>) {
        let sources = vec![s1.into_iter().map(Ok::<_, io::Error>), s2.into_iter().map(Ok::<_, io::Error>)];
        let actual: Vec<i32> = merge(sources).map(Result::unwrap).collect();
        assert_eq!(actual, expected);
    }

    #[rstest]
    fn test_merge_random(#[values(3, 5, 10)] k: usize, #[values(1, 7, 128)] batch_size: usize) {
        let mut rng = rand::thread_rng();

        let mut sources = Vec::from_iter((0..k).map(|_| {
            let len = rng.gen_range(0..200);
            let mut values = Vec::from_iter((0..len).map(|_| rng.gen_range(-50..50)));
            values.sort();
            values
        }));
        sources[0].clear();
        sources[k / 2].clear();

        let mut expected = Vec::from_iter(sources.iter().flatten().copied());
        expected.sort();

        let merger = Merger::new(batch_size).unwrap();
        let actual: Vec<i32> = merger
            .merge(sources.into_iter().map(|source| source.into_iter().map(Ok::<_, io::Error>)))
            .map(Result::unwrap)
            .collect();

        assert_eq!(actual, expected);
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_merge_by(#[case] reversed: bool) {
        let compare = if reversed {
            |a: &i32, b: &i32| a.cmp(b).reverse()
        } else {
            |a: &i32, b: &i32| a.cmp(b)
        };

        let mut sources = Vec::from_iter((0..4).map(|i| Vec::from_iter((0..25).map(|j| j * 4 + i))));
        if reversed {
            sources.iter_mut().for_each(|source| source.reverse());
        }

        let actual: Vec<i32> = super::merge_by(
            sources.into_iter().map(|source| source.into_iter().map(Ok::<_, io::Error>)),
            compare,
        )
        .map(Result::unwrap)
        .collect();

        let expected = if reversed {
            Vec::from_iter((0..100).rev())
        } else {
            Vec::from_iter(0..100)
        };
        assert_eq!(actual, expected);
    }

    #[rstest]
    fn test_merge_early_stop(#[values(0, 1, 2, 3, 5)] k: usize, #[values(0, 7, 60)] taken: usize) {
        let releases = Vec::from_iter((0..k).map(|_| Rc::new(Cell::new(0))));
        let sources = (0..k).map(|i| Counted {
            values: Vec::from_iter((0..10).map(|j| j * k as i32 + i as i32)).into_iter(),
            releases: releases[i].clone(),
        });

        let merger = MergerBuilder::new().with_batch_size(4).build().unwrap();
        let mut merge = crate::Unbatched::new(merger.merge_sources(sources, ascending));

        let actual: Vec<i32> = merge.by_ref().take(taken).map(Result::unwrap).collect();
        drop(merge);

        let expected = Vec::from_iter((0..(10 * k).min(taken)).map(|i| i as i32));
        assert_eq!(actual, expected);
        for (i, released) in releases.iter().enumerate() {
            assert_eq!(released.get(), 1, "source {} released {} times", i, released.get());
        }
    }

    #[test]
    fn test_merge_continues_after_error() {
        let sources = vec![stalling(0..10, 5), stalling(0..10, 10), stalling(0..10, 5)];

        let mut values = Vec::new();
        let mut errors = 0;
        for item in merge(sources) {
            match item {
                Ok(value) => values.push(value),
                Err(err) => {
                    assert_eq!(err.to_string(), "test error");
                    errors += 1;
                }
            }
        }

        assert_eq!(values, Vec::from_iter((0..10).flat_map(|i| [i, i, i])));
        assert_eq!(errors, 2);
    }

    #[test]
    fn test_merge_pairs() {
        let sources = vec![
            vec![Ok::<_, io::Error>((1, "a")), Ok((2, "b")), Ok((4, "c"))],
            vec![Ok((2, "d")), Ok((3, "e"))],
        ];

        let actual: Vec<(i32, &str)> = merge_pairs(sources).map(Result::unwrap).collect();
        assert_eq!(actual, vec![(1, "a"), (2, "b"), (2, "d"), (3, "e"), (4, "c")]);
    }

    #[test]
    fn test_merge_pairs_by() {
        let sources = vec![
            vec![Ok::<_, io::Error>(("b", 1)), Ok(("a", 2))],
            vec![Ok(("c", 3)), Ok(("a", 4))],
            vec![Ok(("b", 5))],
        ];

        let actual: Vec<&str> = super::merge_pairs_by(sources, |a, b| b.cmp(a))
            .map(|item| item.unwrap().0)
            .collect();
        assert_eq!(actual, vec!["c", "b", "b", "a", "a"]);
    }

    #[rstest]
    fn test_merge_batches(#[values(0, 1, 2, 3, 9)] n: i32) {
        let count_slice = |n: i32, r: i32| (0..n).map(move |i| Ok::<_, io::Error>(Vec::from_iter(i * r..(i + 1) * r)));

        let mut merge = merge_batches((0..n).map(|i| count_slice(i, 10)));

        let mut actual = Vec::new();
        while let Some(batch) = merge.next_batch() {
            actual.extend_from_slice(batch.unwrap());
        }

        let mut expected = Vec::from_iter((0..n).flat_map(|i| 0..i * 10));
        expected.sort();

        assert_eq!(actual, expected);
    }

    #[test]
    fn test_merge_batches_example() {
        let sequence = |min: i32, max: i32, step: usize, size: i32| {
            (min..max)
                .step_by(step)
                .map(move |i| Ok::<_, io::Error>(Vec::from_iter(i..i + size)))
        };

        let mut merge = merge_batches(vec![sequence(0, 5, 1, 2), sequence(1, 5, 2, 2), sequence(2, 5, 3, 2)]);

        let mut actual = Vec::new();
        while let Some(batch) = merge.next_batch() {
            actual.extend_from_slice(batch.unwrap());
        }

        assert_eq!(actual, vec![0, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 5]);
    }

    #[test]
    fn test_merge_release() {
        let releases = Rc::new(Cell::new(0));
        let sources = (0..3).map(|i| Counted {
            values: vec![i, i + 3, i + 6].into_iter(),
            releases: releases.clone(),
        });

        let mut merge = MergerBuilder::new()
            .with_batch_size(2)
            .build()
            .unwrap()
            .merge_sources(sources, ascending);

        assert_eq!(merge.next_batch().unwrap().unwrap(), &[0, 1]);
        merge.release();
        assert_eq!(releases.get(), 3);
        assert!(merge.next_batch().is_none());

        drop(merge);
        assert_eq!(releases.get(), 3);
    }

    #[test]
    fn test_nested_merge() {
        let inner = |offset: i32| {
            super::merge_batches_by(
                vec![
                    vec![Ok::<_, io::Error>(vec![offset, offset + 4])],
                    vec![Ok(vec![offset + 2, offset + 6])],
                ],
                ascending,
            )
        };

        let outer = Merger::default().merge_sources(vec![inner(0), inner(1)], ascending);
        let actual: Vec<i32> = crate::Unbatched::new(outer).map(Result::unwrap).collect();

        assert_eq!(actual, Vec::from_iter(0..8));
    }

    #[test]
    fn test_merger_builder() {
        assert_eq!(MergerBuilder::new().build().unwrap().batch_size(), 128);
        assert_eq!(MergerBuilder::new().with_batch_size(7).build().unwrap().batch_size(), 7);

        let err = MergerBuilder::new().with_batch_size(0).build().unwrap_err();
        assert_eq!(err, MergeError::InvalidBatchSize(0));
        assert_eq!(err.to_string(), "invalid batch size: 0");
    }

    fn compare_vectors_of_result<T: PartialEq, E: Error + 'static>(
        actual: &Vec<Result<T, E>>,
        expected: &Vec<Result<T, E>>,
    ) -> bool {
        actual.len() == expected.len()
            && actual
                .into_iter()
                .zip(expected)
                .all(
                    |(actual_result, expected_result)| match (actual_result, expected_result) {
                        (Ok(actual_result), Ok(expected_result)) if actual_result == expected_result => true,
                        (Err(actual_err), Err(expected_err)) => actual_err.to_string() == expected_err.to_string(),
                        _ => false,
                    },
                )
    }
}
