//! Merge strategies.

use std::cmp::Ordering;

use log;

use crate::cursor::{Cursor, Fill};
use crate::source::BatchSource;
use crate::tree::LoserTree;

/// Two-way merger implementation.
/// Merges exactly two sorted sources comparing their current heads, no tree overhead involved.
/// Equal values are emitted left first.
pub(crate) struct TwoWayMerger<S: BatchSource, F> {
    left: Cursor<S>,
    right: Cursor<S>,
    failed: Option<S::Error>,
    compare: F,
    batch_size: usize,
}

enum Pick {
    Left,
    Right,
    Both,
    RestOfLeft,
    RestOfRight,
    Done,
}

impl<S, F> TwoWayMerger<S, F>
where
    S: BatchSource,
    F: Fn(&S::Item, &S::Item) -> Ordering,
{
    pub fn new(left: S, right: S, compare: F, batch_size: usize) -> Self {
        return TwoWayMerger {
            left: Cursor::new(left),
            right: Cursor::new(right),
            failed: None,
            compare,
            batch_size: batch_size.max(1),
        };
    }

    /// Appends the next merged values to `out`.
    pub fn pull(&mut self, out: &mut Vec<S::Item>) -> Option<Result<(), S::Error>> {
        if let Some(err) = self.failed.take() {
            return Some(Err(err));
        }

        let start = out.len();
        while out.len() - start < self.batch_size {
            if let Err(err) = Self::refill(&mut self.left).and_then(|_| Self::refill(&mut self.right)) {
                if out.len() == start {
                    return Some(Err(err));
                }
                self.failed = Some(err);
                break;
            }

            let pick = match (self.left.head(), self.right.head()) {
                (Some(left), Some(right)) => match (self.compare)(left, right) {
                    Ordering::Less => Pick::Left,
                    Ordering::Greater => Pick::Right,
                    Ordering::Equal => Pick::Both,
                },
                (Some(_), None) => Pick::RestOfLeft,
                (None, Some(_)) => Pick::RestOfRight,
                (None, None) => Pick::Done,
            };

            let limit = self.batch_size - (out.len() - start);
            match pick {
                Pick::Left => out.extend(self.left.pop()),
                Pick::Right => out.extend(self.right.pop()),
                Pick::Both => {
                    out.extend(self.left.pop());
                    out.extend(self.right.pop());
                }
                Pick::RestOfLeft => self.left.drain_into(out, limit),
                Pick::RestOfRight => self.right.drain_into(out, limit),
                Pick::Done => break,
            }
        }

        if out.len() == start {
            None
        } else {
            Some(Ok(()))
        }
    }

    /// Releases both sources.
    pub fn release(&mut self) {
        self.left.release();
        self.right.release();
    }

    fn refill(cursor: &mut Cursor<S>) -> Result<(), S::Error> {
        if cursor.is_empty() && !cursor.is_exhausted() {
            if let Fill::Failed(err) = cursor.fill() {
                log::debug!("source failed, surfacing the error");
                return Err(err);
            }
        }
        return Ok(());
    }
}

/// Merge strategy selected by the number of sources.
pub(crate) enum Strategy<S: BatchSource, F> {
    Empty,
    Single(Cursor<S>),
    TwoWay(TwoWayMerger<S, F>),
    Tree(LoserTree<S, F>),
}

impl<S, F> Strategy<S, F>
where
    S: BatchSource,
    F: Fn(&S::Item, &S::Item) -> Ordering,
{
    pub fn new(sources: Vec<S>, compare: F, batch_size: usize) -> Self {
        log::debug!("merging {} sources", sources.len());

        if sources.len() > 2 {
            return Strategy::Tree(LoserTree::new(sources, compare, batch_size));
        }

        let mut sources = sources.into_iter();
        match (sources.next(), sources.next()) {
            (Some(left), Some(right)) => Strategy::TwoWay(TwoWayMerger::new(left, right, compare, batch_size)),
            (Some(single), None) => Strategy::Single(Cursor::new(single)),
            _ => Strategy::Empty,
        }
    }

    /// Appends the next merged values to `out`.
    /// Returns `None` when every source is exhausted.
    pub fn pull(&mut self, out: &mut Vec<S::Item>) -> Option<Result<(), S::Error>> {
        match self {
            Strategy::Empty => None,
            Strategy::Single(cursor) => match cursor.pull_into(out) {
                Fill::Ready => Some(Ok(())),
                Fill::Failed(err) => Some(Err(err)),
                Fill::Exhausted => None,
            },
            Strategy::TwoWay(merger) => merger.pull(out),
            Strategy::Tree(tree) => tree.pull(out),
        }
    }

    /// Releases every source.
    pub fn release(&mut self) {
        match self {
            Strategy::Empty => {}
            Strategy::Single(cursor) => cursor.release(),
            Strategy::TwoWay(merger) => merger.release(),
            Strategy::Tree(tree) => tree.release(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, ErrorKind};

    use rstest::*;

    use super::{Strategy, TwoWayMerger};
    use crate::buffer::Batched;
    use crate::source::BatchSource;

    type DynSource = Box<dyn BatchSource<Item = i32, Error = io::Error>>;

    fn collect<T, E>(mut pull: impl FnMut(&mut Vec<T>) -> Option<Result<(), E>>) -> Vec<Result<T, E>> {
        let mut result = Vec::new();
        let mut batch = Vec::new();
        while let Some(pulled) = pull(&mut batch) {
            match pulled {
                Ok(()) => result.extend(batch.drain(..).map(Ok)),
                Err(err) => result.push(Err(err)),
            }
        }
        return result;
    }

    #[rstest]
    #[case(vec![], vec![], vec![])]
    #[case(vec![0, 3], vec![2, 5], vec![0, 2, 3, 5])]
    #[case(vec![2, 5], vec![0, 3], vec![0, 2, 3, 5])]
    #[case(vec![1, 2, 3], vec![], vec![1, 2, 3])]
    #[case(vec![], vec![1, 2, 3], vec![1, 2, 3])]
    #[case(vec![0], vec![1, 2, 3, 4, 5, 6, 7], vec![0, 1, 2, 3, 4, 5, 6, 7])]
    #[case(vec![9], vec![1, 2, 3, 4, 5, 6, 7], vec![1, 2, 3, 4, 5, 6, 7, 9])]
    #[case(vec![1, 2, 2], vec![2, 3], vec![1, 2, 2, 2, 3])]
    fn test_two_way_merger(#[case] left: Vec<i32>, #[case] right: Vec<i32>, #[case] expected: Vec<i32>) {
        for batch_size in [1, 2, 128] {
            let mut merger = TwoWayMerger::new(
                Batched::new(left.clone().into_iter().map(Ok::<_, io::Error>), batch_size),
                Batched::new(right.clone().into_iter().map(Ok::<_, io::Error>), batch_size),
                |a: &i32, b: &i32| a.cmp(b),
                batch_size,
            );

            let actual: Vec<i32> = collect(|batch| merger.pull(batch))
                .into_iter()
                .map(Result::unwrap)
                .collect();
            assert_eq!(actual, expected, "batch_size={}", batch_size);
        }
    }

    #[test]
    fn test_two_way_merger_ties_keep_source_order() {
        let mut merger = TwoWayMerger::new(
            Batched::new(vec![Ok::<_, io::Error>((2, "left"))], 8),
            Batched::new(vec![Ok::<_, io::Error>((2, "right"))], 8),
            |a: &(i32, &str), b: &(i32, &str)| a.0.cmp(&b.0),
            8,
        );

        let mut batch = Vec::new();
        assert!(matches!(merger.pull(&mut batch), Some(Ok(()))));
        assert_eq!(batch, vec![(2, "left"), (2, "right")]);
    }

    #[test]
    fn test_two_way_merger_continues_after_error() {
        let left = (0..5)
            .map(Ok::<i32, io::Error>)
            .chain([Err(io::Error::new(ErrorKind::Other, "test error"))])
            .chain((5..10).map(Ok));
        let right = (0..10).map(Ok::<i32, io::Error>);

        let mut merger = TwoWayMerger::new(
            Box::new(Batched::new(left, 128)) as DynSource,
            Box::new(Batched::new(right, 128)) as DynSource,
            |a: &i32, b: &i32| a.cmp(b),
            128,
        );

        let actual = collect(|batch| merger.pull(batch));
        let errors: Vec<String> = actual
            .iter()
            .filter_map(|item| item.as_ref().err().map(|err| err.to_string()))
            .collect();
        let values: Vec<i32> = actual.iter().filter_map(|item| item.as_ref().ok().copied()).collect();

        assert_eq!(errors, vec!["test error".to_string()]);
        assert_eq!(values, Vec::from_iter((0..10).flat_map(|i| [i, i])));
        assert!(actual[10].is_err(), "error expected where the left source stalls: {:?}", actual);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    fn test_strategy_dispatch(#[case] sources: usize) {
        let inputs = Vec::from_iter(
            (0..sources).map(|i| Batched::new((0..4).map(move |j| Ok::<_, io::Error>(j * 10 + i)), 2)),
        );
        let mut strategy = Strategy::new(inputs, |a: &usize, b: &usize| a.cmp(b), 2);

        match (&strategy, sources) {
            (Strategy::Empty, 0) | (Strategy::Single(_), 1) | (Strategy::TwoWay(_), 2) | (Strategy::Tree(_), 3) => {}
            _ => panic!("unexpected strategy for {} sources", sources),
        }

        let actual: Vec<usize> = collect(|batch| strategy.pull(batch))
            .into_iter()
            .map(Result::unwrap)
            .collect();
        let mut expected = Vec::from_iter((0..sources).flat_map(|i| (0..4).map(move |j| j * 10 + i)));
        expected.sort();

        assert_eq!(actual, expected);
    }
}
