//! Loser tree merger.

use std::cmp::Ordering;

use log;

use crate::cursor::{Cursor, Fill};
use crate::source::BatchSource;

/// Loser tree slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Vacant,
    /// Index of the cursor the slot stands for.
    Cursor(usize),
}

/// Single extraction outcome.
pub(crate) enum Step<T, E> {
    Value(T),
    Failed(E),
    Done,
}

/// Tournament (loser) tree over *k* sources.
///
/// Nodes are kept in an array of size 2*k*: leaves occupy `k..2k`, leaf `k + i` standing for cursor `i`,
/// internal slots `0..k` hold the loser of the last match played there. The overall winner (champion)
/// is kept aside. Extraction replays only the matches on the path from the changed leaf to the root,
/// so the time complexity is log(*k*) per value and *k* to build.
///
/// Ties are resolved by bracket position: the right player of a match wins on equality,
/// so equal values of different sources don't come out in source order.
pub(crate) struct LoserTree<S: BatchSource, F> {
    cursors: Vec<Cursor<S>>,
    nodes: Vec<Slot>,
    winner: Slot,
    /// Number of active cursors.
    count: usize,
    /// Number of cursors that have pulled their first batch.
    primed: usize,
    built: bool,
    /// The champion's head has been emitted, a replay is due.
    consumed: bool,
    failed: Option<S::Error>,
    compare: F,
    batch_size: usize,
}

impl<S, F> LoserTree<S, F>
where
    S: BatchSource,
    F: Fn(&S::Item, &S::Item) -> Ordering,
{
    pub fn new(sources: Vec<S>, compare: F, batch_size: usize) -> Self {
        let cursors = Vec::from_iter(sources.into_iter().map(Cursor::new));

        return LoserTree {
            count: cursors.len(),
            cursors,
            nodes: Vec::new(),
            winner: Slot::Vacant,
            primed: 0,
            built: false,
            consumed: false,
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
            match self.step() {
                Step::Value(value) => out.push(value),
                Step::Failed(err) if out.len() == start => return Some(Err(err)),
                Step::Failed(err) => {
                    self.failed = Some(err);
                    break;
                }
                Step::Done => break,
            }
        }

        if out.len() == start {
            None
        } else {
            Some(Ok(()))
        }
    }

    /// Extracts the smallest head value among all active cursors.
    pub fn step(&mut self) -> Step<S::Item, S::Error> {
        if self.count == 0 {
            return Step::Done;
        }

        if !self.built {
            if let Err(err) = self.build() {
                return Step::Failed(err);
            }
        } else if self.consumed {
            let cursor = match self.winner {
                Slot::Cursor(cursor) => cursor,
                Slot::Vacant => return Step::Done,
            };
            let leaf = self.leaf(cursor);

            if self.cursors[cursor].is_empty() {
                match self.cursors[cursor].fill() {
                    Fill::Ready => {}
                    Fill::Failed(err) => {
                        log::debug!("source {} failed, surfacing the error", cursor);
                        return Step::Failed(err);
                    }
                    Fill::Exhausted => {
                        log::trace!("source {} exhausted", cursor);
                        self.nodes[leaf] = Slot::Vacant;
                        self.winner = Slot::Vacant;
                        self.count -= 1;
                    }
                }
            }

            self.consumed = false;
            if self.count == 0 {
                return Step::Done;
            }
            self.replay(leaf);
        }

        match self.winner {
            Slot::Cursor(cursor) => {
                self.consumed = true;
                self.cursors[cursor].pop().map_or(Step::Done, Step::Value)
            }
            Slot::Vacant => Step::Done,
        }
    }

    /// Releases every source.
    pub fn release(&mut self) {
        for cursor in self.cursors.iter_mut() {
            cursor.release();
        }
    }

    /// Pulls the first batch of every source and lays out the bracket over the non-empty ones.
    /// Priming resumes at the failed source if a pull fails.
    fn build(&mut self) -> Result<(), S::Error> {
        while self.primed < self.cursors.len() {
            if let Fill::Failed(err) = self.cursors[self.primed].fill() {
                log::debug!("source {} failed on its first pull, surfacing the error", self.primed);
                return Err(err);
            }
            self.primed += 1;
        }

        // sources empty from the start are already released
        self.cursors.retain(|cursor| !cursor.is_empty());
        self.count = self.cursors.len();

        let k = self.cursors.len();
        self.nodes = Vec::with_capacity(2 * k);
        self.nodes.resize(k, Slot::Vacant);
        self.nodes.extend((0..k).map(Slot::Cursor));

        self.winner = self.initialize(0);
        self.built = true;

        log::debug!("loser tree built over {} active sources", self.count);

        return Ok(());
    }

    /// Plays the bracket below slot `i` and returns its winner, storing the losers on the way.
    fn initialize(&mut self, i: usize) -> Slot {
        if i >= self.nodes.len() {
            return Slot::Vacant;
        }

        let n1 = self.initialize(left(i));
        let n2 = self.initialize(right(i));
        if n1 == Slot::Vacant && n2 == Slot::Vacant {
            return self.nodes[i];
        }

        let (loser, winner) = self.play(n1, n2);
        self.nodes[i] = loser;

        return winner;
    }

    /// Replays the matches from `leaf` up to the root carrying the current champion.
    fn replay(&mut self, leaf: usize) {
        let mut winner = self.winner;
        let mut offset = parent(leaf);

        loop {
            let (loser, survivor) = self.play(self.nodes[offset], winner);
            self.nodes[offset] = loser;
            winner = survivor;

            if offset == 0 {
                break;
            }
            offset = parent(offset);
        }

        self.winner = winner;
    }

    /// Plays a match, returns `(loser, winner)`.
    /// A vacant slot loses to any cursor, `n1` wins only if its head is strictly less than the one of `n2`.
    fn play(&self, n1: Slot, n2: Slot) -> (Slot, Slot) {
        match (n1, n2) {
            (Slot::Vacant, _) => (n1, n2),
            (_, Slot::Vacant) => (n2, n1),
            (Slot::Cursor(c1), Slot::Cursor(c2)) => match (self.cursors[c1].head(), self.cursors[c2].head()) {
                (Some(v1), Some(v2)) if (self.compare)(v1, v2) == Ordering::Less => (n2, n1),
                _ => (n1, n2),
            },
        }
    }

    fn leaf(&self, cursor: usize) -> usize {
        self.cursors.len() + cursor
    }
}

fn parent(i: usize) -> usize {
    (i - 1) / 2
}

fn left(i: usize) -> usize {
    2 * i + 1
}

fn right(i: usize) -> usize {
    2 * i + 2
}
