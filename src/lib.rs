//! `kway-merge` is a rust k-way merge implementation.
//!
//! K-way merging combines *k* individually sorted sequences into a single sorted one. It is the second pass of
//! an external sort and the core of compaction-like workloads: the inputs are consumed lazily, so they never have to
//! fit into memory. For more information see [K-way merge algorithm](https://en.wikipedia.org/wiki/K-way_merge_algorithm).
//!
//! # Overview
//!
//! `kway-merge` supports the following features:
//!
//! * **Loser tree:**
//!   more than two sources are merged using a tournament (loser) tree performing log(*k*) comparisons per value.
//!   Two sources are merged directly, a single source is passed through.
//! * **Batching:**
//!   values are pulled from sources and delivered to consumers in batches to amortize per-value overhead.
//!   Batch size is configurable using [`MergerBuilder`].
//! * **Error propagation:**
//!   a source error is delivered to the consumer as is and the merge goes on, the consumer decides whether to stop.
//! * **Resource release:**
//!   every source is released exactly once, whether it has been drained or the merge has been stopped early.
//! * **External chunks:**
//!   sorted runs can be stored on file system and merged back using [`RmpExternalChunk`].
//!
//! # Example
//!
//! ```
//! use std::io;
//!
//! let sequence = |min: i32, max: i32, step: usize| (min..max).step_by(step).map(Ok::<_, io::Error>);
//!
//! let merged: Result<Vec<i32>, io::Error> = kway_merge::merge(vec![
//!     sequence(0, 5, 1), // 0,1,2,3,4
//!     sequence(1, 5, 2), // 1,3
//!     sequence(2, 5, 3), // 2
//! ])
//! .collect();
//!
//! assert_eq!(merged.unwrap(), vec![0, 1, 1, 2, 2, 3, 3, 4]);
//! ```
//!
//! Batched sources and output:
//!
//! ```
//! use std::io;
//!
//! let sequence = |min: i32, max: i32, step: usize| {
//!     (min..max)
//!         .step_by(step)
//!         .map(|i| Ok::<_, io::Error>(vec![i, i + 1]))
//! };
//!
//! let mut merge = kway_merge::merge_batches(vec![
//!     sequence(0, 5, 1), // [0,1],[1,2],[2,3],[3,4],[4,5]
//!     sequence(1, 5, 2), // [1,2],[3,4]
//!     sequence(2, 5, 3), // [2,3]
//! ]);
//!
//! let mut merged = Vec::new();
//! while let Some(batch) = merge.next_batch() {
//!     // the batch is overwritten by the next call
//!     merged.extend_from_slice(batch.unwrap());
//! }
//!
//! assert_eq!(merged, vec![0, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 5]);
//! ```

pub mod buffer;
pub mod chunk;
mod cursor;
pub mod merge;
mod merger;
pub mod source;
mod tree;

pub use buffer::{Batched, Batches, Unbatched, DEFAULT_BATCH_SIZE};
pub use chunk::{ExternalChunk, ExternalChunkError, RmpExternalChunk};
pub use merge::{
    merge, merge_batches, merge_batches_by, merge_by, merge_pairs, merge_pairs_by, Merge, MergeError, MergeIter,
    Merger, MergerBuilder,
};
pub use source::BatchSource;
