//! Test utilities for schedule-layer tests.

use tessel_ir::{Index, IndexRange, Range};

use crate::nest::LoopNest;

/// Builds an `m x n` two-dimensional nest and returns it with its indices.
pub fn nest_2d(m: i64, n: i64) -> (LoopNest, Index, Index) {
    let i = Index::new("i");
    let j = Index::new("j");
    let nest = LoopNest::from_ranges([
        IndexRange::new(i.clone(), Range::new(0, m)),
        IndexRange::new(j.clone(), Range::new(0, n)),
    ])
    .unwrap();
    (nest, i, j)
}
