//! Half-open integer ranges with a loop step.

use std::fmt;

use snafu::ensure;

use crate::error::{MalformedRangeSnafu, Result};
use crate::index::Index;

/// A half-open range `[begin, end)` iterated with a step of `increment`.
///
/// Split outer indices carry their chunk size as the increment, so the loop
/// variable of an outer index takes the absolute begin offset of each chunk
/// (`0, size, 2*size, ...`) rather than a chunk ordinal.
///
/// # Example
///
/// ```
/// use tessel_ir::Range;
///
/// let r = Range::with_increment(0, 10, 4);
/// assert_eq!(r.num_iterations(), 3);
/// assert_eq!(r.iter().collect::<Vec<_>>(), vec![0, 4, 8]);
/// assert_eq!(r.boundary_size(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    begin: i64,
    end: i64,
    increment: i64,
}

impl Range {
    /// Unit-step range `[begin, end)`.
    pub fn new(begin: i64, end: i64) -> Self {
        Self { begin, end, increment: 1 }
    }

    pub fn with_increment(begin: i64, end: i64, increment: i64) -> Self {
        debug_assert!(increment > 0);
        Self { begin, end, increment }
    }

    /// Like [`Range::new`] but rejects `end < begin`.
    pub fn checked(begin: i64, end: i64) -> Result<Self> {
        ensure!(end >= begin, MalformedRangeSnafu { begin, end });
        Ok(Self::new(begin, end))
    }

    pub fn begin(&self) -> i64 {
        self.begin
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn increment(&self) -> i64 {
        self.increment
    }

    pub fn size(&self) -> i64 {
        self.end - self.begin
    }

    pub fn num_iterations(&self) -> i64 {
        (self.size() + self.increment - 1) / self.increment
    }

    /// Begin offset of the final iteration.
    pub fn last_iteration_begin(&self) -> i64 {
        self.begin + (self.num_iterations() - 1) * self.increment
    }

    /// Length of the short final chunk, `0` when the increment divides the
    /// size exactly.
    pub fn boundary_size(&self) -> i64 {
        self.size() % self.increment
    }

    /// End of the evenly divisible prefix; equals `end` when there is no
    /// boundary chunk.
    pub fn non_boundary_end(&self) -> i64 {
        self.end - self.boundary_size()
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.begin && value < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> {
        let (begin, end, increment) = (self.begin, self.end, self.increment);
        std::iter::successors(Some(begin), move |v| Some(v + increment)).take_while(move |v| *v < end)
    }

    /// Restricts the end of the range, keeping begin and increment.
    pub fn clipped_to(&self, end: i64) -> Self {
        Self { begin: self.begin, end: self.end.min(end), increment: self.increment }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.increment == 1 {
            write!(f, "[{}, {})", self.begin, self.end)
        } else {
            write!(f, "[{}, {}:{})", self.begin, self.end, self.increment)
        }
    }
}

/// An [`Index`] bound to its range; the building block of an iteration domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRange {
    pub index: Index,
    pub range: Range,
}

impl IndexRange {
    pub fn new(index: Index, range: Range) -> Self {
        Self { index, range }
    }
}
