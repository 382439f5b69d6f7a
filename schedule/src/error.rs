use snafu::Snafu;

use tessel_ir::{ErrorKind, Index, Range};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(context(false))]
    #[snafu(display("{source}"))]
    Ir { source: tessel_ir::Error },

    /// Loop order entry for an index the domain does not know.
    #[snafu(display("loop order mentions unknown index {index}"))]
    UnknownOrderEntry { index: Index },

    /// Loop order lists a loop index twice (possibly via a split parent).
    #[snafu(display("loop order lists {index} more than once"))]
    DuplicateOrderEntry { index: Index },

    /// Loop order omits a loop index.
    #[snafu(display("loop order is missing {index}"))]
    MissingOrderEntry { index: Index },

    /// Within one dimension, an outer split loop must precede its inner.
    #[snafu(display("loop order places {inner} outside its enclosing split loop {outer}"))]
    OrderViolatesNesting { outer: Index, inner: Index },

    /// Parallel partition counts must be at least 1.
    #[snafu(display("cannot parallelize {index} into {partitions} partitions"))]
    InvalidParallelPartitions { index: Index, partitions: usize },

    /// Fused nests disagree about a shared index's range.
    #[snafu(display("fused nests disagree on the range of shared index {index}: {left} vs {right}"))]
    IncompatibleFusedRanges { index: Index, left: Range, right: Range },

    /// Shared-index lists passed to fuse must pair up.
    #[snafu(display("shared index lists have mismatched lengths: {left} vs {right}"))]
    MismatchedSharedIndices { left: usize, right: usize },

    /// Cache extents don't line up with the region being cached.
    #[snafu(display("cache extents {extents:?} do not match the {rank} cached region indices"))]
    CacheExtentsMismatch { extents: Vec<i64>, rank: usize },

    /// Stripe-packed caches need the stripe to tile the columns exactly.
    #[snafu(display("stripe size {stripe} must evenly divide the cached column extent {cols}"))]
    StripeMisaligned { stripe: i64, cols: i64 },

    /// The cached region does not fit in the configured scratch budget.
    #[snafu(display("cache {name} needs {required} elements but is limited to {max}"))]
    CacheCapacityExceeded { name: String, required: usize, max: usize },

    /// Fill threshold must not exceed the scratch capacity.
    #[snafu(display("fill threshold {threshold} exceeds cache capacity {max}"))]
    InvalidFillThreshold { threshold: usize, max: usize },

    /// Stripe or progressive-fill indices must subdivide a cached region
    /// dimension.
    #[snafu(display("index {index} does not subdivide any cached region dimension"))]
    InvalidFillIndex { index: Index },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Ir { source } => source.kind(),
            Error::CacheExtentsMismatch { .. } => ErrorKind::DimensionMismatch,
            _ => ErrorKind::Configuration,
        }
    }
}
