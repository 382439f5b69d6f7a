use snafu::Snafu;

use crate::index::Index;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The two caller-facing failure categories every variant maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Structurally invalid input; deterministic and caller-fixable.
    Configuration,
    /// Declared extents cannot be reconciled with an operand's actual shape.
    DimensionMismatch,
}

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Dimension added twice to the same domain.
    #[snafu(display("dimension {index} is already part of the domain"))]
    DuplicateDimension { index: Index },

    /// Index not known to the domain it was used with.
    #[snafu(display("unknown index {index}"))]
    UnknownIndex { index: Index },

    /// Split sizes must be strictly positive.
    #[snafu(display("split size must be positive, got {size}"))]
    InvalidSplitSize { size: i64 },

    /// Range with end before begin.
    #[snafu(display("range [{begin}, {end}) is malformed"))]
    MalformedRange { begin: i64, end: i64 },

    /// Coordinate list length does not match the view's rank.
    #[snafu(display("coordinate rank mismatch: view has rank {expected}, got {actual}"))]
    RankMismatch { expected: usize, actual: usize },

    /// Access resolved outside the backing storage.
    #[snafu(display("access out of bounds: physical offset {offset} in storage of {len} elements"))]
    AccessOutOfBounds { offset: i64, len: usize },

    /// Layout dimension order is not a permutation.
    #[snafu(display("dimension order {order:?} is not a permutation of 0..{rank}"))]
    InvalidDimensionOrder { order: Vec<usize>, rank: usize },

    /// Index has no concrete value at this point of the walk.
    #[snafu(display("index {index} has no value at this point in the loop nest"))]
    UndefinedIndexValue { index: Index },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::RankMismatch { .. } | Error::InvalidDimensionOrder { .. } => ErrorKind::DimensionMismatch,
            _ => ErrorKind::Configuration,
        }
    }
}
