//! Mutable scheduling façade over a [`LoopNest`].

use tessel_ir::{Index, IndexExpression, SplitIndex};

use crate::cache::{CacheArgs, CacheHandle, CachingStrategy};
use crate::error::Result;
use crate::nest::LoopNest;

/// Scheduling operations on a nest: split, reorder, parallelize, unroll,
/// and cache. A thin borrow so transformations read as one fluent block:
///
/// ```
/// use tessel_ir::{Index, IndexRange, Range};
/// use tessel_schedule::LoopNest;
///
/// let i = Index::new("i");
/// let mut nest = LoopNest::from_ranges([IndexRange::new(i.clone(), Range::new(0, 10))]).unwrap();
/// let mut schedule = nest.schedule();
/// let tile = schedule.split(&i, 4).unwrap();
/// schedule.unroll(&tile.inner).unwrap();
/// ```
pub struct Schedule<'a> {
    nest: &'a mut LoopNest,
}

impl LoopNest {
    pub fn schedule(&mut self) -> Schedule<'_> {
        Schedule { nest: self }
    }
}

impl Schedule<'_> {
    /// Splits `index` into `(outer, inner)` chunks of `size` iterations,
    /// placing the new loops where the split leaf sat.
    pub fn split(&mut self, index: &Index, size: i64) -> Result<SplitIndex> {
        self.nest.split(index, size)
    }

    /// Sets the loop order outermost-to-innermost.
    pub fn set_order(&mut self, order: &[Index]) -> Result<()> {
        self.nest.set_order(order)
    }

    /// Marks `index` for execution as `partitions` concurrent chunks.
    pub fn parallelize(&mut self, index: &Index, partitions: usize) -> Result<()> {
        self.nest.parallelize(index, partitions)
    }

    /// Fully replicates `index`'s body per iteration value.
    pub fn unroll(&mut self, index: &Index) -> Result<()> {
        self.nest.unroll(index)
    }

    /// Registers a caching stage: the strategy synthesizes copy-in /
    /// copy-out kernels and rename rules, and returns a handle exposing the
    /// raw scratch tensor.
    pub fn cache(&mut self, strategy: &dyn CachingStrategy, args: CacheArgs<'_>) -> Result<CacheHandle> {
        strategy.emit(self.nest, args)
    }

    /// How a computed index recombines from loop variables.
    pub fn index_expression(&self, index: &Index) -> Result<IndexExpression> {
        Ok(self.nest.domain().index_expression(index)?)
    }
}
