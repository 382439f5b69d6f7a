//! Per-generation view of the ordered loop sequence.

use tessel_ir::{Index, Range};
use tessel_schedule::LoopNest;

use crate::error::Result;

/// Static facts about one loop level.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    pub index: Index,
    pub range: Range,
    pub parallel: Option<usize>,
    pub unrolled: bool,
}

/// Immutable per-generation schedule: the loop levels outermost-to-innermost
/// with their unclipped ranges and execution marks. Boundary clipping is
/// applied per-binding during the walk, not here.
#[derive(Debug, Clone)]
pub struct LoopVisitSchedule {
    levels: Vec<LoopInfo>,
}

impl LoopVisitSchedule {
    pub fn new(nest: &LoopNest) -> Result<Self> {
        let mut levels = Vec::with_capacity(nest.order().len());
        for index in nest.order() {
            levels.push(LoopInfo {
                index: index.clone(),
                range: nest.domain().range_of(index)?,
                parallel: nest.parallel_partitions(index),
                unrolled: nest.is_unrolled(index),
            });
        }
        Ok(Self { levels })
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> &LoopInfo {
        &self.levels[level]
    }

    pub fn position_of(&self, index: &Index) -> Option<usize> {
        self.levels.iter().position(|info| info.index == *index)
    }
}
