//! The emitted program structure: what a lowering backend receives.

use std::collections::BTreeMap;

use tessel_ir::{Index, Range};

/// One emitted loop: its index, the (possibly clipped) partition range it
/// traverses, its nesting depth, and execution marks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopDescriptor {
    pub index: Index,
    pub range: Range,
    pub depth: usize,
    pub parallel: Option<usize>,
    pub unrolled: bool,
}

/// Flattened record of one generation pass: the distinct loop shapes
/// emitted (boundary partitions appear as separate descriptors) plus
/// per-kernel invocation counts.
#[derive(Debug, Clone, Default)]
pub struct Program {
    loops: Vec<LoopDescriptor>,
    invocations: BTreeMap<String, usize>,
}

impl Program {
    /// Loop descriptors in first-emission order.
    pub fn loops(&self) -> &[LoopDescriptor] {
        &self.loops
    }

    /// Descriptors emitted for one index, in emission order; more than one
    /// means the loop was partitioned (boundary handling or predicate
    /// unswitching).
    pub fn loops_for(&self, index: &Index) -> Vec<&LoopDescriptor> {
        self.loops.iter().filter(|d| d.index == *index).collect()
    }

    pub fn invocation_count(&self, kernel_name: &str) -> usize {
        self.invocations.get(kernel_name).copied().unwrap_or(0)
    }

    pub fn invocations(&self) -> &BTreeMap<String, usize> {
        &self.invocations
    }

    pub(crate) fn record_loop(&mut self, descriptor: LoopDescriptor) {
        if !self.loops.contains(&descriptor) {
            self.loops.push(descriptor);
        }
    }

    pub(crate) fn record_invocation(&mut self, kernel_name: &str) {
        *self.invocations.entry(kernel_name.to_string()).or_default() += 1;
    }

    pub(crate) fn absorb(&mut self, other: Program) {
        for descriptor in other.loops {
            self.record_loop(descriptor);
        }
        for (name, count) in other.invocations {
            *self.invocations.entry(name).or_default() += count;
        }
    }
}
