//! Per-dimension split trees.
//!
//! Each primary dimension owns a binary tree of derived indices. Leaves are
//! **loop indices** (materialized as real loops); interior nodes are
//! **computed indices** whose value is the sum of the loop variables in their
//! subtree (outer loop variables already carry the chunk begin offset, so no
//! extra scaling is needed). The tree is stored as a flat arena of parallel
//! arrays addressed by node position, so handles held by kernels stay valid
//! as the tree grows.

use smallvec::SmallVec;
use snafu::ensure;

use crate::error::{InvalidSplitSizeSnafu, Result, UnknownIndexSnafu};
use crate::index::Index;
use crate::range::{IndexRange, Range};

/// The two indices produced by one split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndex {
    /// Iterates chunk begin offsets with the split size as its step.
    pub outer: Index,
    /// Iterates `[0, size)` within a chunk.
    pub inner: Index,
}

/// Split tree of one primary dimension.
///
/// Node 0 is the primary index. A split turns a leaf into an interior node
/// with an outer (left) and inner (right) child; the right child of node `n`
/// is always stored at `left_child[n] + 1`.
#[derive(Debug, Clone)]
pub struct DimensionTree {
    dimension: Index,
    indices: Vec<Index>,
    ranges: Vec<Range>,
    parent: Vec<Option<usize>>,
    left_child: Vec<Option<usize>>,
    split_count: usize,
}

impl DimensionTree {
    pub fn new(index_range: IndexRange) -> Self {
        Self {
            dimension: index_range.index.clone(),
            indices: vec![index_range.index],
            ranges: vec![index_range.range],
            parent: vec![None],
            left_child: vec![None],
            split_count: 0,
        }
    }

    pub fn dimension(&self) -> &Index {
        &self.dimension
    }

    pub fn num_splits(&self) -> usize {
        self.split_count
    }

    pub fn has_index(&self, index: &Index) -> bool {
        self.node_of(index).is_some()
    }

    fn node_of(&self, index: &Index) -> Option<usize> {
        self.indices.iter().position(|candidate| candidate == index)
    }

    fn require_node(&self, index: &Index) -> Result<usize> {
        self.node_of(index).ok_or_else(|| UnknownIndexSnafu { index: index.clone() }.build())
    }

    fn right_child(&self, node: usize) -> Option<usize> {
        self.left_child[node].map(|left| left + 1)
    }

    fn is_leaf(&self, node: usize) -> bool {
        self.left_child[node].is_none()
    }

    /// Rightmost leaf of `node`'s subtree: the finest-grained loop index the
    /// node's value still directly depends on. Splitting an already-split
    /// index resolves to this leaf.
    fn smallest_leaf(&self, mut node: usize) -> usize {
        while let Some(right) = self.right_child(node) {
            node = right;
        }
        node
    }

    /// Resolves any index of this dimension to the loop index a further
    /// split (or loop placement) of it would target.
    pub fn resolve_loop_index(&self, index: &Index) -> Result<Index> {
        let node = self.require_node(index)?;
        Ok(self.indices[self.smallest_leaf(node)].clone())
    }

    /// Splits `index` into `(outer, inner)` chunks of `size` iterations.
    ///
    /// The target (resolved to its smallest leaf) becomes a computed index.
    /// `size` need not divide the extent; the short final chunk is clipped
    /// during generation, not here.
    pub fn split(&mut self, index: &Index, size: i64) -> Result<SplitIndex> {
        ensure!(size > 0, InvalidSplitSizeSnafu { size });
        let target = self.smallest_leaf(self.require_node(index)?);
        let parent_range = self.ranges[target];

        let outer = Index::new(format!("{}_{}", self.dimension.name(), self.indices.len() - 1));
        let inner = Index::new(format!("{}_{}", self.dimension.name(), self.indices.len()));
        let outer_range = Range::with_increment(parent_range.begin(), parent_range.end(), size);
        let inner_range = Range::with_increment(0, size.min(parent_range.size()), parent_range.increment());

        let left = self.indices.len();
        self.left_child[target] = Some(left);
        for (idx, range) in [(outer.clone(), outer_range), (inner.clone(), inner_range)] {
            self.indices.push(idx);
            self.ranges.push(range);
            self.parent.push(Some(target));
            self.left_child.push(None);
        }
        self.split_count += 1;
        Ok(SplitIndex { outer, inner })
    }

    pub fn range_of(&self, index: &Index) -> Result<Range> {
        Ok(self.ranges[self.require_node(index)?])
    }

    pub fn is_loop_index(&self, index: &Index) -> bool {
        self.node_of(index).is_some_and(|node| self.is_leaf(node))
    }

    pub fn is_computed_index(&self, index: &Index) -> bool {
        self.node_of(index).is_some_and(|node| !self.is_leaf(node))
    }

    pub fn parent_of(&self, index: &Index) -> Option<Index> {
        let node = self.node_of(index)?;
        self.parent[node].map(|p| self.indices[p].clone())
    }

    /// `(outer, inner)` children of a split index, if it has been split.
    pub fn children_of(&self, index: &Index) -> Option<SplitIndex> {
        let node = self.node_of(index)?;
        let left = self.left_child[node]?;
        Some(SplitIndex { outer: self.indices[left].clone(), inner: self.indices[left + 1].clone() })
    }

    /// Whether `index` is the outer (left) child of its parent.
    pub fn is_outer_child(&self, index: &Index) -> bool {
        self.node_of(index)
            .and_then(|node| self.parent[node].map(|p| self.left_child[p] == Some(node)))
            .unwrap_or(false)
    }

    /// All ancestors of `index`, nearest first, ending at the primary.
    pub fn all_parent_indices(&self, index: &Index) -> Result<SmallVec<[Index; 4]>> {
        let mut node = self.require_node(index)?;
        let mut out = SmallVec::new();
        while let Some(p) = self.parent[node] {
            out.push(self.indices[p].clone());
            node = p;
        }
        Ok(out)
    }

    /// Every index in `index`'s subtree, excluding `index` itself.
    pub fn dependent_indices(&self, index: &Index) -> Result<SmallVec<[Index; 4]>> {
        let node = self.require_node(index)?;
        let mut out = SmallVec::new();
        self.collect(node, false, &mut |_, _| true, &mut out);
        Ok(out)
    }

    /// Loop (leaf) indices in `index`'s subtree, in outer-to-inner tree
    /// order. A leaf index yields itself.
    pub fn dependent_loop_indices(&self, index: &Index) -> Result<SmallVec<[Index; 4]>> {
        let node = self.require_node(index)?;
        if self.is_leaf(node) {
            return Ok(SmallVec::from_iter([self.indices[node].clone()]));
        }
        let mut out = SmallVec::new();
        self.collect(node, false, &mut |tree, n| tree.is_leaf(n), &mut out);
        Ok(out)
    }

    fn collect(
        &self,
        node: usize,
        include_self: bool,
        keep: &mut impl FnMut(&Self, usize) -> bool,
        out: &mut SmallVec<[Index; 4]>,
    ) {
        if include_self && keep(self, node) {
            out.push(self.indices[node].clone());
        }
        if let Some(left) = self.left_child[node] {
            self.collect(left, true, keep, out);
            self.collect(left + 1, true, keep, out);
        }
    }

    /// Whether `index` is in `ancestor`'s subtree (strictly below it).
    pub fn depends_on(&self, index: &Index, ancestor: &Index) -> bool {
        let Some(mut node) = self.node_of(index) else { return false };
        let Some(top) = self.node_of(ancestor) else { return false };
        while let Some(p) = self.parent[node] {
            if p == top {
                return true;
            }
            node = p;
        }
        false
    }

    /// Leaf loop indices of the whole dimension, outer-to-inner.
    pub fn loop_indices(&self) -> SmallVec<[Index; 4]> {
        let mut out = SmallVec::new();
        self.collect(0, true, &mut |tree, n| tree.is_leaf(n), &mut out);
        out
    }

    /// Interior (computed) indices of the whole dimension.
    pub fn computed_indices(&self) -> SmallVec<[Index; 4]> {
        let mut out = SmallVec::new();
        self.collect(0, true, &mut |tree, n| !tree.is_leaf(n), &mut out);
        out
    }
}
