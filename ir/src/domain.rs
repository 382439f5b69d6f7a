//! Multi-dimensional iteration domains.

use std::collections::HashMap;

use smallvec::SmallVec;
use snafu::ensure;

use crate::dimension::{DimensionTree, SplitIndex};
use crate::error::{DuplicateDimensionSnafu, Result, UnknownIndexSnafu};
use crate::index::Index;
use crate::range::{IndexRange, Range};

/// One term of an affine index recombination; the scale is the coefficient
/// applied to the loop variable (always 1 here, since outer loop variables
/// already step by their chunk size).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaledIndex {
    pub scale: i64,
    pub index: Index,
}

/// Affine recombination of a computed index from loop indices:
/// `begin + sum(scale_k * index_k)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexExpression {
    pub terms: SmallVec<[ScaledIndex; 2]>,
    pub begin: i64,
}

/// The set of iteration indices, their ranges, and the derivation trees
/// created by splitting.
///
/// Built from `(index, range)` pairs; every further index comes out of
/// [`IterationDomain::split`]. All queries are pure and stable under later
/// splits.
///
/// # Example
///
/// ```
/// use tessel_ir::{Index, IndexRange, IterationDomain, Range};
///
/// let i = Index::new("i");
/// let mut domain = IterationDomain::new([IndexRange::new(i.clone(), Range::new(0, 10))]).unwrap();
/// let split = domain.split(&i, 4).unwrap();
/// assert!(domain.is_computed_index(&i));
/// assert_eq!(domain.base_index(&split.inner).unwrap(), i);
/// ```
#[derive(Debug, Clone, Default)]
pub struct IterationDomain {
    dimensions: Vec<DimensionTree>,
    base_index: HashMap<Index, Index>,
}

impl IterationDomain {
    pub fn new(ranges: impl IntoIterator<Item = IndexRange>) -> Result<Self> {
        let mut domain = Self::default();
        for index_range in ranges {
            domain.add_dimension(index_range)?;
        }
        Ok(domain)
    }

    /// Adds a primary dimension; duplicate indices are a configuration error.
    pub fn add_dimension(&mut self, index_range: IndexRange) -> Result<()> {
        ensure!(
            !self.base_index.contains_key(&index_range.index),
            DuplicateDimensionSnafu { index: index_range.index.clone() }
        );
        self.base_index.insert(index_range.index.clone(), index_range.index.clone());
        self.dimensions.push(DimensionTree::new(index_range));
        Ok(())
    }

    pub fn num_dimensions(&self) -> usize {
        self.dimensions.len()
    }

    pub fn num_splits(&self) -> usize {
        self.dimensions.iter().map(DimensionTree::num_splits).sum()
    }

    /// Primary indices in declaration order.
    pub fn primary_indices(&self) -> SmallVec<[Index; 4]> {
        self.dimensions.iter().map(|d| d.dimension().clone()).collect()
    }

    pub fn has_index(&self, index: &Index) -> bool {
        self.base_index.contains_key(index)
    }

    pub fn is_primary_dimension(&self, index: &Index) -> bool {
        self.dimensions.iter().any(|d| d.dimension() == index)
    }

    /// The primary dimension every derived index resolves back to.
    pub fn base_index(&self, index: &Index) -> Result<Index> {
        self.base_index.get(index).cloned().ok_or_else(|| UnknownIndexSnafu { index: index.clone() }.build())
    }

    pub fn same_dimension(&self, a: &Index, b: &Index) -> bool {
        match (self.base_index.get(a), self.base_index.get(b)) {
            (Some(base_a), Some(base_b)) => base_a == base_b,
            _ => false,
        }
    }

    pub fn dimension_tree(&self, index: &Index) -> Result<&DimensionTree> {
        let base = self.base_index(index)?;
        // The base always names an existing tree.
        Ok(self.dimensions.iter().find(|d| *d.dimension() == base).unwrap())
    }

    fn dimension_tree_mut(&mut self, index: &Index) -> Result<&mut DimensionTree> {
        let base = self.base_index(index)?;
        Ok(self.dimensions.iter_mut().find(|d| *d.dimension() == base).unwrap())
    }

    /// Splits `index` into `(outer, inner)`; see [`DimensionTree::split`].
    pub fn split(&mut self, index: &Index, size: i64) -> Result<SplitIndex> {
        let base = self.base_index(index)?;
        let split = self.dimension_tree_mut(index)?.split(index, size)?;
        self.base_index.insert(split.outer.clone(), base.clone());
        self.base_index.insert(split.inner.clone(), base);
        Ok(split)
    }

    pub fn resolve_loop_index(&self, index: &Index) -> Result<Index> {
        self.dimension_tree(index)?.resolve_loop_index(index)
    }

    pub fn range_of(&self, index: &Index) -> Result<Range> {
        self.dimension_tree(index)?.range_of(index)
    }

    pub fn is_loop_index(&self, index: &Index) -> bool {
        self.dimension_tree(index).map(|d| d.is_loop_index(index)).unwrap_or(false)
    }

    pub fn is_computed_index(&self, index: &Index) -> bool {
        self.dimension_tree(index).map(|d| d.is_computed_index(index)).unwrap_or(false)
    }

    pub fn parent_of(&self, index: &Index) -> Option<Index> {
        self.dimension_tree(index).ok()?.parent_of(index)
    }

    pub fn children_of(&self, index: &Index) -> Option<SplitIndex> {
        self.dimension_tree(index).ok()?.children_of(index)
    }

    pub fn is_outer_child(&self, index: &Index) -> bool {
        self.dimension_tree(index).map(|d| d.is_outer_child(index)).unwrap_or(false)
    }

    pub fn all_parent_indices(&self, index: &Index) -> Result<SmallVec<[Index; 4]>> {
        self.dimension_tree(index)?.all_parent_indices(index)
    }

    pub fn dependent_indices(&self, index: &Index) -> Result<SmallVec<[Index; 4]>> {
        self.dimension_tree(index)?.dependent_indices(index)
    }

    pub fn dependent_loop_indices(&self, index: &Index) -> Result<SmallVec<[Index; 4]>> {
        self.dimension_tree(index)?.dependent_loop_indices(index)
    }

    pub fn depends_on(&self, index: &Index, ancestor: &Index) -> bool {
        self.dimension_tree(index).map(|d| d.depends_on(index, ancestor)).unwrap_or(false)
    }

    /// All loop indices of the domain: dimensions in declaration order, each
    /// outer-to-inner.
    pub fn all_loop_indices(&self) -> Vec<Index> {
        self.dimensions.iter().flat_map(|d| d.loop_indices()).collect()
    }

    /// How a (possibly computed) index recombines from loop variables. The
    /// value of a split index is the sum of the loop variables in its
    /// subtree plus its range begin.
    pub fn index_expression(&self, index: &Index) -> Result<IndexExpression> {
        let leaves = self.dependent_loop_indices(index)?;
        // Outer loop variables iterate absolute chunk begins, so the sum of
        // the subtree's loop variables is already the absolute value.
        Ok(IndexExpression { terms: leaves.into_iter().map(|index| ScaledIndex { scale: 1, index }).collect(), begin: 0 })
    }
}
