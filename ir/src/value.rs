//! Operand storage and views.
//!
//! Operands seen by kernels are [`Operand`]s: shared, re-pointable cells
//! holding a [`View`] over a [`Tensor`]. Caching strategies exploit the
//! indirection: a copy-in kernel re-points the cell at a scratch tensor with
//! an origin offset, so compute kernels keep addressing elements with global
//! loop-index coordinates while the accesses land in the scratch buffer.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use smallvec::SmallVec;
use snafu::ensure;

use crate::error::{AccessOutOfBoundsSnafu, InvalidDimensionOrderSnafu, RankMismatchSnafu, Result};

pub type Element = f64;

/// Extents and strides of a dense tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    extents: SmallVec<[i64; 4]>,
    strides: SmallVec<[i64; 4]>,
}

impl Layout {
    pub fn row_major(extents: &[i64]) -> Self {
        let mut strides: SmallVec<[i64; 4]> = SmallVec::from_elem(1, extents.len());
        for dim in (0..extents.len().saturating_sub(1)).rev() {
            strides[dim] = strides[dim + 1] * extents[dim + 1];
        }
        Self { extents: SmallVec::from_slice(extents), strides }
    }

    /// Layout whose dimension `order[0]` varies slowest; `order` must be a
    /// permutation of `0..rank`.
    pub fn ordered(extents: &[i64], order: &[usize]) -> Result<Self> {
        let rank = extents.len();
        let mut seen = vec![false; rank];
        for &dim in order {
            if dim >= rank || seen[dim] {
                return InvalidDimensionOrderSnafu { order: order.to_vec(), rank }.fail();
            }
            seen[dim] = true;
        }
        ensure!(order.len() == rank, InvalidDimensionOrderSnafu { order: order.to_vec(), rank });

        let mut strides: SmallVec<[i64; 4]> = SmallVec::from_elem(0, rank);
        let mut running = 1;
        for &dim in order.iter().rev() {
            strides[dim] = running;
            running *= extents[dim];
        }
        Ok(Self { extents: SmallVec::from_slice(extents), strides })
    }

    pub fn rank(&self) -> usize {
        self.extents.len()
    }

    pub fn extents(&self) -> &[i64] {
        &self.extents
    }

    pub fn strides(&self) -> &[i64] {
        &self.strides
    }

    pub fn size(&self) -> i64 {
        self.extents.iter().product()
    }
}

static NEXT_TENSOR_ID: AtomicUsize = AtomicUsize::new(0);

/// Dense shared storage with a fixed layout. Cloning shares the storage.
#[derive(Clone)]
pub struct Tensor {
    id: usize,
    name: Arc<str>,
    layout: Layout,
    data: Arc<RwLock<Vec<Element>>>,
}

impl Tensor {
    pub fn zeros(name: impl AsRef<str>, extents: &[i64]) -> Self {
        let layout = Layout::row_major(extents);
        Self::with_layout(name, layout)
    }

    pub fn with_layout(name: impl AsRef<str>, layout: Layout) -> Self {
        let len = layout.size().max(0) as usize;
        Self {
            id: NEXT_TENSOR_ID.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name.as_ref()),
            layout,
            data: Arc::new(RwLock::new(vec![0.0; len])),
        }
    }

    /// Row-major tensor initialized from a function of the coordinates.
    pub fn from_fn(name: impl AsRef<str>, extents: &[i64], f: impl Fn(&[i64]) -> Element) -> Self {
        let tensor = Self::zeros(name, extents);
        {
            let mut data = tensor.data.write();
            let mut coords: SmallVec<[i64; 4]> = SmallVec::from_elem(0, extents.len());
            for flat in 0..tensor.layout.size() {
                let mut rest = flat;
                for (dim, &extent) in extents.iter().enumerate().rev() {
                    coords[dim] = rest % extent;
                    rest /= extent;
                }
                let offset: i64 = coords.iter().zip(tensor.layout.strides()).map(|(c, s)| c * s).sum();
                data[offset as usize] = f(&coords);
            }
        }
        tensor
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn extents(&self) -> &[i64] {
        self.layout.extents()
    }

    fn offset_of(&self, coords: &[i64]) -> Result<usize> {
        ensure!(coords.len() == self.layout.rank(), RankMismatchSnafu { expected: self.layout.rank(), actual: coords.len() });
        let offset: i64 = coords.iter().zip(self.layout.strides()).map(|(c, s)| c * s).sum();
        let len = self.data.read().len();
        ensure!(offset >= 0 && (offset as usize) < len, AccessOutOfBoundsSnafu { offset, len });
        Ok(offset as usize)
    }

    pub fn get(&self, coords: &[i64]) -> Result<Element> {
        let offset = self.offset_of(coords)?;
        Ok(self.data.read()[offset])
    }

    pub fn set(&self, coords: &[i64], value: Element) -> Result<()> {
        let offset = self.offset_of(coords)?;
        self.data.write()[offset] = value;
        Ok(())
    }

    pub fn fill(&self, value: Element) {
        self.data.write().fill(value);
    }

    pub fn to_vec(&self) -> Vec<Element> {
        self.data.read().clone()
    }

    /// Storage identity; clones of the same tensor share it.
    pub fn same_storage(&self, other: &Tensor) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor({} {:?})", self.name, self.layout.extents())
    }
}

/// Affine window into a tensor: coordinate `c` resolves to physical offset
/// `base + sum((c_d - origin_d) * stride_d)`.
///
/// A whole-tensor view has origin 0, base 0, and the tensor's own strides.
/// Cache views shift the origin to the tile begin so global coordinates map
/// into tile-local storage, and may carry strides unrelated to the backing
/// layout (e.g. a 2D window into a 3D packed buffer).
#[derive(Debug, Clone)]
pub struct View {
    tensor: Tensor,
    origin: SmallVec<[i64; 4]>,
    strides: SmallVec<[i64; 4]>,
    base: i64,
}

impl View {
    pub fn whole(tensor: &Tensor) -> Self {
        Self {
            origin: SmallVec::from_elem(0, tensor.layout().rank()),
            strides: SmallVec::from_slice(tensor.layout().strides()),
            base: 0,
            tensor: tensor.clone(),
        }
    }

    pub fn windowed(tensor: &Tensor, origin: &[i64], strides: &[i64], base: i64) -> Self {
        debug_assert_eq!(origin.len(), strides.len());
        Self {
            tensor: tensor.clone(),
            origin: SmallVec::from_slice(origin),
            strides: SmallVec::from_slice(strides),
            base,
        }
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn rank(&self) -> usize {
        self.origin.len()
    }

    fn offset_of(&self, coords: &[i64]) -> Result<usize> {
        ensure!(coords.len() == self.rank(), RankMismatchSnafu { expected: self.rank(), actual: coords.len() });
        let offset: i64 = self.base
            + coords.iter().zip(self.origin.iter()).zip(self.strides.iter()).map(|((c, o), s)| (c - o) * s).sum::<i64>();
        let len = self.tensor.data.read().len();
        ensure!(offset >= 0 && (offset as usize) < len, AccessOutOfBoundsSnafu { offset, len });
        Ok(offset as usize)
    }

    pub fn get(&self, coords: &[i64]) -> Result<Element> {
        let offset = self.offset_of(coords)?;
        Ok(self.tensor.data.read()[offset])
    }

    pub fn set(&self, coords: &[i64], value: Element) -> Result<()> {
        let offset = self.offset_of(coords)?;
        self.tensor.data.write()[offset] = value;
        Ok(())
    }
}

/// A shared, re-pointable view cell: the operand handle kernels receive.
///
/// Identity (for rename matching) is the cell itself, not the tensor behind
/// it, so re-pointing the view never changes which rename rules apply.
#[derive(Clone)]
pub struct Operand {
    cell: Arc<RwLock<View>>,
}

impl Operand {
    pub fn new(tensor: &Tensor) -> Self {
        Self::from_view(View::whole(tensor))
    }

    pub fn from_view(view: View) -> Self {
        Self { cell: Arc::new(RwLock::new(view)) }
    }

    pub fn get(&self, coords: &[i64]) -> Result<Element> {
        self.cell.read().get(coords)
    }

    pub fn set(&self, coords: &[i64], value: Element) -> Result<()> {
        self.cell.read().set(coords, value)
    }

    pub fn view(&self) -> View {
        self.cell.read().clone()
    }

    /// Re-points the cell; every clone of this operand observes the change.
    pub fn replace_view(&self, view: View) {
        *self.cell.write() = view;
    }

    pub fn tensor(&self) -> Tensor {
        self.cell.read().tensor().clone()
    }

    pub fn same_as(&self, other: &Operand) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl fmt::Debug for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Operand({:?})", self.cell.read().tensor())
    }
}
