//! Kernels: named leaf computations fired at resolved loop positions.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use smallvec::SmallVec;
use tessel_ir::{Index, Operand};

/// Kernel callbacks receive the (possibly renamed) operands and the concrete
/// values of the kernel's declared indices, in declaration order.
pub type KernelFn = dyn Fn(&[Operand], &[i64]) -> tessel_ir::Result<()> + Send + Sync;

static NEXT_KERNEL_ID: AtomicUsize = AtomicUsize::new(0);
static NEXT_SLOT_ID: AtomicUsize = AtomicUsize::new(0);

/// Unique identity of one registered kernel; used by rename-rule exclusion
/// lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelId(usize);

/// Logical placement slot. Kernels sharing a slot are mutually exclusive
/// alternatives at one position (boundary specialization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(usize);

/// A named computation over a fixed set of operands and index values.
///
/// Built by chaining:
///
/// ```
/// use tessel_ir::{Operand, Tensor};
/// use tessel_schedule::Kernel;
/// # use tessel_ir::Index;
///
/// let m = Operand::new(&Tensor::zeros("m", &[4, 5]));
/// let (i, j) = (Index::new("i"), Index::new("j"));
/// let kernel = Kernel::new("compute")
///     .args([m.clone()])
///     .indices([i, j])
///     .define(|ops, idx| ops[0].set(&[idx[0], idx[1]], (idx[0] * 2 + idx[1] * 5) as f64));
/// assert_eq!(kernel.name(), "compute");
/// ```
#[derive(Clone)]
pub struct Kernel {
    id: KernelId,
    slot: SlotId,
    name: Arc<str>,
    args: SmallVec<[Operand; 4]>,
    indices: SmallVec<[Index; 4]>,
    runner: Arc<KernelFn>,
}

/// Builder half of [`Kernel`]; [`KernelBuilder::define`] completes it.
pub struct KernelBuilder {
    slot: Option<SlotId>,
    name: Arc<str>,
    args: SmallVec<[Operand; 4]>,
    indices: SmallVec<[Index; 4]>,
}

impl Kernel {
    pub fn new(name: impl AsRef<str>) -> KernelBuilder {
        KernelBuilder { slot: None, name: Arc::from(name.as_ref()), args: SmallVec::new(), indices: SmallVec::new() }
    }

    pub fn id(&self) -> KernelId {
        self.id
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Operand] {
        &self.args
    }

    pub fn indices(&self) -> &[Index] {
        &self.indices
    }

    pub fn invoke(&self, args: &[Operand], index_values: &[i64]) -> tessel_ir::Result<()> {
        (self.runner)(args, index_values)
    }

    /// Copy of this kernel with its index list rewritten through `map`;
    /// used when fusion unifies index pairs.
    pub(crate) fn with_substituted_indices(&self, map: &dyn Fn(&Index) -> Option<Index>) -> Self {
        let indices = self.indices.iter().map(|index| map(index).unwrap_or_else(|| index.clone())).collect();
        Self { indices, ..self.clone() }
    }
}

impl KernelBuilder {
    pub fn args(mut self, args: impl IntoIterator<Item = Operand>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    pub fn indices(mut self, indices: impl IntoIterator<Item = Index>) -> Self {
        self.indices = indices.into_iter().collect();
        self
    }

    /// Places this kernel in the same slot as `other`, making the two
    /// mutually exclusive alternatives.
    pub fn same_slot_as(mut self, other: &Kernel) -> Self {
        self.slot = Some(other.slot());
        self
    }

    pub fn define(self, runner: impl Fn(&[Operand], &[i64]) -> tessel_ir::Result<()> + Send + Sync + 'static) -> Kernel {
        Kernel {
            id: KernelId(NEXT_KERNEL_ID.fetch_add(1, Ordering::Relaxed)),
            slot: self.slot.unwrap_or_else(|| SlotId(NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed))),
            name: self.name,
            args: self.args,
            indices: self.indices,
            runner: Arc::new(runner),
        }
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.name)
            .field("slot", &self.slot)
            .field("indices", &self.indices)
            .finish_non_exhaustive()
    }
}
