//! Loop nests: an iteration domain plus kernel registrations, rename rules,
//! and per-loop execution marks.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use smallvec::SmallVec;
use snafu::ensure;
use tracing::debug;

use tessel_ir::{Index, IndexRange, IterationDomain, KernelPredicate, Operand, SplitIndex};

use crate::constraints::CodePositionConstraints;
use crate::error::{
    DuplicateOrderEntrySnafu, IncompatibleFusedRangesSnafu, InvalidParallelPartitionsSnafu, MismatchedSharedIndicesSnafu,
    MissingOrderEntrySnafu, OrderViolatesNestingSnafu, Result, UnknownOrderEntrySnafu,
};
use crate::kernel::{Kernel, KernelId, SlotId};

/// One kernel registration: the kernel plus how its firing position is
/// decided. `constraints` and `predicate` may both be present; constraints
/// are lowered to predicates at generation time and conjoined.
#[derive(Debug, Clone)]
pub struct ScheduledKernel {
    pub kernel: Kernel,
    pub constraints: Option<CodePositionConstraints>,
    pub predicate: KernelPredicate,
}

impl ScheduledKernel {
    /// Whether the registration carries an explicit guard beyond structure.
    pub fn is_guarded(&self) -> bool {
        !self.predicate.is_empty()
    }
}

/// Scopes an operand substitution to the sub-tree where all `where_indices`
/// are defined. Kernels in `excluded` (typically the cache's own copy
/// kernels) keep seeing the original operand.
#[derive(Debug, Clone)]
pub struct RenameAction {
    pub operand: Operand,
    pub replacement: Operand,
    pub where_indices: SmallVec<[Index; 4]>,
    pub excluded: SmallVec<[KernelId; 4]>,
}

/// Registrations sharing a slot, in registration order. Members are
/// mutually exclusive; the generator tests guarded members first and falls
/// back to the unguarded primary (ties by registration order).
#[derive(Debug, Clone)]
pub struct KernelGroup {
    pub slot: SlotId,
    pub members: Vec<usize>,
}

/// One iteration domain, its kernel registrations with placement rules,
/// rename scoping, and loop marks. Built once, mutated during scheduling,
/// then handed immutably to the generator.
#[derive(Debug, Clone, Default)]
pub struct LoopNest {
    domain: IterationDomain,
    order: Vec<Index>,
    kernels: Vec<ScheduledKernel>,
    renames: Vec<RenameAction>,
    parallel: HashMap<Index, usize>,
    unrolled: HashSet<Index>,
}

impl LoopNest {
    pub fn new(domain: IterationDomain) -> Self {
        let order = domain.all_loop_indices();
        Self { domain, order, ..Default::default() }
    }

    pub fn from_ranges(ranges: impl IntoIterator<Item = IndexRange>) -> Result<Self> {
        Ok(Self::new(IterationDomain::new(ranges)?))
    }

    pub fn domain(&self) -> &IterationDomain {
        &self.domain
    }

    /// Loop indices outermost-to-innermost.
    pub fn order(&self) -> &[Index] {
        &self.order
    }

    pub fn kernels(&self) -> &[ScheduledKernel] {
        &self.kernels
    }

    pub fn renames(&self) -> &[RenameAction] {
        &self.renames
    }

    pub fn parallel_partitions(&self, index: &Index) -> Option<usize> {
        self.parallel.get(index).copied()
    }

    pub fn is_unrolled(&self, index: &Index) -> bool {
        self.unrolled.contains(index)
    }

    /// Registers a kernel firing once per iteration at the innermost level
    /// its indices resolve to.
    pub fn add_kernel(&mut self, kernel: Kernel) {
        self.add_scheduled(ScheduledKernel { kernel, constraints: Some(CodePositionConstraints::body()), predicate: KernelPredicate::Empty });
    }

    pub fn add_kernel_with_constraints(&mut self, kernel: Kernel, constraints: CodePositionConstraints) {
        self.add_scheduled(ScheduledKernel { kernel, constraints: Some(constraints), predicate: KernelPredicate::Empty });
    }

    pub fn add_kernel_with_predicate(&mut self, kernel: Kernel, predicate: KernelPredicate) {
        self.add_scheduled(ScheduledKernel { kernel, constraints: None, predicate });
    }

    pub fn add_scheduled(&mut self, scheduled: ScheduledKernel) {
        debug!(kernel = scheduled.kernel.name(), slot = ?scheduled.kernel.slot(), "register kernel");
        self.kernels.push(scheduled);
    }

    pub fn add_rename_action(&mut self, action: RenameAction) {
        self.renames.push(action);
    }

    /// Splits `index` and keeps the loop order aligned: the outer index
    /// takes the split leaf's slot and the inner follows immediately, until
    /// a later `set_order` overrides the placement.
    pub fn split(&mut self, index: &Index, size: i64) -> Result<SplitIndex> {
        let target = self.domain.resolve_loop_index(index)?;
        let split = self.domain.split(index, size)?;
        // The target leaf is always in the order.
        let position = self.order.iter().position(|x| *x == target).unwrap();
        self.order[position] = split.outer.clone();
        self.order.insert(position + 1, split.inner.clone());
        debug!(%index, size, outer = %split.outer, inner = %split.inner, "split");
        Ok(split)
    }

    /// Replaces the loop order. Entries may name computed (already split)
    /// indices; each such entry denotes its first not-yet-placed dependent
    /// loop index. Every loop index must end up listed exactly once, and
    /// within a dimension outer split loops must precede their inners.
    pub fn set_order(&mut self, order: &[Index]) -> Result<()> {
        let mut resolved: Vec<Index> = Vec::with_capacity(self.order.len());
        for entry in order {
            ensure!(self.domain.has_index(entry), UnknownOrderEntrySnafu { index: entry.clone() });
            let candidates = if self.domain.is_loop_index(entry) {
                SmallVec::from_iter([entry.clone()])
            } else {
                self.domain.dependent_loop_indices(entry)?
            };
            let next = candidates.into_iter().find(|c| !resolved.contains(c));
            match next {
                Some(index) => resolved.push(index),
                None => return DuplicateOrderEntrySnafu { index: entry.clone() }.fail(),
            }
        }

        let all = self.domain.all_loop_indices();
        for index in &all {
            ensure!(resolved.contains(index), MissingOrderEntrySnafu { index: index.clone() });
        }
        ensure!(resolved.len() == all.len(), DuplicateOrderEntrySnafu { index: resolved[all.len()].clone() });

        // Outer split loops must come before their inners: per dimension the
        // resolved order has to match the tree's outer-to-inner leaf order.
        for primary in self.domain.primary_indices() {
            let tree_order = self.domain.dependent_loop_indices(&primary)?;
            let placed: Vec<&Index> = resolved.iter().filter(|x| tree_order.contains(x)).collect();
            for (a, b) in placed.iter().zip(tree_order.iter()) {
                ensure!(*a == b, OrderViolatesNestingSnafu { outer: b.clone(), inner: (*a).clone() });
            }
        }

        debug!(order = %resolved.iter().join(", "), "set loop order");
        self.order = resolved;
        Ok(())
    }

    /// Marks a loop for execution as `partitions` concurrent chunks. The
    /// caller is responsible for making partition effects disjoint.
    pub fn parallelize(&mut self, index: &Index, partitions: usize) -> Result<()> {
        ensure!(partitions >= 1, InvalidParallelPartitionsSnafu { index: index.clone(), partitions });
        let target = self.domain.resolve_loop_index(index)?;
        self.parallel.insert(target, partitions);
        Ok(())
    }

    /// Marks a loop for full replication per iteration value at generation
    /// time. Trip counts are always generation-time constants here.
    pub fn unroll(&mut self, index: &Index) -> Result<()> {
        let target = self.domain.resolve_loop_index(index)?;
        self.unrolled.insert(target);
        Ok(())
    }

    /// Kernel registrations grouped by slot, groups in first-registration
    /// order, members in registration order.
    pub fn kernel_groups(&self) -> Vec<KernelGroup> {
        let mut groups: Vec<KernelGroup> = Vec::new();
        for (position, scheduled) in self.kernels.iter().enumerate() {
            let slot = scheduled.kernel.slot();
            match groups.iter_mut().find(|g| g.slot == slot) {
                Some(group) => group.members.push(position),
                None => groups.push(KernelGroup { slot, members: vec![position] }),
            }
        }
        groups
    }
}

/// Merges two independently built nests, inferring shared indices by
/// identity: any index present in both domains is unified.
pub fn fuse(first: LoopNest, second: LoopNest) -> Result<LoopNest> {
    let shared: Vec<Index> =
        first.order.iter().filter(|index| second.domain.has_index(index)).cloned().collect();
    let pairs: Vec<(Index, Index)> = shared.iter().map(|i| (i.clone(), i.clone())).collect();
    fuse_pairs(first, second, &pairs)
}

/// Merges two nests, unifying `shared_in_first[k]` with `shared_in_second[k]`.
pub fn fuse_shared(
    first: LoopNest,
    second: LoopNest,
    shared_in_first: &[Index],
    shared_in_second: &[Index],
) -> Result<LoopNest> {
    ensure!(
        shared_in_first.len() == shared_in_second.len(),
        MismatchedSharedIndicesSnafu { left: shared_in_first.len(), right: shared_in_second.len() }
    );
    let pairs: Vec<(Index, Index)> =
        shared_in_first.iter().cloned().zip(shared_in_second.iter().cloned()).collect();
    fuse_pairs(first, second, &pairs)
}

/// Shared fusion core. The fused domain flattens every loop index of both
/// nests into a primary dimension of the union; first-nest kernels gain
/// `First` guards over the second nest's private indices (and second-nest
/// kernels `Last` guards over the first's), so the stages interleave without
/// re-running each other's work.
fn fuse_pairs(first: LoopNest, second: LoopNest, pairs: &[(Index, Index)]) -> Result<LoopNest> {
    let rename: HashMap<Index, Index> =
        pairs.iter().map(|(in_first, in_second)| (in_second.clone(), in_first.clone())).collect();
    let map = |index: &Index| rename.get(index).cloned();

    for (in_first, in_second) in pairs {
        let left = first.domain.range_of(in_first)?;
        let right = second.domain.range_of(in_second)?;
        ensure!(
            left == right,
            IncompatibleFusedRangesSnafu { index: in_first.clone(), left, right }
        );
    }

    let mut ranges: Vec<IndexRange> = Vec::new();
    for index in &first.order {
        ranges.push(IndexRange::new(index.clone(), first.domain.range_of(index)?));
    }
    let second_private: Vec<Index> =
        second.order.iter().filter(|index| !rename.contains_key(index)).cloned().collect();
    for index in &second_private {
        ranges.push(IndexRange::new(index.clone(), second.domain.range_of(index)?));
    }
    let first_private: Vec<Index> =
        first.order.iter().filter(|index| !pairs.iter().any(|(a, _)| a == *index)).cloned().collect();

    let mut fused = LoopNest::new(IterationDomain::new(ranges)?);

    for scheduled in &first.kernels {
        let mut predicate = scheduled.predicate.clone();
        for private in &second_private {
            predicate = predicate.and(KernelPredicate::first(private));
        }
        fused.add_scheduled(ScheduledKernel {
            kernel: scheduled.kernel.clone(),
            constraints: scheduled.constraints.clone(),
            predicate,
        });
    }
    for scheduled in &second.kernels {
        let mut predicate = scheduled.predicate.substitute(&map);
        for private in &first_private {
            predicate = predicate.and(KernelPredicate::last(private));
        }
        let constraints = scheduled.constraints.as_ref().map(|c| {
            let swap = |list: &[Index]| list.iter().map(|i| map(i).unwrap_or_else(|| i.clone())).collect::<Vec<_>>();
            CodePositionConstraints::new(c.position(), swap(c.required()), swap(c.boundary()))
        });
        fused.add_scheduled(ScheduledKernel {
            kernel: scheduled.kernel.with_substituted_indices(&map),
            constraints,
            predicate,
        });
    }

    fused.renames = first.renames.clone();
    for action in &second.renames {
        let mut action = action.clone();
        action.where_indices =
            action.where_indices.iter().map(|index| map(index).unwrap_or_else(|| index.clone())).collect();
        fused.renames.push(action);
    }
    for (index, partitions) in first.parallel.iter().chain(second.parallel.iter()) {
        let index = map(index).unwrap_or_else(|| index.clone());
        fused.parallel.insert(index, *partitions);
    }
    for index in first.unrolled.iter().chain(second.unrolled.iter()) {
        fused.unrolled.insert(map(index).unwrap_or_else(|| index.clone()));
    }
    Ok(fused)
}
