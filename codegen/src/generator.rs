//! The generation walk: lowers structural constraints to predicates, then
//! recursively emits the ordered loop nest, partitioning each loop at
//! boundary and predicate split points and firing kernel groups at their
//! resolved positions.

use smallvec::SmallVec;
use snafu::{ensure, ResultExt};
use tracing::{debug, trace};

use tessel_ir::error::UndefinedIndexValueSnafu;
use tessel_ir::{Fragment, Index, KernelPredicate, Operand, Placement, Range};
use tessel_schedule::{CodePosition, Kernel, LoopNest, ScheduledKernel};

use crate::context::LoopContext;
use crate::error::{
    Error, KernelFailedSnafu, ParallelWorkerPanickedSnafu, Result, UnsatisfiableKernelPlacementSnafu,
    UnusedCacheOperandSnafu,
};
use crate::predicate_eval::evaluate;
use crate::program::{LoopDescriptor, Program};
use crate::visit::LoopVisitSchedule;

/// Which side of the child loops a kernel fires on within its level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Before descending into deeper loops: prologue and body kernels.
    Pre,
    /// After the deeper loops complete: epilogue and `After`-placed kernels.
    Post,
}

/// How strongly a registration is guarded; decides evaluation order within
/// a slot (more specific alternatives are tested before the primary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum GuardRank {
    Explicit,
    Lowered,
    Plain,
}

/// One registration after planning: the conjoined guard (explicit predicate
/// plus lowered structural constraints), the loop level whose iteration it
/// attaches to (`None` is the virtual root around the whole nest), and the
/// firing phase.
#[derive(Debug)]
struct PlannedKernel {
    scheduled: ScheduledKernel,
    guard: KernelPredicate,
    level: Option<usize>,
    phase: Phase,
    rank: GuardRank,
}

/// Turns a [`LoopNest`] into an executed [`Program`].
///
/// Generation both runs the registered kernel callbacks and records the loop
/// structure it walked, so callers can inspect boundary partitioning and
/// invocation counts of the emitted code.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeGenerator;

impl CodeGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, nest: &LoopNest) -> Result<Program> {
        let generation = Generation::plan(nest)?;
        debug!(
            levels = generation.schedule.num_levels(),
            kernels = generation.planned.len(),
            "generate"
        );
        generation.run()
    }
}

struct Generation<'a> {
    nest: &'a LoopNest,
    schedule: LoopVisitSchedule,
    planned: Vec<PlannedKernel>,
    /// Slot groups with members ordered guarded-before-primary.
    groups: Vec<Vec<usize>>,
    /// Fragment atoms of all guards, resolved to loop leaves; the source of
    /// predicate split points for loop partitioning.
    atoms: Vec<(Index, Fragment)>,
}

impl<'a> Generation<'a> {
    fn plan(nest: &'a LoopNest) -> Result<Self> {
        let schedule = LoopVisitSchedule::new(nest)?;
        let domain = nest.domain();

        let mut planned = Vec::with_capacity(nest.kernels().len());
        for scheduled in nest.kernels() {
            let kernel = &scheduled.kernel;
            let required = scheduled.constraints.as_ref().map(|c| c.required()).unwrap_or(&[]);
            let boundary = scheduled.constraints.as_ref().map(|c| c.boundary()).unwrap_or(&[]);
            let position =
                scheduled.constraints.as_ref().map(|c| c.position()).unwrap_or(CodePosition::Body);

            for index in kernel.indices().iter().chain(required).chain(boundary) {
                if !domain.has_index(index) {
                    return UnsatisfiableKernelPlacementSnafu { name: kernel.name(), index: index.clone() }
                        .fail();
                }
            }

            // The level a kernel attaches to is the innermost loop any of its
            // declared or required indices depends on.
            let mut level = None;
            for index in kernel.indices().iter().chain(required) {
                for leaf in domain.dependent_loop_indices(index)? {
                    let position = schedule.position_of(&leaf).ok_or_else(|| {
                        UnsatisfiableKernelPlacementSnafu { name: kernel.name(), index: leaf.clone() }.build()
                    })?;
                    level = level.max(Some(position));
                }
            }

            // Dimensions the registration says nothing about get a structural
            // guard: prologue and body kernels fire on their first iteration,
            // epilogue kernels on their last. Dimensions already mentioned
            // (including through the explicit predicate) are left to the
            // registration's own rules.
            let mut mentioned: SmallVec<[Index; 4]> = SmallVec::new();
            for index in kernel
                .indices()
                .iter()
                .chain(required)
                .chain(boundary)
                .cloned()
                .chain(scheduled.predicate.indices())
            {
                if domain.has_index(&index) {
                    let base = domain.base_index(&index)?;
                    if !mentioned.contains(&base) {
                        mentioned.push(base);
                    }
                }
            }
            let mut lowered = KernelPredicate::Empty;
            for primary in domain.primary_indices() {
                if mentioned.contains(&primary) {
                    continue;
                }
                lowered = lowered.and(match position {
                    CodePosition::Prologue | CodePosition::Body => KernelPredicate::first(&primary),
                    CodePosition::Epilogue => KernelPredicate::last(&primary),
                });
            }
            for index in boundary {
                lowered = lowered.and(KernelPredicate::before(index));
            }

            let rank = if scheduled.is_guarded() {
                GuardRank::Explicit
            } else if !lowered.is_empty() {
                GuardRank::Lowered
            } else {
                GuardRank::Plain
            };
            let phase = if position == CodePosition::Epilogue || mentions_after(&scheduled.predicate) {
                Phase::Post
            } else {
                Phase::Pre
            };
            let guard = scheduled.predicate.clone().and(lowered).simplify();
            trace!(kernel = kernel.name(), ?level, ?phase, "planned kernel");
            planned.push(PlannedKernel { scheduled: scheduled.clone(), guard, level, phase, rank });
        }

        // A rename whose source operand no applicable kernel takes can never
        // fire; the cache registration behind it is misdirected.
        for action in nest.renames() {
            let used = nest.kernels().iter().any(|scheduled| {
                !action.excluded.contains(&scheduled.kernel.id())
                    && scheduled.kernel.args().iter().any(|arg| arg.same_as(&action.operand))
            });
            ensure!(used, UnusedCacheOperandSnafu { operand: action.operand.clone() });
        }

        let mut groups: Vec<Vec<usize>> = nest.kernel_groups().into_iter().map(|g| g.members).collect();
        for group in &mut groups {
            group.sort_by_key(|&member| planned[member].rank);
        }

        let mut atoms: Vec<(Index, Fragment)> = Vec::new();
        for kernel in &planned {
            collect_fragment_atoms(&kernel.guard, &mut |index, fragment| {
                if let Ok(leaves) = domain.dependent_loop_indices(index) {
                    for leaf in leaves {
                        if !atoms.contains(&(leaf.clone(), fragment)) {
                            atoms.push((leaf, fragment));
                        }
                    }
                }
            });
        }

        Ok(Self { nest, schedule, planned, groups, atoms })
    }

    fn run(&self) -> Result<Program> {
        let mut ctx = LoopContext::default();
        self.invoke_groups(None, Phase::Pre, &mut ctx)?;
        if self.schedule.num_levels() > 0 {
            self.emit_loop(0, &mut ctx)?;
        }
        self.invoke_groups(None, Phase::Post, &mut ctx)?;
        Ok(ctx.program)
    }

    /// The end of the value space actually reachable for `index` under the
    /// current outer bindings. Inner split loops get clipped when their outer
    /// sibling sits in a remainder chunk.
    fn available_extent(&self, index: &Index, ctx: &LoopContext) -> Result<i64> {
        let domain = self.nest.domain();
        match domain.parent_of(index) {
            None => Ok(domain.range_of(index)?.end()),
            Some(parent) => {
                // A parent is by construction a split index with two children.
                let children = domain.children_of(&parent).unwrap();
                let parent_extent = self.available_extent(&parent, ctx)?;
                if children.outer == *index {
                    Ok(parent_extent)
                } else {
                    // The outer sibling may itself have been split, leaving
                    // it computed; recombine its value from its leaves.
                    let outer = self.index_value(&children.outer, ctx)?;
                    Ok(domain.range_of(index)?.end().min(parent_extent - outer))
                }
            }
        }
    }

    /// Partitions a clipped loop range at its boundary chunk and at every
    /// split point some guard distinguishes, so each partition evaluates all
    /// guards uniformly.
    fn partition(&self, index: &Index, range: Range) -> SmallVec<[Range; 2]> {
        let mut points: SmallVec<[i64; 4]> = SmallVec::new();
        if range.boundary_size() > 0 {
            points.push(range.non_boundary_end());
        }
        for (leaf, fragment) in &self.atoms {
            if leaf != index {
                continue;
            }
            match fragment {
                Fragment::First => points.push(range.begin() + range.increment()),
                Fragment::Last => points.push(range.last_iteration_begin()),
                Fragment::EndBoundary if range.boundary_size() > 0 => points.push(range.non_boundary_end()),
                _ => {}
            }
        }
        points.retain(|p| *p > range.begin() && *p < range.end());
        points.sort_unstable();
        points.dedup();

        let mut parts = SmallVec::new();
        let mut begin = range.begin();
        for point in points {
            parts.push(Range::with_increment(begin, point, range.increment()));
            begin = point;
        }
        parts.push(Range::with_increment(begin, range.end(), range.increment()));
        parts
    }

    fn emit_loop(&self, level: usize, ctx: &mut LoopContext) -> Result<()> {
        let info = self.schedule.level(level).clone();
        let range = info.range.clipped_to(self.available_extent(&info.index, ctx)?);
        for part in self.partition(&info.index, range) {
            let parallel = info.parallel.filter(|&workers| workers >= 2 && part.num_iterations() >= 2);
            ctx.program.record_loop(LoopDescriptor {
                index: info.index.clone(),
                range: part,
                depth: level,
                parallel,
                unrolled: info.unrolled,
            });
            match parallel {
                Some(workers) => self.emit_parallel(level, part, range, workers, ctx)?,
                None => {
                    for value in part.iter() {
                        self.emit_iteration(level, value, range, ctx)?;
                    }
                }
            }
        }
        // The symbol keeps its final value so epilogues above can still read
        // it; only the state flips.
        ctx.mark_done(&info.index);
        Ok(())
    }

    fn emit_iteration(&self, level: usize, value: i64, loop_range: Range, ctx: &mut LoopContext) -> Result<()> {
        let info = self.schedule.level(level);
        ctx.define(&info.index, value, loop_range);
        for deeper in level + 1..self.schedule.num_levels() {
            ctx.undefine(&self.schedule.level(deeper).index);
        }
        self.invoke_groups(Some(level), Phase::Pre, ctx)?;
        if level + 1 < self.schedule.num_levels() {
            self.emit_loop(level + 1, ctx)?;
        }
        self.invoke_groups(Some(level), Phase::Post, ctx)?;
        Ok(())
    }

    fn emit_parallel(
        &self,
        level: usize,
        part: Range,
        loop_range: Range,
        workers: usize,
        ctx: &mut LoopContext,
    ) -> Result<()> {
        let per_worker = (part.num_iterations() + workers as i64 - 1) / workers as i64;
        let mut chunks: SmallVec<[Range; 4]> = SmallVec::new();
        for worker in 0..workers as i64 {
            let begin = part.begin() + worker * per_worker * part.increment();
            let end = part.end().min(begin + per_worker * part.increment());
            if begin < end {
                chunks.push(Range::with_increment(begin, end, part.increment()));
            }
        }
        let index = self.schedule.level(level).index.clone();
        debug!(%index, chunks = chunks.len(), "parallel partition");

        let results: Vec<Result<LoopContext>> = std::thread::scope(|scope| {
            let handles: Vec<_> = chunks
                .iter()
                .map(|&chunk| {
                    let mut fork = ctx.fork();
                    scope.spawn(move || -> Result<LoopContext> {
                        for value in chunk.iter() {
                            self.emit_iteration(level, value, loop_range, &mut fork)?;
                        }
                        Ok(fork)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| ParallelWorkerPanickedSnafu { index: index.clone() }.fail())
                })
                .collect()
        });

        let last = results.len() - 1;
        for (position, result) in results.into_iter().enumerate() {
            // The last chunk's bindings survive, as if the loop had run
            // sequentially.
            ctx.absorb(result?, position == last);
        }
        Ok(())
    }

    /// Fires the groups attached to this point. Within a group the first
    /// member whose guard holds fires and shadows the rest.
    fn invoke_groups(&self, level: Option<usize>, phase: Phase, ctx: &mut LoopContext) -> Result<()> {
        for group in &self.groups {
            for &member in group {
                let planned = &self.planned[member];
                if planned.level != level || planned.phase != phase {
                    continue;
                }
                if evaluate(&planned.guard, ctx, self.nest.domain())? {
                    self.invoke(planned, ctx)?;
                    break;
                }
            }
        }
        Ok(())
    }

    fn invoke(&self, planned: &PlannedKernel, ctx: &mut LoopContext) -> Result<()> {
        let kernel = &planned.scheduled.kernel;
        let mut values: SmallVec<[i64; 4]> = SmallVec::with_capacity(kernel.indices().len());
        for index in kernel.indices() {
            values.push(self.index_value(index, ctx)?);
        }
        let args = self.resolve_args(kernel, ctx);
        trace!(kernel = kernel.name(), values = ?values, "invoke");
        ctx.program.record_invocation(kernel.name());
        kernel.invoke(&args, &values).context(KernelFailedSnafu { name: kernel.name() })
    }

    /// Concrete value of a kernel index: loop indices read their symbol,
    /// computed indices recombine as the sum of their subtree's loop
    /// variables.
    fn index_value(&self, index: &Index, ctx: &LoopContext) -> Result<i64> {
        let domain = self.nest.domain();
        let value_of = |index: &Index| -> Result<i64> {
            ctx.value_of(index)
                .ok_or_else(|| Error::from(UndefinedIndexValueSnafu { index: index.clone() }.build()))
        };
        if domain.is_loop_index(index) {
            return value_of(index);
        }
        let mut sum = 0;
        for leaf in domain.dependent_loop_indices(index)? {
            sum += value_of(&leaf)?;
        }
        Ok(sum)
    }

    /// Applies the nest's rename actions to the kernel's operand list. An
    /// action applies when its scope indices are all defined and the kernel
    /// is not on its exclusion list; actions chain in registration order.
    fn resolve_args(&self, kernel: &Kernel, ctx: &LoopContext) -> SmallVec<[Operand; 4]> {
        let domain = self.nest.domain();
        kernel
            .args()
            .iter()
            .map(|arg| {
                let mut current = arg.clone();
                for action in self.nest.renames() {
                    if action.excluded.contains(&kernel.id()) || !action.operand.same_as(&current) {
                        continue;
                    }
                    let in_scope = action.where_indices.iter().all(|scope| {
                        domain
                            .dependent_loop_indices(scope)
                            .map(|leaves| leaves.iter().all(|leaf| ctx.is_defined(leaf)))
                            .unwrap_or(false)
                    });
                    if in_scope {
                        current = action.replacement.clone();
                    }
                }
                current
            })
            .collect()
    }
}

fn mentions_after(predicate: &KernelPredicate) -> bool {
    match predicate {
        KernelPredicate::Placement { placement: Placement::After, .. } => true,
        KernelPredicate::And(a, b) | KernelPredicate::Or(a, b) => mentions_after(a) || mentions_after(b),
        _ => false,
    }
}

fn collect_fragment_atoms(predicate: &KernelPredicate, sink: &mut impl FnMut(&Index, Fragment)) {
    match predicate {
        KernelPredicate::Fragment { index, fragment } => sink(index, *fragment),
        KernelPredicate::And(a, b) | KernelPredicate::Or(a, b) => {
            collect_fragment_atoms(a, sink);
            collect_fragment_atoms(b, sink);
        }
        _ => {}
    }
}
