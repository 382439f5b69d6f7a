//! Runtime predicate evaluation against the walk's symbol table.

use tessel_ir::{Fragment, Index, IterationDomain, KernelPredicate, Placement};

use crate::context::{LoopContext, LoopState};
use crate::error::Result;

/// Evaluates a predicate at the current binding.
///
/// A loop that has not been entered yet counts as being "at its beginning":
/// `First` holds for undefined indices (prologue kernels fire before the
/// loops they do not mention), while `Last`, `EndBoundary`, and `After`
/// require the loop to have actually run.
pub(crate) fn evaluate(
    predicate: &KernelPredicate,
    ctx: &LoopContext,
    domain: &IterationDomain,
) -> Result<bool> {
    match predicate {
        KernelPredicate::Empty => Ok(true),
        KernelPredicate::Constant(value) => Ok(*value),
        KernelPredicate::Fragment { index, fragment } => evaluate_fragment(index, *fragment, ctx, domain),
        KernelPredicate::IsDefined { index } => {
            if !domain.has_index(index) {
                return Ok(false);
            }
            Ok(domain.dependent_loop_indices(index)?.iter().all(|leaf| ctx.is_defined(leaf)))
        }
        KernelPredicate::Placement { index: None, .. } => Ok(true),
        KernelPredicate::Placement { index: Some(index), placement } => {
            let leaves = domain.dependent_loop_indices(index)?;
            Ok(match placement {
                Placement::Before => leaves.iter().all(|leaf| !ctx.is_defined(leaf)),
                Placement::After => leaves
                    .iter()
                    .all(|leaf| ctx.symbol(leaf).is_some_and(|entry| entry.state == LoopState::Done)),
            })
        }
        KernelPredicate::And(a, b) => Ok(evaluate(a, ctx, domain)? && evaluate(b, ctx, domain)?),
        KernelPredicate::Or(a, b) => Ok(evaluate(a, ctx, domain)? || evaluate(b, ctx, domain)?),
    }
}

fn evaluate_fragment(index: &Index, fragment: Fragment, ctx: &LoopContext, domain: &IterationDomain) -> Result<bool> {
    if fragment == Fragment::All {
        return Ok(true);
    }
    let leaves = domain.dependent_loop_indices(index)?;
    match fragment {
        Fragment::All => Ok(true),
        Fragment::First => Ok(leaves.iter().all(|leaf| {
            ctx.symbol(leaf).map(|entry| entry.value == entry.loop_range.begin()).unwrap_or(true)
        })),
        Fragment::Last => Ok(leaves.iter().all(|leaf| {
            ctx.symbol(leaf).is_some_and(|entry| entry.value == entry.loop_range.last_iteration_begin())
        })),
        // A binding is in the end boundary when it starts the short final
        // chunk of its own loop, or when its whole loop runs clipped because
        // an outer split is in its remainder region.
        Fragment::EndBoundary => Ok(leaves.iter().any(|leaf| {
            ctx.symbol(leaf).is_some_and(|entry| {
                let in_remainder_chunk = entry.loop_range.boundary_size() > 0
                    && entry.value == entry.loop_range.non_boundary_end();
                let loop_is_clipped = domain
                    .range_of(leaf)
                    .map(|full| entry.loop_range.end() < full.end())
                    .unwrap_or(false);
                in_remainder_chunk || loop_is_clipped
            })
        })),
    }
}
