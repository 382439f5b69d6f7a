//! Output-accumulator caches: zero-init before first use, copied or reduced
//! back after.

use smallvec::SmallVec;
use tessel_ir::error::RankMismatchSnafu;
use tessel_ir::{Layout, Operand, Tensor, View};

use crate::cache::{
    for_each_coord, in_bounds, origin_from, origin_positions, region_extents, CacheArgs, CacheHandle, CachingStrategy,
};
use crate::constraints::CodePositionConstraints;
use crate::error::Result;
use crate::kernel::Kernel;
use crate::nest::{LoopNest, RenameAction};

/// Accumulator cache for GEMM-style kernels: the scratch region starts at
/// zero, compute kernels accumulate into it through the rename rule, and the
/// epilogue adds the partial results back into the operand.
#[derive(Debug, Clone, Default)]
pub struct ZeroInputReduceOutput;

/// Like [`ZeroInputReduceOutput`] but the epilogue overwrites the operand
/// region with the scratch contents instead of accumulating: for kernels
/// that fully compute each cached region in one pass.
#[derive(Debug, Clone, Default)]
pub struct ZeroInputCopyOutput;

impl CachingStrategy for ZeroInputReduceOutput {
    fn emit(&self, nest: &mut LoopNest, args: CacheArgs<'_>) -> Result<CacheHandle> {
        emit_zeroed(nest, args, true)
    }
}

impl CachingStrategy for ZeroInputCopyOutput {
    fn emit(&self, nest: &mut LoopNest, args: CacheArgs<'_>) -> Result<CacheHandle> {
        emit_zeroed(nest, args, false)
    }
}

fn emit_zeroed(nest: &mut LoopNest, args: CacheArgs<'_>, accumulate: bool) -> Result<CacheHandle> {
    let extents = region_extents(nest, &args)?;
    let destination = args.operand.clone();
    let destination_tensor = destination.tensor();
    if destination_tensor.layout().rank() != args.region.len() {
        return Err(RankMismatchSnafu {
            expected: destination_tensor.layout().rank(),
            actual: args.region.len(),
        }
        .build()
        .into());
    }
    let destination_extents: SmallVec<[i64; 4]> = SmallVec::from_slice(destination_tensor.extents());

    let layout = match args.order {
        Some(order) => Layout::ordered(&extents, order).map_err(crate::error::Error::from)?,
        None => Layout::row_major(&extents),
    };
    let strides: SmallVec<[i64; 4]> = SmallVec::from_slice(layout.strides());
    let tensor = Tensor::with_layout(format!("{}_acc", destination_tensor.name()), layout);
    let cell = Operand::new(&tensor);
    let positions = origin_positions(nest, args.region, args.materialization)?;

    let zero_tensor = tensor.clone();
    let zero_positions = positions.clone();
    let zero_strides = strides.clone();
    let zero = Kernel::new(format!("{}_zero", tensor.name()))
        .args([cell.clone()])
        .indices(args.materialization.to_vec())
        .define(move |ops, idx| {
            let origin = origin_from(&zero_positions, idx);
            zero_tensor.fill(0.0);
            ops[0].replace_view(View::windowed(&zero_tensor, &origin, &zero_strides, 0));
            Ok(())
        });
    nest.add_kernel_with_constraints(zero.clone(), CodePositionConstraints::prologue(args.materialization.to_vec()));

    let flush_tensor = tensor.clone();
    let flush = Kernel::new(format!("{}_flush", tensor.name()))
        .args([destination.clone(), cell.clone()])
        .indices(args.materialization.to_vec())
        .define(move |ops, idx| {
            let origin = origin_from(&positions, idx);
            let window = View::windowed(&flush_tensor, &origin, &strides, 0);
            for_each_coord(&extents, |local| {
                let global: SmallVec<[i64; 4]> =
                    local.iter().zip(origin.iter()).map(|(l, o)| l + o).collect();
                if in_bounds(&global, &destination_extents) {
                    let cached = window.get(&global)?;
                    let value = if accumulate { ops[0].get(&global)? + cached } else { cached };
                    ops[0].set(&global, value)?;
                }
                Ok(())
            })
        });
    nest.add_kernel_with_constraints(
        flush.clone(),
        CodePositionConstraints::epilogue(args.materialization.to_vec()),
    );

    nest.add_rename_action(RenameAction {
        operand: destination,
        replacement: cell.clone(),
        where_indices: args.materialization.iter().cloned().collect(),
        excluded: SmallVec::from_iter([zero.id(), flush.id()]),
    });
    Ok(CacheHandle { tensor, operand: cell })
}
