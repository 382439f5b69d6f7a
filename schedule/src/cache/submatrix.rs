//! Rectangular sub-region caches: verbatim copy-in, optionally copied back.

use smallvec::SmallVec;
use tessel_ir::error::RankMismatchSnafu;
use tessel_ir::{Layout, Operand, Tensor, View};
use tracing::debug;

use crate::cache::{
    for_each_coord, in_bounds, origin_from, origin_positions, region_extents, CacheArgs, CacheHandle, CachingStrategy,
};
use crate::constraints::CodePositionConstraints;
use crate::error::Result;
use crate::kernel::Kernel;
use crate::nest::{LoopNest, RenameAction};

/// Copies the addressed rectangle into scratch at each materialization
/// point, optionally with a reordered scratch layout. Never copied back:
/// for read-only operands.
#[derive(Debug, Clone, Default)]
pub struct SubMatrixCopyIn;

/// [`SubMatrixCopyIn`] plus a verbatim copy-out at the matching epilogue:
/// for operands written in place without accumulation.
#[derive(Debug, Clone, Default)]
pub struct CopyInputCopyOutput;

impl CachingStrategy for SubMatrixCopyIn {
    fn emit(&self, nest: &mut LoopNest, args: CacheArgs<'_>) -> Result<CacheHandle> {
        let staged = stage_copy_in(nest, &args, "submatrix")?;
        finish(nest, &args, staged, &[])
    }
}

impl CachingStrategy for CopyInputCopyOutput {
    fn emit(&self, nest: &mut LoopNest, args: CacheArgs<'_>) -> Result<CacheHandle> {
        let staged = stage_copy_in(nest, &args, "copy_cache")?;

        let tensor = staged.handle.tensor.clone();
        let destination = args.operand.clone();
        let positions = staged.positions.clone();
        let extents = staged.extents.clone();
        let strides = staged.strides.clone();
        let source_extents = staged.source_extents.clone();
        let flush = Kernel::new(format!("{}_flush", tensor.name()))
            .args([destination.clone(), staged.handle.operand.clone()])
            .indices(args.materialization.to_vec())
            .define(move |ops, idx| {
                let origin = origin_from(&positions, idx);
                let window = View::windowed(&tensor, &origin, &strides, 0);
                for_each_coord(&extents, |local| {
                    let global: SmallVec<[i64; 4]> =
                        local.iter().zip(origin.iter()).map(|(l, o)| l + o).collect();
                    if in_bounds(&global, &source_extents) {
                        ops[0].set(&global, window.get(&global)?)?;
                    }
                    Ok(())
                })
            });
        nest.add_kernel_with_constraints(
            flush.clone(),
            CodePositionConstraints::epilogue(args.materialization.to_vec()),
        );
        finish(nest, &args, staged, &[flush.id()])
    }
}

/// Everything the copy-in stage produced that later kernels need again.
pub(crate) struct StagedCache {
    pub handle: CacheHandle,
    pub fill_id: crate::kernel::KernelId,
    pub positions: SmallVec<[Option<usize>; 4]>,
    pub extents: SmallVec<[i64; 4]>,
    pub strides: SmallVec<[i64; 4]>,
    pub source_extents: SmallVec<[i64; 4]>,
}

/// Builds the scratch tensor and registers the prologue copy-in kernel.
pub(crate) fn stage_copy_in(nest: &mut LoopNest, args: &CacheArgs<'_>, label: &str) -> Result<StagedCache> {
    let extents = region_extents(nest, args)?;
    let source = args.operand.clone();
    let source_tensor = source.tensor();
    if source_tensor.layout().rank() != args.region.len() {
        return Err(RankMismatchSnafu { expected: source_tensor.layout().rank(), actual: args.region.len() }
            .build()
            .into());
    }
    let source_extents: SmallVec<[i64; 4]> = SmallVec::from_slice(source_tensor.extents());

    let layout = match args.order {
        Some(order) => Layout::ordered(&extents, order).map_err(crate::error::Error::from)?,
        None => Layout::row_major(&extents),
    };
    let strides: SmallVec<[i64; 4]> = SmallVec::from_slice(layout.strides());
    let tensor = Tensor::with_layout(format!("{}_{}", source_tensor.name(), label), layout);
    let cell = Operand::new(&tensor);
    let positions = origin_positions(nest, args.region, args.materialization)?;
    debug!(cache = tensor.name(), ?extents, "stage copy-in cache");

    let fill_tensor = tensor.clone();
    let fill_positions = positions.clone();
    let fill_extents = extents.clone();
    let fill_strides = strides.clone();
    let fill_source_extents = source_extents.clone();
    let fill = Kernel::new(format!("{}_fill", tensor.name()))
        .args([source.clone(), cell.clone()])
        .indices(args.materialization.to_vec())
        .define(move |ops, idx| {
            let origin = origin_from(&fill_positions, idx);
            let window = View::windowed(&fill_tensor, &origin, &fill_strides, 0);
            ops[1].replace_view(window.clone());
            for_each_coord(&fill_extents, |local| {
                let global: SmallVec<[i64; 4]> =
                    local.iter().zip(origin.iter()).map(|(l, o)| l + o).collect();
                if in_bounds(&global, &fill_source_extents) {
                    window.set(&global, ops[0].get(&global)?)?;
                }
                Ok(())
            })
        });
    nest.add_kernel_with_constraints(fill.clone(), CodePositionConstraints::prologue(args.materialization.to_vec()));

    Ok(StagedCache {
        handle: CacheHandle { tensor, operand: cell },
        fill_id: fill.id(),
        positions,
        extents,
        strides,
        source_extents,
    })
}

/// Registers the rename rule and hands the cache back.
fn finish(
    nest: &mut LoopNest,
    args: &CacheArgs<'_>,
    staged: StagedCache,
    extra_excluded: &[crate::kernel::KernelId],
) -> Result<CacheHandle> {
    let mut excluded: SmallVec<[crate::kernel::KernelId; 4]> = SmallVec::from_iter([staged.fill_id]);
    excluded.extend_from_slice(extra_excluded);
    nest.add_rename_action(RenameAction {
        operand: args.operand.clone(),
        replacement: staged.handle.operand.clone(),
        where_indices: args.materialization.iter().cloned().collect(),
        excluded,
    });
    Ok(staged.handle)
}
