//! BLAS-style panel packing.
//!
//! Packs an `R x C` tile into a 3D scratch buffer shaped
//! `{C/s, R, s}` (stripe column, row, column-within-stripe) so the innermost
//! compute loops stream through one stripe at a time with unit stride.
//! Rows and columns beyond the source extent are packed as zeros, so every
//! stripe is always fully populated regardless of boundary conditions.

use smallvec::SmallVec;
use snafu::ensure;
use tessel_ir::error::RankMismatchSnafu;
use tessel_ir::{Index, Operand, Tensor, View};
use tracing::debug;

use crate::cache::{origin_from, origin_positions, region_extents, CacheArgs, CacheHandle, CachingStrategy};
use crate::constraints::CodePositionConstraints;
use crate::error::{CacheExtentsMismatchSnafu, InvalidFillIndexSnafu, Result, StripeMisalignedSnafu};
use crate::kernel::Kernel;
use crate::nest::{LoopNest, RenameAction};

/// Panel-packing cache over a 2D region.
///
/// `stripe` is the column sub-width packed contiguously; `stripe_index` is
/// the loop index (a split of the region's column dimension) at which the
/// compute-visible window advances to the next stripe.
#[derive(Debug, Clone)]
pub struct BlastCopy {
    stripe: i64,
    stripe_index: Index,
}

impl BlastCopy {
    pub fn new(stripe: i64, stripe_index: Index) -> Self {
        Self { stripe, stripe_index }
    }
}

impl CachingStrategy for BlastCopy {
    fn emit(&self, nest: &mut LoopNest, args: CacheArgs<'_>) -> Result<CacheHandle> {
        let extents = region_extents(nest, &args)?;
        ensure!(extents.len() == 2, CacheExtentsMismatchSnafu { extents: extents.to_vec(), rank: 2usize });
        let (rows, cols) = (extents[0], extents[1]);
        ensure!(cols % self.stripe == 0, StripeMisalignedSnafu { stripe: self.stripe, cols });
        ensure!(
            nest.domain().base_index(&self.stripe_index)? == nest.domain().base_index(&args.region[1])?,
            InvalidFillIndexSnafu { index: self.stripe_index.clone() }
        );

        let source = args.operand.clone();
        let source_tensor = source.tensor();
        if source_tensor.layout().rank() != 2 {
            return Err(RankMismatchSnafu { expected: 2usize, actual: source_tensor.layout().rank() }.build().into());
        }
        let source_extents: SmallVec<[i64; 4]> = SmallVec::from_slice(source_tensor.extents());

        let stripe = self.stripe;
        let tensor = Tensor::zeros(format!("{}_blast", source_tensor.name()), &[cols / stripe, rows, stripe]);
        let cell = Operand::new(&tensor);
        let positions = origin_positions(nest, args.region, args.materialization)?;
        debug!(cache = tensor.name(), rows, cols, stripe, "stage blast cache");

        // Packs the whole tile stripe-by-stripe, zero-padding out-of-bounds
        // rows and columns.
        let fill_tensor = tensor.clone();
        let fill_positions = positions.clone();
        let fill_source_extents = source_extents.clone();
        let fill = Kernel::new(format!("{}_fill", tensor.name()))
            .args([source.clone(), cell.clone()])
            .indices(args.materialization.to_vec())
            .define(move |ops, idx| {
                let origin = origin_from(&fill_positions, idx);
                for chunk in 0..cols / stripe {
                    for row in 0..rows {
                        for col in 0..stripe {
                            let global = [origin[0] + row, origin[1] + chunk * stripe + col];
                            let value = if global[0] < fill_source_extents[0] && global[1] < fill_source_extents[1]
                            {
                                ops[0].get(&global)?
                            } else {
                                0.0
                            };
                            fill_tensor.set(&[chunk, row, col], value)?;
                        }
                    }
                }
                Ok(())
            });
        nest.add_kernel_with_constraints(fill.clone(), CodePositionConstraints::prologue(args.materialization.to_vec()));

        // Advances the compute-visible 2D window to the stripe the column
        // loop is about to traverse.
        let view_tensor = tensor.clone();
        let view_positions = positions.clone();
        let mut view_indices: Vec<Index> = args.materialization.to_vec();
        view_indices.push(self.stripe_index.clone());
        let stripe_at = view_indices.len() - 1;
        let view = Kernel::new(format!("{}_view", tensor.name()))
            .args([cell.clone()])
            .indices(view_indices.clone())
            .define(move |ops, idx| {
                let origin = origin_from(&view_positions, &idx[..stripe_at]);
                // The stripe loop is a split of the tile-local column loop,
                // so its variable is already the tile-local stripe begin.
                let stripe_begin = idx[stripe_at];
                let chunk = stripe_begin / stripe;
                ops[0].replace_view(View::windowed(
                    &view_tensor,
                    &[origin[0], origin[1] + stripe_begin],
                    &[stripe, 1],
                    chunk * rows * stripe,
                ));
                Ok(())
            });
        nest.add_kernel_with_constraints(view.clone(), CodePositionConstraints::prologue(view_indices.clone()));

        let mut where_indices: SmallVec<[Index; 4]> = args.materialization.iter().cloned().collect();
        where_indices.push(self.stripe_index.clone());
        nest.add_rename_action(RenameAction {
            operand: source,
            replacement: cell.clone(),
            where_indices,
            excluded: SmallVec::from_iter([fill.id(), view.id()]),
        });
        Ok(CacheHandle { tensor, operand: cell })
    }
}
