//! Configurable caching: input or output operands, optional progressive
//! fills, pluggable reduction on copy-out.

use std::sync::Arc;

use smallvec::SmallVec;
use snafu::ensure;
use tessel_ir::error::RankMismatchSnafu;
use tessel_ir::{Element, Index, Layout, Operand, Tensor, View};
use tracing::debug;

use crate::cache::{
    for_each_coord, for_each_coord_in, in_bounds, origin_from, origin_positions, region_extents, CacheArgs,
    CacheHandle, CachingStrategy,
};
use crate::constraints::CodePositionConstraints;
use crate::error::{
    CacheCapacityExceededSnafu, InvalidFillIndexSnafu, InvalidFillThresholdSnafu, Result,
};
use crate::kernel::{Kernel, KernelId};
use crate::nest::{LoopNest, RenameAction};

/// How the cached operand is used by the kernels inside the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    /// Read only: copy-in, no copy-out.
    Input,
    /// Read and written in place: copy-in and copy-out.
    InputOutput,
    /// Written only: zero-init, reduce-out.
    Output,
}

pub type ReduceFn = Arc<dyn Fn(Element, Element) -> Element + Send + Sync>;

/// The fully configurable strategy: `{argument kind, name, max scratch
/// elements, fill threshold, reduce function, reset-on-fill}`.
///
/// With `fill_threshold == max_cache_elements` the scratch fills all at once
/// at the materialization level. A smaller threshold plus a `fill_index`
/// (a split of one region dimension) fills progressively, one block per
/// `fill_index` iteration, which changes fill order but never the cached
/// values a compute kernel observes.
#[derive(Clone)]
pub struct GeneralCachingStrategy {
    kind: ArgumentKind,
    name: String,
    max_cache_elements: usize,
    fill_threshold: usize,
    reduce: Option<ReduceFn>,
    reset_on_fill: bool,
    fill_index: Option<Index>,
}

impl GeneralCachingStrategy {
    pub fn input(name: impl Into<String>, max_cache_elements: usize) -> Self {
        Self {
            kind: ArgumentKind::Input,
            name: name.into(),
            max_cache_elements,
            fill_threshold: max_cache_elements,
            reduce: None,
            reset_on_fill: false,
            fill_index: None,
        }
    }

    pub fn output(name: impl Into<String>, max_cache_elements: usize, reduce: ReduceFn) -> Self {
        Self {
            kind: ArgumentKind::Output,
            name: name.into(),
            max_cache_elements,
            fill_threshold: max_cache_elements,
            reduce: Some(reduce),
            reset_on_fill: false,
            fill_index: None,
        }
    }

    pub fn kind(mut self, kind: ArgumentKind) -> Self {
        self.kind = kind;
        self
    }

    /// Caps the elements copied per fill step; requires
    /// [`GeneralCachingStrategy::fill_at`] when below the capacity.
    pub fn fill_threshold(mut self, threshold: usize) -> Self {
        self.fill_threshold = threshold;
        self
    }

    /// The loop index at which progressive fill blocks materialize.
    pub fn fill_at(mut self, index: Index) -> Self {
        self.fill_index = Some(index);
        self
    }

    /// Zero the not-yet-filled remainder of each progressive block.
    pub fn reset_on_fill(mut self, reset: bool) -> Self {
        self.reset_on_fill = reset;
        self
    }
}

impl CachingStrategy for GeneralCachingStrategy {
    fn emit(&self, nest: &mut LoopNest, args: CacheArgs<'_>) -> Result<CacheHandle> {
        let extents = region_extents(nest, &args)?;
        let required = extents.iter().product::<i64>() as usize;
        ensure!(
            required <= self.max_cache_elements,
            CacheCapacityExceededSnafu { name: self.name.clone(), required, max: self.max_cache_elements }
        );
        ensure!(
            self.fill_threshold > 0 && self.fill_threshold <= self.max_cache_elements,
            InvalidFillThresholdSnafu { threshold: self.fill_threshold, max: self.max_cache_elements }
        );

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
        let tensor = Tensor::with_layout(&self.name, layout);
        let cell = Operand::new(&tensor);
        let positions = origin_positions(nest, args.region, args.materialization)?;
        let mut excluded: SmallVec<[KernelId; 4]> = SmallVec::new();
        debug!(cache = %self.name, ?extents, threshold = self.fill_threshold, "stage general cache");

        // Window setup (and zero-init for accumulators) once per tile.
        let init_tensor = tensor.clone();
        let init_positions = positions.clone();
        let init_strides = strides.clone();
        let zero_init = self.kind == ArgumentKind::Output;
        let init = Kernel::new(format!("{}_init", self.name))
            .args([cell.clone()])
            .indices(args.materialization.to_vec())
            .define(move |ops, idx| {
                let origin = origin_from(&init_positions, idx);
                if zero_init {
                    init_tensor.fill(0.0);
                }
                ops[0].replace_view(View::windowed(&init_tensor, &origin, &init_strides, 0));
                Ok(())
            });
        nest.add_kernel_with_constraints(init.clone(), CodePositionConstraints::prologue(args.materialization.to_vec()));
        excluded.push(init.id());

        if self.kind != ArgumentKind::Output {
            let progressive = self.fill_threshold < required;
            if progressive {
                let fill_index =
                    self.fill_index.clone().ok_or_else(|| {
                        InvalidFillThresholdSnafu { threshold: self.fill_threshold, max: required }.build()
                    })?;
                let fill_dim = {
                    let base = nest.domain().base_index(&fill_index)?;
                    let mut found = None;
                    for (position, region_index) in args.region.iter().enumerate() {
                        if nest.domain().base_index(region_index)? == base {
                            found = Some(position);
                        }
                    }
                    found.ok_or_else(|| InvalidFillIndexSnafu { index: fill_index.clone() }.build())?
                };
                let block_rows = nest.domain().range_of(&fill_index)?.increment();
                let block: usize = extents
                    .iter()
                    .enumerate()
                    .map(|(d, e)| if d == fill_dim { block_rows as usize } else { *e as usize })
                    .product();
                ensure!(
                    block <= self.fill_threshold,
                    InvalidFillThresholdSnafu { threshold: self.fill_threshold, max: block }
                );

                let fill_tensor = tensor.clone();
                let fill_positions = positions.clone();
                let fill_strides = strides.clone();
                let fill_extents = extents.clone();
                let fill_source_extents = source_extents.clone();
                let reset_on_fill = self.reset_on_fill;
                let mut fill_indices: Vec<Index> = args.materialization.to_vec();
                fill_indices.push(fill_index.clone());
                let fill_at = fill_indices.len() - 1;
                // A fill index that is itself a materialization level runs in
                // absolute coordinates; a split below the materialization
                // level is already tile-local.
                let fill_is_materialization = args.materialization.contains(&fill_index);
                let fill = Kernel::new(format!("{}_fill", self.name))
                    .args([source.clone(), cell.clone()])
                    .indices(fill_indices.clone())
                    .define(move |ops, idx| {
                        let origin = origin_from(&fill_positions, &idx[..fill_at]);
                        let window = View::windowed(&fill_tensor, &origin, &fill_strides, 0);
                        let block_begin =
                            if fill_is_materialization { idx[fill_at] - origin[fill_dim] } else { idx[fill_at] };
                        let mut lo: SmallVec<[i64; 4]> = SmallVec::from_elem(0, fill_extents.len());
                        let mut hi: SmallVec<[i64; 4]> = fill_extents.clone();
                        lo[fill_dim] = block_begin;
                        hi[fill_dim] = (block_begin + block_rows).min(fill_extents[fill_dim]);
                        for_each_coord_in(&lo, &hi, |local| {
                            let global: SmallVec<[i64; 4]> =
                                local.iter().zip(origin.iter()).map(|(l, o)| l + o).collect();
                            if in_bounds(&global, &fill_source_extents) {
                                window.set(&global, ops[0].get(&global)?)?;
                            } else if reset_on_fill {
                                window.set(&global, 0.0)?;
                            }
                            Ok(())
                        })
                    });
                nest.add_kernel_with_constraints(fill.clone(), CodePositionConstraints::prologue(fill_indices));
                excluded.push(fill.id());
            } else {
                let fill_tensor = tensor.clone();
                let fill_positions = positions.clone();
                let fill_strides = strides.clone();
                let fill_extents = extents.clone();
                let fill_source_extents = source_extents.clone();
                let fill = Kernel::new(format!("{}_fill", self.name))
                    .args([source.clone(), cell.clone()])
                    .indices(args.materialization.to_vec())
                    .define(move |ops, idx| {
                        let origin = origin_from(&fill_positions, idx);
                        let window = View::windowed(&fill_tensor, &origin, &fill_strides, 0);
                        for_each_coord(&fill_extents, |local| {
                            let global: SmallVec<[i64; 4]> =
                                local.iter().zip(origin.iter()).map(|(l, o)| l + o).collect();
                            if in_bounds(&global, &fill_source_extents) {
                                window.set(&global, ops[0].get(&global)?)?;
                            }
                            Ok(())
                        })
                    });
                nest.add_kernel_with_constraints(
                    fill.clone(),
                    CodePositionConstraints::prologue(args.materialization.to_vec()),
                );
                excluded.push(fill.id());
            }
        }

        if self.kind != ArgumentKind::Input {
            let flush_tensor = tensor.clone();
            let flush_positions = positions.clone();
            let flush_strides = strides.clone();
            let flush_extents = extents.clone();
            let flush_source_extents = source_extents;
            let reduce = self.reduce.clone();
            let flush = Kernel::new(format!("{}_flush", self.name))
                .args([source.clone(), cell.clone()])
                .indices(args.materialization.to_vec())
                .define(move |ops, idx| {
                    let origin = origin_from(&flush_positions, idx);
                    let window = View::windowed(&flush_tensor, &origin, &flush_strides, 0);
                    for_each_coord(&flush_extents, |local| {
                        let global: SmallVec<[i64; 4]> =
                            local.iter().zip(origin.iter()).map(|(l, o)| l + o).collect();
                        if in_bounds(&global, &flush_source_extents) {
                            let cached = window.get(&global)?;
                            let value = match &reduce {
                                Some(f) => f(ops[0].get(&global)?, cached),
                                None => cached,
                            };
                            ops[0].set(&global, value)?;
                        }
                        Ok(())
                    })
                });
            nest.add_kernel_with_constraints(
                flush.clone(),
                CodePositionConstraints::epilogue(args.materialization.to_vec()),
            );
            excluded.push(flush.id());
        }

        nest.add_rename_action(RenameAction {
            operand: source,
            replacement: cell.clone(),
            where_indices: args.materialization.iter().cloned().collect(),
            excluded,
        });
        Ok(CacheHandle { tensor, operand: cell })
    }
}

impl std::fmt::Debug for GeneralCachingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneralCachingStrategy")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("max_cache_elements", &self.max_cache_elements)
            .field("fill_threshold", &self.fill_threshold)
            .field("reset_on_fill", &self.reset_on_fill)
            .field("fill_index", &self.fill_index)
            .finish_non_exhaustive()
    }
}
