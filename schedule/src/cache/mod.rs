//! Caching strategies: pluggable policies that stage operand sub-regions
//! through scratch buffers.
//!
//! A strategy's only interface to the rest of the system is kernel
//! registration: copy-in kernels are prologue kernels, copy-out / reduce
//! kernels are epilogue kernels, and compute kernels are redirected into the
//! scratch buffer with rename rules. The generator treats all of them like
//! user kernels.

use smallvec::SmallVec;
use snafu::ensure;
use tessel_ir::{Index, Operand, Tensor};

use crate::error::{CacheExtentsMismatchSnafu, Result};
use crate::nest::LoopNest;

mod blast;
mod general;
mod submatrix;
mod zero;

pub use blast::BlastCopy;
pub use general::{ArgumentKind, GeneralCachingStrategy, ReduceFn};
pub use submatrix::{CopyInputCopyOutput, SubMatrixCopyIn};
pub use zero::{ZeroInputCopyOutput, ZeroInputReduceOutput};

/// Arguments common to every cache registration.
///
/// `region` addresses the operand (one index per operand dimension, in
/// dimension order); `extents` sizes the scratch buffer (empty = the full
/// extent of each region index); `materialization` is where copy kernels
/// fire (empty = once, outside all loops).
#[derive(Debug, Clone, Copy)]
pub struct CacheArgs<'a> {
    pub operand: &'a Operand,
    pub region: &'a [Index],
    pub extents: &'a [i64],
    pub materialization: &'a [Index],
    /// Scratch layout ordering hint: dimension order, slowest-varying first.
    pub order: Option<&'a [usize]>,
}

/// What a cache registration hands back: the raw scratch tensor and the
/// view cell compute kernels are redirected through.
#[derive(Debug, Clone)]
pub struct CacheHandle {
    pub tensor: Tensor,
    pub operand: Operand,
}

/// A policy generating the copy-in/copy-out kernels for one scratch buffer.
pub trait CachingStrategy {
    fn emit(&self, nest: &mut LoopNest, args: CacheArgs<'_>) -> Result<CacheHandle>;
}

/// Resolves the per-dimension scratch extents and validates the region
/// against the domain and the declared extents.
pub(crate) fn region_extents(nest: &LoopNest, args: &CacheArgs<'_>) -> Result<SmallVec<[i64; 4]>> {
    ensure!(
        args.extents.is_empty() || args.extents.len() == args.region.len(),
        CacheExtentsMismatchSnafu { extents: args.extents.to_vec(), rank: args.region.len() }
    );
    let mut extents = SmallVec::with_capacity(args.region.len());
    for (position, index) in args.region.iter().enumerate() {
        let full = nest.domain().range_of(index)?.size();
        extents.push(if args.extents.is_empty() { full } else { args.extents[position] });
    }
    for index in args.materialization {
        nest.domain().range_of(index)?;
    }
    Ok(extents)
}

/// Global tile origin per region dimension: the binding of the
/// materialization index belonging to the same dimension, or 0 when the
/// dimension has no materialization level.
///
/// Returns, for each region dimension, the position in `materialization`
/// whose value supplies the origin (or `None`).
pub(crate) fn origin_positions(
    nest: &LoopNest,
    region: &[Index],
    materialization: &[Index],
) -> Result<SmallVec<[Option<usize>; 4]>> {
    let mut out = SmallVec::with_capacity(region.len());
    for index in region {
        let base = nest.domain().base_index(index)?;
        let mut found = None;
        for (position, mat) in materialization.iter().enumerate() {
            if nest.domain().base_index(mat)? == base {
                found = Some(position);
            }
        }
        out.push(found);
    }
    Ok(out)
}

/// Computes the concrete tile origin from the materialization index values
/// a copy kernel was invoked with.
pub(crate) fn origin_from(positions: &[Option<usize>], index_values: &[i64]) -> SmallVec<[i64; 4]> {
    positions.iter().map(|p| p.map(|at| index_values[at]).unwrap_or(0)).collect()
}

/// Invokes `f` for every coordinate in the box `[lo, hi)`, last dimension
/// fastest.
pub(crate) fn for_each_coord_in(
    lo: &[i64],
    hi: &[i64],
    mut f: impl FnMut(&[i64]) -> tessel_ir::Result<()>,
) -> tessel_ir::Result<()> {
    let total: i64 = lo.iter().zip(hi).map(|(l, h)| (h - l).max(0)).product();
    if total == 0 {
        return Ok(());
    }
    let mut coords: SmallVec<[i64; 4]> = SmallVec::from_slice(lo);
    for _ in 0..total {
        f(&coords)?;
        for dim in (0..coords.len()).rev() {
            coords[dim] += 1;
            if coords[dim] < hi[dim] {
                break;
            } else if dim > 0 {
                coords[dim] = lo[dim];
            }
        }
    }
    Ok(())
}

/// Invokes `f` for every coordinate in the box `[0, extents)`.
pub(crate) fn for_each_coord(
    extents: &[i64],
    f: impl FnMut(&[i64]) -> tessel_ir::Result<()>,
) -> tessel_ir::Result<()> {
    let lo: SmallVec<[i64; 4]> = SmallVec::from_elem(0, extents.len());
    for_each_coord_in(&lo, extents, f)
}

/// Whether `coords` addresses an element inside `extents`.
pub(crate) fn in_bounds(coords: &[i64], extents: &[i64]) -> bool {
    coords.iter().zip(extents).all(|(c, e)| *c >= 0 && c < e)
}
