use test_case::test_case;
use tessel_ir::{ErrorKind, Index, IndexRange, Operand, Range, Tensor};
use tessel_schedule::{
    BlastCopy, CacheArgs, CopyInputCopyOutput, GeneralCachingStrategy, Kernel, LoopNest, SubMatrixCopyIn,
    ZeroInputCopyOutput, ZeroInputReduceOutput,
};

use crate::error::Error;
use crate::generator::CodeGenerator;
use crate::test::helpers::nest_2d;

fn copy_kernel(out: &Operand, source: &Operand, i: &Index, j: &Index) -> Kernel {
    Kernel::new("copy")
        .args([out.clone(), source.clone()])
        .indices([i.clone(), j.clone()])
        .define(|ops, idx| ops[0].set(idx, ops[1].get(idx)?))
}

#[test_case(8, 8)]
#[test_case(8, 7)]
#[test_case(6, 8)]
#[test_case(6, 7)]
#[test_case(2, 2)]
#[test_case(3, 3)]
fn blast_cache_round_trip(rows: i64, cols: i64) {
    let source_t = Tensor::from_fn("src", &[rows, cols], |c| (c[0] * 100 + c[1]) as f64);
    let out_t = Tensor::zeros("out", &[rows, cols]);
    let source = Operand::new(&source_t);
    let out = Operand::new(&out_t);

    let (mut nest, i, j) = nest_2d(rows, cols);
    nest.add_kernel(copy_kernel(&out, &source, &i, &j));

    let mut schedule = nest.schedule();
    let i_tile = schedule.split(&i, 4).unwrap();
    let j_tile = schedule.split(&j, 4).unwrap();
    let j_stripe = schedule.split(&j, 2).unwrap();
    schedule
        .set_order(&[
            i_tile.outer.clone(),
            j_tile.outer.clone(),
            j_stripe.outer.clone(),
            i.clone(),
            j.clone(),
        ])
        .unwrap();
    schedule
        .cache(
            &BlastCopy::new(2, j_stripe.outer),
            CacheArgs {
                operand: &source,
                region: &[i, j],
                extents: &[4, 4],
                materialization: &[i_tile.outer, j_tile.outer],
                order: None,
            },
        )
        .unwrap();

    CodeGenerator::new().generate(&nest).unwrap();

    for row in 0..rows {
        for col in 0..cols {
            assert_eq!(out_t.get(&[row, col]).unwrap(), source_t.get(&[row, col]).unwrap());
        }
    }
}

/// A single ragged tile packs stripe-by-stripe with zero padding.
#[test]
fn blast_packs_padded_stripes() {
    let source_t = Tensor::from_fn("src", &[3, 3], |c| (c[0] * 10 + c[1] + 1) as f64);
    let out_t = Tensor::zeros("out", &[3, 3]);
    let source = Operand::new(&source_t);
    let out = Operand::new(&out_t);

    let (mut nest, i, j) = nest_2d(3, 3);
    nest.add_kernel(copy_kernel(&out, &source, &i, &j));

    let mut schedule = nest.schedule();
    let i_tile = schedule.split(&i, 4).unwrap();
    let j_tile = schedule.split(&j, 4).unwrap();
    let j_stripe = schedule.split(&j, 2).unwrap();
    schedule
        .set_order(&[i_tile.outer.clone(), j_tile.outer.clone(), j_stripe.outer.clone(), i.clone(), j.clone()])
        .unwrap();
    let handle = schedule
        .cache(
            &BlastCopy::new(2, j_stripe.outer),
            CacheArgs {
                operand: &source,
                region: &[i, j],
                extents: &[4, 4],
                materialization: &[i_tile.outer, j_tile.outer],
                order: None,
            },
        )
        .unwrap();

    CodeGenerator::new().generate(&nest).unwrap();

    assert_eq!(handle.tensor.extents(), &[2, 4, 2]);
    for chunk in 0..2 {
        for row in 0..4 {
            for col in 0..2 {
                let global = [row, chunk * 2 + col];
                let expected = if global[0] < 3 && global[1] < 3 {
                    source_t.get(&global).unwrap()
                } else {
                    0.0
                };
                assert_eq!(handle.tensor.get(&[chunk, row, col]).unwrap(), expected);
            }
        }
    }
}

fn gemm_nest(n: i64) -> (LoopNest, Index, Index, Index) {
    let (i, j, k) = (Index::new("i"), Index::new("j"), Index::new("k"));
    let nest = LoopNest::from_ranges([
        IndexRange::new(i.clone(), Range::new(0, n)),
        IndexRange::new(j.clone(), Range::new(0, n)),
        IndexRange::new(k.clone(), Range::new(0, n)),
    ])
    .unwrap();
    (nest, i, j, k)
}

fn gemm_kernel(c: &Operand, a: &Operand, b: &Operand, i: &Index, j: &Index, k: &Index) -> Kernel {
    Kernel::new("gemm")
        .args([c.clone(), a.clone(), b.clone()])
        .indices([i.clone(), j.clone(), k.clone()])
        .define(|ops, idx| {
            let product = ops[1].get(&[idx[0], idx[2]])? * ops[2].get(&[idx[2], idx[1]])?;
            ops[0].set(&[idx[0], idx[1]], ops[0].get(&[idx[0], idx[1]])? + product)
        })
}

fn reference_gemm(a: &Tensor, b: &Tensor, n: i64) -> Vec<f64> {
    let mut out = vec![0.0; (n * n) as usize];
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                out[(i * n + j) as usize] += a.get(&[i, k]).unwrap() * b.get(&[k, j]).unwrap();
            }
        }
    }
    out
}

#[test]
fn zero_reduce_accumulator_matches_reference() {
    let n = 4;
    let a_t = Tensor::from_fn("a", &[n, n], |c| (c[0] * 2 + c[1]) as f64);
    let b_t = Tensor::from_fn("b", &[n, n], |c| (c[0] - 3 * c[1]) as f64);
    let c_t = Tensor::zeros("c", &[n, n]);
    let (a, b, c) = (Operand::new(&a_t), Operand::new(&b_t), Operand::new(&c_t));

    let (mut nest, i, j, k) = gemm_nest(n);
    nest.add_kernel(gemm_kernel(&c, &a, &b, &i, &j, &k));

    let mut schedule = nest.schedule();
    let i_tile = schedule.split(&i, 2).unwrap();
    let j_tile = schedule.split(&j, 2).unwrap();
    schedule
        .set_order(&[i_tile.outer.clone(), j_tile.outer.clone(), k.clone(), i.clone(), j.clone()])
        .unwrap();
    schedule
        .cache(
            &ZeroInputReduceOutput,
            CacheArgs {
                operand: &c,
                region: &[i, j],
                extents: &[2, 2],
                materialization: &[i_tile.outer, j_tile.outer],
                order: None,
            },
        )
        .unwrap();

    CodeGenerator::new().generate(&nest).unwrap();

    assert_eq!(c_t.to_vec(), reference_gemm(&a_t, &b_t, n));
}

/// The overwrite variant replaces each destination tile wholesale, so
/// whatever the destination held before generation never leaks through.
#[test]
fn zero_copy_out_overwrites_destination() {
    let n = 4;
    let a_t = Tensor::from_fn("a", &[n, n], |c| (c[0] * 2 + c[1]) as f64);
    let b_t = Tensor::from_fn("b", &[n, n], |c| (c[0] - 3 * c[1]) as f64);
    let c_t = Tensor::from_fn("c", &[n, n], |_| 99.0);
    let (a, b, c) = (Operand::new(&a_t), Operand::new(&b_t), Operand::new(&c_t));

    let (mut nest, i, j, k) = gemm_nest(n);
    nest.add_kernel(gemm_kernel(&c, &a, &b, &i, &j, &k));

    let mut schedule = nest.schedule();
    let i_tile = schedule.split(&i, 2).unwrap();
    let j_tile = schedule.split(&j, 2).unwrap();
    schedule
        .set_order(&[i_tile.outer.clone(), j_tile.outer.clone(), k.clone(), i.clone(), j.clone()])
        .unwrap();
    schedule
        .cache(
            &ZeroInputCopyOutput,
            CacheArgs {
                operand: &c,
                region: &[i, j],
                extents: &[2, 2],
                materialization: &[i_tile.outer, j_tile.outer],
                order: None,
            },
        )
        .unwrap();

    CodeGenerator::new().generate(&nest).unwrap();

    assert_eq!(c_t.to_vec(), reference_gemm(&a_t, &b_t, n));
}

/// Caching an operand no compute kernel takes can never redirect anything.
#[test]
fn cache_over_unused_operand_is_rejected() {
    let (mut nest, i, j) = nest_2d(4, 4);
    let used = Operand::new(&Tensor::zeros("m", &[4, 4]));
    nest.add_kernel(
        Kernel::new("touch")
            .args([used.clone()])
            .indices([i.clone(), j.clone()])
            .define(|ops, idx| ops[0].set(idx, 1.0)),
    );

    let stray = Operand::new(&Tensor::zeros("stray", &[4, 4]));
    let mut schedule = nest.schedule();
    let i_tile = schedule.split(&i, 2).unwrap();
    let j_tile = schedule.split(&j, 2).unwrap();
    schedule
        .cache(
            &SubMatrixCopyIn,
            CacheArgs {
                operand: &stray,
                region: &[i, j],
                extents: &[2, 2],
                materialization: &[i_tile.outer, j_tile.outer],
                order: None,
            },
        )
        .unwrap();

    let err = CodeGenerator::new().generate(&nest).unwrap_err();
    assert!(matches!(err, Error::UnusedCacheOperand { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

fn gemm_with_input_cache(progressive: bool) -> Vec<f64> {
    let n = 8;
    let a_t = Tensor::from_fn("a", &[n, n], |c| (c[0] * 3 + c[1]) as f64);
    let b_t = Tensor::from_fn("b", &[n, n], |c| (2 * c[0] - c[1]) as f64);
    let c_t = Tensor::zeros("c", &[n, n]);
    let (a, b, c) = (Operand::new(&a_t), Operand::new(&b_t), Operand::new(&c_t));

    let (mut nest, i, j, k) = gemm_nest(n);
    nest.add_kernel(gemm_kernel(&c, &a, &b, &i, &j, &k));

    let mut schedule = nest.schedule();
    let k_tile = schedule.split(&k, 2).unwrap();
    schedule.set_order(&[k_tile.outer.clone(), i.clone(), j.clone(), k.clone()]).unwrap();
    let strategy = if progressive {
        GeneralCachingStrategy::input("a_cache", 64).fill_threshold(16).fill_at(k_tile.outer)
    } else {
        GeneralCachingStrategy::input("a_cache", 64)
    };
    schedule
        .cache(
            &strategy,
            CacheArgs { operand: &a, region: &[i, k], extents: &[], materialization: &[], order: None },
        )
        .unwrap();

    CodeGenerator::new().generate(&nest).unwrap();
    c_t.to_vec()
}

/// Filling the scratch block-by-block at the tile loop instead of all at
/// once changes the copy order but never the computed values.
#[test]
fn progressive_fill_matches_bulk_fill() {
    let bulk = gemm_with_input_cache(false);
    let progressive = gemm_with_input_cache(true);
    assert_eq!(progressive, bulk);

    let a_t = Tensor::from_fn("a", &[8, 8], |c| (c[0] * 3 + c[1]) as f64);
    let b_t = Tensor::from_fn("b", &[8, 8], |c| (2 * c[0] - c[1]) as f64);
    assert_eq!(bulk, reference_gemm(&a_t, &b_t, 8));
}

/// In-place update through a copy-in/copy-out cache over ragged tiles.
#[test]
fn copy_in_copy_out_round_trip() {
    let m_t = Tensor::from_fn("m", &[5, 5], |c| (c[0] * 5 + c[1]) as f64);
    let before = m_t.to_vec();
    let m = Operand::new(&m_t);

    let (mut nest, i, j) = nest_2d(5, 5);
    nest.add_kernel(
        Kernel::new("bump")
            .args([m.clone()])
            .indices([i.clone(), j.clone()])
            .define(|ops, idx| ops[0].set(idx, ops[0].get(idx)? + 1.0)),
    );

    let mut schedule = nest.schedule();
    let i_tile = schedule.split(&i, 3).unwrap();
    let j_tile = schedule.split(&j, 3).unwrap();
    schedule
        .set_order(&[i_tile.outer.clone(), j_tile.outer.clone(), i.clone(), j.clone()])
        .unwrap();
    schedule
        .cache(
            &CopyInputCopyOutput,
            CacheArgs {
                operand: &m,
                region: &[i, j],
                extents: &[3, 3],
                materialization: &[i_tile.outer, j_tile.outer],
                order: None,
            },
        )
        .unwrap();

    CodeGenerator::new().generate(&nest).unwrap();

    let after = m_t.to_vec();
    for (slot, original) in before.iter().enumerate() {
        assert_eq!(after[slot], original + 1.0);
    }
}
