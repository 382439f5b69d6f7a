use test_case::test_case;

use crate::test::helpers::nest_2d;

#[test_case(0)]
#[test_case(-4)]
fn split_rejects_non_positive_sizes(size: i64) {
    let (mut nest, i, _) = nest_2d(8, 6);
    assert!(nest.schedule().split(&i, size).is_err());
}

#[test]
fn split_inserts_inner_after_outer() {
    let (mut nest, i, j) = nest_2d(10, 5);
    let split = nest.schedule().split(&i, 4).unwrap();
    assert_eq!(nest.order(), &[split.outer, split.inner, j]);
}

#[test]
fn resplitting_keeps_the_new_loops_adjacent() {
    let (mut nest, i, j) = nest_2d(16, 5);
    let first = nest.schedule().split(&i, 8).unwrap();
    let second = nest.schedule().split(&i, 2).unwrap();
    assert_eq!(nest.order(), &[first.outer, second.outer, second.inner, j]);
}

#[test]
fn set_order_accepts_computed_entries() {
    let (mut nest, i, j) = nest_2d(8, 6);
    let si = nest.schedule().split(&i, 4).unwrap();
    let sj = nest.schedule().split(&j, 2).unwrap();

    // Naming a split parent denotes its first unplaced dependent loop index.
    nest.schedule().set_order(&[si.outer.clone(), sj.outer.clone(), i.clone(), j.clone()]).unwrap();
    assert_eq!(nest.order(), &[si.outer, sj.outer, si.inner, sj.inner]);
}

#[test]
fn set_order_rejects_missing_and_duplicate_entries() {
    let (mut nest, i, j) = nest_2d(8, 6);
    let si = nest.schedule().split(&i, 4).unwrap();

    assert!(nest.schedule().set_order(&[si.outer.clone(), si.inner.clone()]).is_err());
    assert!(nest
        .schedule()
        .set_order(&[si.outer.clone(), si.inner.clone(), si.inner.clone(), j.clone()])
        .is_err());
    assert!(nest
        .schedule()
        .set_order(&[si.outer.clone(), si.inner.clone(), j.clone(), tessel_ir::Index::new("z")])
        .is_err());
}

#[test]
fn set_order_rejects_inner_loop_outside_its_outer() {
    let (mut nest, i, j) = nest_2d(8, 6);
    let si = nest.schedule().split(&i, 4).unwrap();
    let result = nest.schedule().set_order(&[si.inner.clone(), si.outer.clone(), j.clone()]);
    assert!(result.is_err());
}

#[test]
fn parallelize_and_unroll_resolve_to_loop_indices() {
    let (mut nest, i, j) = nest_2d(8, 6);
    let si = nest.schedule().split(&i, 4).unwrap();
    nest.schedule().parallelize(&si.outer, 2).unwrap();
    // Unrolling the split parent targets its smallest leaf.
    nest.schedule().unroll(&i).unwrap();
    nest.schedule().unroll(&j).unwrap();

    assert_eq!(nest.parallel_partitions(&si.outer), Some(2));
    assert!(nest.is_unrolled(&si.inner));
    assert!(nest.is_unrolled(&j));
    assert!(nest.schedule().parallelize(&si.outer, 0).is_err());
}
