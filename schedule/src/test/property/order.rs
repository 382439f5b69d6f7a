//! Property-based tests: loop-order maintenance over arbitrary split stacks.

use proptest::prelude::*;
use tessel_ir::Index;

use crate::test::helpers::nest_2d;

proptest! {
    /// Swapping whole dimensions while keeping each dimension's
    /// outer-to-inner leaf order is always a valid order.
    #[test]
    fn dimension_swap_is_always_a_valid_order(
        m in 1i64..24,
        n in 1i64..24,
        tile_i in 1i64..6,
        tile_j in 1i64..6,
    ) {
        let (mut nest, i, j) = nest_2d(m, n);
        nest.split(&i, tile_i).unwrap();
        nest.split(&j, tile_j).unwrap();

        let mut order: Vec<Index> = nest.domain().dependent_loop_indices(&j).unwrap().to_vec();
        order.extend(nest.domain().dependent_loop_indices(&i).unwrap());
        nest.set_order(&order).unwrap();
        prop_assert_eq!(nest.order(), order.as_slice());
    }

    /// Any stack of splits keeps every loop index placed exactly once, in
    /// the dimension tree's outer-to-inner order.
    #[test]
    fn split_stack_keeps_the_order_aligned(sizes in proptest::collection::vec(1i64..9, 1..4)) {
        let (mut nest, i, _) = nest_2d(32, 4);
        for size in &sizes {
            nest.split(&i, *size).unwrap();
        }

        let leaves = nest.domain().dependent_loop_indices(&i).unwrap();
        prop_assert_eq!(nest.order().len(), leaves.len() + 1);
        let placed: Vec<Index> = nest.order().iter().filter(|x| leaves.contains(x)).cloned().collect();
        prop_assert_eq!(placed.as_slice(), leaves.as_slice());
    }
}
