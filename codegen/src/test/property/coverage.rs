//! Property-based tests: generated loop nests visit every domain point
//! exactly once, whatever the split structure.

use proptest::prelude::*;

use crate::generator::CodeGenerator;
use crate::test::helpers::{nest_1d, nest_2d, trace, tracing_kernel};

proptest! {
    /// Any stack of splits over one dimension still walks [0, n) in order.
    #[test]
    fn split_stack_covers_every_value(n in 1i64..48, sizes in proptest::collection::vec(1i64..9, 0..3)) {
        let (mut nest, i) = nest_1d(n);
        for size in sizes {
            nest.split(&i, size).unwrap();
        }
        let seen = trace();
        nest.add_kernel(tracing_kernel("probe", [i], &seen));

        CodeGenerator::new().generate(&nest).unwrap();

        let values: Vec<i64> = seen.lock().iter().map(|entry| entry[0]).collect();
        let expected: Vec<i64> = (0..n).collect();
        prop_assert_eq!(values, expected);
    }

    /// Tiling both dimensions never changes the visited grid.
    #[test]
    fn tiled_grid_is_covered_exactly_once(
        m in 1i64..12,
        n in 1i64..12,
        tile_i in 1i64..5,
        tile_j in 1i64..5,
    ) {
        let (mut nest, i, j) = nest_2d(m, n);
        nest.split(&i, tile_i).unwrap();
        nest.split(&j, tile_j).unwrap();
        let seen = trace();
        nest.add_kernel(tracing_kernel("probe", [i, j], &seen));

        CodeGenerator::new().generate(&nest).unwrap();

        let mut visited: Vec<Vec<i64>> = seen.lock().clone();
        visited.sort();
        let expected: Vec<Vec<i64>> =
            (0..m).flat_map(|a| (0..n).map(move |b| vec![a, b])).collect();
        prop_assert_eq!(visited, expected);
    }
}
