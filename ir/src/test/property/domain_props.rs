//! Property-based tests for split-index trees.

use proptest::prelude::*;

use crate::{Index, IndexRange, IterationDomain, Range};

proptest! {
    /// Iterating (outer, inner) with the inner extent clipped to what the
    /// chunk has left visits every integer in [0, N) exactly once, for any
    /// split size, divisible or not.
    #[test]
    fn split_covers_range_exactly_once(n in 1i64..200, size in 1i64..64) {
        let i = Index::new("i");
        let mut domain = IterationDomain::new([IndexRange::new(i.clone(), Range::new(0, n))]).unwrap();
        let split = domain.split(&i, size).unwrap();

        let outer = domain.range_of(&split.outer).unwrap();
        let inner = domain.range_of(&split.inner).unwrap();

        let mut visited = Vec::new();
        for chunk in outer.iter() {
            let available = outer.end() - chunk;
            for offset in inner.clipped_to(inner.end().min(available)).iter() {
                visited.push(chunk + offset);
            }
        }
        let expected: Vec<i64> = (0..n).collect();
        prop_assert_eq!(visited, expected);
    }

    /// Further splitting either child never changes the set of leaf ranges'
    /// combined coverage.
    #[test]
    fn nested_split_coverage(n in 1i64..100, size in 1i64..32, sub in 1i64..8) {
        let i = Index::new("i");
        let mut domain = IterationDomain::new([IndexRange::new(i.clone(), Range::new(0, n))]).unwrap();
        let first = domain.split(&i, size).unwrap();
        let second = domain.split(&first.inner, sub).unwrap();

        let outer = domain.range_of(&first.outer).unwrap();
        let mid = domain.range_of(&second.outer).unwrap();
        let unit = domain.range_of(&second.inner).unwrap();

        let mut visited = Vec::new();
        for chunk in outer.iter() {
            let chunk_len = mid.end().min(outer.end() - chunk);
            for stripe in mid.clipped_to(chunk_len).iter() {
                let stripe_len = unit.end().min(chunk_len - stripe);
                for offset in unit.clipped_to(stripe_len).iter() {
                    visited.push(chunk + stripe + offset);
                }
            }
        }
        let expected: Vec<i64> = (0..n).collect();
        prop_assert_eq!(visited, expected);
    }

    /// Queries stay stable as the tree grows: handles captured before later
    /// splits still resolve to the same base dimension and ranges.
    #[test]
    fn handles_survive_tree_growth(n in 4i64..100, size in 1i64..16) {
        let i = Index::new("i");
        let mut domain = IterationDomain::new([IndexRange::new(i.clone(), Range::new(0, n))]).unwrap();
        let first = domain.split(&i, size).unwrap();
        let outer_range_before = domain.range_of(&first.outer).unwrap();

        let _ = domain.split(&first.inner, 2).unwrap();
        let _ = domain.split(&first.outer, size * 2).unwrap();

        prop_assert_eq!(domain.range_of(&first.outer).unwrap(), outer_range_before);
        prop_assert_eq!(domain.base_index(&first.outer).unwrap(), i.clone());
        prop_assert!(domain.is_computed_index(&first.outer));
    }
}
