//! Kernel placement predicates.
//!
//! A [`KernelPredicate`] is an immutable boolean expression tree deciding, at
//! a concrete index-value binding during generation, whether a kernel fires.
//! Atoms test loop fragments (`First`, `Last`, `EndBoundary`, `All`), walk
//! position relative to another loop (`Before`, `After`), or whether an index
//! has a value at all (`IsDefined`). The tree is built once at registration
//! time and never mutated; evaluation lives in the generator, which owns the
//! runtime symbol table.

use smallvec::SmallVec;

use crate::index::Index;

/// Which fragment of a loop's iteration space an atom matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fragment {
    /// Only the first iteration.
    First,
    /// Only the last iteration (of the clipped range).
    Last,
    /// Only the final short remainder chunk of a split index.
    EndBoundary,
    /// Every iteration.
    All,
}

/// Walk position an atom matches, relative to a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    /// The loop has not been entered yet.
    Before,
    /// The loop has completed.
    After,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KernelPredicate {
    /// No constraint; always satisfied.
    Empty,
    Constant(bool),
    Fragment { index: Index, fragment: Fragment },
    Placement { index: Option<Index>, placement: Placement },
    IsDefined { index: Index },
    And(Box<KernelPredicate>, Box<KernelPredicate>),
    Or(Box<KernelPredicate>, Box<KernelPredicate>),
}

impl KernelPredicate {
    pub fn first(index: &Index) -> Self {
        Self::Fragment { index: index.clone(), fragment: Fragment::First }
    }

    pub fn last(index: &Index) -> Self {
        Self::Fragment { index: index.clone(), fragment: Fragment::Last }
    }

    pub fn end_boundary(index: &Index) -> Self {
        Self::Fragment { index: index.clone(), fragment: Fragment::EndBoundary }
    }

    pub fn all(index: &Index) -> Self {
        Self::Fragment { index: index.clone(), fragment: Fragment::All }
    }

    pub fn is_defined(index: &Index) -> Self {
        Self::IsDefined { index: index.clone() }
    }

    pub fn before(index: &Index) -> Self {
        Self::Placement { index: Some(index.clone()), placement: Placement::Before }
    }

    pub fn after(index: &Index) -> Self {
        Self::Placement { index: Some(index.clone()), placement: Placement::After }
    }

    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::Empty, p) | (p, Self::Empty) => p,
            (a, b) => Self::And(Box::new(a), Box::new(b)),
        }
    }

    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::Empty, p) | (p, Self::Empty) => p,
            (a, b) => Self::Or(Box::new(a), Box::new(b)),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Structural simplification: folds constants and drops `All` atoms,
    /// which constrain nothing. No index binding is consulted.
    pub fn simplify(&self) -> Self {
        match self {
            Self::Fragment { fragment: Fragment::All, .. } => Self::Empty,
            Self::And(a, b) => match (a.simplify(), b.simplify()) {
                (Self::Constant(false), _) | (_, Self::Constant(false)) => Self::Constant(false),
                (Self::Constant(true), p) | (p, Self::Constant(true)) => p,
                (Self::Empty, p) | (p, Self::Empty) => p,
                (a, b) => Self::And(Box::new(a), Box::new(b)),
            },
            Self::Or(a, b) => match (a.simplify(), b.simplify()) {
                (Self::Constant(true), _) | (_, Self::Constant(true)) => Self::Constant(true),
                (Self::Constant(false), p) | (p, Self::Constant(false)) => p,
                (Self::Empty, p) | (p, Self::Empty) => p,
                (a, b) => Self::Or(Box::new(a), Box::new(b)),
            },
            other => other.clone(),
        }
    }

    /// Every index the predicate mentions.
    pub fn indices(&self) -> SmallVec<[Index; 4]> {
        let mut out = SmallVec::new();
        self.collect_indices(&mut out);
        out
    }

    fn collect_indices(&self, out: &mut SmallVec<[Index; 4]>) {
        match self {
            Self::Fragment { index, .. } | Self::IsDefined { index } => {
                if !out.contains(index) {
                    out.push(index.clone());
                }
            }
            Self::Placement { index: Some(index), .. } => {
                if !out.contains(index) {
                    out.push(index.clone());
                }
            }
            Self::And(a, b) | Self::Or(a, b) => {
                a.collect_indices(out);
                b.collect_indices(out);
            }
            _ => {}
        }
    }

    /// Rewrites every mentioned index through `map`; indices absent from the
    /// map are kept. Used when fusing nests that unify index pairs.
    pub fn substitute(&self, map: &dyn Fn(&Index) -> Option<Index>) -> Self {
        let swap = |index: &Index| map(index).unwrap_or_else(|| index.clone());
        match self {
            Self::Fragment { index, fragment } => Self::Fragment { index: swap(index), fragment: *fragment },
            Self::IsDefined { index } => Self::IsDefined { index: swap(index) },
            Self::Placement { index, placement } => {
                Self::Placement { index: index.as_ref().map(swap), placement: *placement }
            }
            Self::And(a, b) => Self::And(Box::new(a.substitute(map)), Box::new(b.substitute(map))),
            Self::Or(a, b) => Self::Or(Box::new(a.substitute(map)), Box::new(b.substitute(map))),
            other => other.clone(),
        }
    }
}
