//! Core data model for the tessel loop-nest scheduler.
//!
//! This crate defines the structures the schedule and codegen layers operate
//! on:
//!
//! - [`index`] - Loop index handles
//! - [`range`] - Half-open ranges with a loop step
//! - [`dimension`] - Per-dimension split trees
//! - [`domain`] - Multi-dimensional iteration domains
//! - [`predicate`] - Kernel placement predicate expression trees
//! - [`value`] - Operand storage, views, and re-pointable view cells
//! - [`error`] - Error types and result handling

pub mod dimension;
pub mod domain;
pub mod error;
pub mod index;
pub mod predicate;
pub mod range;
pub mod value;


pub use dimension::{DimensionTree, SplitIndex};
pub use domain::{IndexExpression, IterationDomain, ScaledIndex};
pub use error::{Error, ErrorKind, Result};
pub use index::Index;
pub use predicate::{Fragment, KernelPredicate, Placement};
pub use range::{IndexRange, Range};
pub use value::{Element, Layout, Operand, Tensor, View};
