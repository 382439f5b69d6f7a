//! Loop-nest scheduling for the tessel compiler.
//!
//! This crate owns the build phase: a [`LoopNest`] couples an iteration
//! domain with kernel registrations, placement rules, rename scoping, and
//! per-loop execution marks; a [`Schedule`] is the mutable façade applying
//! transformations (split, reorder, parallelize, unroll, cache); the
//! [`cache`] module provides the pluggable caching strategies.
//!
//! # Module Organization
//!
//! - [`kernel`] - Kernels and placement slots
//! - [`constraints`] - Structural placement constraints
//! - [`nest`] - Loop nests and fusion
//! - [`schedule`] - The scheduling façade
//! - [`cache`] - Caching strategies
//! - [`error`] - Error types and result handling

pub mod cache;
pub mod constraints;
pub mod error;
pub mod kernel;
pub mod nest;
pub mod schedule;


pub use cache::{
    ArgumentKind, BlastCopy, CacheArgs, CacheHandle, CachingStrategy, CopyInputCopyOutput, GeneralCachingStrategy,
    ReduceFn, SubMatrixCopyIn, ZeroInputCopyOutput, ZeroInputReduceOutput,
};
pub use constraints::{CodePosition, CodePositionConstraints};
pub use error::{Error, Result};
pub use kernel::{Kernel, KernelBuilder, KernelFn, KernelId, SlotId};
pub use nest::{fuse, fuse_shared, KernelGroup, LoopNest, RenameAction, ScheduledKernel};
pub use schedule::Schedule;
