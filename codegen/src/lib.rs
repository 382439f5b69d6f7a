//! Code generation for the tessel loop-nest scheduler.
//!
//! Takes a scheduled [`LoopNest`](tessel_schedule::LoopNest) and walks it:
//! loops are emitted outermost-to-innermost in the scheduled order, split
//! loops are clipped and partitioned at boundaries, structural constraints
//! are lowered to placement predicates, and kernel callbacks fire at their
//! resolved positions. The walk both executes the kernels and records a
//! [`Program`] describing the emitted structure.
//!
//! # Module Organization
//!
//! - [`generator`] - The generation walk
//! - [`context`] - Per-generation symbol table
//! - [`visit`] - The ordered loop sequence of one generation
//! - [`program`] - The emitted program record
//! - [`error`] - Error types and result handling

pub mod context;
pub mod error;
pub mod generator;
mod predicate_eval;
pub mod program;
pub mod visit;


pub use context::{LoopContext, LoopState, LoopSymbol};
pub use error::{Error, Result};
pub use generator::CodeGenerator;
pub use program::{LoopDescriptor, Program};
pub use visit::{LoopInfo, LoopVisitSchedule};
