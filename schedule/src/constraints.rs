//! Structural placement constraints.

use smallvec::SmallVec;
use tessel_ir::Index;

/// Where a kernel sits relative to the loop level its indices resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodePosition {
    /// Once, before the first iteration of every not-yet-entered dimension.
    Prologue,
    /// Once per iteration at the innermost level the kernel declares.
    Body,
    /// Once, after the last iteration of every inner dimension completes.
    Epilogue,
}

/// Structural constraint attached to a kernel registration: the position,
/// indices that must already be entered when it fires, and indices whose
/// loops it must stay outside of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodePositionConstraints {
    position: CodePosition,
    required: SmallVec<[Index; 4]>,
    boundary: SmallVec<[Index; 4]>,
}

impl CodePositionConstraints {
    pub fn new(
        position: CodePosition,
        required: impl IntoIterator<Item = Index>,
        boundary: impl IntoIterator<Item = Index>,
    ) -> Self {
        Self { position, required: required.into_iter().collect(), boundary: boundary.into_iter().collect() }
    }

    pub fn body() -> Self {
        Self::new(CodePosition::Body, [], [])
    }

    pub fn prologue(required: impl IntoIterator<Item = Index>) -> Self {
        Self::new(CodePosition::Prologue, required, [])
    }

    pub fn epilogue(required: impl IntoIterator<Item = Index>) -> Self {
        Self::new(CodePosition::Epilogue, required, [])
    }

    pub fn position(&self) -> CodePosition {
        self.position
    }

    pub fn required(&self) -> &[Index] {
        &self.required
    }

    pub fn boundary(&self) -> &[Index] {
        &self.boundary
    }
}
