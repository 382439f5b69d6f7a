//! Explicit generation context threaded through the recursive walk.

use std::collections::HashMap;

use tessel_ir::{Index, Range};

use crate::program::Program;

/// Walk state of one loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    InProgress,
    Done,
}

/// Symbol-table entry for one loop index: its current value, the clipped
/// full range its loop traverses under the current outer bindings, and
/// whether the loop is still running.
#[derive(Debug, Clone)]
pub struct LoopSymbol {
    pub value: i64,
    pub loop_range: Range,
    pub state: LoopState,
}

/// All mutable state of one `generate` call: the loop-index symbol table and
/// the program being recorded. There is no process-wide generation state;
/// parallel partitions fork the context and the results are merged back.
#[derive(Debug, Clone, Default)]
pub struct LoopContext {
    symbols: HashMap<Index, LoopSymbol>,
    pub(crate) program: Program,
}

impl LoopContext {
    pub fn symbol(&self, index: &Index) -> Option<&LoopSymbol> {
        self.symbols.get(index)
    }

    pub fn value_of(&self, index: &Index) -> Option<i64> {
        self.symbols.get(index).map(|entry| entry.value)
    }

    pub fn is_defined(&self, index: &Index) -> bool {
        self.symbols.contains_key(index)
    }

    pub(crate) fn define(&mut self, index: &Index, value: i64, loop_range: Range) {
        self.symbols.insert(index.clone(), LoopSymbol { value, loop_range, state: LoopState::InProgress });
    }

    pub(crate) fn mark_done(&mut self, index: &Index) {
        if let Some(entry) = self.symbols.get_mut(index) {
            entry.state = LoopState::Done;
        }
    }

    pub(crate) fn undefine(&mut self, index: &Index) {
        self.symbols.remove(index);
    }

    /// Fork for a parallel partition: shares nothing mutable; the program
    /// recorded by the fork is merged back with [`LoopContext::absorb`].
    pub(crate) fn fork(&self) -> Self {
        Self { symbols: self.symbols.clone(), program: Program::default() }
    }

    pub(crate) fn absorb(&mut self, fork: LoopContext, adopt_symbols: bool) {
        self.program.absorb(fork.program);
        if adopt_symbols {
            self.symbols = fork.symbols;
        }
    }
}
