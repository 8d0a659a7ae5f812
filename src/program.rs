//! A validated, immutable program ready to execute.

use std::ops::Range;

use crate::brackets::BracketMap;
use crate::error::LoadError;
use crate::source::{self, Op};

/// Instructions, their source offsets and the bracket map, checked once up front.
///
/// Loading never touches any execution state, so a rejected program leaves
/// the previous run untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    ops: Vec<Op>,
    positions: Vec<usize>,
    brackets: BracketMap,
}

impl Program {
    pub fn load(raw: &str) -> Result<Self, LoadError> {
        let filtered = source::filter(raw);
        if filtered.is_empty() {
            return Err(LoadError::Empty);
        }

        let brackets = BracketMap::build(&filtered.ops).map_err(|e| LoadError::UnmatchedBracket {
            kind: e.kind,
            index: e.index,
            offset: filtered.positions[e.index],
        })?;

        Ok(Self {
            ops: filtered.ops,
            positions: filtered.positions,
            brackets,
        })
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn op(&self, index: usize) -> Option<Op> {
        self.ops.get(index).copied()
    }

    pub fn brackets(&self) -> &BracketMap {
        &self.brackets
    }

    /// Character offset of instruction `index` in the raw source.
    pub fn position(&self, index: usize) -> Option<usize> {
        self.positions.get(index).copied()
    }

    /// Source character range covering `len` instructions starting at `start`.
    ///
    /// Comments between the instructions are included in the range.
    pub fn source_span(&self, start: usize, len: usize) -> Range<usize> {
        let Some(first) = self.position(start) else {
            return 0..0;
        };
        let last_index = (start + len.max(1) - 1).min(self.positions.len() - 1);
        first..self.positions[last_index] + 1
    }

    /// Length of the run of identical instructions starting at `start`.
    pub fn run_length(&self, start: usize) -> usize {
        let Some(&op) = self.ops.get(start) else {
            return 0;
        };
        self.ops[start..].iter().take_while(|&&o| o == op).count()
    }
}
