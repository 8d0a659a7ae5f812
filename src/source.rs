//! Turning raw source text into an instruction stream.
//!
//! Everything outside `><+-.,[]` is a comment and is dropped. For every kept
//! instruction we remember its character offset in the raw text so front ends
//! can highlight the instruction being executed.

use std::fmt;

/// One Brainfuck instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// `>`
    Right,
    /// `<`
    Left,
    /// `+`
    Inc,
    /// `-`
    Dec,
    /// `.`
    Output,
    /// `,`
    Input,
    /// `[`
    LoopStart,
    /// `]`
    LoopEnd,
}

impl Op {
    pub fn from_char(ch: char) -> Option<Op> {
        Some(match ch {
            '>' => Op::Right,
            '<' => Op::Left,
            '+' => Op::Inc,
            '-' => Op::Dec,
            '.' => Op::Output,
            ',' => Op::Input,
            '[' => Op::LoopStart,
            ']' => Op::LoopEnd,
            _ => return None,
        })
    }

    pub fn as_char(self) -> char {
        match self {
            Op::Right => '>',
            Op::Left => '<',
            Op::Inc => '+',
            Op::Dec => '-',
            Op::Output => '.',
            Op::Input => ',',
            Op::LoopStart => '[',
            Op::LoopEnd => ']',
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// The filtered instruction stream plus where each instruction came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filtered {
    pub ops: Vec<Op>,
    /// `positions[i]` is the character offset of `ops[i]` in the raw source.
    pub positions: Vec<usize>,
}

impl Filtered {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Keep only instruction characters, recording their source offsets.
pub fn filter(raw: &str) -> Filtered {
    let mut out = Filtered::default();
    for (offset, ch) in raw.chars().enumerate() {
        if let Some(op) = Op::from_char(ch) {
            out.ops.push(op);
            out.positions.push(offset);
        }
    }
    out
}
