//! Everything the interpreter reports to the outside world.
//!
//! Program output, diagnostics, per-step highlight events, tape snapshots and
//! the final halt all go through one [`Observer`]. Every method has a no-op
//! default so a front end only implements what it displays.

use std::fmt;
use std::ops::Range;

use crate::machine::Status;
use crate::source::Op;
use crate::tape::Tape;

/// Messages on the diagnostic channel, kept apart from program output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The run hit its step budget before the program ended.
    StepLimitExceeded { limit: usize },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::StepLimitExceeded { limit } => write!(
                f,
                "Execution stopped: step limit exceeded ({limit}). Possible infinite loop."
            ),
        }
    }
}

/// One executed step, as seen by a highlighting front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepEvent {
    /// Value of the step counter after this step.
    pub step: usize,
    /// Index of the first executed instruction in the filtered stream.
    pub index: usize,
    pub op: Op,
    /// Number of instructions covered (more than 1 for coalesced `+`/`-` runs).
    pub run: usize,
    /// Character range in the raw source to highlight.
    pub source: Range<usize>,
    /// Data pointer and its cell after the step.
    pub pointer: usize,
    pub cell: u8,
}

pub trait Observer {
    /// A byte written by `.`.
    fn output(&mut self, _byte: u8) {}

    fn diagnostic(&mut self, _diagnostic: &Diagnostic) {}

    /// Only called when highlighting is enabled for the step.
    fn step(&mut self, _event: &StepEvent) {}

    /// A published view of the whole tape.
    fn tape(&mut self, _tape: &Tape) {}

    /// The run reached a terminal status. Called once per run.
    fn halted(&mut self, _status: Status) {}
}

/// Keeps everything in memory. Handy for embedding and for tests.
#[derive(Debug, Default, Clone)]
pub struct Recorder {
    pub output: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
    pub steps: Vec<StepEvent>,
    pub tape_publishes: usize,
    pub last_tape: Option<(usize, Vec<u8>)>,
    pub halted: Option<Status>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Observer for Recorder {
    fn output(&mut self, byte: u8) {
        self.output.push(byte);
    }

    fn diagnostic(&mut self, diagnostic: &Diagnostic) {
        self.diagnostics.push(diagnostic.clone());
    }

    fn step(&mut self, event: &StepEvent) {
        self.steps.push(event.clone());
    }

    fn tape(&mut self, tape: &Tape) {
        self.tape_publishes += 1;
        self.last_tape = Some((tape.pointer(), tape.cells().to_vec()));
    }

    fn halted(&mut self, status: Status) {
        self.halted = Some(status);
    }
}
