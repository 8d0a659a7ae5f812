//! The interpreter: execution state plus the single-step function.
//!
//! Quick start:
//!
//! ```
//! use std::sync::Arc;
//! use bfvm::{ExecConfig, Interpreter, Program, Recorder, Status};
//!
//! let program = Arc::new(Program::load("++++++++[>++++++++<-]>+.").unwrap());
//! let mut vm = Interpreter::new(program, 4096, b"".to_vec(), ExecConfig::default());
//! let mut out = Recorder::new();
//! while !vm.step(&mut out, false).is_terminal() {}
//! assert_eq!(vm.status(), Status::HaltedNormal);
//! assert_eq!(out.output, b"A");
//! ```

use std::fmt;
use std::sync::Arc;

use crate::observer::{Diagnostic, Observer, StepEvent};
use crate::program::Program;
use crate::source::Op;
use crate::tape::Tape;

/// Default step budget.
pub const DEFAULT_MAX_STEPS: usize = 1_000_000;

/// What `,` stores when the input is exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum EofPolicy {
    /// Set the cell to 0.
    #[default]
    Zero,
    /// Set the cell to 255.
    #[value(alias = "minusOne")]
    MinusOne,
    /// Leave the cell as it is.
    Unchanged,
}

impl EofPolicy {
    /// Parse a configured value. Anything that is not recognisably `zero` or
    /// `minus-one` means "leave the cell unchanged".
    pub fn parse_lenient(value: &str) -> EofPolicy {
        let v = value.trim().to_ascii_lowercase();
        match v.as_str() {
            "zero" | "0" => EofPolicy::Zero,
            "minusone" | "minus-one" | "minus_one" | "-1" | "255" => EofPolicy::MinusOne,
            _ => EofPolicy::Unchanged,
        }
    }
}

impl fmt::Display for EofPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EofPolicy::Zero => write!(f, "zero"),
            EofPolicy::MinusOne => write!(f, "minus-one"),
            EofPolicy::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Nothing executed yet.
    Ready,
    /// At least one step executed and more remain.
    Running,
    /// The program counter ran off the end of the program.
    HaltedNormal,
    /// The step counter reached the configured budget.
    HaltedStepLimit,
    /// Reserved for instruction-level failures; no current instruction produces it.
    HaltedError,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Status::HaltedNormal | Status::HaltedStepLimit | Status::HaltedError
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Ready => "ready",
            Status::Running => "running",
            Status::HaltedNormal => "halted",
            Status::HaltedStepLimit => "stopped (step limit)",
            Status::HaltedError => "stopped (error)",
        };
        f.write_str(s)
    }
}

/// Per-run knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecConfig {
    /// Step budget; values below 1 are raised to 1.
    pub max_steps: usize,
    pub eof: EofPolicy,
    /// Execute a run of identical `+` or `-` as a single step.
    pub coalesce: bool,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            eof: EofPolicy::Zero,
            coalesce: true,
        }
    }
}

/// Mutable state of the one active run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionState {
    pub pc: usize,
    pub steps: usize,
    pub input: Vec<u8>,
    pub input_cursor: usize,
    pub status: Status,
}

impl ExecutionState {
    fn new(input: Vec<u8>) -> Self {
        Self {
            pc: 0,
            steps: 0,
            input,
            input_cursor: 0,
            status: Status::Ready,
        }
    }

    fn next_input(&mut self) -> Option<u8> {
        let byte = self.input.get(self.input_cursor).copied()?;
        self.input_cursor += 1;
        Some(byte)
    }
}

/// Executes a [`Program`] against a [`Tape`], one step per call.
#[derive(Debug, Clone)]
pub struct Interpreter {
    program: Arc<Program>,
    tape: Tape,
    state: ExecutionState,
    config: ExecConfig,
}

impl Interpreter {
    /// Fresh run on a newly allocated tape of `tape_size` cells.
    pub fn new(program: Arc<Program>, tape_size: usize, input: Vec<u8>, config: ExecConfig) -> Self {
        Self::with_tape(program, Tape::new(tape_size), input, config)
    }

    /// Fresh run reusing an existing tape allocation. The tape is zeroed.
    pub fn with_tape(program: Arc<Program>, mut tape: Tape, input: Vec<u8>, config: ExecConfig) -> Self {
        tape.reset();
        let config = ExecConfig {
            max_steps: config.max_steps.max(1),
            ..config
        };
        Self {
            program,
            tape,
            state: ExecutionState::new(input),
            config,
        }
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn tape(&self) -> &Tape {
        &self.tape
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    pub fn status(&self) -> Status {
        self.state.status
    }

    pub fn steps(&self) -> usize {
        self.state.steps
    }

    pub fn pc(&self) -> usize {
        self.state.pc
    }

    /// Give the tape back, e.g. to recycle it for the next run.
    pub fn into_tape(self) -> Tape {
        self.tape
    }

    /// Execute exactly one step.
    ///
    /// The step budget and the end of the program are checked before anything
    /// runs, so calling this on a halted interpreter does nothing. When
    /// `highlight` is set the observer receives a [`StepEvent`] for the step.
    pub fn step<O: Observer + ?Sized>(&mut self, observer: &mut O, highlight: bool) -> Status {
        if self.state.status.is_terminal() {
            return self.state.status;
        }

        if self.state.steps >= self.config.max_steps {
            observer.diagnostic(&Diagnostic::StepLimitExceeded {
                limit: self.config.max_steps,
            });
            return self.halt(Status::HaltedStepLimit, observer);
        }

        let start = self.state.pc;
        let Some(op) = self.program.op(start) else {
            return self.halt(Status::HaltedNormal, observer);
        };

        let run = match op {
            Op::Inc | Op::Dec if self.config.coalesce => self.program.run_length(start),
            _ => 1,
        };

        match op {
            Op::Right => {
                self.tape.move_right();
                self.state.pc += 1;
            }
            Op::Left => {
                self.tape.move_left();
                self.state.pc += 1;
            }
            Op::Inc => {
                self.tape.add(run);
                self.state.pc += run;
            }
            Op::Dec => {
                self.tape.sub(run);
                self.state.pc += run;
            }
            Op::Output => {
                observer.output(self.tape.get());
                self.state.pc += 1;
            }
            Op::Input => {
                match self.state.next_input() {
                    Some(byte) => self.tape.set(byte),
                    None => match self.config.eof {
                        EofPolicy::Zero => self.tape.set(0),
                        EofPolicy::MinusOne => self.tape.set(255),
                        EofPolicy::Unchanged => {}
                    },
                }
                self.state.pc += 1;
            }
            Op::LoopStart => {
                self.state.pc = if self.tape.get() == 0 {
                    self.partner(start) + 1
                } else {
                    start + 1
                };
            }
            Op::LoopEnd => {
                self.state.pc = if self.tape.get() != 0 {
                    self.partner(start) + 1
                } else {
                    start + 1
                };
            }
        }

        self.state.steps += 1;

        if highlight {
            observer.step(&StepEvent {
                step: self.state.steps,
                index: start,
                op,
                run,
                source: self.program.source_span(start, run),
                pointer: self.tape.pointer(),
                cell: self.tape.get(),
            });
        }

        if self.state.pc >= self.program.len() {
            self.halt(Status::HaltedNormal, observer)
        } else {
            self.state.status = Status::Running;
            self.state.status
        }
    }

    /// Step until a terminal status without highlighting.
    pub fn run_to_end<O: Observer + ?Sized>(&mut self, observer: &mut O) -> Status {
        loop {
            let status = self.step(observer, false);
            if status.is_terminal() {
                return status;
            }
        }
    }

    fn partner(&self, index: usize) -> usize {
        // Programs are only constructed with a complete bracket map.
        self.program.brackets().partner(index).unwrap_or(index)
    }

    fn halt<O: Observer + ?Sized>(&mut self, status: Status, observer: &mut O) -> Status {
        self.state.status = status;
        observer.halted(status);
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::Recorder;
    use proptest::prelude::*;

    fn vm(code: &str, input: &[u8], config: ExecConfig) -> Interpreter {
        let program = Arc::new(Program::load(code).expect("valid program"));
        Interpreter::new(program, 16, input.to_vec(), config)
    }

    fn run(code: &str, input: &[u8], config: ExecConfig) -> (Interpreter, Recorder) {
        let mut vm = vm(code, input, config);
        let mut rec = Recorder::new();
        vm.run_to_end(&mut rec);
        (vm, rec)
    }

    #[test]
    fn new_interpreter_is_ready() {
        let vm = vm("+", b"", ExecConfig::default());
        assert_eq!(vm.status(), Status::Ready);
        assert_eq!(vm.steps(), 0);
        assert_eq!(vm.pc(), 0);
    }

    #[test]
    fn plus_plus_dot_outputs_two() {
        let (vm, rec) = run("++.", b"", ExecConfig::default());
        assert_eq!(rec.output, vec![2]);
        assert_eq!(vm.status(), Status::HaltedNormal);
        assert_eq!(rec.halted, Some(Status::HaltedNormal));
    }

    #[test]
    fn input_is_echoed() {
        let (_, rec) = run(",.", b"A", ExecConfig::default());
        assert_eq!(rec.output, b"A");
    }

    #[test]
    fn eof_policies() {
        let zero = ExecConfig { eof: EofPolicy::Zero, ..ExecConfig::default() };
        let minus = ExecConfig { eof: EofPolicy::MinusOne, ..ExecConfig::default() };
        let keep = ExecConfig { eof: EofPolicy::Unchanged, ..ExecConfig::default() };

        assert_eq!(run(",.", b"", zero).1.output, vec![0]);
        assert_eq!(run("+++,.", b"", zero).1.output, vec![0]);
        assert_eq!(run("+++,.", b"", minus).1.output, vec![255]);
        assert_eq!(run("+++,.", b"", keep).1.output, vec![3]);
    }

    #[test]
    fn input_is_consumed_in_order() {
        let (vm, rec) = run(",.,.,.", b"xy", ExecConfig::default());
        assert_eq!(rec.output, vec![b'x', b'y', 0]);
        assert_eq!(vm.state().input_cursor, 2);
    }

    #[test]
    fn clear_loop_halts_normally_with_zero_cell() {
        let (vm, _) = run("+[-]", b"", ExecConfig::default());
        assert_eq!(vm.status(), Status::HaltedNormal);
        assert_eq!(vm.tape().cells()[0], 0);
    }

    #[test]
    fn loop_skipped_when_cell_is_zero() {
        let (vm, rec) = run("[.]+", b"", ExecConfig::default());
        assert!(rec.output.is_empty());
        assert_eq!(vm.tape().cells()[0], 1);
        assert_eq!(vm.steps(), 2);
    }

    #[test]
    fn pointer_wraps_instead_of_failing() {
        let (vm, _) = run("<+", b"", ExecConfig::default());
        assert_eq!(vm.tape().pointer(), 15);
        assert_eq!(vm.tape().cells()[15], 1);
    }

    #[test]
    fn runaway_loop_hits_step_limit() {
        let config = ExecConfig { max_steps: 100, ..ExecConfig::default() };
        let (vm, rec) = run("+[]", b"", config);
        assert_eq!(vm.status(), Status::HaltedStepLimit);
        assert_eq!(vm.steps(), 100);
        assert_eq!(rec.diagnostics, vec![Diagnostic::StepLimitExceeded { limit: 100 }]);
        assert!(rec.output.is_empty());
    }

    #[test]
    fn zero_max_steps_is_raised_to_one() {
        let config = ExecConfig { max_steps: 0, ..ExecConfig::default() };
        let (vm, _) = run("+>+", b"", config);
        assert_eq!(vm.config().max_steps, 1);
        assert_eq!(vm.steps(), 1);
        assert_eq!(vm.status(), Status::HaltedStepLimit);
    }

    #[test]
    fn program_ending_exactly_at_budget_halts_normally() {
        let config = ExecConfig { max_steps: 2, ..ExecConfig::default() };
        let (vm, rec) = run(">+", b"", config);
        assert_eq!(vm.status(), Status::HaltedNormal);
        assert!(rec.diagnostics.is_empty());
    }

    #[test]
    fn halted_interpreter_is_a_no_op() {
        let (mut vm, mut rec) = run("+.", b"", ExecConfig::default());
        let before = vm.state().clone();
        assert_eq!(vm.step(&mut rec, true), Status::HaltedNormal);
        assert_eq!(vm.state(), &before);
        assert_eq!(rec.output, vec![1]);
        assert!(rec.steps.is_empty());
    }

    #[test]
    fn coalesced_run_is_one_step_with_one_span() {
        let mut vm = vm("a+++b-", b"", ExecConfig::default());
        let mut rec = Recorder::new();
        assert_eq!(vm.step(&mut rec, true), Status::Running);
        assert_eq!(vm.steps(), 1);
        assert_eq!(vm.pc(), 3);
        assert_eq!(vm.tape().get(), 3);
        let event = &rec.steps[0];
        assert_eq!(event.op, Op::Inc);
        assert_eq!(event.run, 3);
        assert_eq!(event.source, 1..4);
        assert_eq!(event.cell, 3);
    }

    #[test]
    fn uncoalesced_runs_step_per_character() {
        let config = ExecConfig { coalesce: false, ..ExecConfig::default() };
        let (vm, _) = run("+++--", b"", config);
        assert_eq!(vm.steps(), 5);
        assert_eq!(vm.tape().get(), 1);
    }

    #[test]
    fn no_step_events_without_highlight() {
        let (_, rec) = run("+>+<-", b"", ExecConfig::default());
        assert!(rec.steps.is_empty());
    }

    #[test]
    fn with_tape_zeroes_recycled_tape() {
        let (vm, _) = run("+++>++", b"", ExecConfig::default());
        let tape = vm.into_tape();
        let program = Arc::new(Program::load(".").unwrap());
        let fresh = Interpreter::with_tape(program, tape, Vec::new(), ExecConfig::default());
        assert!(fresh.tape().cells().iter().all(|&c| c == 0));
        assert_eq!(fresh.tape().pointer(), 0);
    }

    #[test]
    fn eof_policy_lenient_parsing() {
        assert_eq!(EofPolicy::parse_lenient("zero"), EofPolicy::Zero);
        assert_eq!(EofPolicy::parse_lenient("minusOne"), EofPolicy::MinusOne);
        assert_eq!(EofPolicy::parse_lenient(" minus-one "), EofPolicy::MinusOne);
        assert_eq!(EofPolicy::parse_lenient("unchanged"), EofPolicy::Unchanged);
        assert_eq!(EofPolicy::parse_lenient("whatever"), EofPolicy::Unchanged);
    }

    const HELLO: &str = "++++++++++[>+++++++>++++++++++>+++>+<<<<-]>++.>+.+++++++..+++.>++.<<+++++++++++++++.>.+++.------.--------.>+.>.";

    #[test]
    fn hello_world() {
        let (vm, rec) = run(HELLO, b"", ExecConfig::default());
        assert_eq!(rec.output_lossy(), "Hello World!\n");
        assert_eq!(vm.status(), Status::HaltedNormal);
    }

    #[test]
    fn rerunning_is_deterministic() {
        let first = run(HELLO, b"abc", ExecConfig::default());
        let second = run(HELLO, b"abc", ExecConfig::default());
        assert_eq!(first.1.output, second.1.output);
        assert_eq!(first.0.tape(), second.0.tape());
        assert_eq!(first.0.steps(), second.0.steps());
    }

    proptest! {
        #[test]
        fn coalescing_does_not_change_results(code in "[+\\-<>]{0,60}", input in proptest::collection::vec(any::<u8>(), 0..4)) {
            let code = format!("{code},.");
            let (a, ra) = run(&code, &input, ExecConfig::default());
            let (b, rb) = run(&code, &input, ExecConfig { coalesce: false, ..ExecConfig::default() });
            prop_assert_eq!(a.tape(), b.tape());
            prop_assert_eq!(ra.output, rb.output);
            prop_assert!(a.steps() <= b.steps());
        }

        #[test]
        fn plus_run_then_minus_run_restores_cell(value: u8, k in 1usize..600) {
            let code = format!("{}{}{}", "+".repeat(value as usize), "+".repeat(k), "-".repeat(k));
            let (coalesced, _) = run(&code, b"", ExecConfig::default());
            prop_assert_eq!(coalesced.tape().get(), value);
        }
    }
}
