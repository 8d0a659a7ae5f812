//! A Brainfuck virtual machine with instant, paced and single-step execution.
//!
//! The machine runs on a circular tape of byte cells (4096 by default) with
//! a data pointer that wraps at both ends. Programs are filtered down to the
//! eight instruction characters, with a map back to the raw source so that
//! front ends can highlight what is executing.
//!
//! Features and behaviors:
//! - Cell arithmetic wraps modulo 256; pointer moves wrap around the tape.
//! - Unmatched `[` or `]` are rejected before anything runs.
//! - `,` consumes a fixed input buffer; what it stores at end of input is
//!   chosen by [`EofPolicy`].
//! - Every run has a step budget. Hitting it halts the run and emits a
//!   [`Diagnostic`] instead of hanging.
//! - Runs of identical `+` or `-` execute as one step unless disabled.
//!
//! Quick start:
//!
//! ```
//! use bfvm::{ExecConfig, Recorder, Session, Status};
//!
//! let mut session = Session::new(4096, ExecConfig::default());
//! session.set_source("++++++++++[>+++++++>++++++++++>+++>+<<<<-]>++.>+.+++++++..+++.>++.<<+++++++++++++++.>.+++.------.--------.>+.>.");
//! let mut out = Recorder::new();
//! assert_eq!(session.run_instant(&mut out), Ok(Status::HaltedNormal));
//! assert_eq!(out.output_lossy(), "Hello World!\n");
//! ```

pub mod log;

pub mod brackets;
pub mod error;
pub mod machine;
pub mod observer;
pub mod program;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod tape;

pub mod cli_util;
pub mod commands;
pub mod config;
pub mod repl;
pub mod samples;
pub mod theme;
pub mod tui;
pub mod view;

pub use brackets::BracketMap;
pub use error::{BracketError, ConfigError, LoadError, RunError, UnmatchedBracketKind};
pub use machine::{EofPolicy, ExecConfig, ExecutionState, Interpreter, Status};
pub use observer::{Diagnostic, Observer, Recorder, StepEvent};
pub use program::Program;
pub use scheduler::{CancelToken, Pacer, RunOutcome, Speed, ThreadPacer, Tick};
pub use session::Session;
pub use source::Op;
pub use tape::Tape;
