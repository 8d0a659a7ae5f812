//! The single owner of "the" run.
//!
//! A [`Session`] holds the current source, input and settings, and at most one
//! live [`Interpreter`]. Every operation that starts or advances execution
//! goes through the `running` guard, so two runs can never overlap, and
//! changing the source throws away state that belongs to the old program.

use std::sync::Arc;

use crate::error::{LoadError, RunError};
use crate::machine::{ExecConfig, Interpreter, Status};
use crate::observer::Observer;
use crate::program::Program;
use crate::scheduler::{self, CancelToken, Pacer, RunOutcome, Speed, Tick};
use crate::tape::Tape;
use crate::{debug, info};

#[derive(Debug)]
pub struct Session {
    source: String,
    input: Vec<u8>,
    config: ExecConfig,
    interp: Option<Interpreter>,
    // Tape kept around between runs (and shown) when no interpreter is live.
    idle_tape: Tape,
    running: bool,
    cancel: CancelToken,
}

impl Session {
    pub fn new(tape_size: usize, config: ExecConfig) -> Self {
        Self {
            source: String::new(),
            input: Vec::new(),
            config,
            interp: None,
            idle_tape: Tape::new(tape_size),
            running: false,
            cancel: CancelToken::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn input(&self) -> &[u8] {
        &self.input
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Replace the source text.
    ///
    /// A paced run in progress is cancelled and the execution state dropped;
    /// the tape contents stay visible until the next run starts.
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
        self.abandon();
    }

    /// Input bytes for the next run. The current run keeps its own copy.
    pub fn set_input(&mut self, input: impl Into<Vec<u8>>) {
        self.input = input.into();
    }

    /// Settings for the next run.
    pub fn set_config(&mut self, config: ExecConfig) {
        self.config = config;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn interpreter(&self) -> Option<&Interpreter> {
        self.interp.as_ref()
    }

    pub fn status(&self) -> Option<Status> {
        self.interp.as_ref().map(Interpreter::status)
    }

    pub fn tape(&self) -> &Tape {
        match &self.interp {
            Some(interp) => interp.tape(),
            None => &self.idle_tape,
        }
    }

    /// A handle that stops the current paced run at its next tick boundary.
    ///
    /// The session re-arms the token once a run has stopped because of it, so
    /// a cancel lands on exactly one run. A cancel made while idle stops the
    /// next paced run as soon as it starts.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Validate the source without touching any state.
    pub fn check(&self) -> Result<Program, LoadError> {
        Program::load(&self.source)
    }

    /// Run to completion in one go.
    pub fn run_instant<O: Observer + ?Sized>(&mut self, observer: &mut O) -> Result<Status, RunError> {
        self.ensure_idle()?;
        self.prepare()?;
        let interp = self.interp.as_mut().ok_or(RunError::Busy)?;
        self.running = true;
        let status = scheduler::run_instant(interp, observer);
        self.running = false;
        info!("run finished: {status} after {} steps", interp.steps());
        Ok(status)
    }

    /// Finish the current run without restarting it. With nothing to resume
    /// this is the same as [`Session::run_instant`].
    pub fn resume_instant<O: Observer + ?Sized>(&mut self, observer: &mut O) -> Result<Status, RunError> {
        self.ensure_idle()?;
        if !self.can_resume() {
            self.prepare()?;
        }
        let interp = self.interp.as_mut().ok_or(RunError::Busy)?;
        self.running = true;
        let status = scheduler::run_instant(interp, observer);
        self.running = false;
        info!("run resumed and finished: {status} after {} steps", interp.steps());
        Ok(status)
    }

    /// Run tick by tick, pausing through `pacer`, until halt or cancellation.
    pub fn run_paced<O, P>(&mut self, observer: &mut O, pacer: &mut P) -> Result<RunOutcome, RunError>
    where
        O: Observer + ?Sized,
        P: Pacer + ?Sized,
    {
        self.start_paced()?;
        let interp = self.interp.as_mut().ok_or(RunError::Busy)?;
        let outcome = scheduler::run_paced(interp, observer, pacer, &self.cancel);
        self.running = false;
        if outcome == RunOutcome::Cancelled {
            self.cancel.reset();
        }
        info!("paced run ended: {outcome:?} after {} steps", interp.steps());
        Ok(outcome)
    }

    /// Begin a paced run driven by [`Session::tick`] from an event loop.
    pub fn start_paced(&mut self) -> Result<(), RunError> {
        self.ensure_idle()?;
        self.prepare()?;
        self.running = true;
        Ok(())
    }

    /// Like [`Session::start_paced`], but picks up a paused run where it
    /// stopped instead of starting over.
    pub fn resume_paced(&mut self) -> Result<(), RunError> {
        self.ensure_idle()?;
        if !self.can_resume() {
            self.prepare()?;
        }
        self.running = true;
        Ok(())
    }

    /// Whether a live run has steps left to execute.
    pub fn can_resume(&self) -> bool {
        self.interp
            .as_ref()
            .is_some_and(|interp| !interp.status().is_terminal())
    }

    /// Advance a paced run by one tick. `None` when no paced run is active,
    /// including right after it was cancelled.
    pub fn tick<O: Observer + ?Sized>(&mut self, observer: &mut O, speed: Speed) -> Option<Tick> {
        if !self.running {
            return None;
        }
        if self.cancel.is_cancelled() {
            debug!("paced run cancelled");
            self.cancel.reset();
            self.running = false;
            return None;
        }
        let interp = self.interp.as_mut()?;
        let tick = scheduler::tick(interp, observer, speed);
        if let Tick::Finished(status) = tick {
            info!("paced run finished: {status} after {} steps", interp.steps());
            self.running = false;
        }
        Some(tick)
    }

    /// Execute one step on behalf of a user action.
    ///
    /// The first call (or the first after a run ended or the source changed)
    /// sets up a fresh run.
    pub fn step<O: Observer + ?Sized>(&mut self, observer: &mut O) -> Result<Status, RunError> {
        self.ensure_idle()?;
        let needs_fresh_run = self
            .interp
            .as_ref()
            .is_none_or(|interp| interp.status().is_terminal());
        if needs_fresh_run {
            self.prepare()?;
        }
        let interp = self.interp.as_mut().ok_or(RunError::Busy)?;
        let status = interp.step(observer, true);
        observer.tape(interp.tape());
        Ok(status)
    }

    /// Stop a paced run. Returns whether one was active.
    pub fn cancel(&mut self) -> bool {
        let was_running = self.running;
        self.running = false;
        was_running
    }

    /// Stop everything, drop the execution state and zero the tape.
    pub fn reset(&mut self) {
        self.abandon();
        self.idle_tape.reset();
    }

    fn ensure_idle(&self) -> Result<(), RunError> {
        if self.running {
            return Err(RunError::Busy);
        }
        Ok(())
    }

    /// Load the source and replace the interpreter with a fresh one.
    ///
    /// Loading happens first, so a bad program leaves everything as it was.
    fn prepare(&mut self) -> Result<(), LoadError> {
        let program = Arc::new(Program::load(&self.source)?);
        let tape = match self.interp.take() {
            Some(old) => old.into_tape(),
            None => std::mem::take(&mut self.idle_tape),
        };
        debug!(
            "starting run: {} instructions, {} input bytes, max_steps={}, eof={}",
            program.len(),
            self.input.len(),
            self.config.max_steps,
            self.config.eof
        );
        self.interp = Some(Interpreter::with_tape(program, tape, self.input.clone(), self.config));
        Ok(())
    }

    fn abandon(&mut self) {
        if self.running {
            debug!("abandoning active run");
        }
        self.running = false;
        if let Some(interp) = self.interp.take() {
            self.idle_tape = interp.into_tape();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnmatchedBracketKind;
    use crate::observer::Recorder;
    use std::time::Duration;

    fn session(code: &str) -> Session {
        let mut s = Session::new(32, ExecConfig::default());
        s.set_source(code);
        s
    }

    struct NoWait(Speed);

    impl Pacer for NoWait {
        fn speed(&self) -> Speed {
            self.0
        }
        fn pause(&mut self, _delay: Duration) {}
    }

    #[test]
    fn instant_run_end_to_end() {
        let mut s = session("++.");
        let mut rec = Recorder::new();
        assert_eq!(s.run_instant(&mut rec), Ok(Status::HaltedNormal));
        assert_eq!(rec.output, vec![2]);
        assert!(!s.is_running());
    }

    #[test]
    fn load_error_leaves_state_untouched() {
        let mut s = session("+++");
        s.run_instant(&mut Recorder::new()).unwrap();
        let before = s.tape().clone();

        s.set_source("+[");
        let err = s.run_instant(&mut Recorder::new()).unwrap_err();
        assert!(matches!(
            err,
            RunError::Load(LoadError::UnmatchedBracket { kind: UnmatchedBracketKind::Open, .. })
        ));
        assert_eq!(s.tape(), &before);
        assert!(!s.is_running());

        s.set_source("no code here");
        assert_eq!(s.step(&mut Recorder::new()), Err(RunError::Load(LoadError::Empty)));
    }

    #[test]
    fn busy_session_rejects_new_runs() {
        let mut s = session("+[]");
        s.start_paced().unwrap();
        assert!(s.is_running());
        assert_eq!(s.start_paced(), Err(RunError::Busy));
        assert_eq!(s.step(&mut Recorder::new()), Err(RunError::Busy));
        assert_eq!(s.run_instant(&mut Recorder::new()), Err(RunError::Busy));
        assert!(s.cancel());
        assert!(s.step(&mut Recorder::new()).is_ok());
    }

    #[test]
    fn ticks_drive_a_paced_run_to_the_end() {
        let mut s = session("+++.");
        s.start_paced().unwrap();
        let mut rec = Recorder::new();
        let speed = Speed::from_millis(200, false);
        let mut ticks = 0;
        while let Some(tick) = s.tick(&mut rec, speed) {
            ticks += 1;
            if let Tick::Finished(status) = tick {
                assert_eq!(status, Status::HaltedNormal);
            }
        }
        assert_eq!(ticks, 2);
        assert_eq!(rec.output, vec![3]);
        assert!(!s.is_running());
    }

    #[test]
    fn editing_source_cancels_paced_run() {
        let mut s = session("+[]");
        s.start_paced().unwrap();
        let speed = Speed::from_millis(200, false);
        s.tick(&mut Recorder::new(), speed);
        assert_eq!(s.tape().cells()[0], 1);

        s.set_source("++");
        assert!(!s.is_running());
        assert!(s.interpreter().is_none());
        assert_eq!(s.tick(&mut Recorder::new(), speed), None);
        // Tape stays visible until the next run.
        assert_eq!(s.tape().cells()[0], 1);
    }

    #[test]
    fn external_cancel_stops_ticking() {
        let mut s = session("+[]");
        s.start_paced().unwrap();
        let token = s.cancel_token();
        let speed = Speed::from_millis(200, false);
        assert!(s.tick(&mut Recorder::new(), speed).is_some());
        token.cancel();
        assert_eq!(s.tick(&mut Recorder::new(), speed), None);
        assert!(!s.is_running());
        assert_eq!(s.status(), Some(Status::Running));
        // Consumed by the run it stopped
        assert!(!token.is_cancelled());
        s.resume_paced().unwrap();
        assert!(s.tick(&mut Recorder::new(), speed).is_some());
    }

    #[test]
    fn idle_source_edits_leave_the_token_alone() {
        let mut s = Session::new(16, ExecConfig::default());
        let token = s.cancel_token();
        s.set_source("+++.");
        assert!(!token.is_cancelled());
        s.reset();
        assert!(!token.is_cancelled());

        let mut rec = Recorder::new();
        let outcome = s.run_paced(&mut rec, &mut NoWait(Speed::from_millis(200, false))).unwrap();
        assert_eq!(outcome, RunOutcome::Halted(Status::HaltedNormal));
        assert_eq!(rec.output, vec![3]);
    }

    #[test]
    fn stopping_a_run_from_the_session_leaves_the_token_alone() {
        let mut s = session("+[]");
        let token = s.cancel_token();
        s.start_paced().unwrap();
        s.tick(&mut Recorder::new(), Speed::from_millis(200, false));
        s.set_source("+.");
        assert!(!s.is_running());
        assert!(!token.is_cancelled());
        s.start_paced().unwrap();
        assert!(s.cancel());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_before_a_paced_run_stops_it_once() {
        let mut s = session("+[]");
        s.set_config(ExecConfig { max_steps: 50, ..ExecConfig::default() });
        let token = s.cancel_token();
        token.cancel();

        let mut pacer = NoWait(Speed::from_millis(200, false));
        let outcome = s.run_paced(&mut Recorder::new(), &mut pacer).unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert!(!token.is_cancelled());

        let outcome = s.run_paced(&mut Recorder::new(), &mut pacer).unwrap();
        assert_eq!(outcome, RunOutcome::Halted(Status::HaltedStepLimit));
    }

    #[test]
    fn step_mode_initializes_lazily_and_restarts_after_halt() {
        let mut s = session("+>.");
        let mut rec = Recorder::new();
        assert!(s.interpreter().is_none());
        assert_eq!(s.step(&mut rec), Ok(Status::Running));
        assert_eq!(s.step(&mut rec), Ok(Status::Running));
        assert_eq!(s.step(&mut rec), Ok(Status::HaltedNormal));
        assert_eq!(rec.steps.len(), 3);
        assert_eq!(rec.tape_publishes, 3);
        assert_eq!(rec.output, vec![0]);

        // Next step starts over on a zeroed tape.
        assert_eq!(s.step(&mut rec), Ok(Status::Running));
        assert_eq!(s.interpreter().map(Interpreter::steps), Some(1));
        assert_eq!(s.tape().cells()[0], 1);
        assert_eq!(s.tape().pointer(), 0);
    }

    #[test]
    fn input_and_config_apply_to_next_run() {
        let mut s = session(",.,.");
        s.set_input(b"Z".to_vec());
        s.set_config(ExecConfig {
            eof: crate::machine::EofPolicy::MinusOne,
            ..ExecConfig::default()
        });
        let mut rec = Recorder::new();
        s.run_instant(&mut rec).unwrap();
        assert_eq!(rec.output, vec![b'Z', 255]);
    }

    #[test]
    fn paced_run_through_pacer() {
        let mut s = session("+[]");
        s.set_config(ExecConfig { max_steps: 100, ..ExecConfig::default() });
        let mut rec = Recorder::new();
        let outcome = s.run_paced(&mut rec, &mut NoWait(Speed::from_millis(5, false))).unwrap();
        assert_eq!(outcome, RunOutcome::Halted(Status::HaltedStepLimit));
        assert_eq!(rec.diagnostics.len(), 1);
    }

    #[test]
    fn resume_continues_a_stepped_run() {
        let mut s = session("+++.>++.");
        let mut rec = Recorder::new();
        s.step(&mut rec).unwrap();
        s.step(&mut rec).unwrap();
        assert_eq!(rec.output, vec![3]);
        assert_eq!(s.resume_instant(&mut rec), Ok(Status::HaltedNormal));
        assert_eq!(rec.output, vec![3, 2]);
        assert_eq!(s.interpreter().map(Interpreter::steps), Some(5));

        // Nothing left to resume: a fresh run.
        let mut again = Recorder::new();
        assert_eq!(s.resume_instant(&mut again), Ok(Status::HaltedNormal));
        assert_eq!(again.output, vec![3, 2]);
    }

    #[test]
    fn paused_paced_run_resumes_where_it_stopped() {
        let mut s = session("+++++[-]");
        s.set_config(ExecConfig { coalesce: false, ..ExecConfig::default() });
        let speed = Speed::from_millis(200, false);
        s.start_paced().unwrap();
        s.tick(&mut Recorder::new(), speed);
        s.tick(&mut Recorder::new(), speed);
        assert!(s.cancel());
        assert!(s.can_resume());

        s.resume_paced().unwrap();
        s.tick(&mut Recorder::new(), speed);
        assert_eq!(s.interpreter().map(Interpreter::steps), Some(3));
        assert_eq!(s.tape().cells()[0], 3);
    }

    #[test]
    fn reset_zeroes_tape_and_drops_state() {
        let mut s = session("+++>+");
        s.run_instant(&mut Recorder::new()).unwrap();
        s.reset();
        assert!(s.interpreter().is_none());
        assert_eq!(s.tape(), &Tape::new(32));
    }

    #[test]
    fn repeated_runs_are_identical() {
        let mut s = session("+++++[>+++++<-]>.,.");
        s.set_input(b"q".to_vec());
        let mut first = Recorder::new();
        s.run_instant(&mut first).unwrap();
        let tape_first = s.tape().clone();
        let mut second = Recorder::new();
        s.run_instant(&mut second).unwrap();
        assert_eq!(first.output, second.output);
        assert_eq!(&tape_first, s.tape());
    }
}
