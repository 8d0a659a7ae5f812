//! Driving an [`Interpreter`] to completion, either flat out or paced.
//!
//! Paced execution works in ticks: a tick runs a small batch of steps (the
//! first one highlighted), publishes the tape, and then hands control back so
//! the caller can wait before the next tick. Cancellation is only looked at
//! between ticks, so a cancelled run always stops on a step boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::machine::{Interpreter, Status};
use crate::observer::Observer;

/// How fast a run should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    /// No pacing and no per-step highlighting.
    Instant,
    /// Wait this long between ticks.
    Delay(Duration),
}

impl Speed {
    /// A delay of 0 ms, or the `instant` flag, means [`Speed::Instant`].
    pub fn from_millis(delay_ms: u64, instant: bool) -> Speed {
        if instant || delay_ms == 0 {
            Speed::Instant
        } else {
            Speed::Delay(Duration::from_millis(delay_ms))
        }
    }

    pub fn is_instant(self) -> bool {
        matches!(self, Speed::Instant)
    }
}

/// Steps executed per tick for a given delay.
///
/// Short delays get bigger batches so that visible progress keeps up: up to
/// 100 ms the batch is `round(100 / delay)`, never below one step.
pub fn steps_per_tick(delay: Duration) -> usize {
    let ms = delay.as_millis();
    if ms <= 100 {
        let ms = ms.max(1);
        ((100 + ms / 2) / ms).max(1) as usize
    } else {
        1
    }
}

/// Cooperative cancellation flag shared between a run and whoever may stop it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Re-arm the token for the next run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}

/// The caller's scheduling primitive for paced runs.
pub trait Pacer {
    /// Current speed. Asked again before every tick, so it may change mid-run.
    fn speed(&self) -> Speed;

    /// Suspend until the next tick is due.
    fn pause(&mut self, delay: Duration);
}

/// Paces by sleeping the current thread.
#[derive(Debug, Clone, Copy)]
pub struct ThreadPacer {
    pub speed: Speed,
}

impl ThreadPacer {
    pub fn new(speed: Speed) -> Self {
        Self { speed }
    }
}

impl Pacer for ThreadPacer {
    fn speed(&self) -> Speed {
        self.speed
    }

    fn pause(&mut self, delay: Duration) {
        thread::sleep(delay);
    }
}

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// More work remains; wait this long before the next tick.
    Continue(Duration),
    Finished(Status),
}

/// How a paced run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Halted(Status),
    /// Stopped at a tick boundary before reaching a terminal status.
    Cancelled,
}

/// Run to a terminal status without highlighting, then publish the tape once.
///
/// Only the step limit bounds this loop.
pub fn run_instant<O: Observer + ?Sized>(interp: &mut Interpreter, observer: &mut O) -> Status {
    let status = interp.run_to_end(observer);
    observer.tape(interp.tape());
    status
}

/// Execute one tick at `speed`.
///
/// At [`Speed::Instant`] the tick finishes the run.
pub fn tick<O: Observer + ?Sized>(interp: &mut Interpreter, observer: &mut O, speed: Speed) -> Tick {
    let delay = match speed {
        Speed::Instant => return Tick::Finished(run_instant(interp, observer)),
        Speed::Delay(delay) => delay,
    };

    let mut status = interp.step(observer, true);
    for _ in 1..steps_per_tick(delay) {
        if status.is_terminal() {
            break;
        }
        status = interp.step(observer, false);
    }
    observer.tape(interp.tape());

    if status.is_terminal() {
        Tick::Finished(status)
    } else {
        Tick::Continue(delay)
    }
}

/// Run tick by tick until the program halts or `cancel` is set.
pub fn run_paced<O, P>(
    interp: &mut Interpreter,
    observer: &mut O,
    pacer: &mut P,
    cancel: &CancelToken,
) -> RunOutcome
where
    O: Observer + ?Sized,
    P: Pacer + ?Sized,
{
    loop {
        if cancel.is_cancelled() {
            return RunOutcome::Cancelled;
        }
        match tick(interp, observer, pacer.speed()) {
            Tick::Finished(status) => return RunOutcome::Halted(status),
            Tick::Continue(delay) => pacer.pause(delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::ExecConfig;
    use crate::observer::Recorder;
    use crate::program::Program;

    /// Records pauses instead of sleeping; can cancel or switch speed after N pauses.
    struct FakePacer {
        speed: Speed,
        pauses: Vec<Duration>,
        cancel_after: Option<(usize, CancelToken)>,
        instant_after: Option<usize>,
    }

    impl FakePacer {
        fn new(ms: u64) -> Self {
            Self {
                speed: Speed::from_millis(ms, false),
                pauses: Vec::new(),
                cancel_after: None,
                instant_after: None,
            }
        }
    }

    impl Pacer for FakePacer {
        fn speed(&self) -> Speed {
            self.speed
        }

        fn pause(&mut self, delay: Duration) {
            self.pauses.push(delay);
            if let Some((n, token)) = &self.cancel_after {
                if self.pauses.len() >= *n {
                    token.cancel();
                }
            }
            if self.instant_after == Some(self.pauses.len()) {
                self.speed = Speed::Instant;
            }
        }
    }

    fn interp(code: &str, config: ExecConfig) -> Interpreter {
        let program = Arc::new(Program::load(code).unwrap());
        Interpreter::new(program, 64, b"hi".to_vec(), config)
    }

    const COUNTER: &str = "++++++++++[>++++++<-]>+++++.";

    #[test]
    fn batch_size_grows_as_delay_shrinks() {
        assert_eq!(steps_per_tick(Duration::from_millis(0)), 100);
        assert_eq!(steps_per_tick(Duration::from_millis(1)), 100);
        assert_eq!(steps_per_tick(Duration::from_millis(3)), 33);
        assert_eq!(steps_per_tick(Duration::from_millis(40)), 3);
        assert_eq!(steps_per_tick(Duration::from_millis(100)), 1);
        assert_eq!(steps_per_tick(Duration::from_millis(500)), 1);
    }

    #[test]
    fn speed_from_millis() {
        assert_eq!(Speed::from_millis(0, false), Speed::Instant);
        assert_eq!(Speed::from_millis(10, true), Speed::Instant);
        assert_eq!(
            Speed::from_millis(10, false),
            Speed::Delay(Duration::from_millis(10))
        );
    }

    #[test]
    fn instant_run_publishes_tape_once_and_never_highlights() {
        let mut vm = interp(COUNTER, ExecConfig::default());
        let mut rec = Recorder::new();
        assert_eq!(run_instant(&mut vm, &mut rec), Status::HaltedNormal);
        assert_eq!(rec.output, b"A");
        assert_eq!(rec.tape_publishes, 1);
        assert!(rec.steps.is_empty());
    }

    #[test]
    fn paced_run_matches_instant_run() {
        let mut instant = interp(COUNTER, ExecConfig::default());
        let mut instant_rec = Recorder::new();
        run_instant(&mut instant, &mut instant_rec);

        let mut paced = interp(COUNTER, ExecConfig::default());
        let mut paced_rec = Recorder::new();
        let mut pacer = FakePacer::new(50);
        let outcome = run_paced(&mut paced, &mut paced_rec, &mut pacer, &CancelToken::new());

        assert_eq!(outcome, RunOutcome::Halted(Status::HaltedNormal));
        assert_eq!(paced_rec.output, instant_rec.output);
        assert_eq!(paced.tape(), instant.tape());
        assert_eq!(paced.steps(), instant.steps());
        assert!(!pacer.pauses.is_empty());
        assert!(pacer.pauses.iter().all(|d| *d == Duration::from_millis(50)));
    }

    #[test]
    fn each_tick_highlights_first_step_only() {
        let mut vm = interp(COUNTER, ExecConfig::default());
        let mut rec = Recorder::new();
        // 25 ms -> 4 steps per tick
        let t = tick(&mut vm, &mut rec, Speed::from_millis(25, false));
        assert_eq!(t, Tick::Continue(Duration::from_millis(25)));
        assert_eq!(vm.steps(), 4);
        assert_eq!(rec.steps.len(), 1);
        assert_eq!(rec.steps[0].index, 0);
        assert_eq!(rec.tape_publishes, 1);
    }

    #[test]
    fn cancelled_run_stops_on_a_tick_boundary() {
        let token = CancelToken::new();
        let mut pacer = FakePacer::new(100);
        pacer.cancel_after = Some((3, token.clone()));

        let mut vm = interp("+[]", ExecConfig::default());
        let mut rec = Recorder::new();
        let outcome = run_paced(&mut vm, &mut rec, &mut pacer, &token);

        assert_eq!(outcome, RunOutcome::Cancelled);
        // 100 ms -> one step per tick, three ticks ran
        assert_eq!(vm.steps(), 3);
        assert_eq!(vm.status(), Status::Running);
        assert_eq!(rec.halted, None);

        // The same three steps executed directly give the same state.
        let mut reference = interp("+[]", ExecConfig::default());
        let mut sink = Recorder::new();
        for _ in 0..3 {
            reference.step(&mut sink, false);
        }
        assert_eq!(reference.state(), vm.state());
        assert_eq!(reference.tape(), vm.tape());
    }

    #[test]
    fn pre_cancelled_run_executes_nothing() {
        let token = CancelToken::new();
        token.cancel();
        let mut vm = interp("+++", ExecConfig::default());
        let outcome = run_paced(&mut vm, &mut Recorder::new(), &mut FakePacer::new(10), &token);
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(vm.status(), Status::Ready);
    }

    #[test]
    fn switching_to_instant_mid_run_finishes_it() {
        let mut pacer = FakePacer::new(200);
        pacer.instant_after = Some(2);
        let mut vm = interp(COUNTER, ExecConfig::default());
        let mut rec = Recorder::new();
        let outcome = run_paced(&mut vm, &mut rec, &mut pacer, &CancelToken::new());
        assert_eq!(outcome, RunOutcome::Halted(Status::HaltedNormal));
        assert_eq!(pacer.pauses.len(), 2);
        assert_eq!(rec.steps.len(), 2);
        assert_eq!(rec.output, b"A");
    }

    #[test]
    fn paced_runaway_loop_hits_step_limit() {
        let config = ExecConfig { max_steps: 100, ..ExecConfig::default() };
        let mut vm = interp("+[]", config);
        let mut rec = Recorder::new();
        let outcome = run_paced(&mut vm, &mut rec, &mut FakePacer::new(1), &CancelToken::new());
        assert_eq!(outcome, RunOutcome::Halted(Status::HaltedStepLimit));
        assert_eq!(rec.diagnostics.len(), 1);
    }

    #[test]
    fn token_reset_rearms() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!other.is_cancelled());
    }
}
