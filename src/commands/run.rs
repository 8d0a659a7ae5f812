use std::fs;
use std::io::{self, BufWriter, IsTerminal, Read, Write};
use std::path::PathBuf;

use clap::Args;

use crate::cli_util::{load_settings, print_load_error, print_run_error, resolve_code};
use crate::machine::{EofPolicy, Status};
use crate::observer::{Diagnostic, Observer, StepEvent};
use crate::scheduler::{RunOutcome, Speed, ThreadPacer};
use crate::session::Session;
use crate::source::Op;
use crate::tape::Tape;
use crate::view::{CellFormat, touched_rows};
use crate::{error, info};

#[derive(Args, Debug)]
#[command(disable_help_flag = true)]
pub struct RunArgs {
    /// Read Brainfuck code from PATH instead of positional "<code>"
    #[arg(short = 'f', long = "file", conflicts_with = "sample")]
    pub file: Option<PathBuf>,

    /// Run one of the bundled sample programs
    #[arg(short = 's', long = "sample", value_name = "NAME")]
    pub sample: Option<String>,

    /// Concatenated Brainfuck code parts
    #[arg(value_name = "code", trailing_var_arg = true)]
    pub code: Vec<String>,

    /// Input bytes consumed by `,`
    #[arg(short = 'i', long = "input", value_name = "TEXT", conflicts_with = "input_file")]
    pub input: Option<String>,

    /// Read the input bytes from PATH
    #[arg(long = "input-file", value_name = "PATH")]
    pub input_file: Option<PathBuf>,

    /// Step budget before the run is stopped (fallback BFVM_MAX_STEPS)
    #[arg(long = "max-steps", value_name = "N")]
    pub max_steps: Option<usize>,

    /// What `,` stores once input is exhausted
    #[arg(long = "eof", value_name = "POLICY")]
    pub eof: Option<EofPolicy>,

    /// Pace the run with MS milliseconds between ticks
    #[arg(long = "speed", value_name = "MS")]
    pub speed_ms: Option<u64>,

    /// Run without pacing, even if a speed is configured
    #[arg(long = "instant")]
    pub instant: bool,

    /// Print executed steps to stderr
    #[arg(short = 't', long = "trace")]
    pub trace: bool,

    /// Print the touched tape rows to stderr after the run
    #[arg(long = "dump-tape")]
    pub dump_tape: bool,

    /// Show this help
    #[arg(short = 'h', long = "help", action = clap::ArgAction::SetTrue)]
    pub help: bool,
}

/// Routes program output to stdout and step traces to stderr.
pub struct CliObserver<W: Write, E: Write> {
    out: W,
    trace: Option<E>,
    diagnostics: Vec<Diagnostic>,
    io_error: Option<io::Error>,
}

impl<W: Write, E: Write> CliObserver<W, E> {
    pub fn new(out: W, trace: Option<E>) -> Self {
        Self {
            out,
            trace,
            diagnostics: Vec::new(),
            io_error: None,
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Flush stdout and hand back the first write failure, if any.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(e) = self.io_error.take() {
            return Err(e);
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn record(&mut self, result: io::Result<()>) {
        if let Err(e) = result {
            if self.io_error.is_none() {
                self.io_error = Some(e);
            }
        }
    }
}

impl<W: Write, E: Write> Observer for CliObserver<W, E> {
    fn output(&mut self, byte: u8) {
        if self.io_error.is_none() {
            let result = self.out.write_all(&[byte]);
            self.record(result);
        }
    }

    fn diagnostic(&mut self, diagnostic: &Diagnostic) {
        self.diagnostics.push(diagnostic.clone());
    }

    fn step(&mut self, event: &StepEvent) {
        if let Some(trace) = self.trace.as_mut() {
            let _ = writeln!(trace, "{}", trace_line(event));
        }
    }

    fn tape(&mut self, _tape: &Tape) {
        // A publish marks a tick boundary; show output as it is produced
        let result = self.out.flush();
        self.record(result);
    }
}

/// One `--trace` line.
pub fn trace_line(event: &StepEvent) -> String {
    let op = if event.run > 1 {
        format!("{}x{}", event.op, event.run)
    } else {
        event.op.to_string()
    };
    format!(
        "step {:>7}  ip {:>5}  {:<6} src {:>5}..{:<5} ptr {:04X} = {:02X}",
        event.step, event.index, op, event.source.start, event.source.end, event.pointer, event.cell
    )
}

pub fn run(program: &str, args: RunArgs) -> i32 {
    if args.help {
        usage_and_exit(program, 0);
    }

    let RunArgs {
        file,
        sample,
        code,
        input,
        input_file,
        max_steps,
        eof,
        speed_ms,
        instant,
        trace,
        dump_tape,
        ..
    } = args;

    if file.is_none() && sample.is_none() && code.is_empty() {
        usage_and_exit(program, 2);
    }
    if (file.is_some() || sample.is_some()) && !code.is_empty() {
        eprintln!("{program}: cannot use positional code together with --file or --sample");
        usage_and_exit(program, 2);
    }

    let code_str = match resolve_code(program, &code, file.as_deref(), sample.as_deref()) {
        Ok(s) => s,
        Err(exit) => return exit,
    };

    // Resolve settings: flags -> env -> config file -> defaults
    let mut settings = match load_settings(program) {
        Ok(s) => s,
        Err(exit) => return exit,
    };
    if let Some(n) = max_steps {
        settings.max_steps = n.max(1);
    }
    if let Some(policy) = eof {
        settings.eof = policy;
    }

    let mut session = Session::new(settings.tape_size, settings.exec_config());
    session.set_source(code_str.as_str());

    // Fail on a bad program before touching stdin
    let checked = match session.check() {
        Ok(p) => p,
        Err(e) => {
            print_load_error(Some(program), &code_str, &e);
            return 1;
        }
    };

    let input_bytes = match read_input(input, input_file, checked.ops().contains(&Op::Input)) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("{program}: failed to read input: {e}");
            let _ = io::stderr().flush();
            return 1;
        }
    };
    session.set_input(input_bytes);

    // Only an explicit --speed paces a command-line run
    let speed = match speed_ms {
        Some(ms) => Speed::from_millis(ms, instant),
        None => Speed::Instant,
    };

    let token = session.cancel_token();
    let interruptible = trace || !speed.is_instant();
    if interruptible {
        let handler_token = token.clone();
        if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
            eprintln!("{program}: failed to set ctrl+c handler: {e}");
            let _ = io::stderr().flush();
            return 1;
        }
    }

    let stdout = BufWriter::new(io::stdout().lock());
    let tracer = if trace { Some(io::stderr()) } else { None };
    let mut observer = CliObserver::new(stdout, tracer);

    let result = match speed {
        Speed::Delay(_) => {
            let mut pacer = ThreadPacer::new(speed);
            session.run_paced(&mut observer, &mut pacer)
        }
        Speed::Instant if trace => step_to_end(&mut session, &mut observer),
        Speed::Instant => session.run_instant(&mut observer).map(RunOutcome::Halted),
    };

    let diagnostics = observer.diagnostics().to_vec();
    let finished = observer.finish().and_then(|mut out| {
        // For readability, ensure output ends with a newline
        writeln!(out)?;
        out.flush()
    });

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            print_run_error(Some(program), &code_str, &e);
            return 1;
        }
    };

    if dump_tape {
        let mut stderr = io::stderr().lock();
        for line in touched_rows(session.tape(), CellFormat::Hex) {
            let _ = writeln!(stderr, "{line}");
        }
    }

    for diagnostic in &diagnostics {
        eprintln!("{diagnostic}");
    }

    let exit_code = match outcome {
        RunOutcome::Halted(Status::HaltedNormal) => 0,
        RunOutcome::Halted(status) => {
            info!("run ended with status {status}");
            1
        }
        RunOutcome::Cancelled => {
            let steps = session.interpreter().map_or(0, |i| i.steps());
            eprintln!("Execution cancelled after {steps} steps");
            130
        }
    };

    if let Err(e) = finished {
        if e.kind() != io::ErrorKind::BrokenPipe {
            error!("failed to write program output: {e}");
            return 1;
        }
    }

    let _ = io::stderr().flush();
    exit_code
}

// Manual stepping to the end, with every step traced. Polls the cancel token
// between steps.
fn step_to_end<W: Write, E: Write>(
    session: &mut Session,
    observer: &mut CliObserver<W, E>,
) -> Result<RunOutcome, crate::error::RunError> {
    let token = session.cancel_token();
    loop {
        if token.is_cancelled() {
            token.reset();
            return Ok(RunOutcome::Cancelled);
        }
        let status = session.step(observer)?;
        if status.is_terminal() {
            return Ok(RunOutcome::Halted(status));
        }
    }
}

// Input for `,`: --input, --input-file, or piped stdin when the program reads.
fn read_input(
    input: Option<String>,
    input_file: Option<PathBuf>,
    program_reads: bool,
) -> io::Result<Vec<u8>> {
    if let Some(text) = input {
        return Ok(text.into_bytes());
    }
    if let Some(path) = input_file {
        return fs::read(path);
    }
    let stdin = io::stdin();
    if program_reads && !stdin.is_terminal() {
        let mut buf = Vec::new();
        stdin.lock().read_to_end(&mut buf)?;
        return Ok(buf);
    }
    Ok(Vec::new())
}

fn usage_and_exit(program: &str, code: i32) -> ! {
    eprintln!(
        r#"Usage:
  {0} run [OPTIONS] "<code>"
  {0} run [OPTIONS] --file <PATH>
  {0} run [OPTIONS] --sample <NAME>

Options:
  --file,  -f <PATH>     Read Brainfuck code from PATH instead of positional "<code>"
  --sample, -s <NAME>    Run a bundled sample (hello, echo, counter)
  --input, -i <TEXT>     Input bytes for `,`
  --input-file <PATH>    Read input bytes from PATH
  --max-steps <N>        Stop after N steps (default 1000000)
  --eof <POLICY>         On end of input `,` stores: zero | minus-one | unchanged
  --speed <MS>           Pace the run, MS milliseconds between ticks
  --instant              Ignore --speed and run flat out
  --trace, -t            Print executed steps to stderr
  --dump-tape            Print the touched tape rows to stderr after the run
  --help,  -h            Show this help

Notes:
- Non-Brainfuck characters are comments.
- Without --input or --input-file, piped stdin is used as input when the program contains `,`.
- Program output goes to stdout followed by a newline; everything else goes to stderr.
- Ctrl+C stops a paced or traced run between steps (exit code 130).
- Environment: BFVM_MAX_STEPS, BFVM_EOF, BFVM_TAPE_SIZE, BFVM_CONFIG, BFVM_LOG.

Examples:
- Run a file with a smaller step budget:
    {0} run --max-steps 5000 --file ./program.bf
- Echo a file through the echo sample:
    {0} run --sample echo < input.txt
"#,
        program
    );
    let _ = io::stderr().flush();
    std::process::exit(code);
}
