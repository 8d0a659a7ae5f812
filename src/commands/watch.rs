use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::Args;

use crate::cli_util::{load_settings, resolve_code};
use crate::error;
use crate::repl::unescape_input;
use crate::tui::{self, App};

#[derive(Args, Debug)]
#[command(disable_help_flag = true)]
pub struct WatchArgs {
    /// Read Brainfuck code from PATH instead of positional "<code>"
    #[arg(short = 'f', long = "file", value_name = "PATH", conflicts_with = "sample")]
    pub file: Option<PathBuf>,

    /// Watch one of the bundled sample programs
    #[arg(short = 's', long = "sample", value_name = "NAME")]
    pub sample: Option<String>,

    /// Concatenated Brainfuck code parts
    #[arg(value_name = "code", trailing_var_arg = true)]
    pub code: Vec<String>,

    /// Input bytes for `,` (escapes like \n and \xNN are decoded)
    #[arg(short = 'i', long = "input", value_name = "TEXT", conflicts_with = "input_file")]
    pub input: Option<String>,

    /// Read the input bytes from PATH
    #[arg(long = "input-file", value_name = "PATH")]
    pub input_file: Option<PathBuf>,

    /// Initial delay between ticks in milliseconds
    #[arg(long = "speed", value_name = "MS")]
    pub speed_ms: Option<u64>,

    /// Start in instant mode
    #[arg(long = "instant")]
    pub instant: bool,

    /// Step budget for each run
    #[arg(long = "max-steps", value_name = "N")]
    pub max_steps: Option<usize>,

    /// Show this help
    #[arg(short = 'h', long = "help", action = clap::ArgAction::SetTrue)]
    pub help: bool,
}

// Public entry point for the viewer from main.rs
pub fn run(program: &str, args: WatchArgs) -> i32 {
    if args.help {
        usage_and_exit(program, 0);
    }
    if args.file.is_none() && args.sample.is_none() && args.code.is_empty() {
        usage_and_exit(program, 2);
    }
    if (args.file.is_some() || args.sample.is_some()) && !args.code.is_empty() {
        eprintln!("{program}: cannot use positional code together with --file or --sample");
        usage_and_exit(program, 2);
    }
    if !io::stdout().is_terminal() {
        eprintln!("{program}: watch needs a terminal on stdout (use \"{program} run --trace\" instead)");
        let _ = io::stderr().flush();
        return 1;
    }

    let code = match resolve_code(program, &args.code, args.file.as_deref(), args.sample.as_deref()) {
        Ok(code) => code,
        Err(exit) => return exit,
    };

    let mut settings = match load_settings(program) {
        Ok(s) => s,
        Err(exit) => return exit,
    };
    if let Some(ms) = args.speed_ms {
        settings.speed_ms = ms;
    }
    if args.instant {
        settings.instant = true;
    }
    if let Some(n) = args.max_steps {
        settings.max_steps = n.max(1);
    }

    let input = match (&args.input, &args.input_file) {
        (Some(text), _) => unescape_input(text),
        (None, Some(path)) => match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("{program}: failed to read input: {e}");
                let _ = io::stderr().flush();
                return 1;
            }
        },
        (None, None) => Vec::new(),
    };

    let title = match (&args.file, &args.sample) {
        (Some(path), _) => path.display().to_string(),
        (None, Some(name)) => format!("sample {name}"),
        (None, None) => "<command line>".to_string(),
    };

    let app = App::new(&settings, &code, input, title);
    match tui::run(app) {
        Ok(()) => 0,
        Err(e) => {
            error!("terminal error: {e}");
            eprintln!("{program}: watch failed: {e}");
            let _ = io::stderr().flush();
            1
        }
    }
}

fn usage_and_exit(program: &str, code: i32) -> ! {
    eprintln!(
        r#"Usage:
  {0} watch [OPTIONS] "<code>"
  {0} watch [OPTIONS] --file <PATH>
  {0} watch [OPTIONS] --sample <NAME>

Options:
  --file,   -f <PATH>  Read Brainfuck code from PATH
  --sample, -s <NAME>  Watch a bundled sample (hello, echo, counter)
  --input,  -i <TEXT>  Input bytes for `,`
  --input-file <PATH>  Read input bytes from PATH
  --speed <MS>         Initial delay between ticks (default 50)
  --instant            Start in instant mode
  --max-steps <N>      Step budget for each run
  --help,   -h         Show this help

Description:
  Opens a terminal view of the machine: the source with the executing
  instruction highlighted, a 16-column memory grid, the output and a status bar.

Keys:
    - Space/r/F5 runs or pauses; s/n/F10 steps once; x resets.
    - +/- change the speed, i toggles instant mode, f toggles hex/decimal cells.
    - Up/Down and PageUp/PageDown scroll memory; Home follows the pointer.
    - ? shows help; q, Esc or Ctrl+C quits.
"#,
        program
    );
    let _ = io::stderr().flush();
    std::process::exit(code);
}
