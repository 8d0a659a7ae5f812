use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::Args;

use crate::cli_util::{load_settings, resolve_code};
use crate::repl::{DebugMode, Debugger, ModeFlagOverride, execute_bare, repl_loop, select_mode, unescape_input};

#[derive(Args, Debug, Default)]
#[command(disable_help_flag = true)]
pub struct DebugArgs {
    /// Load Brainfuck code from PATH on startup
    #[arg(short = 'f', long = "file", value_name = "PATH", conflicts_with = "sample")]
    pub file: Option<PathBuf>,

    /// Load a bundled sample on startup
    #[arg(short = 's', long = "sample", value_name = "NAME")]
    pub sample: Option<String>,

    /// Input bytes for `,` (escapes like \n and \xNN are decoded)
    #[arg(short = 'i', long = "input", value_name = "TEXT")]
    pub input: Option<String>,

    /// Force non-interactive bare mode
    #[arg(long = "bare", conflicts_with = "editor")]
    pub bare: bool,

    /// Force interactive mode (errors if stdin is not a TTY)
    #[arg(long = "editor", conflicts_with = "bare")]
    pub editor: bool,

    /// Show this help
    #[arg(short = 'h', long = "help", action = clap::ArgAction::SetTrue)]
    pub help: bool,
}

impl DebugArgs {
    fn mode_flag(&self) -> ModeFlagOverride {
        if self.bare {
            ModeFlagOverride::Bare
        } else if self.editor {
            ModeFlagOverride::Editor
        } else {
            ModeFlagOverride::None
        }
    }
}

// Public entry point for the debugger from main.rs
pub fn run(program: &str, args: DebugArgs) -> i32 {
    if args.help {
        usage_and_exit(program, 0);
    }

    // Determine mode: flags -> env -> auto-detect via is_terminal()
    let mode = match select_mode(args.mode_flag()) {
        Ok(m) => m,
        Err(msg) => {
            eprintln!("{program}: {msg}");
            let _ = io::stderr().flush();
            return 1;
        }
    };

    let settings = match load_settings(program) {
        Ok(s) => s,
        Err(exit) => return exit,
    };
    let mut debugger = Debugger::new(&settings);

    if let Some(text) = &args.input {
        debugger.set_input(unescape_input(text));
    }
    if args.file.is_some() || args.sample.is_some() {
        let code = match resolve_code(program, &[], args.file.as_deref(), args.sample.as_deref()) {
            Ok(code) => code,
            Err(exit) => return exit,
        };
        if let Err(e) = debugger.load(&code, &mut io::stderr()) {
            eprintln!("{program}: {e}");
            return 1;
        }
    }

    match mode {
        DebugMode::Editor => {
            // Ctrl+C arrives as a key press in raw mode; outside of it, flush and leave
            if let Err(e) = ctrlc::set_handler(|| {
                let _ = io::stdout().flush();
                let _ = io::stderr().flush();
                std::process::exit(0);
            }) {
                eprintln!("{program}: failed to set ctrl+c handler: {e}");
                let _ = io::stderr().flush();
                return 1;
            }

            // Print banners/prompts only if stderr is a TTY
            if io::stderr().is_terminal() {
                eprintln!("Brainfuck stepping debugger. Type :help for commands, Ctrl+C to exit");
                let _ = io::stderr().flush();
            }

            if let Err(e) = repl_loop(&mut debugger) {
                eprintln!("{program}: debugger error: {e}");
                let _ = io::stderr().flush();
                return 1;
            }
            0
        }
        DebugMode::Bare => match execute_bare(&mut debugger) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{program}: debugger error: {e}");
                let _ = io::stderr().flush();
                1
            }
        },
    }
}

fn usage_and_exit(program: &str, code: i32) -> ! {
    eprintln!(
        r#"Usage:
  {0} debug [--file <PATH> | --sample <NAME>] [--input <TEXT>] [--bare|--editor]
  {0}                                  # same as "{0} debug"

Options:
  --file,   -f <PATH>  Load Brainfuck code from PATH on startup
  --sample, -s <NAME>  Load a bundled sample (hello, echo, counter)
  --input,  -i <TEXT>  Input bytes for `,`
  --bare               Force non-interactive bare mode
  --editor             Force interactive editor mode (errors if stdin is not a TTY)
  --help,   -h         Show this help

Description:
  Load a program, then step through it one instruction at a time while
  watching the tape, or run it to the end.

Meta commands (line starts with ":")
  :step [N]        Execute N steps (default 1), printing each one
  :run             Run from the start to the end
  :continue        Finish the current run without restarting it
  :reset           Drop the run and clear the tape
  :input TEXT      Input for the next run
  :eof POLICY      zero | minus-one | unchanged
  :max-steps N     Step budget for the next run
  :tape [ROW]      Show tape rows
  :format [hex|dec]  Cell display format
  :state           Status, counters and the next instruction
  :source          Print the loaded source
  :sample [NAME]   Load a sample, or list them
  :exit            Exit immediately (code 0)

Notes:
    - Any line that is not a meta command replaces the program source.
    - Enter submits; Alt+Enter inserts a newline for multi-line programs.
    - Bare mode reads a script from stdin: consecutive code lines form one
      program. A script without meta commands just runs its program once.
    - Mode selection:
        * Flags: --bare|--editor override environment and auto-detection.
        * Env: BFVM_DEBUG_MODE=bare|editor overrides auto-detection.
        * Auto-detect: if stdin is a TTY, starts in interactive editor mode; otherwise, bare mode.
        * Banners are suppressed if stderr is not a TTY.
"#,
        program
    );
    let _ = io::stderr().flush();
    std::process::exit(code);
}
