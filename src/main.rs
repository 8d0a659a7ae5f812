use std::env;
use std::io::{self, Write};

use bfvm::commands::{debug, run, watch};
use clap::{Parser, Subcommand};

fn print_top_usage_and_exit(program: &str, code: i32) -> ! {
    eprintln!(
        r#"Usage:
  {0} run   [OPTIONS] "<code>"        # Run Brainfuck code (args are concatenated)
  {0} run   [OPTIONS] --file <PATH>   # Run Brainfuck code loaded from file
  {0} debug [--file <PATH>]           # Step through a program interactively
  {0} watch [OPTIONS] --file <PATH>   # Watch a paced run in a terminal view
  {0}                                 # Same as "{0} debug"

Run "{0} <subcommand> --help" for more info.
"#,
        program
    );
    let _ = io::stderr().flush();
    std::process::exit(code);
}

#[derive(Parser, Debug)]
#[command(name = "bfvm", disable_help_flag = true, disable_help_subcommand = true)]
struct Cli {
    /// Show this help
    #[arg(short = 'h', long = "help", action = clap::ArgAction::SetTrue)]
    help: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    Run(run::RunArgs),
    Debug(debug::DebugArgs),
    Watch(watch::WatchArgs),
}

fn main() {
    // We still pull the program name for help rendering consistency
    let program = env::args()
        .next()
        .and_then(|p| {
            std::path::Path::new(&p)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| String::from("bfvm"));

    let cli = Cli::parse();

    if cli.help {
        print_top_usage_and_exit(&program, 0);
    }

    let code = match cli.command {
        Some(Command::Run(args)) => run::run(&program, args),
        Some(Command::Debug(args)) => debug::run(&program, args),
        Some(Command::Watch(args)) => watch::run(&program, args),
        None => debug::run(&program, debug::DebugArgs::default()),
    };
    std::process::exit(code);
}
