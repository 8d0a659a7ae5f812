use std::env;
use std::io::{self, BufRead, IsTerminal, Read, Write};

use clap::ValueEnum;
use nu_ansi_term::Style;
use reedline::{DefaultPrompt, DefaultPromptSegment, Highlighter, HistoryItem, Signal, StyledText};

use crate::cli_util::load_error_lines;
use crate::commands::run::trace_line;
use crate::config::Settings;
use crate::machine::{EofPolicy, ExecConfig, Status};
use crate::observer::Recorder;
use crate::samples;
use crate::session::Session;
use crate::source::Op;
use crate::theme;
use crate::view::{self, CellFormat};
use crate::{debug, warn};

/// Rows printed by `:tape`.
const TAPE_ROWS: usize = 4;

/// Whether the caller should keep reading submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// One unit of debugger input: a block of code or a `:command` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Code(String),
    Command(String),
}

/// Split a piped script. Consecutive non-command lines form one code block.
pub fn split_script(text: &str) -> Vec<Submission> {
    let mut out = Vec::new();
    let mut code = String::new();
    for line in text.lines() {
        if line.trim_start().starts_with(':') {
            if !code.trim().is_empty() {
                out.push(Submission::Code(std::mem::take(&mut code)));
            }
            code.clear();
            out.push(Submission::Command(line.trim().to_string()));
        } else {
            code.push_str(line);
            code.push('\n');
        }
    }
    if !code.trim().is_empty() {
        out.push(Submission::Code(code));
    }
    out
}

/// Manual stepping front end over a [`Session`].
///
/// Content a command asks for (trace lines, program output, tape rows, state)
/// goes to `out`; confirmations, diagnostics and errors go to `err`.
pub struct Debugger {
    session: Session,
    format: CellFormat,
}

impl Debugger {
    pub fn new(settings: &Settings) -> Self {
        Self {
            session: Session::new(settings.tape_size, settings.exec_config()),
            format: CellFormat::Hex,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn set_input(&mut self, input: impl Into<Vec<u8>>) {
        self.session.set_input(input);
    }

    /// Short status for the editor prompt.
    pub fn prompt_status(&self) -> String {
        match self.session.interpreter() {
            None => Status::Ready.to_string(),
            Some(interp) => format!("{}, step {}", interp.status(), interp.steps()),
        }
    }

    /// Replace the source and report whether it loads.
    pub fn load<W: Write + ?Sized>(&mut self, code: &str, err: &mut W) -> io::Result<()> {
        self.session.set_source(code);
        match self.session.check() {
            Ok(program) => writeln!(err, "loaded {} instructions", program.len()),
            Err(e) => {
                for line in load_error_lines(None, code, &e) {
                    writeln!(err, "{line}")?;
                }
                Ok(())
            }
        }
    }

    /// Handle one submission from the line editor.
    pub fn handle<W, E>(&mut self, submission: &str, out: &mut W, err: &mut E) -> io::Result<Flow>
    where
        W: Write + ?Sized,
        E: Write + ?Sized,
    {
        let trimmed = submission.trim();
        if trimmed.is_empty() {
            return Ok(Flow::Continue);
        }
        if trimmed.starts_with(':') {
            return self.command(trimmed, out, err);
        }
        self.load(submission, err)?;
        Ok(Flow::Continue)
    }

    /// Process a whole piped script. A script without any command just runs
    /// its code once.
    pub fn run_script<R, W, E>(&mut self, mut reader: R, out: &mut W, err: &mut E) -> io::Result<()>
    where
        R: BufRead,
        W: Write + ?Sized,
        E: Write + ?Sized,
    {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        let submissions = split_script(&text);
        let has_commands = submissions
            .iter()
            .any(|s| matches!(s, Submission::Command(_)));

        for submission in &submissions {
            let flow = match submission {
                Submission::Code(code) => {
                    self.load(code, err)?;
                    Flow::Continue
                }
                Submission::Command(line) => self.command(line, out, err)?,
            };
            if flow == Flow::Exit {
                return Ok(());
            }
        }

        if !has_commands && !self.session.source().trim().is_empty() {
            self.command(":run", out, err)?;
        }
        Ok(())
    }

    fn command<W, E>(&mut self, line: &str, out: &mut W, err: &mut E) -> io::Result<Flow>
    where
        W: Write + ?Sized,
        E: Write + ?Sized,
    {
        let body = line.trim_start_matches(':');
        let (name, rest) = match body.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (body, ""),
        };
        debug!("debugger command :{name} {rest}");

        match name {
            "exit" | "quit" | "q" => return Ok(Flow::Exit),
            "help" | "h" => writeln!(out, "{}", HELP.trim_end())?,
            "step" | "s" => self.step(rest, out, err)?,
            "run" | "r" => {
                let mut rec = Recorder::new();
                match self.session.run_instant(&mut rec) {
                    Ok(status) => self.report_run(status, &rec, out, err)?,
                    Err(e) => self.report_error(&e, err)?,
                }
            }
            "continue" | "c" => {
                let mut rec = Recorder::new();
                match self.session.resume_instant(&mut rec) {
                    Ok(status) => self.report_run(status, &rec, out, err)?,
                    Err(e) => self.report_error(&e, err)?,
                }
            }
            "reset" => {
                self.session.reset();
                writeln!(err, "tape cleared")?;
            }
            "input" => {
                let bytes = unescape_input(rest);
                writeln!(err, "input set ({} bytes, used from the next run)", bytes.len())?;
                self.session.set_input(bytes);
            }
            "eof" => match EofPolicy::from_str(rest, true) {
                Ok(policy) => {
                    let config = ExecConfig {
                        eof: policy,
                        ..*self.session.config()
                    };
                    self.session.set_config(config);
                    writeln!(err, "eof policy: {policy} (from the next run)")?;
                }
                Err(_) => writeln!(err, "invalid eof policy '{rest}': expected zero, minus-one or unchanged")?,
            },
            "max-steps" => match rest.parse::<usize>() {
                Ok(n) => {
                    let config = ExecConfig {
                        max_steps: n.max(1),
                        ..*self.session.config()
                    };
                    self.session.set_config(config);
                    writeln!(err, "max steps: {} (from the next run)", config.max_steps)?;
                }
                Err(_) => writeln!(err, "invalid step count '{rest}'")?,
            },
            "tape" | "t" => self.tape(rest, out, err)?,
            "format" => {
                self.format = match rest {
                    "" => self.format.toggle(),
                    "hex" => CellFormat::Hex,
                    "dec" => CellFormat::Dec,
                    other => {
                        writeln!(err, "invalid format '{other}': expected hex or dec")?;
                        return Ok(Flow::Continue);
                    }
                };
                writeln!(err, "cells shown in {}", self.format.label())?;
            }
            "state" => self.state(out)?,
            "source" => {
                let source = self.session.source();
                if source.is_empty() {
                    writeln!(out, "(no source)")?;
                } else {
                    write!(out, "{source}")?;
                    if !source.ends_with('\n') {
                        writeln!(out)?;
                    }
                }
            }
            "sample" => {
                if rest.is_empty() {
                    for sample in samples::SAMPLES.iter() {
                        writeln!(out, "{:<8} {}", sample.name, sample.description)?;
                    }
                } else if let Some(sample) = samples::find(rest) {
                    self.load(sample.code, err)?;
                } else {
                    writeln!(err, "unknown sample '{rest}' (available: {})", samples::names())?;
                }
            }
            other => {
                writeln!(err, "unknown command ':{other}' (try :help)")?;
            }
        }
        Ok(Flow::Continue)
    }

    fn step<W, E>(&mut self, count: &str, out: &mut W, err: &mut E) -> io::Result<()>
    where
        W: Write + ?Sized,
        E: Write + ?Sized,
    {
        let count = if count.is_empty() {
            1
        } else {
            match count.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    writeln!(err, "invalid step count '{count}'")?;
                    return Ok(());
                }
            }
        };

        let mut rec = Recorder::new();
        let mut last = None;
        for _ in 0..count {
            match self.session.step(&mut rec) {
                Ok(status) => {
                    last = Some(status);
                    if status.is_terminal() {
                        break;
                    }
                }
                Err(e) => {
                    self.report_error(&e, err)?;
                    break;
                }
            }
        }

        for event in &rec.steps {
            writeln!(out, "{}", trace_line(event))?;
        }
        if !rec.output.is_empty() {
            let shown = view::bytes_to_escaped(&rec.output)
                .replace('\n', "\\n")
                .replace('\t', "\\t");
            writeln!(out, "output: {shown}")?;
        }
        for diagnostic in &rec.diagnostics {
            writeln!(err, "{diagnostic}")?;
        }
        if let Some(status) = last.filter(|s| s.is_terminal()) {
            writeln!(out, "status: {status}")?;
        }
        Ok(())
    }

    fn report_run<W, E>(&self, status: Status, rec: &Recorder, out: &mut W, err: &mut E) -> io::Result<()>
    where
        W: Write + ?Sized,
        E: Write + ?Sized,
    {
        out.write_all(&rec.output)?;
        // For readability, ensure output ends with a newline
        writeln!(out)?;
        for diagnostic in &rec.diagnostics {
            writeln!(err, "{diagnostic}")?;
        }
        if status != Status::HaltedNormal {
            writeln!(out, "status: {status}")?;
        }
        Ok(())
    }

    fn report_error<E: Write + ?Sized>(&self, e: &crate::error::RunError, err: &mut E) -> io::Result<()> {
        match e {
            crate::error::RunError::Load(load) => {
                for line in load_error_lines(None, self.session.source(), load) {
                    writeln!(err, "{line}")?;
                }
            }
            other => writeln!(err, "{other}")?,
        }
        Ok(())
    }

    fn tape<W, E>(&self, row: &str, out: &mut W, err: &mut E) -> io::Result<()>
    where
        W: Write + ?Sized,
        E: Write + ?Sized,
    {
        let tape = self.session.tape();
        let rows = view::row_count(tape);
        let start = if row.is_empty() {
            view::pointer_row(tape)
        } else {
            match row.parse::<usize>() {
                Ok(r) if r < rows => r,
                _ => {
                    writeln!(err, "invalid row '{row}': the tape has {rows} rows")?;
                    return Ok(());
                }
            }
        };
        for r in start..(start + TAPE_ROWS).min(rows) {
            writeln!(out, "{}", view::grid_row(tape, r, self.format))?;
        }
        Ok(())
    }

    fn state<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let config = self.session.config();
        let tape = self.session.tape();
        let cell = tape.get();
        match self.session.interpreter() {
            None => writeln!(out, "status: {}  steps: 0/{}", Status::Ready, config.max_steps)?,
            Some(interp) => {
                let state = interp.state();
                writeln!(
                    out,
                    "status: {}  steps: {}/{}",
                    state.status,
                    state.steps,
                    interp.config().max_steps
                )?;
                let program = interp.program();
                match (program.op(state.pc), program.position(state.pc)) {
                    (Some(op), Some(offset)) => writeln!(
                        out,
                        "ip: {} of {}  next: '{op}' at offset {offset}",
                        state.pc,
                        program.len()
                    )?,
                    _ => writeln!(out, "ip: {} of {}  (end of program)", state.pc, program.len())?,
                }
                writeln!(
                    out,
                    "input: {} of {} bytes used",
                    state.input_cursor,
                    state.input.len()
                )?;
            }
        }
        writeln!(
            out,
            "ptr: {:#06X} = {} ({cell})",
            tape.pointer(),
            self.format.cell(cell).trim()
        )?;
        writeln!(out, "eof: {}  coalesce: {}", config.eof, config.coalesce)?;
        Ok(())
    }
}

/// Input text with `\n`, `\t`, `\r`, `\0`, `\\` and `\xNN` escapes decoded.
pub fn unescape_input(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('r') => out.push(b'\r'),
            Some('0') => out.push(0),
            Some('\\') => out.push(b'\\'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(b) if hex.len() == 2 => out.push(b),
                    _ => {
                        out.extend_from_slice(b"\\x");
                        out.extend_from_slice(hex.as_bytes());
                    }
                }
            }
            Some(other) => {
                out.push(b'\\');
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => out.push(b'\\'),
        }
    }
    out
}

const HELP: &str = r#"Commands (line starts with ":")
  :step [N]        Execute N steps (default 1), printing each one
  :run             Run from the start to the end
  :continue        Finish the current run without restarting it
  :reset           Drop the run and clear the tape
  :input TEXT      Input for the next run (\n, \t, \xNN escapes)
  :eof POLICY      zero | minus-one | unchanged
  :max-steps N     Step budget for the next run
  :tape [ROW]      Show tape rows, starting at ROW or the pointer's row
  :format [hex|dec]  Cell display format (toggles without an argument)
  :state           Status, counters and the next instruction
  :source          Print the loaded source
  :sample [NAME]   Load a sample, or list them
  :help            Show this help
  :exit            Leave the debugger
Any other input replaces the program source."#;

pub fn repl_loop(debugger: &mut Debugger) -> io::Result<()> {
    // Initialize interactive line editor
    let mut editor = init_line_editor()?;
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();

    loop {
        let prompt = DefaultPrompt::new(
            DefaultPromptSegment::Basic("bfvm".to_string()),
            DefaultPromptSegment::Basic(debugger.prompt_status()),
        );

        match editor.read_line(&prompt) {
            Ok(Signal::Success(buffer)) => {
                if buffer.trim().is_empty() {
                    continue;
                }
                let _ = editor
                    .history_mut()
                    .save(HistoryItem::from_command_line(buffer.clone()));
                let flow = debugger.handle(&buffer, &mut stdout, &mut stderr)?;
                stdout.flush()?;
                stderr.flush()?;
                if flow == Flow::Exit {
                    return Ok(());
                }
            }
            // Ctrl+C or EOF. End the session cleanly
            Ok(_) => {
                println!();
                io::stdout().flush()?;
                return Ok(());
            }
            Err(e) => {
                eprintln!("debug: editor error: {e}");
                let _ = io::stderr().flush();
                return Ok(());
            }
        }
    }
}

fn init_line_editor() -> io::Result<reedline::Reedline> {
    use reedline::{
        EditCommand, Emacs, KeyCode, KeyModifiers, Reedline, ReedlineEvent, default_emacs_keybindings,
    };

    // Enter submits a command or a one-line program, Alt+Enter starts a new
    // line for longer programs. Ctrl+D also submits.
    let mut keybindings = default_emacs_keybindings();
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Enter, ReedlineEvent::Submit);
    keybindings.add_binding(
        KeyModifiers::ALT,
        KeyCode::Enter,
        ReedlineEvent::Edit(vec![EditCommand::InsertNewline]),
    );
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('d'), ReedlineEvent::Submit);

    // Up/down move within a multiline buffer; Alt or Ctrl browse history
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Up, ReedlineEvent::Up);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Down, ReedlineEvent::Down);
    keybindings.add_binding(KeyModifiers::ALT, KeyCode::Up, ReedlineEvent::PreviousHistory);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Up, ReedlineEvent::PreviousHistory);
    keybindings.add_binding(KeyModifiers::ALT, KeyCode::Down, ReedlineEvent::NextHistory);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Down, ReedlineEvent::NextHistory);

    let history = reedline::FileBackedHistory::new(1_000).map_err(|e| io::Error::other(e.to_string()))?;

    let editor = Reedline::create()
        .with_highlighter(Box::new(BrainfuckHighlighter::new_catppuccin_mocha()))
        .with_history(Box::new(history))
        .with_edit_mode(Box::new(Emacs::new(keybindings)));

    Ok(editor)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugMode {
    Bare,
    Editor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeFlagOverride {
    None,
    Bare,
    Editor,
}

pub fn select_mode(flag: ModeFlagOverride) -> Result<DebugMode, String> {
    select_mode_with(flag, env::var("BFVM_DEBUG_MODE").ok(), io::stdin().is_terminal())
}

// Flags, then BFVM_DEBUG_MODE, then whether stdin is a terminal.
fn select_mode_with(flag: ModeFlagOverride, env_mode: Option<String>, stdin_tty: bool) -> Result<DebugMode, String> {
    match flag {
        ModeFlagOverride::Bare => return Ok(DebugMode::Bare),
        ModeFlagOverride::Editor => {
            if !stdin_tty {
                return Err("cannot start editor: stdin is not a TTY (use --bare or BFVM_DEBUG_MODE=bare)".to_string());
            }
            return Ok(DebugMode::Editor);
        }
        ModeFlagOverride::None => {}
    }

    if let Some(val) = env_mode {
        let v = val.trim().to_ascii_lowercase();
        return match v.as_str() {
            "bare" => Ok(DebugMode::Bare),
            "editor" => {
                if !stdin_tty {
                    return Err("cannot start editor: stdin is not a TTY (use BFVM_DEBUG_MODE=bare)".to_string());
                }
                Ok(DebugMode::Editor)
            }
            _ => Err(format!("invalid BFVM_DEBUG_MODE value: {val}, must be 'bare' or 'editor'")),
        };
    }

    if stdin_tty {
        Ok(DebugMode::Editor)
    } else {
        Ok(DebugMode::Bare)
    }
}

/// Read stdin to EOF and process it as a script.
pub fn execute_bare(debugger: &mut Debugger) -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    let result = debugger.run_script(stdin.lock(), &mut stdout, &mut stderr);
    stdout.flush()?;
    stderr.flush()?;
    if let Err(e) = &result {
        if e.kind() == io::ErrorKind::BrokenPipe {
            warn!("output closed early");
            return Ok(());
        }
    }
    result
}

struct BrainfuckHighlighter {
    command: Style,
}

impl BrainfuckHighlighter {
    fn new_catppuccin_mocha() -> Self {
        use crate::theme::catppuccin::Mocha as P;
        Self {
            command: Style::new().fg(P::BLUE).bold(),
        }
    }

    // > <   => SKY/TEAL (movement)
    // + -   => GREEN/RED (data modification)
    // . ,   => YELLOW/PEACH (I/O)
    // [ ]   => MAUVE (flow control)
    #[inline]
    fn style_for(&self, ch: char) -> Style {
        let style = Style::new().fg(theme::instruction_color(ch));
        if Op::from_char(ch).is_some() { style.bold() } else { style }
    }
}

impl Highlighter for BrainfuckHighlighter {
    fn highlight(&self, line: &str, _cursor: usize) -> StyledText {
        let mut out = StyledText::new();

        // Meta commands are one color; their arguments are not code
        if line.trim_start().starts_with(':') {
            out.push((self.command, line.to_string()));
            return out;
        }

        let mut current_style: Option<Style> = None;
        let mut buffer = String::new();
        for ch in line.chars() {
            let style = self.style_for(ch);
            match current_style {
                Some(s) if s == style => buffer.push(ch),
                Some(s) => {
                    out.push((s, std::mem::take(&mut buffer)));
                    current_style = Some(style);
                    buffer.push(ch);
                }
                None => {
                    current_style = Some(style);
                    buffer.push(ch);
                }
            }
        }
        if let Some(s) = current_style {
            if !buffer.is_empty() {
                out.push((s, buffer));
            }
        }
        out
    }
}
