use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::Path;

use nu_ansi_term::{Color, Style};

use crate::config::Settings;
use crate::error::{LoadError, RunError};
use crate::samples;

/// Source text from positional parts, a file, or a bundled sample.
/// On failure the message is already printed and the exit code returned.
pub fn resolve_code(
    program: &str,
    parts: &[String],
    file: Option<&Path>,
    sample: Option<&str>,
) -> Result<String, i32> {
    if let Some(name) = sample {
        return match samples::find(name) {
            Some(s) => Ok(s.code.to_string()),
            None => {
                eprintln!("{program}: unknown sample '{name}' (available: {})", samples::names());
                let _ = io::stderr().flush();
                Err(2)
            }
        };
    }
    if let Some(path) = file {
        return fs::read_to_string(path).map_err(|e| {
            eprintln!("{program}: failed to read code file as UTF-8: {e}");
            let _ = io::stderr().flush();
            1
        });
    }
    Ok(parts.join(""))
}

/// [`Settings::load`], reporting a bad configuration as exit code 2.
pub fn load_settings(program: &str) -> Result<Settings, i32> {
    Settings::load().map_err(|e| {
        eprintln!("{}", styled_header(&format!("{program}: {e}")));
        let _ = io::stderr().flush();
        2
    })
}

/// Pretty-print a [`LoadError`] with caret positioning.
/// If `program` is `Some("bfvm")`, prefix messages with "bfvm: ..." for CLI mode
pub fn print_load_error(program: Option<&str>, code: &str, err: &LoadError) {
    let mut stderr = io::stderr().lock();
    for line in load_error_lines(program, code, err) {
        let _ = writeln!(stderr, "{line}");
    }
    let _ = stderr.flush();
}

/// The lines [`print_load_error`] prints.
pub fn load_error_lines(program: Option<&str>, code: &str, err: &LoadError) -> Vec<String> {
    let prefix_program = |msg: &str| {
        if let Some(p) = program {
            format!("{p}: {msg}")
        } else {
            msg.to_string()
        }
    };

    match err {
        LoadError::Empty => vec![styled_header(&prefix_program(
            "Load error: no executable instructions",
        ))],
        LoadError::UnmatchedBracket { kind, offset, .. } => {
            let msg = prefix_program(&format!("Parse error: unmatched bracket {kind}"));
            error_context_lines(&msg, code, *offset)
        }
    }
}

/// Same as [`print_load_error`] for session errors.
pub fn print_run_error(program: Option<&str>, code: &str, err: &RunError) {
    match err {
        RunError::Load(load) => print_load_error(program, code, load),
        RunError::Busy => {
            let msg = match program {
                Some(p) => format!("{p}: {err}"),
                None => err.to_string(),
            };
            eprintln!("{}", styled_header(&msg));
            let _ = io::stderr().flush();
        }
    }
}

/// A concise error with source offset and a caret context window: header,
/// source window, caret. Works on UTF-8 by slicing at char indices.
pub fn error_context_lines(prefix: &str, code: &str, pos: usize) -> Vec<String> {
    // Show a short window around the position for context
    const WINDOW_CHARS: usize = 32;

    let total_chars = code.chars().count();
    let start_char = pos.saturating_sub(WINDOW_CHARS);
    let end_char = (pos + WINDOW_CHARS + 1).min(total_chars);

    let start_byte = char_to_byte_index(code, start_char);
    let end_byte = char_to_byte_index(code, end_char);
    // Newlines would break the caret alignment
    let slice: String = code[start_byte..end_byte]
        .chars()
        .map(|c| if c == '\n' || c == '\r' || c == '\t' { ' ' } else { c })
        .collect();

    // Caret under the exact position
    let caret_offset_chars = pos.saturating_sub(start_char);
    let underline = format!("{}^", " ".repeat(caret_offset_chars));

    vec![
        styled_header(&format!("{prefix} at offset {pos}")),
        format!("  {slice}"),
        format!("  {underline}"),
    ]
}

/// Convert a char index into a byte index in the given UTF-8 string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    if char_idx == 0 {
        return 0;
    }
    match s.char_indices().nth(char_idx) {
        Some((i, _)) => i,
        None => s.len(),
    }
}

// Styled error header for TTY stderr; keep pipelines clean otherwise
fn styled_header(msg: &str) -> String {
    if io::stderr().is_terminal() {
        Style::new().fg(Color::Red).bold().paint(msg).to_string()
    } else {
        msg.to_string()
    }
}
