//! Small leveled logger for operational messages on stderr.
//!
//! Program output never goes through here. The threshold comes from the
//! `BFVM_LOG` environment variable (`error`, `warn`, `info`, `debug`) and
//! defaults to `warn`, so a normal run prints nothing.

use std::fmt::Display;
use std::io::{self, IsTerminal, Write};
use std::sync::OnceLock;

use nu_ansi_term::{Color, Style};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Level {
    pub fn parse(value: &str) -> Option<Level> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            _ => None,
        }
    }

    fn style(self) -> Style {
        match self {
            Level::Debug => Style::new().fg(Color::DarkGray),
            Level::Info => Style::new(),
            Level::Warn => Style::new().fg(Color::Yellow).bold(),
            Level::Error => Style::new().fg(Color::Red).bold(),
        }
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Debug => f.pad("DEBUG"),
            Level::Info => f.pad("INFO"),
            Level::Warn => f.pad("WARN"),
            Level::Error => f.pad("ERROR"),
        }
    }
}

static THRESHOLD: OnceLock<Level> = OnceLock::new();

/// Active threshold, read from `BFVM_LOG` on first use.
pub fn threshold() -> Level {
    *THRESHOLD.get_or_init(|| {
        std::env::var("BFVM_LOG")
            .ok()
            .and_then(|v| Level::parse(&v))
            .unwrap_or(Level::Warn)
    })
}

pub fn enabled(level: Level) -> bool {
    level >= threshold()
}

/// Internal logging function. Use the `info!`, `warn!`, `error!` or `debug!` macros instead.
#[doc(hidden)]
pub fn log(level: Level, message: &str) {
    if !enabled(level) {
        return;
    }
    let stderr = io::stderr();
    let tag = format!("[{level:5}]");
    let tag = if stderr.is_terminal() {
        level.style().paint(tag).to_string()
    } else {
        tag
    };
    let mut handle = stderr.lock();
    let _ = writeln!(handle, "bfvm {tag} {message}");
    let _ = handle.flush();
}

/// Logs a debug-level message.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::log::log($crate::log::Level::Debug, &format!($($arg)*))
        }
    }};
}

/// Logs an info-level message.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::log::log($crate::log::Level::Info, &format!($($arg)*))
        }
    }};
}

/// Logs a warning-level message.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::log::log($crate::log::Level::Warn, &format!($($arg)*))
        }
    }};
}

/// Logs an error-level message.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::log::log($crate::log::Level::Error, &format!($($arg)*))
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn level_display() {
        assert_eq!(format!("{}", Level::Info), "INFO");
        assert_eq!(format!("{:5}", Level::Warn), "WARN ");
        assert_eq!(format!("{}", Level::Error), "ERROR");
    }

    #[test]
    fn level_parsing() {
        assert_eq!(Level::parse("DEBUG"), Some(Level::Debug));
        assert_eq!(Level::parse(" warning "), Some(Level::Warn));
        assert_eq!(Level::parse("loud"), None);
    }
}
