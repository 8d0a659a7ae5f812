use std::fmt;

/// Which side of the loop was unmatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmatchedBracketKind {
    Open,
    Close,
}

impl fmt::Display for UnmatchedBracketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmatchedBracketKind::Open => write!(f, "'['"),
            UnmatchedBracketKind::Close => write!(f, "']'"),
        }
    }
}

/// A bracket without a partner, located by its index in the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unmatched bracket {kind} at instruction {index}")]
pub struct BracketError {
    pub kind: UnmatchedBracketKind,
    pub index: usize,
}

/// Reasons a program cannot be loaded. Nothing is executed when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// The source contained no instruction characters at all.
    #[error("no executable instructions")]
    Empty,

    /// Loops were not balanced.
    ///
    /// `index` is the position in the filtered instruction stream, `offset` the
    /// character offset in the raw source.
    #[error("unmatched bracket {kind} at source offset {offset}")]
    UnmatchedBracket {
        kind: UnmatchedBracketKind,
        index: usize,
        offset: usize,
    },
}

impl LoadError {
    /// Source character offset to point at when reporting, if any.
    pub fn offset(&self) -> Option<usize> {
        match self {
            LoadError::Empty => None,
            LoadError::UnmatchedBracket { offset, .. } => Some(*offset),
        }
    }
}

/// Failures when asking a session to start or advance a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Another run is active; it must finish or be cancelled first.
    #[error("a run is already in progress")]
    Busy,
}

/// Invalid configuration values, wherever they came from.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key} in {origin}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        origin: String,
        reason: String,
    },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
