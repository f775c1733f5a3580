//! Error types for terminal lifecycle operations.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Errors raised while launching a PTY child process.
///
/// A spawn error always means no process handle was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnError {
    /// The requested working directory does not exist or is not a directory.
    InvalidWorkingDir { path: PathBuf },
    /// Columns and rows must both be positive.
    InvalidGeometry { cols: u16, rows: u16 },
    /// The shell executable could not be resolved.
    ShellNotFound { shell: String },
    /// The OS refused to open the PTY or start the child.
    Pty { message: String },
}

impl Display for SpawnError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidWorkingDir { path } => {
                write!(f, "working directory does not exist: {}", path.display())
            }
            Self::InvalidGeometry { cols, rows } => {
                write!(f, "invalid terminal size {}x{}", cols, rows)
            }
            Self::ShellNotFound { shell } => write!(f, "shell not found: {}", shell),
            Self::Pty { message } => write!(f, "failed to start pty process: {}", message),
        }
    }
}

impl std::error::Error for SpawnError {}

/// Errors returned across the lifecycle boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalError {
    /// The process could not be created.
    Spawn(SpawnError),
    /// The operation referenced an id that is not in the registry.
    NotFound { id: String },
    /// A session store read or write failed.
    Persistence { message: String },
    /// Restoring a stored session failed to spawn its terminal.
    Restore { id: String, source: SpawnError },
    /// Writing to or resizing a live process failed.
    ProcessIo { id: String, message: String },
}

impl TerminalError {
    pub(crate) fn persistence(err: &anyhow::Error) -> Self {
        Self::Persistence {
            message: format!("{:#}", err),
        }
    }
}

impl Display for TerminalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(err) => write!(f, "spawn failed: {}", err),
            Self::NotFound { id } => write!(f, "terminal not found: {}", id),
            Self::Persistence { message } => write!(f, "session persistence failed: {}", message),
            Self::Restore { id, source } => {
                write!(f, "failed to restore terminal {}: {}", id, source)
            }
            Self::ProcessIo { id, message } => {
                write!(f, "terminal {} process i/o failed: {}", id, message)
            }
        }
    }
}

impl std::error::Error for TerminalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(err) => Some(err),
            Self::Restore { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<SpawnError> for TerminalError {
    fn from(err: SpawnError) -> Self {
        Self::Spawn(err)
    }
}

pub type TerminalResult<T> = Result<T, TerminalError>;
