//! Error type shared by every setup step.

use std::path::PathBuf;

/// Result type for setup operations.
pub type SetupResult<T> = Result<T, SetupError>;

/// Errors that can occur while preparing the R runtime.
///
/// `UnsupportedOs` and `UnsupportedDevTool` are the fail-fast class: the
/// caller decides whether to abort. Everything else is surfaced as-is from
/// the failing child process or R request.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("unsupported OS: {0}")]
    UnsupportedOs(String),

    #[error("unsupported development tool (neither Colab nor conda detected)")]
    UnsupportedDevTool,

    #[error("environment variable {0} is not set")]
    MissingVariable(&'static str),

    #[error("program not found: {0}")]
    ProgramNotFound(String),

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("R session error: {0}")]
    RSession(String),

    #[error("invalid config at {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SetupError {
    /// True for the fail-fast class (platform or development tool not recognized).
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            SetupError::UnsupportedOs(_) | SetupError::UnsupportedDevTool
        )
    }
}
