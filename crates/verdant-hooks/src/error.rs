use thiserror::Error;

#[derive(Debug, Error)]
pub enum HookError {
    /// The collaborator behind the hook reported a failure.
    #[error("Hook execution failed: {0}")]
    ExecutionFailed(String),

    /// The hook exceeded its allowed wall-clock budget.
    #[error("Hook timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Underlying I/O failure (spawning a command, reading a directory).
    #[error("Hook I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HookError>;
