use thiserror::Error;
use verdant_core::{ActuationError, ConfigError};

/// Failure reading or writing the watering state record.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("State I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying SQLite / rusqlite error.
    #[error("State database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Actuation(#[from] ActuationError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
