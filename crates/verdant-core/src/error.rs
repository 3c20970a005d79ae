use thiserror::Error;

/// Problems with the startup configuration. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },

    #[error("Configuration error: {0}")]
    Load(String),

    #[error("Invalid time of day {value:?}: {reason}")]
    InvalidTime { value: String, reason: String },

    #[error("Duplicate schedule entry: {id}")]
    DuplicateEntry { id: String },

    #[error("Schedule entry {id}: interval_days must be at least 1 (got {value})")]
    InvalidInterval { id: String, value: u32 },

    #[error("No watering schedule configured in {path}")]
    EmptySchedule { path: String },
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Load(e.to_string())
    }
}

/// Failure reported by the pump adapter.
#[derive(Debug, Error)]
pub enum ActuationError {
    #[error("Pump activation failed: {0}")]
    Activate(String),

    #[error("Pump deactivation failed: {0}")]
    Deactivate(String),

    #[error("Pump I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ActuationError {
    /// Short code used in structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            ActuationError::Activate(_) => "ACTIVATE_FAILED",
            ActuationError::Deactivate(_) => "DEACTIVATE_FAILED",
            ActuationError::Io(_) => "IO_ERROR",
        }
    }
}
