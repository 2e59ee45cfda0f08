use thiserror::Error;

/// Error types for monitor setup.
///
/// Steady-state sampling and aggregation have no failure mode; every
/// variant here is raised while bringing the monitor up.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LevelError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The digit bus could not be configured.
    #[error("bus setup failed: {0}")]
    BusSetup(String),

    /// I/O operation error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Sampler thread could not be spawned or placed.
    #[error("sampler thread error: {0}")]
    Thread(String),
}

/// Convenience type alias for monitor operations.
pub type LevelResult<T> = Result<T, LevelError>;
