use thiserror::Error;

#[derive(Error, Debug)]
pub enum PendulumError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Frequency list rejected: {0}")]
    FrequencyList(String),

    #[error("Fit diverged after {iterations} iterations: {message}")]
    FitDiverged { iterations: usize, message: String },

    #[error("Serial link error: {0}")]
    Link(String),

    #[error("Session fault: {0}")]
    SessionFault(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PendulumResult<T> = Result<T, PendulumError>;
