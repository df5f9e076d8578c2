use gasbench::{CompileError, ConfigError};

/// Error types of the gasbench CLI
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Benchmark service error
    #[error("{0}")]
    Bench(#[from] gasbench::Error),

    /// Configuration error
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Failed to load a contract artifact
    #[error("Invalid artifact: {0}")]
    Artifact(#[from] CompileError),

    /// Failed to read file
    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Logging could not be set up
    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    /// The process was interrupted; every fork was torn down
    #[error("Interrupted")]
    Interrupted,
}

/// Result type for the gasbench CLI
pub type Result<T> = std::result::Result<T, CliError>;
