// file: src/error.rs
// version: 1.0.0
// guid: 6b53a8d5-d06e-427f-b0a9-e963cacf984b

use thiserror::Error;

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, WatchError>;

/// Error types for coverage-watch
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Report error: {0}")]
    Report(String),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WatchError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new report error
    pub fn report(msg: impl Into<String>) -> Self {
        Self::Report(msg.into())
    }
}
