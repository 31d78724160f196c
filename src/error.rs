//! # Error Types
//!
//! Custom error types for RC Link using `thiserror`.

use thiserror::Error;

/// Main error type for RC Link
#[derive(Debug, Error)]
pub enum RcLinkError {
    /// Wire protocol errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial radio bridge errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// No serial radio bridge could be opened
    #[error("No radio bridge found (tried: {0})")]
    SerialPortNotFound(String),

    /// Settings storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Telemetry serialization errors
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] serde_json::Error),
}

/// Result type alias for RC Link
pub type Result<T> = std::result::Result<T, RcLinkError>;
