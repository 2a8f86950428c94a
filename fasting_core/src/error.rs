//! Error types for the fasting_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for fasting_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation is not legal in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A fast was started with a goal that is not a positive duration
    #[error("Invalid fasting goal: {0} seconds")]
    InvalidGoal(f64),

    /// A durable write failed; the in-memory state is still authoritative
    #[error("Persistence write failed: {0}")]
    PersistenceWrite(String),

    /// An outbound effect could not be delivered to its collaborator
    #[error("Side effect dispatch failed: {0}")]
    SideEffect(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
