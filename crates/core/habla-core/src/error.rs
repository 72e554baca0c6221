//! Error types for the habla bot

use thiserror::Error;

/// Main error type for habla operations
#[derive(Debug, Error)]
pub enum HablaError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Saves-store error (custom message)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Speech synthesis error
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Voice channel join/move failure
    #[error("Voice connection error: {0}")]
    Connection(String),

    /// Audio decode/stream failure
    #[error("Playback error: {0}")]
    Playback(String),

    /// Discord gateway/API error
    #[error("Discord error: {0}")]
    Discord(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl HablaError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a synthesis error
    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::Synthesis(msg.into())
    }

    /// Create a voice connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a playback error
    pub fn playback(msg: impl Into<String>) -> Self {
        Self::Playback(msg.into())
    }

    /// Create a Discord error
    pub fn discord(msg: impl Into<String>) -> Self {
        Self::Discord(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Result alias used throughout the workspace
pub type Result<T> = std::result::Result<T, HablaError>;
