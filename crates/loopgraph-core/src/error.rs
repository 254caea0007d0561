//! Error types for loopgraph-core.

use thiserror::Error;

/// Result type alias for loopgraph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or driving a loop session.
#[derive(Debug, Error)]
pub enum Error {
    /// Session configuration is malformed or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The audio backend rejected its initialization.
    #[error("Audio backend initialization failed: {0}")]
    BackendInit(String),

    /// A clip could not be registered with the audio backend.
    #[error("Failed to register clip '{name}': {reason}")]
    ClipRegistration { name: String, reason: String },

    /// A sequence or state was read or advanced while inactive.
    ///
    /// This is a scheduling bug, never an expected runtime condition.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A state name did not resolve to a node in the graph.
    #[error("Unknown state: {0}")]
    UnknownState(String),

    /// A sequence name did not resolve within its state.
    #[error("Unknown sequence '{sequence}' in state '{state}'")]
    UnknownSequence { state: String, sequence: String },

    /// A loop name was not found in the registry.
    #[error("Unknown loop: {0}")]
    UnknownLoop(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Error {
    /// Shorthand for an [`Error::InvalidState`] with the given message.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Whether this error signals a scheduling bug rather than a setup failure.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Error::InvalidState(_))
    }
}
