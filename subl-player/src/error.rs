//! Error types for subl-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for subl-player
#[derive(Error, Debug)]
pub enum Error {
    /// Main or frequency resource failed to fetch or decode
    #[error("Failed to load {url}: {reason}")]
    Load { url: String, reason: String },

    /// Runtime refused to start playback
    #[error("Playback rejected: {0}")]
    PlaybackRejected(String),

    /// Speech synthesis request failed
    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    /// Operation superseded or stopped on purpose
    #[error("Operation cancelled")]
    Cancelled,

    /// Rejected caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resume snapshot storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] subl_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn load(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Load {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors that end the current playback attempt and are shown to the listener
    ///
    /// Synthesis failures and cancellations are absorbed by the speech loop.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Error::Load { .. } | Error::PlaybackRejected(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Convenience Result type using subl-player Error
pub type Result<T> = std::result::Result<T, Error>;
