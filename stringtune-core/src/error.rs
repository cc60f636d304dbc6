//! Error types for the tuner core.
//!
//! Weak or ambiguous signal is not an error: the pitch pipeline reports
//! those ticks as `None`. The variants below cover configuration, tuning
//! data and audio device failures only.

use thiserror::Error;

/// Tuner core errors
#[derive(Debug, Error)]
pub enum TunerError {
    /// No preset or custom tuning has this id
    #[error("Unknown tuning: {0}")]
    UnknownTuning(String),

    /// Tuning data failed validation
    #[error("Invalid tuning '{id}': {reason}")]
    InvalidTuning { id: String, reason: String },

    /// Note name could not be parsed
    #[error("Invalid note name: {0}")]
    InvalidNote(String),

    /// Frame length or sample rate unusable for analysis
    #[error("Invalid audio frame: {0}")]
    InvalidFrame(String),

    /// Audio device or stream failure
    #[error("Audio error: {0}")]
    Audio(String),

    /// Tuning or config JSON failed to (de)serialize
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tuner core operations
pub type Result<T> = std::result::Result<T, TunerError>;
