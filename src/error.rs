//! Error types for the audio director

use thiserror::Error;

/// Errors surfaced by construction, persistence and backend boundaries.
///
/// Request-level misuse (unknown trigger, cooldown denial, stale handle) is
/// deliberately NOT represented here: those degrade to `None` return values
/// and a log line, since a dropped sound effect is preferable to a halted
/// game.
#[derive(Error, Debug)]
pub enum AudioError {
    /// Audio backend could not be initialized
    #[error("Backend initialization failed: {0}")]
    BackendInitFailed(String),

    /// Operation requires an initialized backend
    #[error("Backend not initialized")]
    BackendNotInitialized,

    /// Handle doesn't correspond to an active backend sound
    #[error("Invalid sound handle")]
    InvalidHandle,

    /// Backend failed to start or control a sound
    #[error("Playback failed: {0}")]
    PlaybackFailed(String),

    /// Saved tree data cannot be turned into a usable category tree
    #[error("Corrupt category tree: {0}")]
    CorruptTree(String),

    /// IO error while loading or saving durable data
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a RON document
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Failed to encode a RON document
    #[error("Encode error: {0}")]
    Encode(#[from] ron::Error),
}
