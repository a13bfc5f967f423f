//! Error types for segue-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for segue-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors bubbled up from the common crate
    #[error(transparent)]
    Common(#[from] segue_common::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// The playback engine is no longer running
    #[error("Playback engine stopped")]
    EngineStopped,

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using segue-player Error
pub type Result<T> = std::result::Result<T, Error>;

/// Inbound notification rejected at the ingress edge
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngressError {
    /// Payload is not a well-formed producer message
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// The engine task has shut down
    #[error("Playback engine stopped")]
    EngineStopped,
}

/// Failure of one media handle (fetch, decode, playback or load timeout)
///
/// Cloneable because it travels inside media events and host reports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// Resource could not be fetched
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Resource fetched but not decodable
    #[error("decode failed: {0}")]
    Decode(String),

    /// Playback failed after start
    #[error("playback failed: {0}")]
    Playback(String),

    /// Resource did not become ready in time
    #[error("load timed out after {0:?}")]
    Timeout(std::time::Duration),
}
