//! Error types for room and peer negotiation

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating resources with a peer
///
/// Connect outcomes are shared by every caller of a single-flight operation,
/// so the error is `Clone` and carries rendered messages instead of sources.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The API was used in a way the current configuration forbids
    #[error("Usage error: {0}")]
    Usage(String),

    /// A transport object was delivered for a name that already resolved
    #[error("Resource `{name}` was already resolved")]
    DuplicateResolution { name: String },

    /// The transport session rejected an operation
    #[error("Transport error: {0}")]
    Transport(String),

    /// The signaling session rejected an operation
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// A local stream could not be constructed
    #[error("Media error: {0}")]
    Media(String),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

impl Error {
    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        Error::Usage(msg.into())
    }

    /// Whether this is a caller mistake rather than a runtime failure
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Error::Usage(_) | Error::DuplicateResolution { .. })
    }

    /// Whether retrying with a fresh session could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Signaling(_))
    }
}
