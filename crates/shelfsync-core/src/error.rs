//! Error types for shelfsync
//!
//! Fatal errors (`Config`, `Fetch`, `RunInProgress`) abort a run before the
//! local store is touched. Per-record errors (`RecordNotFound`,
//! `NoMatchingRemoteItem`, `AmbiguousMatch`) are folded into run reports and
//! never abort a batch.

use thiserror::Error;

/// Result type alias for shelfsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for shelfsync
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration (credential, library, schedule)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A remote fetch failed (connection, HTTP status, timeout, malformed payload)
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// The local store could not resolve a book
    #[error("Book not found: {0}")]
    RecordNotFound(String),

    /// A linked remote id is absent from the current fetch
    #[error("Remote item not found: {0}")]
    NoMatchingRemoteItem(String),

    /// More than one remote item shares an identifier
    #[error("Ambiguous match for {identifier}: {candidates} candidates")]
    AmbiguousMatch {
        /// The identifier that was tested (e.g. "isbn:123")
        identifier: String,
        /// Number of remote items sharing it
        candidates: usize,
    },

    /// Local store read/write failures
    #[error("Local store error: {0}")]
    LocalStore(String),

    /// Another run is already in flight on this runner
    #[error("A run is already in progress")]
    RunInProgress,

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a record-not-found error
    pub fn record_not_found(msg: impl Into<String>) -> Self {
        Self::RecordNotFound(msg.into())
    }

    /// Create a missing-remote-item error
    pub fn no_matching_remote_item(remote_id: impl Into<String>) -> Self {
        Self::NoMatchingRemoteItem(remote_id.into())
    }

    /// Create a local store error
    pub fn local_store(msg: impl Into<String>) -> Self {
        Self::LocalStore(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error aborts a whole run rather than a single record
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Fetch(_) | Self::RunInProgress)
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(Error::config("missing key").is_fatal());
        assert!(Error::fetch("timeout").is_fatal());
        assert!(Error::RunInProgress.is_fatal());
        assert!(!Error::record_not_found("uuid").is_fatal());
        assert!(!Error::no_matching_remote_item("li_1").is_fatal());
    }

    #[test]
    fn ambiguous_match_message() {
        let err = Error::AmbiguousMatch {
            identifier: "isbn:123".to_string(),
            candidates: 2,
        };
        assert_eq!(err.to_string(), "Ambiguous match for isbn:123: 2 candidates");
    }
}
