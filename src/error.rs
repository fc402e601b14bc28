//! Error types for peercache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving or loading cached values.
///
/// Every variant is `Clone` so that a single load result can be handed to
/// all callers coalesced onto it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Empty key passed to a lookup
    #[error("key is required")]
    EmptyKey,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Peer picker registered twice for the same group
    #[error("peers already registered for group: {group}")]
    PeersAlreadyRegistered { group: String },

    /// Lookup against an unregistered group name
    #[error("no such group: {0}")]
    GroupNotFound(String),

    /// Backing loader failed
    #[error("{reason}")]
    Loader { key: String, reason: String },

    /// Transport failure talking to a peer
    #[error("peer {peer} failed: {reason}")]
    Peer { peer: String, reason: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Loader failure for `key` with the given reason.
    pub fn loader(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Loader {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Loader failure for a key the source of truth does not know.
    pub fn not_exist(key: impl Into<String>) -> Self {
        let key = key.into();
        let reason = format!("{} not exist", key);
        Error::Loader { key, reason }
    }

    /// Transport failure while fetching from `peer`.
    pub fn peer(peer: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Peer {
            peer: peer.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error came from the backing loader.
    pub fn is_loader(&self) -> bool {
        matches!(self, Error::Loader { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
