//! Network error types

use thiserror::Error;

/// Result type alias for network operations
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Errors raised by messengers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Peer is unknown to this messenger
    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    /// Peer is known but currently not connected
    #[error("Peer unavailable: {0}")]
    PeerUnavailable(String),

    /// Message could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// Transport was shut down
    #[error("Messenger closed")]
    Closed,
}

impl NetworkError {
    /// Whether a later send to the same peer may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::PeerUnavailable(_))
    }
}

impl From<bincode::Error> for NetworkError {
    fn from(err: bincode::Error) -> Self {
        NetworkError::Codec(err.to_string())
    }
}
