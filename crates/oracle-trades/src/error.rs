//! Trades error types

use thiserror::Error;

use oracle_network::NetworkError;

/// Result type alias for trades operations
pub type Result<T> = std::result::Result<T, TradesError>;

/// Errors raised by the trades cache and refresher
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TradesError {
    // === Input ===
    /// Timestamp is not aligned to a minute boundary
    #[error("Timestamp {0} is not minute-aligned")]
    UnalignedTimestamp(u64),

    /// Sample amounts could not be normalized
    #[error("Invalid sample from {source_name}: {reason}")]
    InvalidSample { source_name: String, reason: String },

    /// Payload asset list and trades list disagree
    #[error("Malformed trades payload: {0}")]
    MalformedPayload(String),

    // === Sources ===
    /// No market data source with that name is configured
    #[error("Data source not found: {0}")]
    UnknownSource(String),

    /// Market data source failed
    #[error("Data source error: {0}")]
    Source(String),

    // === Gossip ===
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

impl TradesError {
    /// Whether the next refresh cycle may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Source(_) => true,
            Self::Network(e) => e.is_recoverable(),
            _ => false,
        }
    }
}
