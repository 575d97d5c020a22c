//! Error types for oracle core operations

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in core operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    // === Identifiers ===
    /// Hex string could not be decoded
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// Identifier has the wrong byte length
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    // === Cluster ===
    /// Cluster has no members
    #[error("Cluster membership is empty")]
    EmptyCluster,

    /// Node is not part of the cluster
    #[error("Node is not a cluster member: {0}")]
    NotAMember(String),

    // === Time ===
    /// Timestamp is not aligned to a minute boundary
    #[error("Timestamp {0} is not minute-aligned")]
    UnalignedTimestamp(u64),

    /// Timeframe must be a positive multiple of one minute
    #[error("Invalid timeframe: {0}ms")]
    InvalidTimeframe(u64),

    // === Numbers ===
    /// Numeric value could not be parsed
    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    /// Decimals outside the supported range
    #[error("Unsupported decimals: {0}")]
    UnsupportedDecimals(u32),
}

impl CoreError {
    /// Check if error is a configuration/precondition problem that a later
    /// cycle may resolve on its own
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnalignedTimestamp(_) | Self::NotAMember(_) | Self::EmptyCluster
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidLength {
            expected: 32,
            actual: 31,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("expected 32"));
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(CoreError::UnalignedTimestamp(1).is_recoverable());
        assert!(!CoreError::UnsupportedDecimals(40).is_recoverable());
    }
}
