//! Consensus engine error types

use thiserror::Error;

use oracle_core::{ContractId, CoreError};
use oracle_crypto::CryptoError;
use oracle_network::NetworkError;
use oracle_trades::TradesError;

use crate::rpc::RpcError;
use crate::submission::SubmitError;

/// Result type alias for consensus operations
pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Errors raised while building, signing or submitting transactions
#[derive(Error, Debug)]
pub enum ConsensusError {
    // === Configuration / preconditions ===
    /// Required contract setting is missing
    #[error("Missing configuration for {contract}: {field}")]
    MissingConfig {
        contract: ContractId,
        field: &'static str,
    },

    /// Contract setting is invalid
    #[error("Invalid configuration for {contract}: {reason}")]
    InvalidConfig { contract: ContractId, reason: String },

    /// On-chain state does not match the contract kind
    #[error("Unexpected on-chain state for {contract}: expected {expected}")]
    UnexpectedState {
        contract: ContractId,
        expected: &'static str,
    },

    // === Chain ===
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Submission failed: {0}")]
    Submit(#[from] SubmitError),

    /// Transaction payload could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    // === Wrapped ===
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Trades(#[from] TradesError),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl ConsensusError {
    /// Whether the next tick may succeed without intervention
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Rpc(e) => e.is_transient(),
            Self::Submit(e) => e.is_tolerated(),
            Self::Core(e) => e.is_recoverable(),
            Self::Trades(e) => e.is_recoverable(),
            Self::Network(e) => e.is_recoverable(),
            Self::UnexpectedState { .. } => true,
            _ => false,
        }
    }
}

impl From<bincode::Error> for ConsensusError {
    fn from(err: bincode::Error) -> Self {
        ConsensusError::Encoding(err.to_string())
    }
}
