//! Configuration errors

use thiserror::Error;

use oracle_consensus::ConsensusError;
use oracle_core::CoreError;
use oracle_crypto::CryptoError;

/// Result type for configuration handling
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    // === Loading ===
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    // === Identity ===
    #[error("No node key configured (set node.secret_key or node.key_file)")]
    MissingKey,

    #[error("Invalid node key: {0}")]
    Key(#[from] CryptoError),

    #[error("Local node {0} is not a cluster member")]
    NotAMember(String),

    // === Cluster ===
    #[error("Cluster has no members")]
    EmptyCluster,

    #[error("Duplicate cluster member: {0}")]
    DuplicateMember(String),

    #[error("Invalid member key: {0}")]
    InvalidMember(#[from] CoreError),

    // === Contracts ===
    #[error("Duplicate contract: {0}")]
    DuplicateContract(String),

    #[error("Contract {contract} uses unknown data source {source_name}")]
    UnknownDataSource {
        contract: String,
        source_name: String,
    },

    #[error("Invalid contract: {0}")]
    Contract(#[from] ConsensusError),

    // === Settings ===
    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
