//! # Chain RPC
//!
//! Blockchain collaborator used by strategies (state reads) and the
//! submission policy (submit and poll). The wire client lives outside this
//! crate; `ledger::MemoryLedger` is the in-process implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use oracle_core::price::Price;
use oracle_core::{Asset, ContractId, NodeId, TxHash};

use crate::transaction::SignedTransaction;

/// Result type alias for RPC calls
pub type RpcResult<T> = std::result::Result<T, RpcError>;

/// RPC failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    // === Transient ===
    /// Endpoint asked us to slow down
    #[error("Rate limited")]
    RateLimited,

    /// Data not yet visible on the queried node
    #[error("Not yet visible: {0}")]
    NotYetVisible(String),

    /// Connection or timeout failure
    #[error("Transport error: {0}")]
    Transport(String),

    // === Permanent ===
    /// Account or contract does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Response could not be understood
    #[error("Bad response: {0}")]
    BadResponse(String),
}

impl RpcError {
    /// Retry the call later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::NotYetVisible(_) | Self::Transport(_)
        )
    }
}

/// Finalization status of a transaction looked up by hash
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionStatus {
    NotFound,
    Pending,
    Success,
    Failed(String),
}

/// Why the chain refused a transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Sequence number already consumed or not yet reached
    BadSequence,
    /// Past the transaction's max time
    TooLate,
    /// Not enough valid cluster signatures
    InsufficientSignatures,
    Other(String),
}

impl RejectReason {
    /// Caused by a competing submission that already landed
    pub fn is_race(&self) -> bool {
        matches!(self, Self::BadSequence | Self::TooLate)
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadSequence => f.write_str("bad sequence"),
            Self::TooLate => f.write_str("too late"),
            Self::InsufficientSignatures => f.write_str("insufficient signatures"),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}

/// Immediate response to a submit
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendStatus {
    /// Accepted, awaiting finalization
    Pending,
    /// Already known to the chain
    Duplicate,
    /// Temporarily refused
    TryAgainLater,
    Rejected(RejectReason),
}

/// Subscription tracked by the subscriptions contract
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: u64,
    pub heartbeat_ms: u64,
    pub last_triggered: u64,
    pub active: bool,
}

impl Subscription {
    /// Heartbeat elapsed at `timestamp`
    pub fn is_due(&self, timestamp: u64) -> bool {
        self.active && timestamp >= self.last_triggered.saturating_add(self.heartbeat_ms)
    }
}

/// On-chain oracle configuration and latest prices
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleState {
    pub base_asset: Asset,
    pub decimals: u32,
    pub timeframe_ms: u64,
    pub period_ms: u64,
    pub assets: Vec<Asset>,
    /// Timestamp of the latest price update (0 if none)
    pub last_timestamp: u64,
    /// Latest prices, by asset position
    pub prices: Vec<Price>,
}

/// Contract state as read from the chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractState {
    Uninitialized,
    Oracle(OracleState),
    Cluster {
        nodes: Vec<NodeId>,
    },
    Subscriptions {
        last_charge: u64,
        subscriptions: Vec<Subscription>,
    },
    Dao {
        unlock_period_ms: u64,
        last_unlock: u64,
    },
}

impl ContractState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Oracle(_) => "oracle",
            Self::Cluster { .. } => "cluster",
            Self::Subscriptions { .. } => "subscriptions",
            Self::Dao { .. } => "dao",
        }
    }

    /// Last timestamp the contract advanced to, when it tracks one
    pub fn last_timestamp(&self) -> Option<u64> {
        match self {
            Self::Oracle(state) => Some(state.last_timestamp),
            Self::Subscriptions { last_charge, .. } => Some(*last_charge),
            Self::Dao { last_unlock, .. } => Some(*last_unlock),
            _ => None,
        }
    }
}

/// Blockchain RPC collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Current sequence of `account`
    async fn account_sequence(&self, account: &str) -> RpcResult<u64>;

    async fn contract_state(&self, contract: &ContractId) -> RpcResult<ContractState>;

    /// Look up a transaction by hash
    async fn get_transaction(&self, hash: &TxHash) -> RpcResult<TransactionStatus>;

    async fn send_transaction(&self, tx: &SignedTransaction) -> RpcResult<SendStatus>;
}
