//! # Transactions
//!
//! Candidate contract invocations built identically by every node. The hash
//! of the unsigned payload is what peers sign, so every field must be derived
//! deterministically from on-chain state, configuration and the tick
//! timestamp.

use serde::{Deserialize, Serialize};
use std::fmt;

use oracle_core::price::Price;
use oracle_core::{Asset, ContractId, NodeId, TxHash};
use oracle_crypto::{transaction_hash, NodeSignature};

use crate::error::Result;

/// Closed set of transaction kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    Init,
    NodesUpdate,
    AssetsUpdate,
    PeriodUpdate,
    PriceUpdate,
    DaoInit,
    DaoUnlock,
    SubscriptionTrigger,
    SubscriptionCharge,
}

impl TransactionKind {
    /// A failed submission of this kind leaves the cluster inconsistent
    ///
    /// Init and price updates are retried or superseded by later ticks.
    pub fn is_fatal_on_failure(&self) -> bool {
        !matches!(self, Self::Init | Self::PriceUpdate)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::NodesUpdate => "nodes_update",
            Self::AssetsUpdate => "assets_update",
            Self::PeriodUpdate => "period_update",
            Self::PriceUpdate => "price_update",
            Self::DaoInit => "dao_init",
            Self::DaoUnlock => "dao_unlock",
            Self::SubscriptionTrigger => "subscription_trigger",
            Self::SubscriptionCharge => "subscription_charge",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract call carried by a transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractOperation {
    // === Oracle ===
    OracleInit {
        base_asset: Asset,
        decimals: u32,
        timeframe_ms: u64,
        period_ms: u64,
        assets: Vec<Asset>,
    },
    AssetsUpdate {
        assets: Vec<Asset>,
    },
    PeriodUpdate {
        period_ms: u64,
    },
    PriceUpdate {
        timestamp: u64,
        prices: Vec<Price>,
    },

    // === Cluster ===
    ClusterInit {
        nodes: Vec<NodeId>,
    },
    NodesUpdate {
        nodes: Vec<NodeId>,
    },

    // === Subscriptions ===
    SubscriptionsInit {
        base_fee: u64,
    },
    SubscriptionTrigger {
        timestamp: u64,
        ids: Vec<u64>,
    },
    SubscriptionCharge {
        timestamp: u64,
        ids: Vec<u64>,
    },

    // === DAO ===
    DaoInit {
        unlock_period_ms: u64,
    },
    DaoUnlock {
        timestamp: u64,
    },
}

impl ContractOperation {
    pub fn kind(&self) -> TransactionKind {
        match self {
            Self::OracleInit { .. } | Self::ClusterInit { .. } | Self::SubscriptionsInit { .. } => {
                TransactionKind::Init
            }
            Self::AssetsUpdate { .. } => TransactionKind::AssetsUpdate,
            Self::PeriodUpdate { .. } => TransactionKind::PeriodUpdate,
            Self::PriceUpdate { .. } => TransactionKind::PriceUpdate,
            Self::NodesUpdate { .. } => TransactionKind::NodesUpdate,
            Self::SubscriptionTrigger { .. } => TransactionKind::SubscriptionTrigger,
            Self::SubscriptionCharge { .. } => TransactionKind::SubscriptionCharge,
            Self::DaoInit { .. } => TransactionKind::DaoInit,
            Self::DaoUnlock { .. } => TransactionKind::DaoUnlock,
        }
    }
}

/// Unsigned transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    /// Cluster account paying for the transaction
    pub source_account: String,

    /// Account sequence this transaction consumes
    pub sequence: u64,

    /// Target contract
    pub contract_id: ContractId,

    pub operation: ContractOperation,

    /// Fee in base units
    pub fee: u64,

    /// Validity bounds (ms since epoch)
    pub min_time: u64,
    pub max_time: u64,
}

impl UnsignedTransaction {
    pub fn kind(&self) -> TransactionKind {
        self.operation.kind()
    }

    /// Canonical payload bytes
    pub fn payload(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Hash signed by the cluster, domain separated by the network passphrase
    pub fn hash(&self, network_passphrase: &str) -> Result<TxHash> {
        Ok(transaction_hash(network_passphrase, &self.payload()?))
    }
}

/// Transaction carrying a quorum of signatures
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub hash: TxHash,
    pub tx: UnsignedTransaction,
    pub signatures: Vec<NodeSignature>,
}

impl SignedTransaction {
    pub fn kind(&self) -> TransactionKind {
        self.tx.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::price_update_tx as price_update;

    #[test]
    fn test_hash_is_deterministic() {
        let a = price_update(60_000).hash("testnet").unwrap();
        let b = price_update(60_000).hash("testnet").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_depends_on_payload_and_network() {
        let base = price_update(60_000).hash("testnet").unwrap();
        assert_ne!(price_update(120_000).hash("testnet").unwrap(), base);
        assert_ne!(price_update(60_000).hash("mainnet").unwrap(), base);
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(!TransactionKind::Init.is_fatal_on_failure());
        assert!(!TransactionKind::PriceUpdate.is_fatal_on_failure());
        assert!(TransactionKind::NodesUpdate.is_fatal_on_failure());
        assert!(TransactionKind::DaoUnlock.is_fatal_on_failure());
        assert!(TransactionKind::SubscriptionCharge.is_fatal_on_failure());
    }

    #[test]
    fn test_operation_kinds() {
        assert_eq!(
            ContractOperation::ClusterInit { nodes: vec![] }.kind(),
            TransactionKind::Init
        );
        assert_eq!(
            ContractOperation::DaoInit {
                unlock_period_ms: 1
            }
            .kind(),
            TransactionKind::DaoInit
        );
    }
}
