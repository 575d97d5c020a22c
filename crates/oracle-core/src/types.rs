//! Core type definitions for the oracle cluster
//!
//! Identifiers are plain byte arrays with hex formatting so they can be
//! logged, compared and sent over the wire without extra conversions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

fn decode_32(s: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s.trim()).map_err(|e| CoreError::InvalidHex(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(CoreError::InvalidLength {
            expected: 32,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// NodeId - Ed25519 public key of a cluster member
///
/// Ordered so membership lists can be sorted identically on every node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    key: [u8; 32],
}

impl NodeId {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.key)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self::new(decode_32(s)?))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..12])
    }
}

/// TxHash - deterministic digest of an unsigned transaction payload
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TxHash {
    hash: [u8; 32],
}

impl TxHash {
    pub fn new(hash: [u8; 32]) -> Self {
        Self { hash }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.hash
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self::new(decode_32(s)?))
    }

    /// Zero hash
    pub const ZERO: Self = Self { hash: [0u8; 32] };
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// ContractId - on-chain address of a managed contract
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractId(String);

impl ContractId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContractId({})", self.0)
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContractId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Kind of contract managed by a runner
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractKind {
    /// Price feed oracle
    Oracle,
    /// Cluster membership / system configuration
    Cluster,
    /// Subscription triggers and charges
    Subscriptions,
    /// DAO treasury
    Dao,
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContractKind::Oracle => "oracle",
            ContractKind::Cluster => "cluster",
            ContractKind::Subscriptions => "subscriptions",
            ContractKind::Dao => "dao",
        };
        f.write_str(name)
    }
}

/// Tracked asset (ticker symbol or token contract address)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asset {
    pub code: String,
}

impl Asset {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

/// Grouping key for trade data: one data source quoting against one base asset
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetKey {
    pub source: String,
    pub base_asset: Asset,
}

impl AssetKey {
    pub fn new(source: impl Into<String>, base_asset: Asset) -> Self {
        Self {
            source: source.into(),
            base_asset,
        }
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.base_asset)
    }
}

/// Node-level constants
pub mod constants {
    /// Maximum number of minute timestamps kept per trades key
    pub const MAX_TRADES_TIMESTAMPS: usize = 15;

    /// Scale applied to percentages in deviation checks (1% == 1000)
    pub const PERCENT_SCALE: u64 = 1000;

    /// Relative deviation tolerated around the median price (4%, scaled)
    pub const MEDIAN_MAX_DEVIATION: u64 = 4 * PERCENT_SCALE;

    /// Highest supported fixed-point precision
    pub const MAX_DECIMALS: u32 = 18;
}
