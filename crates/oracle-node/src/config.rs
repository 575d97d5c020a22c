//! Node configuration types
//!
//! Loaded from a TOML file. Every section is optional and falls back to
//! defaults, except the cluster member list, the node key and the contracts
//! a node is expected to manage.
//!
//! ```toml
//! [node]
//! name = "oracle-1"
//! key_file = "keys/node.key"
//! source_account = "GCLUSTER..."
//!
//! [[cluster.members]]
//! public_key = "5f2a..."
//! name = "oracle-1"
//!
//! [[contracts]]
//! id = "CORACLE..."
//! kind = "oracle"
//! data_source = "exchanges"
//! base_asset = "USD"
//! assets = ["BTC", "ETH"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use oracle_consensus::{ClusterUpdate, ContractConfig, SubmissionConfig, DEFAULT_TX_VALIDITY};
use oracle_core::constants::MAX_TRADES_TIMESTAMPS;
use oracle_core::time::MINUTE_MS;
use oracle_core::{ClusterMembership, ContractKind, NodeId};
use oracle_crypto::NodeKeyPair;

use crate::error::{ConfigError, Result};

/// Complete node configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSettings,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub rpc: RpcConfig,

    /// Managed contracts
    #[serde(default)]
    pub contracts: Vec<ContractConfig>,

    #[serde(default)]
    pub trades: TradesConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Basic node settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(default = "default_node_name")]
    pub name: String,

    /// Hex-encoded Ed25519 secret seed
    #[serde(default)]
    pub secret_key: Option<String>,

    /// File holding the hex-encoded secret seed
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Network passphrase mixed into transaction hashes
    #[serde(default = "default_network_passphrase")]
    pub network_passphrase: String,

    /// Cluster account paying for transactions
    #[serde(default)]
    pub source_account: String,

    /// Wait after each tick timestamp so chain indexers catch up
    #[serde(default = "default_db_sync_delay_ms")]
    pub db_sync_delay_ms: u64,

    /// Validity window of built transactions
    #[serde(default = "default_tx_validity_ms")]
    pub tx_validity_ms: u64,
}

fn default_node_name() -> String {
    "oracle-node".to_string()
}

fn default_network_passphrase() -> String {
    "Test SDF Network ; September 2015".to_string()
}

fn default_db_sync_delay_ms() -> u64 {
    15_000
}

fn default_tx_validity_ms() -> u64 {
    DEFAULT_TX_VALIDITY.as_millis() as u64
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            secret_key: None,
            key_file: None,
            network_passphrase: default_network_passphrase(),
            source_account: String::new(),
            db_sync_delay_ms: default_db_sync_delay_ms(),
            tx_validity_ms: default_tx_validity_ms(),
        }
    }
}

/// Cluster member entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberConfig {
    /// Hex-encoded Ed25519 public key
    pub public_key: String,

    #[serde(default)]
    pub name: Option<String>,
}

/// Scheduled membership change
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterUpdateConfig {
    /// Public keys of the new member list
    pub members: Vec<String>,

    /// Earliest timestamp (ms) the change goes on chain
    pub activation_ms: u64,
}

/// Cluster settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub members: Vec<MemberConfig>,

    #[serde(default)]
    pub update: Option<ClusterUpdateConfig>,
}

/// Chain RPC settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Endpoint URLs, tried in order
    #[serde(default)]
    pub endpoints: Vec<String>,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// First retry pause; later ones grow up to `max_retry_delay_ms`
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    100
}

fn default_poll_attempts() -> u32 {
    10
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_max_retry_delay_ms() -> u64 {
    30_000
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            max_attempts: default_max_attempts(),
            poll_attempts: default_poll_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}

/// Trades collection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TradesConfig {
    /// Fetch and gossip local trades every minute
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Known market data source names
    #[serde(default)]
    pub sources: Vec<String>,

    /// Minutes kept per key and node
    #[serde(default = "default_cache_depth")]
    pub cache_depth: usize,

    /// Delay after each minute before fetching it
    #[serde(default = "default_refresh_delay_ms")]
    pub refresh_delay_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_cache_depth() -> usize {
    MAX_TRADES_TIMESTAMPS
}

fn default_refresh_delay_ms() -> u64 {
    5_000
}

impl Default for TradesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sources: Vec::new(),
            cache_depth: default_cache_depth(),
            refresh_delay_ms: default_refresh_delay_ms(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Metrics configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_metrics_address")]
    pub address: String,
}

fn default_metrics_address() -> String {
    "127.0.0.1:9615".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_metrics_address(),
        }
    }
}

impl NodeConfig {
    /// Load and parse a TOML file (not validated)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Check the configuration as a whole
    pub fn validate(&self) -> Result<()> {
        let membership = self.membership()?;

        let keypair = self.load_keypair()?;
        if !membership.is_member(&keypair.node_id()) {
            return Err(ConfigError::NotAMember(keypair.node_id().to_hex()));
        }

        if let Some(update) = &self.cluster.update {
            let nodes = parse_members(update.members.iter().map(String::as_str))?;
            ClusterMembership::new(nodes).map_err(|_| ConfigError::EmptyCluster)?;
        }

        if self.node.source_account.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "node.source_account",
                reason: "must not be empty".into(),
            });
        }
        if self.rpc.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "rpc.max_attempts",
                reason: "must be positive".into(),
            });
        }
        if self.rpc.max_retry_delay_ms < self.rpc.retry_delay_ms {
            return Err(ConfigError::Invalid {
                field: "rpc.max_retry_delay_ms",
                reason: "shorter than rpc.retry_delay_ms".into(),
            });
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::Invalid {
                field: "logging.format",
                reason: format!("unknown format {}", self.logging.format),
            });
        }

        let mut ids = HashSet::new();
        for contract in &self.contracts {
            if !ids.insert(contract.id.clone()) {
                return Err(ConfigError::DuplicateContract(contract.id.to_string()));
            }
            contract.validate()?;
            if contract.kind == ContractKind::Oracle {
                let source = contract.require_data_source()?;
                if !self.trades.sources.iter().any(|s| s == source) {
                    return Err(ConfigError::UnknownDataSource {
                        contract: contract.id.to_string(),
                        source_name: source.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Node keypair from `secret_key` or `key_file`
    pub fn load_keypair(&self) -> Result<NodeKeyPair> {
        if let Some(secret) = &self.node.secret_key {
            return Ok(NodeKeyPair::from_secret_hex(secret)?);
        }
        if let Some(path) = &self.node.key_file {
            let secret = std::fs::read_to_string(path)?;
            return Ok(NodeKeyPair::from_secret_hex(&secret)?);
        }
        Err(ConfigError::MissingKey)
    }

    /// Parsed cluster member list
    pub fn membership(&self) -> Result<ClusterMembership> {
        let nodes = parse_members(self.cluster.members.iter().map(|m| m.public_key.as_str()))?;
        ClusterMembership::new(nodes).map_err(|_| ConfigError::EmptyCluster)
    }

    /// Scheduled membership change, if any
    pub fn cluster_update(&self) -> Result<Option<ClusterUpdate>> {
        match &self.cluster.update {
            Some(update) => {
                let nodes = parse_members(update.members.iter().map(String::as_str))?;
                Ok(Some(ClusterUpdate::new(nodes, update.activation_ms)))
            }
            None => Ok(None),
        }
    }

    pub fn submission_config(&self) -> SubmissionConfig {
        SubmissionConfig {
            max_attempts: self.rpc.max_attempts,
            poll_attempts: self.rpc.poll_attempts,
            poll_interval: Duration::from_millis(self.rpc.poll_interval_ms),
            retry_delay: Duration::from_millis(self.rpc.retry_delay_ms),
            max_retry_delay: Duration::from_millis(self.rpc.max_retry_delay_ms),
        }
    }

    pub fn db_sync_delay(&self) -> Duration {
        Duration::from_millis(self.node.db_sync_delay_ms)
    }

    pub fn tx_validity(&self) -> Duration {
        Duration::from_millis(self.node.tx_validity_ms.max(MINUTE_MS))
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.trades.refresh_delay_ms)
    }

    /// Display name of a member, falling back to its short key
    pub fn member_name(&self, node: &NodeId) -> String {
        self.cluster
            .members
            .iter()
            .find(|m| NodeId::from_hex(&m.public_key).ok().as_ref() == Some(node))
            .and_then(|m| m.name.clone())
            .unwrap_or_else(|| node.to_string())
    }
}

/// Parse hex public keys, rejecting duplicates
fn parse_members<'a>(keys: impl Iterator<Item = &'a str>) -> Result<Vec<NodeId>> {
    let mut seen = HashSet::new();
    let mut nodes = Vec::new();
    for key in keys {
        let node = NodeId::from_hex(key)?;
        if !seen.insert(node) {
            return Err(ConfigError::DuplicateMember(key.to_string()));
        }
        nodes.push(node);
    }
    if nodes.is_empty() {
        return Err(ConfigError::EmptyCluster);
    }
    Ok(nodes)
}
