//! # Node Context
//!
//! Everything a runner needs, built once by the process entry point and
//! shared by `Arc`. Replaces module-level singletons: membership, trades,
//! early signatures and collaborators all hang off this struct.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use oracle_core::time::MINUTE_MS;
use oracle_core::{ClusterMembership, ContractId, NodeId};
use oracle_crypto::NodeKeyPair;
use oracle_network::Messenger;
use oracle_trades::Trades;

use crate::buffer::PendingSignatureBuffer;
use crate::error::Result;
use crate::rpc::ChainRpc;
use crate::stats::{MemoryStatistics, Statistics};
use crate::submission::SubmissionConfig;
use crate::transaction::{ContractOperation, UnsignedTransaction};

/// Default lifetime of a transaction after its tick timestamp
pub const DEFAULT_TX_VALIDITY: Duration = Duration::from_secs(2 * 60);

/// Membership change scheduled through configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterUpdate {
    /// New member list (sorted)
    pub nodes: Vec<NodeId>,

    /// Earliest tick timestamp the change may be applied at
    pub activation_ms: u64,
}

impl ClusterUpdate {
    pub fn new(nodes: impl IntoIterator<Item = NodeId>, activation_ms: u64) -> Self {
        let mut nodes: Vec<NodeId> = nodes.into_iter().collect();
        nodes.sort();
        nodes.dedup();
        Self {
            nodes,
            activation_ms,
        }
    }
}

/// Node-local state applied outside any transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocalUpdate {
    /// Switch to a new member list
    Membership(Vec<NodeId>),
}

/// Shared application context
pub struct NodeContext {
    keypair: NodeKeyPair,
    membership: RwLock<ClusterMembership>,
    pending_cluster_update: RwLock<Option<ClusterUpdate>>,

    /// Network passphrase mixed into transaction hashes
    pub network_passphrase: String,

    /// Cluster account that pays for transactions
    pub source_account: String,

    pub chain: Arc<dyn ChainRpc>,
    pub messenger: Arc<dyn Messenger>,
    pub trades: Arc<Trades>,
    pub signatures: Arc<PendingSignatureBuffer>,
    pub stats: Arc<dyn Statistics>,

    pub submission: SubmissionConfig,

    /// Extra wait after a tick timestamp before it is processed
    pub db_sync_delay: Duration,

    /// Validity window of built transactions
    pub tx_validity: Duration,

    shutdown_tx: watch::Sender<bool>,
}

impl NodeContext {
    pub fn new(
        keypair: NodeKeyPair,
        membership: ClusterMembership,
        chain: Arc<dyn ChainRpc>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        let trades = Arc::new(Trades::new(keypair.node_id()));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            keypair,
            membership: RwLock::new(membership),
            pending_cluster_update: RwLock::new(None),
            network_passphrase: String::new(),
            source_account: String::new(),
            chain,
            messenger,
            trades,
            signatures: Arc::new(PendingSignatureBuffer::default()),
            stats: Arc::new(MemoryStatistics::new()),
            submission: SubmissionConfig::default(),
            db_sync_delay: Duration::ZERO,
            tx_validity: DEFAULT_TX_VALIDITY,
            shutdown_tx,
        }
    }

    pub fn with_network(mut self, passphrase: impl Into<String>, source_account: impl Into<String>) -> Self {
        self.network_passphrase = passphrase.into();
        self.source_account = source_account.into();
        self
    }

    pub fn with_trades(mut self, trades: Arc<Trades>) -> Self {
        self.trades = trades;
        self
    }

    pub fn with_stats(mut self, stats: Arc<dyn Statistics>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_submission(mut self, submission: SubmissionConfig) -> Self {
        self.submission = submission;
        self
    }

    pub fn with_db_sync_delay(mut self, delay: Duration) -> Self {
        self.db_sync_delay = delay;
        self
    }

    pub fn with_tx_validity(mut self, validity: Duration) -> Self {
        self.tx_validity = validity;
        self
    }

    pub fn node_id(&self) -> NodeId {
        self.keypair.node_id()
    }

    pub fn keypair(&self) -> &NodeKeyPair {
        &self.keypair
    }

    // ========================================================================
    // Membership
    // ========================================================================

    /// Snapshot of the current membership
    pub fn membership(&self) -> ClusterMembership {
        self.membership.read().clone()
    }

    pub fn member_count(&self) -> usize {
        self.membership.read().len()
    }

    pub fn is_member(&self, node: &NodeId) -> bool {
        self.membership.read().is_member(node)
    }

    /// Schedule a membership change for the cluster contract runner
    pub fn schedule_cluster_update(&self, update: ClusterUpdate) {
        info!(
            "Cluster update to {} nodes scheduled at {}",
            update.nodes.len(),
            update.activation_ms
        );
        *self.pending_cluster_update.write() = Some(update);
    }

    pub fn pending_cluster_update(&self) -> Option<ClusterUpdate> {
        self.pending_cluster_update.read().clone()
    }

    /// Apply a local-only update requested by a strategy
    pub fn apply_local_update(&self, update: LocalUpdate) -> Result<()> {
        match update {
            LocalUpdate::Membership(nodes) => {
                let membership = ClusterMembership::new(nodes)?;
                info!("Applying cluster membership of {} nodes", membership.len());
                self.trades.retain_members(&membership);
                *self.membership.write() = membership;

                let mut pending = self.pending_cluster_update.write();
                if pending
                    .as_ref()
                    .map(|u| u.nodes == self.membership.read().members())
                    .unwrap_or(false)
                {
                    *pending = None;
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Unsigned transaction for `operation` at tick `timestamp`
    ///
    /// Sequence and validity bounds only depend on chain state and the
    /// timestamp so every node derives the same hash.
    pub async fn build_transaction(
        &self,
        contract_id: &ContractId,
        operation: ContractOperation,
        timestamp: u64,
        fee: u64,
    ) -> Result<UnsignedTransaction> {
        let sequence = self.chain.account_sequence(&self.source_account).await?;
        let validity = (self.tx_validity.as_millis() as u64).max(MINUTE_MS);
        Ok(UnsignedTransaction {
            source_account: self.source_account.clone(),
            sequence: sequence + 1,
            contract_id: contract_id.clone(),
            operation,
            fee,
            min_time: 0,
            max_time: timestamp + validity,
        })
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Ask the process to stop after a fatal consensus failure
    pub fn request_shutdown(&self, reason: &str) {
        error!("Shutdown requested: {}", reason);
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Receiver flipping to `true` on shutdown request
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}
