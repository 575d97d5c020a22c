//! # Runner Manager
//!
//! Owns one `Runner` per configured contract and routes inbound cluster
//! messages to them. Contract configuration can be re-applied at runtime:
//! new contracts get a runner, removed ones are stopped, changed ones are
//! replaced.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use oracle_core::{ContractId, NodeId, TxHash};
use oracle_crypto::NodeSignature;
use oracle_network::{MessageHandler, PeerState, TradesPayload};

use crate::config::ContractConfig;
use crate::context::NodeContext;
use crate::error::Result;
use crate::runner::{Runner, SignatureOutcome};
use crate::strategy::for_contract;

/// Registry of contract runners
pub struct RunnerManager {
    ctx: Arc<NodeContext>,
    runners: DashMap<ContractId, Arc<Runner>>,
    started: AtomicBool,
}

impl RunnerManager {
    pub fn new(ctx: Arc<NodeContext>) -> Self {
        Self {
            ctx,
            runners: DashMap::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn context(&self) -> &Arc<NodeContext> {
        &self.ctx
    }

    /// Reconcile runners with `contracts`
    ///
    /// Every config is validated before anything changes.
    pub fn apply_contracts(&self, contracts: &[ContractConfig]) -> Result<()> {
        let mut strategies = Vec::with_capacity(contracts.len());
        for config in contracts {
            strategies.push(for_contract(config.clone())?);
        }

        let wanted: Vec<ContractId> = contracts.iter().map(|c| c.id.clone()).collect();
        let removed: Vec<ContractId> = self
            .runners
            .iter()
            .filter(|entry| !wanted.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        for id in removed {
            if let Some((_, runner)) = self.runners.remove(&id) {
                runner.stop();
                info!("Removed runner for contract {}", id);
            }
        }

        let started = self.started.load(Ordering::SeqCst);
        for strategy in strategies {
            let id = strategy.config().id.clone();
            if let Some(existing) = self.runners.get(&id) {
                if existing.strategy().config() == strategy.config() {
                    continue;
                }
            }

            let runner = Arc::new(Runner::new(self.ctx.clone(), strategy));
            if let Some(old) = self.runners.insert(id.clone(), runner.clone()) {
                old.stop();
                info!("Replaced runner for contract {}", id);
            } else {
                info!("Added {} runner for contract {}", runner.kind(), id);
            }
            if started {
                runner.start();
            }
        }
        Ok(())
    }

    /// Start every runner; runners added later start immediately
    pub fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
        for entry in self.runners.iter() {
            entry.value().start();
        }
    }

    pub fn stop_all(&self) {
        self.started.store(false, Ordering::SeqCst);
        for entry in self.runners.iter() {
            entry.value().stop();
        }
    }

    pub fn get(&self, contract: &ContractId) -> Option<Arc<Runner>> {
        self.runners.get(contract).map(|r| r.value().clone())
    }

    pub fn contract_ids(&self) -> Vec<ContractId> {
        let mut ids: Vec<ContractId> = self.runners.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<Runner>> {
        self.runners.iter().map(|e| e.value().clone()).collect()
    }

    /// Hand a peer signature to the runner of `contract`
    pub async fn route_signature(
        &self,
        contract: &ContractId,
        hash: TxHash,
        signature: NodeSignature,
    ) -> Option<SignatureOutcome> {
        // clone out of the map so no shard lock is held across the await
        let runner = match self.get(contract) {
            Some(runner) => runner,
            None => {
                debug!("Signature for unknown contract {}", contract);
                return None;
            }
        };
        Some(runner.add_signature(hash, signature).await)
    }

    /// Re-send outstanding signatures to a peer that became ready
    pub async fn broadcast_ready(&self, peer: &NodeId) -> usize {
        let mut resent = 0;
        for runner in self.snapshot() {
            if runner.on_peer_ready(peer).await {
                resent += 1;
            }
        }
        resent
    }
}

#[async_trait]
impl MessageHandler for RunnerManager {
    async fn on_signature(
        &self,
        from: NodeId,
        contract_id: ContractId,
        hash: TxHash,
        signature: NodeSignature,
    ) {
        if let Some(outcome) = self.route_signature(&contract_id, hash, signature).await {
            debug!(
                "Signature from {} for {} on {}: {:?}",
                from, hash, contract_id, outcome
            );
        }
    }

    async fn on_state(&self, from: NodeId, state: PeerState) {
        match state {
            PeerState::Ready => {
                let resent = self.broadcast_ready(&from).await;
                debug!("Peer {} ready, re-sent {} signatures", from, resent);
            }
        }
    }

    async fn on_trades(&self, from: NodeId, payload: TradesPayload) {
        if !self.ctx.is_member(&from) {
            debug!("Ignoring trades from non-member {}", from);
            return;
        }
        if let Err(e) = self.ctx.trades.push_payload(from, &payload) {
            warn!("Rejected trades from {}: {}", from, e);
        }
    }
}
