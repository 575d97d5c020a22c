//! Cluster membership contract

use async_trait::async_trait;

use oracle_core::ContractKind;

use super::{candidate, read_state, Candidate, ContractStrategy, SYSTEM_TIMEFRAME_MS};
use crate::config::ContractConfig;
use crate::context::{LocalUpdate, NodeContext};
use crate::error::{ConsensusError, Result};
use crate::rpc::ContractState;
use crate::transaction::ContractOperation;

/// Pushes scheduled membership changes on chain
pub struct ClusterStrategy {
    config: ContractConfig,
}

impl ClusterStrategy {
    pub fn new(config: ContractConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ContractStrategy for ClusterStrategy {
    fn kind(&self) -> ContractKind {
        ContractKind::Cluster
    }

    fn config(&self) -> &ContractConfig {
        &self.config
    }

    fn timeframe(&self) -> u64 {
        SYSTEM_TIMEFRAME_MS
    }

    async fn build_candidate(&self, ctx: &NodeContext, timestamp: u64) -> Result<Option<Candidate>> {
        let nodes = match read_state(ctx, &self.config.id).await? {
            ContractState::Uninitialized => {
                let nodes = ctx.membership().members().to_vec();
                return candidate(ctx, &self.config, ContractOperation::ClusterInit { nodes }, timestamp)
                    .await;
            }
            ContractState::Cluster { nodes } => nodes,
            _ => {
                return Err(ConsensusError::UnexpectedState {
                    contract: self.config.id.clone(),
                    expected: "cluster",
                })
            }
        };

        let update = match ctx.pending_cluster_update() {
            Some(update) => update,
            None => return Ok(None),
        };
        if timestamp < update.activation_ms {
            tracing::debug!(
                "Cluster update not due until {} (tick {})",
                update.activation_ms,
                timestamp
            );
            return Ok(None);
        }

        let local = LocalUpdate::Membership(update.nodes.clone());
        if nodes == update.nodes {
            // already on chain, only the local view lags
            return Ok(Some(Candidate::local(local)));
        }

        let operation = ContractOperation::NodesUpdate {
            nodes: update.nodes,
        };
        Ok(candidate(ctx, &self.config, operation, timestamp)
            .await?
            .map(|c| c.with_local_update(local)))
    }
}
