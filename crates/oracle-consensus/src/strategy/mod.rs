//! # Contract Strategies
//!
//! A runner is the same state machine for every contract; what differs is
//! how a tick turns on-chain state into a candidate transaction. Each
//! contract kind plugs in through `ContractStrategy`.
//!
//! | Kind          | Timeframe        | Transactions                                    |
//! |---------------|------------------|-------------------------------------------------|
//! | oracle        | configured       | Init, AssetsUpdate, PeriodUpdate, PriceUpdate   |
//! | cluster       | 1 minute         | Init, NodesUpdate (or local apply)              |
//! | subscriptions | 1 minute         | Init, SubscriptionCharge, SubscriptionTrigger   |
//! | dao           | 1 minute         | DaoInit, DaoUnlock                              |

use async_trait::async_trait;
use std::sync::Arc;

use oracle_core::time::MINUTE_MS;
use oracle_core::{ContractId, ContractKind};

use crate::config::ContractConfig;
use crate::context::{LocalUpdate, NodeContext};
use crate::error::Result;
use crate::rpc::ContractState;
use crate::transaction::{ContractOperation, UnsignedTransaction};

mod cluster;
mod dao;
mod oracle;
mod subscriptions;

pub use cluster::ClusterStrategy;
pub use dao::DaoStrategy;
pub use oracle::OracleStrategy;
pub use subscriptions::SubscriptionsStrategy;

/// Timeframe of system contracts
pub const SYSTEM_TIMEFRAME_MS: u64 = MINUTE_MS;

/// Outcome of a build step that has something to do
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// Transaction to sign and submit
    pub tx: Option<UnsignedTransaction>,

    /// Local state to apply once the transaction landed (or right away
    /// when there is no transaction)
    pub local_update: Option<LocalUpdate>,
}

impl Candidate {
    pub fn transaction(tx: UnsignedTransaction) -> Self {
        Self {
            tx: Some(tx),
            local_update: None,
        }
    }

    /// Nothing to submit, only advance local state
    pub fn local(update: LocalUpdate) -> Self {
        Self {
            tx: None,
            local_update: Some(update),
        }
    }

    pub fn with_local_update(mut self, update: LocalUpdate) -> Self {
        self.local_update = Some(update);
        self
    }
}

/// Per-kind transaction building
#[async_trait]
pub trait ContractStrategy: Send + Sync {
    fn kind(&self) -> ContractKind;

    fn config(&self) -> &ContractConfig;

    /// Interval between ticks
    fn timeframe(&self) -> u64;

    /// Tick following `current`
    fn next_timestamp(&self, current: u64) -> u64 {
        current + self.timeframe()
    }

    /// Candidate for the tick at `timestamp`, or `None` when up to date
    async fn build_candidate(&self, ctx: &NodeContext, timestamp: u64) -> Result<Option<Candidate>>;
}

/// Strategy matching the contract kind
pub fn for_contract(config: ContractConfig) -> Result<Arc<dyn ContractStrategy>> {
    config.validate()?;
    Ok(match config.kind {
        ContractKind::Oracle => Arc::new(OracleStrategy::new(config)?),
        ContractKind::Cluster => Arc::new(ClusterStrategy::new(config)),
        ContractKind::Subscriptions => Arc::new(SubscriptionsStrategy::new(config)),
        ContractKind::Dao => Arc::new(DaoStrategy::new(config)),
    })
}

/// Read contract state and report it to statistics
async fn read_state(ctx: &NodeContext, contract: &ContractId) -> Result<ContractState> {
    let state = ctx.chain.contract_state(contract).await?;
    ctx.stats.set_contract_state(contract, &state);
    Ok(state)
}

/// Candidate invoking `operation` on the strategy's contract
async fn candidate(
    ctx: &NodeContext,
    config: &ContractConfig,
    operation: ContractOperation,
    timestamp: u64,
) -> Result<Option<Candidate>> {
    let tx = ctx
        .build_transaction(&config.id, operation, timestamp, config.fee)
        .await?;
    Ok(Some(Candidate::transaction(tx)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_contract_validates() {
        let config = ContractConfig::new("CORACLE", ContractKind::Oracle);
        assert!(for_contract(config).is_err());

        let strategy = for_contract(ContractConfig::new("CDAO", ContractKind::Dao)).unwrap();
        assert_eq!(strategy.kind(), ContractKind::Dao);
        assert_eq!(strategy.next_timestamp(60_000), 120_000);
    }
}
