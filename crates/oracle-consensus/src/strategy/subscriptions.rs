//! Subscriptions contract: heartbeat triggers and daily charges

use async_trait::async_trait;

use oracle_core::time::{align_to, DAY_MS};
use oracle_core::ContractKind;

use super::{candidate, read_state, Candidate, ContractStrategy, SYSTEM_TIMEFRAME_MS};
use crate::config::ContractConfig;
use crate::context::NodeContext;
use crate::error::{ConsensusError, Result};
use crate::rpc::ContractState;
use crate::transaction::ContractOperation;

pub struct SubscriptionsStrategy {
    config: ContractConfig,
}

impl SubscriptionsStrategy {
    pub fn new(config: ContractConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ContractStrategy for SubscriptionsStrategy {
    fn kind(&self) -> ContractKind {
        ContractKind::Subscriptions
    }

    fn config(&self) -> &ContractConfig {
        &self.config
    }

    fn timeframe(&self) -> u64 {
        SYSTEM_TIMEFRAME_MS
    }

    async fn build_candidate(&self, ctx: &NodeContext, timestamp: u64) -> Result<Option<Candidate>> {
        let (last_charge, subscriptions) = match read_state(ctx, &self.config.id).await? {
            ContractState::Uninitialized => {
                let operation = ContractOperation::SubscriptionsInit {
                    base_fee: self.config.subscription_fee,
                };
                return candidate(ctx, &self.config, operation, timestamp).await;
            }
            ContractState::Subscriptions {
                last_charge,
                subscriptions,
            } => (last_charge, subscriptions),
            _ => {
                return Err(ConsensusError::UnexpectedState {
                    contract: self.config.id.clone(),
                    expected: "subscriptions",
                })
            }
        };

        // charges run once per day, ahead of triggers
        let charge_day = align_to(timestamp, DAY_MS);
        let active: Vec<u64> = subscriptions
            .iter()
            .filter(|s| s.active)
            .map(|s| s.id)
            .collect();
        if charge_day > last_charge && !active.is_empty() {
            let operation = ContractOperation::SubscriptionCharge {
                timestamp: charge_day,
                ids: active,
            };
            return candidate(ctx, &self.config, operation, timestamp).await;
        }

        let due: Vec<u64> = subscriptions
            .iter()
            .filter(|s| s.is_due(timestamp))
            .map(|s| s.id)
            .collect();
        if due.is_empty() {
            return Ok(None);
        }
        let operation = ContractOperation::SubscriptionTrigger {
            timestamp,
            ids: due,
        };
        candidate(ctx, &self.config, operation, timestamp).await
    }
}
