//! DAO treasury contract: periodic unlocks

use async_trait::async_trait;

use oracle_core::time::align_to;
use oracle_core::ContractKind;

use super::{candidate, read_state, Candidate, ContractStrategy, SYSTEM_TIMEFRAME_MS};
use crate::config::ContractConfig;
use crate::context::NodeContext;
use crate::error::{ConsensusError, Result};
use crate::rpc::ContractState;
use crate::transaction::ContractOperation;

pub struct DaoStrategy {
    config: ContractConfig,
}

impl DaoStrategy {
    pub fn new(config: ContractConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ContractStrategy for DaoStrategy {
    fn kind(&self) -> ContractKind {
        ContractKind::Dao
    }

    fn config(&self) -> &ContractConfig {
        &self.config
    }

    fn timeframe(&self) -> u64 {
        SYSTEM_TIMEFRAME_MS
    }

    async fn build_candidate(&self, ctx: &NodeContext, timestamp: u64) -> Result<Option<Candidate>> {
        match read_state(ctx, &self.config.id).await? {
            ContractState::Uninitialized => {
                let operation = ContractOperation::DaoInit {
                    unlock_period_ms: self.config.unlock_period_ms,
                };
                candidate(ctx, &self.config, operation, timestamp).await
            }
            ContractState::Dao {
                unlock_period_ms,
                last_unlock,
            } => {
                if unlock_period_ms == 0 {
                    return Err(ConsensusError::UnexpectedState {
                        contract: self.config.id.clone(),
                        expected: "dao with a non-zero unlock period",
                    });
                }
                let unlock_at = align_to(timestamp, unlock_period_ms);
                if unlock_at <= last_unlock {
                    return Ok(None);
                }
                let operation = ContractOperation::DaoUnlock {
                    timestamp: unlock_at,
                };
                candidate(ctx, &self.config, operation, timestamp).await
            }
            _ => Err(ConsensusError::UnexpectedState {
                contract: self.config.id.clone(),
                expected: "dao",
            }),
        }
    }
}
