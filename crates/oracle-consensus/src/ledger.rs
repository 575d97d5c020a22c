//! # In-Memory Ledger
//!
//! `ChainRpc` implementation holding contract state in process. It enforces
//! what a real chain enforces for cluster transactions: payload hash,
//! a quorum of valid member signatures, account sequence and max time.
//! Finalization is immediate.

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::Mutex;
use primitive_types::U256;
use std::collections::{HashSet, VecDeque};

use oracle_core::{ClusterMembership, ContractId, TxHash};

use crate::rpc::{
    ChainRpc, ContractState, OracleState, RejectReason, RpcResult, SendStatus, TransactionStatus,
};
use crate::transaction::{ContractOperation, SignedTransaction, TransactionKind};

struct LedgerState {
    signers: ClusterMembership,
    now: u64,
    sequences: HashMap<String, u64>,
    contracts: HashMap<ContractId, ContractState>,
    transactions: HashMap<TxHash, TransactionStatus>,
    applied: Vec<(ContractId, TransactionKind)>,
    send_calls: usize,
    scripted: VecDeque<SendStatus>,
}

/// Shared in-process chain
pub struct MemoryLedger {
    network_passphrase: String,
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    /// Ledger accepting transactions signed by a quorum of `signers`
    pub fn new(network_passphrase: impl Into<String>, signers: ClusterMembership) -> Self {
        Self {
            network_passphrase: network_passphrase.into(),
            state: Mutex::new(LedgerState {
                signers,
                now: 0,
                sequences: HashMap::new(),
                contracts: HashMap::new(),
                transactions: HashMap::new(),
                applied: Vec::new(),
                send_calls: 0,
                scripted: VecDeque::new(),
            }),
        }
    }

    /// Ledger clock used for max-time checks (0 disables them)
    pub fn set_time(&self, now: u64) {
        self.state.lock().now = now;
    }

    pub fn set_sequence(&self, account: &str, sequence: u64) {
        self.state
            .lock()
            .sequences
            .insert(account.to_string(), sequence);
    }

    pub fn sequence(&self, account: &str) -> u64 {
        self.state
            .lock()
            .sequences
            .get(account)
            .copied()
            .unwrap_or(0)
    }

    pub fn set_contract(&self, contract: ContractId, state: ContractState) {
        self.state.lock().contracts.insert(contract, state);
    }

    pub fn contract(&self, contract: &ContractId) -> ContractState {
        self.state
            .lock()
            .contracts
            .get(contract)
            .cloned()
            .unwrap_or(ContractState::Uninitialized)
    }

    /// Respond to the next submit with `status` instead of processing it
    pub fn script_send(&self, status: SendStatus) {
        self.state.lock().scripted.push_back(status);
    }

    /// Number of `send_transaction` calls received
    pub fn send_calls(&self) -> usize {
        self.state.lock().send_calls
    }

    /// Successfully applied transactions, in order
    pub fn applied(&self) -> Vec<(ContractId, TransactionKind)> {
        self.state.lock().applied.clone()
    }

    pub fn status(&self, hash: &TxHash) -> TransactionStatus {
        self.state
            .lock()
            .transactions
            .get(hash)
            .cloned()
            .unwrap_or(TransactionStatus::NotFound)
    }

    fn check_signatures(signers: &ClusterMembership, tx: &SignedTransaction) -> bool {
        let mut valid = HashSet::new();
        for signature in &tx.signatures {
            if signers.is_member(&signature.signer) && signature.verify(&tx.hash).is_ok() {
                valid.insert(signature.signer);
            }
        }
        valid.len() >= signers.quorum()
    }
}

fn apply(
    state: &mut LedgerState,
    contract: &ContractId,
    operation: &ContractOperation,
) -> Result<(), String> {
    let current = state
        .contracts
        .get(contract)
        .cloned()
        .unwrap_or(ContractState::Uninitialized);

    let next = match (current, operation) {
        (
            ContractState::Uninitialized,
            ContractOperation::OracleInit {
                base_asset,
                decimals,
                timeframe_ms,
                period_ms,
                assets,
            },
        ) => ContractState::Oracle(OracleState {
            base_asset: base_asset.clone(),
            decimals: *decimals,
            timeframe_ms: *timeframe_ms,
            period_ms: *period_ms,
            assets: assets.clone(),
            last_timestamp: 0,
            prices: vec![U256::zero(); assets.len()],
        }),
        (ContractState::Oracle(mut oracle), ContractOperation::AssetsUpdate { assets }) => {
            for asset in assets {
                if !oracle.assets.contains(asset) {
                    oracle.assets.push(asset.clone());
                    oracle.prices.push(U256::zero());
                }
            }
            ContractState::Oracle(oracle)
        }
        (ContractState::Oracle(mut oracle), ContractOperation::PeriodUpdate { period_ms }) => {
            oracle.period_ms = *period_ms;
            ContractState::Oracle(oracle)
        }
        (ContractState::Oracle(mut oracle), ContractOperation::PriceUpdate { timestamp, prices }) => {
            if *timestamp <= oracle.last_timestamp {
                return Err(format!("stale price timestamp {}", timestamp));
            }
            if prices.len() != oracle.assets.len() {
                return Err(format!(
                    "{} prices for {} assets",
                    prices.len(),
                    oracle.assets.len()
                ));
            }
            oracle.last_timestamp = *timestamp;
            oracle.prices = prices.clone();
            ContractState::Oracle(oracle)
        }
        (ContractState::Uninitialized, ContractOperation::ClusterInit { nodes })
        | (ContractState::Cluster { .. }, ContractOperation::NodesUpdate { nodes }) => {
            state.signers =
                ClusterMembership::new(nodes.iter().copied()).map_err(|e| e.to_string())?;
            ContractState::Cluster {
                nodes: state.signers.members().to_vec(),
            }
        }
        (ContractState::Uninitialized, ContractOperation::SubscriptionsInit { .. }) => {
            ContractState::Subscriptions {
                last_charge: 0,
                subscriptions: Vec::new(),
            }
        }
        (
            ContractState::Subscriptions {
                last_charge,
                mut subscriptions,
            },
            ContractOperation::SubscriptionTrigger { timestamp, ids },
        ) => {
            for sub in subscriptions.iter_mut().filter(|s| ids.contains(&s.id)) {
                sub.last_triggered = *timestamp;
            }
            ContractState::Subscriptions {
                last_charge,
                subscriptions,
            }
        }
        (
            ContractState::Subscriptions { subscriptions, .. },
            ContractOperation::SubscriptionCharge { timestamp, .. },
        ) => ContractState::Subscriptions {
            last_charge: *timestamp,
            subscriptions,
        },
        (ContractState::Uninitialized, ContractOperation::DaoInit { unlock_period_ms }) => {
            ContractState::Dao {
                unlock_period_ms: *unlock_period_ms,
                last_unlock: 0,
            }
        }
        (
            ContractState::Dao {
                unlock_period_ms, ..
            },
            ContractOperation::DaoUnlock { timestamp },
        ) => ContractState::Dao {
            unlock_period_ms,
            last_unlock: *timestamp,
        },
        (current, operation) => {
            return Err(format!(
                "{} not applicable to {} contract",
                operation.kind(),
                current.name()
            ))
        }
    };

    state.contracts.insert(contract.clone(), next);
    Ok(())
}

#[async_trait]
impl ChainRpc for MemoryLedger {
    async fn account_sequence(&self, account: &str) -> RpcResult<u64> {
        Ok(self.sequence(account))
    }

    async fn contract_state(&self, contract: &ContractId) -> RpcResult<ContractState> {
        Ok(self.contract(contract))
    }

    async fn get_transaction(&self, hash: &TxHash) -> RpcResult<TransactionStatus> {
        Ok(self.status(hash))
    }

    async fn send_transaction(&self, tx: &SignedTransaction) -> RpcResult<SendStatus> {
        let mut state = self.state.lock();
        state.send_calls += 1;

        if let Some(status) = state.scripted.pop_front() {
            return Ok(status);
        }
        if state.transactions.contains_key(&tx.hash) {
            return Ok(SendStatus::Duplicate);
        }
        match tx.tx.hash(&self.network_passphrase) {
            Ok(hash) if hash == tx.hash => {}
            _ => return Ok(SendStatus::Rejected(RejectReason::Other("hash mismatch".into()))),
        }
        if !Self::check_signatures(&state.signers, tx) {
            return Ok(SendStatus::Rejected(RejectReason::InsufficientSignatures));
        }

        let current = state
            .sequences
            .get(&tx.tx.source_account)
            .copied()
            .unwrap_or(0);
        if tx.tx.sequence != current + 1 {
            return Ok(SendStatus::Rejected(RejectReason::BadSequence));
        }
        if state.now > 0 && state.now > tx.tx.max_time {
            return Ok(SendStatus::Rejected(RejectReason::TooLate));
        }

        state
            .sequences
            .insert(tx.tx.source_account.clone(), current + 1);
        let status = match apply(&mut state, &tx.tx.contract_id, &tx.tx.operation) {
            Ok(()) => {
                state
                    .applied
                    .push((tx.tx.contract_id.clone(), tx.tx.kind()));
                TransactionStatus::Success
            }
            Err(reason) => {
                tracing::debug!("Transaction {} failed: {}", tx.hash, reason);
                TransactionStatus::Failed(reason)
            }
        };
        state.transactions.insert(tx.hash, status);
        Ok(SendStatus::Pending)
    }
}
