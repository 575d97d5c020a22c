//! Statistics collaborator

use hashbrown::HashMap;
use parking_lot::RwLock;

use oracle_core::ContractId;

use crate::rpc::ContractState;
use crate::transaction::TransactionKind;

/// Receiver of informational progress updates
///
/// Nothing in the consensus path reads these values back.
pub trait Statistics: Send + Sync {
    fn set_last_processed(&self, contract: &ContractId, timestamp: u64);

    fn inc_submitted(&self, contract: &ContractId, kind: TransactionKind);

    fn inc_failed(&self, contract: &ContractId, kind: TransactionKind);

    fn set_contract_state(&self, contract: &ContractId, state: &ContractState);

    fn set_pending_signatures(&self, count: usize);
}

/// Per-contract counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContractStats {
    pub last_processed: u64,
    pub submitted: u64,
    pub failed: u64,
    pub last_state: Option<ContractState>,
}

/// In-memory statistics
#[derive(Default)]
pub struct MemoryStatistics {
    contracts: RwLock<HashMap<ContractId, ContractStats>>,
    pending_signatures: RwLock<usize>,
}

impl MemoryStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contract(&self, contract: &ContractId) -> ContractStats {
        self.contracts
            .read()
            .get(contract)
            .cloned()
            .unwrap_or_default()
    }

    pub fn pending_signatures(&self) -> usize {
        *self.pending_signatures.read()
    }

    fn update(&self, contract: &ContractId, f: impl FnOnce(&mut ContractStats)) {
        f(self.contracts.write().entry(contract.clone()).or_default());
    }
}

impl Statistics for MemoryStatistics {
    fn set_last_processed(&self, contract: &ContractId, timestamp: u64) {
        self.update(contract, |s| s.last_processed = timestamp);
    }

    fn inc_submitted(&self, contract: &ContractId, _kind: TransactionKind) {
        self.update(contract, |s| s.submitted += 1);
    }

    fn inc_failed(&self, contract: &ContractId, _kind: TransactionKind) {
        self.update(contract, |s| s.failed += 1);
    }

    fn set_contract_state(&self, contract: &ContractId, state: &ContractState) {
        self.update(contract, |s| s.last_state = Some(state.clone()));
    }

    fn set_pending_signatures(&self, count: usize) {
        *self.pending_signatures.write() = count;
    }
}
