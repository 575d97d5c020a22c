//! Prometheus-backed runner statistics

use prometheus::{IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

use oracle_consensus::{ContractState, Statistics, TransactionKind};
use oracle_core::ContractId;

/// Statistics collector registered in its own Prometheus registry
pub struct NodeStatistics {
    registry: Registry,
    submitted: IntCounterVec,
    failed: IntCounterVec,
    last_processed: IntGaugeVec,
    contract_timestamp: IntGaugeVec,
    contract_initialized: IntGaugeVec,
    pending_signatures: IntGauge,
    connected_peers: IntGauge,
}

impl NodeStatistics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let submitted = IntCounterVec::new(
            Opts::new(
                "oracle_submitted_transactions_total",
                "Transactions finalized on chain",
            ),
            &["contract", "kind"],
        )?;
        let failed = IntCounterVec::new(
            Opts::new(
                "oracle_failed_submissions_total",
                "Transactions that could not be submitted",
            ),
            &["contract", "kind"],
        )?;
        let last_processed = IntGaugeVec::new(
            Opts::new(
                "oracle_last_processed_timestamp",
                "Last tick timestamp processed by a runner (ms)",
            ),
            &["contract"],
        )?;
        let contract_timestamp = IntGaugeVec::new(
            Opts::new(
                "oracle_contract_last_timestamp",
                "Last timestamp recorded in contract state (ms)",
            ),
            &["contract"],
        )?;
        let contract_initialized = IntGaugeVec::new(
            Opts::new(
                "oracle_contract_initialized",
                "Whether the contract was initialized on chain",
            ),
            &["contract"],
        )?;
        let pending_signatures = IntGauge::new(
            "oracle_pending_signatures",
            "Signatures buffered ahead of their transaction",
        )?;
        let connected_peers = IntGauge::new("oracle_connected_peers", "Reachable cluster peers")?;

        registry.register(Box::new(submitted.clone()))?;
        registry.register(Box::new(failed.clone()))?;
        registry.register(Box::new(last_processed.clone()))?;
        registry.register(Box::new(contract_timestamp.clone()))?;
        registry.register(Box::new(contract_initialized.clone()))?;
        registry.register(Box::new(pending_signatures.clone()))?;
        registry.register(Box::new(connected_peers.clone()))?;

        Ok(Self {
            registry,
            submitted,
            failed,
            last_processed,
            contract_timestamp,
            contract_initialized,
            pending_signatures,
            connected_peers,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn set_connected_peers(&self, count: usize) {
        self.connected_peers.set(count as i64);
    }
}

impl Statistics for NodeStatistics {
    fn set_last_processed(&self, contract: &ContractId, timestamp: u64) {
        self.last_processed
            .with_label_values(&[contract.as_str()])
            .set(timestamp as i64);
    }

    fn inc_submitted(&self, contract: &ContractId, kind: TransactionKind) {
        self.submitted
            .with_label_values(&[contract.as_str(), kind.as_str()])
            .inc();
    }

    fn inc_failed(&self, contract: &ContractId, kind: TransactionKind) {
        self.failed
            .with_label_values(&[contract.as_str(), kind.as_str()])
            .inc();
    }

    fn set_contract_state(&self, contract: &ContractId, state: &ContractState) {
        let initialized = !matches!(state, ContractState::Uninitialized);
        self.contract_initialized
            .with_label_values(&[contract.as_str()])
            .set(initialized as i64);
        if let Some(timestamp) = state.last_timestamp() {
            self.contract_timestamp
                .with_label_values(&[contract.as_str()])
                .set(timestamp as i64);
        }
    }

    fn set_pending_signatures(&self, count: usize) {
        self.pending_signatures.set(count as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_by_contract_and_kind() {
        let stats = NodeStatistics::new().unwrap();
        let contract = ContractId::new("CORACLE");

        stats.inc_submitted(&contract, TransactionKind::PriceUpdate);
        stats.inc_submitted(&contract, TransactionKind::PriceUpdate);
        stats.inc_failed(&contract, TransactionKind::Init);
        stats.set_last_processed(&contract, 120_000);
        stats.set_pending_signatures(3);

        assert_eq!(
            stats
                .submitted
                .with_label_values(&["CORACLE", "price_update"])
                .get(),
            2
        );
        assert_eq!(stats.failed.with_label_values(&["CORACLE", "init"]).get(), 1);
        assert_eq!(
            stats.last_processed.with_label_values(&["CORACLE"]).get(),
            120_000
        );
        assert_eq!(stats.pending_signatures.get(), 3);
    }

    #[test]
    fn test_contract_state_gauges() {
        let stats = NodeStatistics::new().unwrap();
        let contract = ContractId::new("CDAO");

        stats.set_contract_state(&contract, &ContractState::Uninitialized);
        assert_eq!(
            stats.contract_initialized.with_label_values(&["CDAO"]).get(),
            0
        );

        stats.set_contract_state(
            &contract,
            &ContractState::Dao {
                unlock_period_ms: 60_000,
                last_unlock: 600_000,
            },
        );
        assert_eq!(
            stats.contract_initialized.with_label_values(&["CDAO"]).get(),
            1
        );
        assert_eq!(
            stats.contract_timestamp.with_label_values(&["CDAO"]).get(),
            600_000
        );
    }

    #[test]
    fn test_registry_exports_all_families() {
        let stats = NodeStatistics::new().unwrap();
        stats.set_connected_peers(2);
        stats.inc_submitted(&ContractId::new("C"), TransactionKind::DaoInit);
        let names: Vec<String> = stats
            .registry()
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"oracle_connected_peers".to_string()));
        assert!(names.contains(&"oracle_submitted_transactions_total".to_string()));
    }
}
