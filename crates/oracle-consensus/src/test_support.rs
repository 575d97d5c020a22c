//! Fixtures shared by unit tests

use primitive_types::U256;
use std::sync::Arc;

use oracle_core::{ClusterMembership, ContractId};
use oracle_crypto::NodeKeyPair;
use oracle_network::{InMemoryHub, Inbox};

use crate::context::NodeContext;
use crate::ledger::MemoryLedger;
use crate::rpc::ChainRpc;
use crate::stats::MemoryStatistics;
use crate::submission::SubmissionConfig;
use crate::transaction::{ContractOperation, SignedTransaction, UnsignedTransaction};

pub const PASSPHRASE: &str = "testnet";
pub const ACCOUNT: &str = "GCLUSTER";

pub fn keypairs(n: usize) -> Vec<NodeKeyPair> {
    (0..n).map(|_| NodeKeyPair::generate()).collect()
}

pub fn membership_of(keys: &[NodeKeyPair]) -> ClusterMembership {
    ClusterMembership::new(keys.iter().map(|k| k.node_id())).unwrap()
}

pub fn price_update_tx(timestamp: u64) -> UnsignedTransaction {
    UnsignedTransaction {
        source_account: ACCOUNT.into(),
        sequence: 7,
        contract_id: ContractId::new("CORACLE"),
        operation: ContractOperation::PriceUpdate {
            timestamp,
            prices: vec![U256::from(1_000), U256::from(2_000)],
        },
        fee: 100,
        min_time: 0,
        max_time: timestamp + 120_000,
    }
}

pub fn signed_price_update(max_time: u64) -> SignedTransaction {
    let tx = UnsignedTransaction {
        max_time,
        ..price_update_tx(60_000)
    };
    SignedTransaction {
        hash: tx.hash(PASSPHRASE).unwrap(),
        tx,
        signatures: Vec::new(),
    }
}

/// Node 0's context in an `n` member cluster
pub struct Fixture {
    pub ctx: Arc<NodeContext>,
    pub keys: Vec<NodeKeyPair>,
    pub ledger: Arc<MemoryLedger>,
    pub stats: Arc<MemoryStatistics>,
    pub hub: InMemoryHub,
    /// Inbound channels by key index (index 0 is the local node)
    pub inboxes: Vec<Inbox>,
}

pub fn fixture(n: usize) -> Fixture {
    fixture_with(n, |ledger| ledger as Arc<dyn ChainRpc>, SubmissionConfig::default())
}

/// Fixture whose node reaches the ledger through `chain`
pub fn fixture_with(
    n: usize,
    chain: impl FnOnce(Arc<MemoryLedger>) -> Arc<dyn ChainRpc>,
    submission: SubmissionConfig,
) -> Fixture {
    let keys = keypairs(n);
    let membership = membership_of(&keys);
    let ledger = Arc::new(MemoryLedger::new(PASSPHRASE, membership.clone()));
    let stats = Arc::new(MemoryStatistics::new());

    let hub = InMemoryHub::new();
    let mut inboxes = Vec::new();
    let mut messengers = Vec::new();
    for key in &keys {
        let (messenger, inbox) = hub.join(key.node_id());
        messengers.push(messenger);
        inboxes.push(inbox);
    }

    let local = NodeKeyPair::from_secret_hex(&keys[0].secret_hex()).unwrap();
    let ctx = NodeContext::new(
        local,
        membership,
        chain(ledger.clone()),
        Arc::new(messengers.swap_remove(0)),
    )
    .with_network(PASSPHRASE, ACCOUNT)
    .with_stats(stats.clone())
    .with_submission(submission);

    Fixture {
        ctx: Arc::new(ctx),
        keys,
        ledger,
        stats,
        hub,
        inboxes,
    }
}

pub fn test_context(n: usize) -> (Arc<NodeContext>, Vec<NodeKeyPair>, Arc<MemoryLedger>) {
    let f = fixture(n);
    (f.ctx, f.keys, f.ledger)
}
