//! Several nodes sharing one in-memory chain and hub

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use oracle_consensus::{
    ClusterUpdate, ContractConfig, ContractState, MemoryLedger, NodeContext, RunnerManager,
    RunnerState, TransactionKind,
};
use oracle_core::time::MINUTE_MS;
use oracle_core::{ClusterMembership, ContractId, ContractKind, NodeId};
use oracle_crypto::NodeKeyPair;
use oracle_network::{dispatch, InMemoryHub, Inbox};

const PASSPHRASE: &str = "integration";
const ACCOUNT: &str = "GCLUSTER";

struct TestNode {
    ctx: Arc<NodeContext>,
    manager: Arc<RunnerManager>,
    _pump: JoinHandle<()>,
}

fn spawn_pump(manager: Arc<RunnerManager>, mut inbox: Inbox) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(envelope) = inbox.recv().await {
            let manager = manager.clone();
            tokio::spawn(async move { dispatch(manager.as_ref(), envelope).await });
        }
    })
}

fn cluster(n: usize, contracts: &[ContractConfig]) -> (Vec<TestNode>, Arc<MemoryLedger>, Vec<NodeId>) {
    let keys: Vec<NodeKeyPair> = (0..n).map(|_| NodeKeyPair::generate()).collect();
    let ids: Vec<NodeId> = keys.iter().map(|k| k.node_id()).collect();
    let membership = ClusterMembership::new(ids.clone()).unwrap();
    let ledger = Arc::new(MemoryLedger::new(PASSPHRASE, membership.clone()));
    let hub = InMemoryHub::new();

    let nodes = keys
        .into_iter()
        .map(|key| {
            let (messenger, inbox) = hub.join(key.node_id());
            let ctx = Arc::new(
                NodeContext::new(key, membership.clone(), ledger.clone(), Arc::new(messenger))
                    .with_network(PASSPHRASE, ACCOUNT),
            );
            let manager = Arc::new(RunnerManager::new(ctx.clone()));
            manager.apply_contracts(contracts).unwrap();
            let pump = spawn_pump(manager.clone(), inbox);
            TestNode {
                ctx,
                manager,
                _pump: pump,
            }
        })
        .collect();
    (nodes, ledger, ids)
}

async fn settle() {
    tokio::time::sleep(Duration::from_secs(30)).await;
}

#[tokio::test(start_paused = true)]
async fn test_three_nodes_submit_once() {
    let dao = ContractConfig::new("CDAO", ContractKind::Dao);
    let (nodes, ledger, _) = cluster(3, &[dao]);
    let id = ContractId::new("CDAO");

    for node in &nodes {
        node.manager
            .get(&id)
            .unwrap()
            .process_tick(MINUTE_MS)
            .await
            .ok();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    settle().await;

    assert_eq!(ledger.applied(), vec![(id.clone(), TransactionKind::DaoInit)]);
    for node in &nodes {
        assert_eq!(node.manager.get(&id).unwrap().state(), RunnerState::Idle);
    }
}

#[tokio::test(start_paused = true)]
async fn test_membership_change_goes_on_chain() {
    let config = ContractConfig::new("CCLUSTER", ContractKind::Cluster);
    let (nodes, ledger, ids) = cluster(3, &[config]);
    let id = ContractId::new("CCLUSTER");
    let mut current = ids.clone();
    current.sort();
    ledger.set_contract(id.clone(), ContractState::Cluster { nodes: current });

    let update = ClusterUpdate::new(ids[..2].to_vec(), MINUTE_MS);
    for node in &nodes {
        node.ctx.schedule_cluster_update(update.clone());
    }

    for node in &nodes[..2] {
        node.manager
            .get(&id)
            .unwrap()
            .process_tick(MINUTE_MS)
            .await
            .ok();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    settle().await;

    assert_eq!(ledger.applied(), vec![(id.clone(), TransactionKind::NodesUpdate)]);
    assert_eq!(
        ledger.contract(&id),
        ContractState::Cluster {
            nodes: update.nodes.clone()
        }
    );
    for node in &nodes[..2] {
        assert_eq!(node.ctx.member_count(), 2);
        assert!(node.ctx.pending_cluster_update().is_none());
    }

    // the lagging node catches up locally without a transaction
    let lagging = &nodes[2];
    assert_eq!(lagging.ctx.member_count(), 3);
    lagging
        .manager
        .get(&id)
        .unwrap()
        .process_tick(2 * MINUTE_MS)
        .await
        .unwrap();
    assert_eq!(lagging.ctx.member_count(), 2);
    assert_eq!(ledger.applied().len(), 1);
}
