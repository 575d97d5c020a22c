//! Quorum collection and the submission commit point

use async_trait::async_trait;
use parking_lot::Mutex;
use primitive_types::U256;
use std::sync::{Arc, OnceLock};

use oracle_consensus::rpc::RpcResult;
use oracle_consensus::strategy::{DaoStrategy, OracleStrategy};
use oracle_consensus::{
    ChainRpc, ContractConfig, ContractOperation, ContractState, ContractStrategy, MemoryLedger,
    NodeContext, OracleState, Runner, RunnerState, SendStatus, SignatureOutcome,
    SignedTransaction, TransactionKind, TransactionStatus,
};
use oracle_core::time::MINUTE_MS;
use oracle_core::{Asset, ClusterMembership, ContractId, ContractKind, TxHash};
use oracle_crypto::NodeKeyPair;
use oracle_network::{InMemoryHub, RawVolumeSample};
use oracle_trades::AssetsMap;

const PASSPHRASE: &str = "integration";
const ACCOUNT: &str = "GCLUSTER";

/// Ledger wrapper recording what the runner looked like at submit time
struct Inspecting {
    ledger: Arc<MemoryLedger>,
    runner: OnceLock<Arc<Runner>>,
    pending_at_send: Mutex<Vec<Option<TxHash>>>,
}

#[async_trait]
impl ChainRpc for Inspecting {
    async fn account_sequence(&self, account: &str) -> RpcResult<u64> {
        self.ledger.account_sequence(account).await
    }

    async fn contract_state(&self, contract: &ContractId) -> RpcResult<ContractState> {
        self.ledger.contract_state(contract).await
    }

    async fn get_transaction(&self, hash: &TxHash) -> RpcResult<TransactionStatus> {
        self.ledger.get_transaction(hash).await
    }

    async fn send_transaction(&self, tx: &SignedTransaction) -> RpcResult<SendStatus> {
        let pending = self.runner.get().and_then(|r| r.pending_hash());
        self.pending_at_send.lock().push(pending);
        self.ledger.send_transaction(tx).await
    }
}

/// Node 0 of `keys` talking to the ledger through [`Inspecting`]
struct InspectedNode {
    ledger: Arc<MemoryLedger>,
    chain: Arc<Inspecting>,
    ctx: Arc<NodeContext>,
    _hub: InMemoryHub,
}

impl InspectedNode {
    fn new(keys: &[NodeKeyPair]) -> Self {
        let membership = ClusterMembership::new(keys.iter().map(|k| k.node_id())).unwrap();
        assert_eq!(membership.quorum(), 4);

        let ledger = Arc::new(MemoryLedger::new(PASSPHRASE, membership.clone()));
        let chain = Arc::new(Inspecting {
            ledger: ledger.clone(),
            runner: OnceLock::new(),
            pending_at_send: Mutex::new(Vec::new()),
        });

        let hub = InMemoryHub::new();
        let (messenger, _inbox) = hub.join(keys[0].node_id());
        let local = NodeKeyPair::from_secret_hex(&keys[0].secret_hex()).unwrap();
        let ctx = Arc::new(
            NodeContext::new(local, membership, chain.clone(), Arc::new(messenger))
                .with_network(PASSPHRASE, ACCOUNT),
        );
        Self {
            ledger,
            chain,
            ctx,
            _hub: hub,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_buffered_signatures_complete_quorum_on_build() {
    let keys: Vec<NodeKeyPair> = (0..7).map(|_| NodeKeyPair::generate()).collect();
    let node = InspectedNode::new(&keys);
    let (ledger, chain, ctx) = (node.ledger, node.chain, node.ctx);

    let config = ContractConfig::new("CDAO", ContractKind::Dao);
    let strategy = Arc::new(DaoStrategy::new(config));
    let runner = Arc::new(Runner::new(ctx.clone(), strategy.clone()));
    assert!(chain.runner.set(runner.clone()).is_ok());

    // peers built the same transaction first
    let tx = strategy
        .build_candidate(&ctx, MINUTE_MS)
        .await
        .unwrap()
        .unwrap()
        .tx
        .unwrap();
    let hash = tx.hash(PASSPHRASE).unwrap();
    for key in &keys[1..4] {
        assert_eq!(
            runner.add_signature(hash, key.sign(&hash)).await,
            SignatureOutcome::Buffered
        );
    }
    assert_eq!(ledger.send_calls(), 0);

    runner.process_tick(MINUTE_MS).await.unwrap();

    assert_eq!(ledger.send_calls(), 1);
    assert_eq!(*chain.pending_at_send.lock(), vec![None]);
    assert_eq!(
        ledger.applied(),
        vec![(ContractId::new("CDAO"), TransactionKind::DaoInit)]
    );
    assert_eq!(runner.state(), RunnerState::Idle);
    assert!(ctx.signatures.is_empty());

    // stragglers for the submitted hash never trigger a second send
    for key in &keys[4..] {
        runner.add_signature(hash, key.sign(&hash)).await;
    }
    assert_eq!(ledger.send_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_buffered_signatures_complete_price_update_on_build() {
    let keys: Vec<NodeKeyPair> = (0..7).map(|_| NodeKeyPair::generate()).collect();
    let node = InspectedNode::new(&keys);
    let (ledger, chain, ctx) = (node.ledger, node.chain, node.ctx);

    let assets = vec![Asset::new("BTC"), Asset::new("ETH")];
    ledger.set_contract(
        ContractId::new("CORACLE"),
        ContractState::Oracle(OracleState {
            base_asset: Asset::new("USD"),
            decimals: 2,
            timeframe_ms: 2 * MINUTE_MS,
            period_ms: 10 * MINUTE_MS,
            assets: assets.clone(),
            last_timestamp: 0,
            prices: vec![U256::zero(), U256::zero()],
        }),
    );
    let config = ContractConfig {
        timeframe_ms: 2 * MINUTE_MS,
        decimals: 2,
        period_ms: 10 * MINUTE_MS,
        data_source: Some("exchanges".into()),
        base_asset: Some(Asset::new("USD")),
        assets: assets.clone(),
        ..ContractConfig::new("CORACLE", ContractKind::Oracle)
    };
    let strategy = Arc::new(OracleStrategy::new(config).unwrap());
    let runner = Arc::new(Runner::new(ctx.clone(), strategy.clone()));
    assert!(chain.runner.set(runner.clone()).is_ok());

    // a quorum of nodes reported the same BTC trades for the frame [2m, 4m)
    let trades_key = strategy.trades_key().clone();
    let map: AssetsMap = assets.into_iter().collect();
    for key in &keys[..4] {
        for minute in [2 * MINUTE_MS, 3 * MINUTE_MS] {
            ctx.trades
                .push(
                    key.node_id(),
                    trades_key.clone(),
                    map.clone(),
                    minute,
                    &[
                        vec![
                            RawVolumeSample::new("a", "1", "100"),
                            RawVolumeSample::new("b", "1", "102"),
                        ],
                        vec![],
                    ],
                )
                .unwrap();
        }
    }

    // peers built the same update first
    let timestamp = 4 * MINUTE_MS + 30_000;
    let tx = strategy
        .build_candidate(&ctx, timestamp)
        .await
        .unwrap()
        .unwrap()
        .tx
        .unwrap();
    assert_eq!(
        tx.operation,
        ContractOperation::PriceUpdate {
            timestamp: 4 * MINUTE_MS,
            prices: vec![U256::from(10_100), U256::zero()],
        }
    );
    let hash = tx.hash(PASSPHRASE).unwrap();
    for key in &keys[1..4] {
        assert_eq!(
            runner.add_signature(hash, key.sign(&hash)).await,
            SignatureOutcome::Buffered
        );
    }
    assert_eq!(ledger.send_calls(), 0);

    runner.process_tick(timestamp).await.unwrap();

    assert_eq!(ledger.send_calls(), 1);
    assert_eq!(*chain.pending_at_send.lock(), vec![None]);
    assert_eq!(
        ledger.applied(),
        vec![(ContractId::new("CORACLE"), TransactionKind::PriceUpdate)]
    );
    assert_eq!(runner.state(), RunnerState::Idle);
    assert!(ctx.signatures.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_below_quorum_waits() {
    let keys: Vec<NodeKeyPair> = (0..7).map(|_| NodeKeyPair::generate()).collect();
    let membership = ClusterMembership::new(keys.iter().map(|k| k.node_id())).unwrap();
    let ledger = Arc::new(MemoryLedger::new(PASSPHRASE, membership.clone()));

    let hub = InMemoryHub::new();
    let (messenger, _inbox) = hub.join(keys[0].node_id());
    let local = NodeKeyPair::from_secret_hex(&keys[0].secret_hex()).unwrap();
    let ctx = Arc::new(
        NodeContext::new(local, membership, ledger.clone(), Arc::new(messenger))
            .with_network(PASSPHRASE, ACCOUNT),
    );
    let strategy = Arc::new(DaoStrategy::new(ContractConfig::new("CDAO", ContractKind::Dao)));
    let runner = Runner::new(ctx, strategy);

    runner.process_tick(MINUTE_MS).await.unwrap();
    let hash = runner.pending_hash().unwrap();
    for key in &keys[1..3] {
        assert_eq!(
            runner.add_signature(hash, key.sign(&hash)).await,
            SignatureOutcome::Merged
        );
    }
    assert_eq!(runner.pending_signature_count(), 3);
    assert_eq!(runner.state(), RunnerState::AwaitingQuorum);
    assert_eq!(ledger.send_calls(), 0);

    runner.add_signature(hash, keys[3].sign(&hash)).await;
    assert_eq!(ledger.send_calls(), 1);
    assert_eq!(runner.state(), RunnerState::Idle);
}
