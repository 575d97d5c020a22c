//! Oracle node implementation
//!
//! Wires the consensus engine to its collaborators and drives the process
//! lifecycle: start runners, the trades refresher, the inbound message pump
//! and the metrics server, then wait for ctrl-c, SIGTERM or a fatal
//! consensus failure and stop everything.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use oracle_consensus::{ChainRpc, NodeContext, RunnerManager};
use oracle_core::{ContractKind, NodeId};
use oracle_network::{dispatch, Inbox, Messenger};
use oracle_trades::{MarketDataSource, Trades, TradesRefresher};

use crate::config::NodeConfig;
use crate::metrics::MetricsServer;
use crate::stats::NodeStatistics;

/// Interval of the connected peers gauge refresh
const PEER_GAUGE_INTERVAL: Duration = Duration::from_secs(15);

/// Node state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Built, not running yet
    Starting,
    /// Runners active
    Running,
    /// Shutting down
    Stopping,
    /// Everything stopped
    Stopped,
}

#[derive(Debug, PartialEq, Eq)]
enum ShutdownReason {
    Signal,
    Requested,
    Fatal,
}

/// Oracle cluster node
pub struct OracleNode {
    config: RwLock<NodeConfig>,
    ctx: Arc<NodeContext>,
    manager: Arc<RunnerManager>,
    refresher: Arc<TradesRefresher>,
    stats: Arc<NodeStatistics>,
    state: RwLock<NodeState>,
    stop_tx: watch::Sender<bool>,
}

impl OracleNode {
    /// Build a node from validated configuration and its collaborators
    pub fn new(
        config: NodeConfig,
        chain: Arc<dyn ChainRpc>,
        messenger: Arc<dyn Messenger>,
        sources: Vec<Arc<dyn MarketDataSource>>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let keypair = config.load_keypair()?;
        let membership = config.membership()?;
        let node_id = keypair.node_id();

        let stats = Arc::new(NodeStatistics::new()?);
        let trades = Arc::new(Trades::with_capacity(node_id, config.trades.cache_depth));

        let ctx = Arc::new(
            NodeContext::new(keypair, membership, chain, messenger.clone())
                .with_network(
                    config.node.network_passphrase.clone(),
                    config.node.source_account.clone(),
                )
                .with_trades(trades.clone())
                .with_stats(stats.clone())
                .with_submission(config.submission_config())
                .with_db_sync_delay(config.db_sync_delay())
                .with_tx_validity(config.tx_validity()),
        );

        let refresher = Arc::new(
            TradesRefresher::new(trades, messenger, sources).with_delay(config.refresh_delay()),
        );
        let manager = Arc::new(RunnerManager::new(ctx.clone()));
        let (stop_tx, _) = watch::channel(false);

        let node = Self {
            config: RwLock::new(config.clone()),
            ctx,
            manager,
            refresher,
            stats,
            state: RwLock::new(NodeState::Starting),
            stop_tx,
        };
        node.apply_config(config)?;
        Ok(node)
    }

    pub fn node_id(&self) -> NodeId {
        self.ctx.node_id()
    }

    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    pub fn context(&self) -> &Arc<NodeContext> {
        &self.ctx
    }

    pub fn manager(&self) -> &Arc<RunnerManager> {
        &self.manager
    }

    pub fn stats(&self) -> &Arc<NodeStatistics> {
        &self.stats
    }

    /// Apply an updated configuration
    ///
    /// Contracts are reconciled by id, a scheduled cluster update replaces
    /// the previous one and oracle trade keys are tracked by the refresher.
    /// Identity and cluster members are fixed for the node's lifetime.
    pub fn apply_config(&self, config: NodeConfig) -> anyhow::Result<()> {
        config.validate()?;
        self.manager.apply_contracts(&config.contracts)?;

        if let Some(update) = config.cluster_update()? {
            self.ctx.schedule_cluster_update(update);
        }

        for contract in config
            .contracts
            .iter()
            .filter(|c| c.kind == ContractKind::Oracle)
        {
            let (key, assets) = contract.trades_subscription()?;
            self.refresher.track(key, assets)?;
        }

        *self.config.write() = config;
        Ok(())
    }

    /// Ask a running node to stop
    pub fn shutdown(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Run until a shutdown signal; `inbox` carries envelopes from peers
    pub async fn run(&self, inbox: Inbox) -> anyhow::Result<()> {
        tracing::info!("Starting oracle node {}...", self.node_id());
        *self.state.write() = NodeState::Running;

        let (trades_enabled, metrics) = {
            let config = self.config.read();
            (config.trades.enabled, config.metrics.clone())
        };
        let stop_rx = self.stop_tx.subscribe();

        self.manager.start();

        let refresher_handle: Option<JoinHandle<()>> = if trades_enabled {
            let refresher = self.refresher.clone();
            let stop_rx = stop_rx.clone();
            Some(tokio::spawn(async move { refresher.run(stop_rx).await }))
        } else {
            tracing::info!("Trades refresher disabled");
            None
        };

        let metrics_handle = if metrics.enabled {
            let server = MetricsServer::new(metrics.address.clone(), self.stats.registry().clone());
            let stop_rx = stop_rx.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = server.run(stop_rx).await {
                    tracing::error!("Metrics server error: {}", e);
                }
            }))
        } else {
            None
        };

        let pump_handle = tokio::spawn(pump(
            self.manager.clone(),
            self.ctx.messenger.clone(),
            self.stats.clone(),
            inbox,
            stop_rx,
        ));

        self.print_startup_banner(metrics.enabled.then_some(metrics.address.as_str()));

        let reason = self.wait_for_shutdown().await;

        *self.state.write() = NodeState::Stopping;
        tracing::info!("Shutting down ({:?})...", reason);

        self.manager.stop_all();
        self.stop_tx.send_replace(true);

        for handle in [Some(pump_handle), refresher_handle, metrics_handle]
            .into_iter()
            .flatten()
        {
            let _ = handle.await;
        }

        *self.state.write() = NodeState::Stopped;
        tracing::info!("Node stopped");

        if reason == ShutdownReason::Fatal {
            anyhow::bail!("node stopped after a fatal consensus failure");
        }
        Ok(())
    }

    fn print_startup_banner(&self, metrics: Option<&str>) {
        let config = self.config.read();
        tracing::info!("Node: {} ({})", config.node.name, self.node_id());
        tracing::info!(
            "Cluster: {} members, quorum {}",
            self.ctx.member_count(),
            self.ctx.membership().quorum()
        );
        for id in self.manager.contract_ids() {
            if let Some(runner) = self.manager.get(&id) {
                tracing::info!("Contract {} ({})", id, runner.kind());
            }
        }
        if let Some(address) = metrics {
            tracing::info!("Metrics: http://{}/metrics", address);
        }
    }

    async fn wait_for_shutdown(&self) -> ShutdownReason {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let mut fatal_rx = self.ctx.shutdown_receiver();
        let mut stop_rx = self.stop_tx.subscribe();

        tokio::select! {
            _ = ctrl_c => ShutdownReason::Signal,
            _ = terminate => ShutdownReason::Signal,
            _ = fatal_rx.wait_for(|fatal| *fatal) => ShutdownReason::Fatal,
            _ = stop_rx.wait_for(|stop| *stop) => ShutdownReason::Requested,
        }
    }
}

/// Dispatch inbound envelopes until stopped
///
/// Each envelope is handled on its own task so a long submission triggered
/// by a signature never blocks the inbound channel.
async fn pump(
    manager: Arc<RunnerManager>,
    messenger: Arc<dyn Messenger>,
    stats: Arc<NodeStatistics>,
    mut inbox: Inbox,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut peers = tokio::time::interval(PEER_GAUGE_INTERVAL);
    loop {
        tokio::select! {
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    break;
                }
            }
            envelope = inbox.recv() => match envelope {
                Some(envelope) => {
                    let manager = manager.clone();
                    tokio::spawn(async move { dispatch(manager.as_ref(), envelope).await });
                }
                None => {
                    tracing::warn!("Inbound message channel closed");
                    break;
                }
            },
            _ = peers.tick() => stats.set_connected_peers(messenger.connected_peers()),
        }
    }
    tracing::debug!("Message pump stopped");
}
