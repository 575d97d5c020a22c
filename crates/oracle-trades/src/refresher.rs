//! # Trades Refresher
//!
//! Every minute, pulls the previous minute's samples for each tracked
//! `(source, base asset)` key, stores them as the local node's report and
//! gossips them to the cluster.

use hashbrown::HashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use oracle_core::time::{align_to, now_ms, MINUTE_MS};
use oracle_core::{Asset, AssetKey};
use oracle_network::{ClusterMessage, Messenger, TradesPayload};

use crate::assets::AssetsMap;
use crate::consensus::Trades;
use crate::error::{Result, TradesError};
use crate::source::MarketDataSource;

/// Default wait after a minute boundary before fetching it
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_secs(5);

/// Periodic loader of local trades
pub struct TradesRefresher {
    trades: Arc<Trades>,
    messenger: Arc<dyn Messenger>,
    sources: HashMap<String, Arc<dyn MarketDataSource>>,
    tracked: RwLock<IndexMap<AssetKey, AssetsMap>>,
    delay: Duration,
}

impl TradesRefresher {
    pub fn new(
        trades: Arc<Trades>,
        messenger: Arc<dyn Messenger>,
        sources: Vec<Arc<dyn MarketDataSource>>,
    ) -> Self {
        Self {
            trades,
            messenger,
            sources: sources
                .into_iter()
                .map(|s| (s.name().to_string(), s))
                .collect(),
            tracked: RwLock::new(IndexMap::new()),
            delay: DEFAULT_REFRESH_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn has_source(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Start tracking `assets` for `key`; already tracked assets keep their index
    pub fn track(&self, key: AssetKey, assets: impl IntoIterator<Item = Asset>) -> Result<()> {
        if !self.has_source(&key.source) {
            return Err(TradesError::UnknownSource(key.source));
        }
        let mut tracked = self.tracked.write();
        let map = tracked.entry(key).or_default();
        for asset in assets {
            map.add(asset);
        }
        Ok(())
    }

    pub fn tracked_keys(&self) -> Vec<AssetKey> {
        self.tracked.read().keys().cloned().collect()
    }

    /// Load, store and gossip the minute at `timestamp` for every tracked key
    ///
    /// Returns the number of keys refreshed. A failing key does not stop
    /// the others.
    pub async fn refresh(&self, timestamp: u64) -> usize {
        let tracked: Vec<(AssetKey, AssetsMap)> = self
            .tracked
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut refreshed = 0;
        for (key, assets) in tracked {
            match self.refresh_key(&key, assets, timestamp).await {
                Ok(()) => refreshed += 1,
                Err(e) if e.is_recoverable() => debug!("Trades refresh for {} failed: {}", key, e),
                Err(e) => warn!("Trades refresh for {} failed: {}", key, e),
            }
        }
        refreshed
    }

    async fn refresh_key(&self, key: &AssetKey, assets: AssetsMap, timestamp: u64) -> Result<()> {
        let source = self
            .sources
            .get(&key.source)
            .ok_or_else(|| TradesError::UnknownSource(key.source.clone()))?;

        let asset_list = assets.to_vec();
        let trades = source
            .fetch_minute(&key.base_asset, &asset_list, timestamp)
            .await?;

        self.trades.push(
            self.trades.local_id(),
            key.clone(),
            assets,
            timestamp,
            &trades,
        )?;

        let payload = TradesPayload {
            key: key.clone(),
            assets: asset_list,
            timestamp,
            trades,
        };
        let reached = self
            .messenger
            .broadcast(ClusterMessage::Trades(payload))
            .await?;
        debug!("Trades for {} at {} sent to {} peers", key, timestamp, reached);
        Ok(())
    }

    /// Refresh every minute until shutdown
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting trades refresher ({} keys, delay {}ms)",
            self.tracked.read().len(),
            self.delay.as_millis()
        );

        loop {
            let now = now_ms();
            let next_minute = align_to(now, MINUTE_MS) + MINUTE_MS;
            let wait = Duration::from_millis(next_minute - now) + self.delay;

            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Trades refresher shutting down");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    // the minute that just closed
                    let refreshed = self.refresh(next_minute - MINUTE_MS).await;
                    debug!("Refreshed trades for {} keys", refreshed);
                }
            }
        }
    }
}
