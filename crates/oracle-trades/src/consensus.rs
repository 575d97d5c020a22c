//! # Cross-Node Trades View
//!
//! One `NodeTradesCache` per cluster member. Consensus reads take the local
//! node's samples as the candidate set and keep a sample only when a quorum
//! of members (the local node included) reported exactly the same amounts
//! for the same source. Peers without data for the minute are skipped.

use hashbrown::HashMap;
use parking_lot::RwLock;

use oracle_core::constants::MAX_TRADES_TIMESTAMPS;
use oracle_core::{Asset, AssetKey, ClusterMembership, NodeId};
use oracle_network::{RawVolumeSample, TradesPayload};

use crate::assets::AssetsMap;
use crate::cache::NodeTradesCache;
use crate::error::{Result, TradesError};
use crate::sample::TimestampTradeData;

/// Trades reported by every cluster member, shared by all runners of a node
pub struct Trades {
    local: NodeId,
    caches: RwLock<HashMap<NodeId, NodeTradesCache>>,
    max_timestamps: usize,
}

impl Trades {
    pub fn new(local: NodeId) -> Self {
        Self::with_capacity(local, MAX_TRADES_TIMESTAMPS)
    }

    /// Keep at most `max_timestamps` minutes per key and node
    pub fn with_capacity(local: NodeId, max_timestamps: usize) -> Self {
        Self {
            local,
            caches: RwLock::new(HashMap::new()),
            max_timestamps,
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.local
    }

    /// Store trades reported by `node`
    pub fn push(
        &self,
        node: NodeId,
        key: AssetKey,
        assets: AssetsMap,
        timestamp: u64,
        trades: &[Vec<RawVolumeSample>],
    ) -> Result<()> {
        let mut caches = self.caches.write();
        caches
            .entry(node)
            .or_insert_with(|| NodeTradesCache::new(self.max_timestamps))
            .push(key, assets, timestamp, trades)
    }

    /// Store a gossip payload received from `node`
    pub fn push_payload(&self, node: NodeId, payload: &TradesPayload) -> Result<()> {
        let assets: AssetsMap = payload.assets.iter().cloned().collect();
        if assets.len() != payload.assets.len() {
            return Err(TradesError::MalformedPayload(format!(
                "duplicate assets for {}",
                payload.key
            )));
        }
        if payload.trades.len() > assets.len() {
            return Err(TradesError::MalformedPayload(format!(
                "{} trade lists for {} assets",
                payload.trades.len(),
                assets.len()
            )));
        }
        self.push(
            node,
            payload.key.clone(),
            assets,
            payload.timestamp,
            &payload.trades,
        )
    }

    /// Majority-validated samples for `assets` at `timestamp`
    ///
    /// `None` when the local node has nothing for that minute.
    pub fn consensus_trades(
        &self,
        key: &AssetKey,
        timestamp: u64,
        assets: &[Asset],
        membership: &ClusterMembership,
    ) -> Option<TimestampTradeData> {
        let caches = self.caches.read();
        let local = caches
            .get(&self.local)?
            .get_trades_data(key, timestamp, assets)?;

        let peers: Vec<TimestampTradeData> = membership
            .peers(&self.local)
            .filter_map(|peer| caches.get(peer)?.get_trades_data(key, timestamp, assets))
            .collect();
        let quorum = membership.quorum();

        let result = local
            .into_iter()
            .enumerate()
            .map(|(index, samples)| {
                samples
                    .into_iter()
                    .filter(|sample| {
                        let confirmations = 1 + peers
                            .iter()
                            .filter(|peer| peer[index].iter().any(|s| s.confirms(sample)))
                            .count();
                        if confirmations < quorum {
                            tracing::trace!(
                                "Sample {} for {} at {} confirmed by {}/{} nodes, dropped",
                                sample.source,
                                assets[index],
                                timestamp,
                                confirmations,
                                quorum
                            );
                            return false;
                        }
                        true
                    })
                    .collect()
            })
            .collect();
        Some(result)
    }

    /// Local samples without cross-validation
    pub fn local_trades(
        &self,
        key: &AssetKey,
        timestamp: u64,
        assets: &[Asset],
    ) -> Option<TimestampTradeData> {
        self.caches
            .read()
            .get(&self.local)?
            .get_trades_data(key, timestamp, assets)
    }

    /// Most recent minute the local node holds for `key`
    pub fn latest_local_timestamp(&self, key: &AssetKey) -> Option<u64> {
        self.caches.read().get(&self.local)?.latest_timestamp(key)
    }

    /// Forget everything reported by `node`
    pub fn clear_node(&self, node: &NodeId) {
        self.caches.write().remove(node);
    }

    /// Drop caches of nodes that left the cluster
    pub fn retain_members(&self, membership: &ClusterMembership) {
        let local = self.local;
        self.caches
            .write()
            .retain(|node, _| *node == local || membership.is_member(node));
    }

    /// Number of nodes with cached trades
    pub fn node_count(&self) -> usize {
        self.caches.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_core::time::MINUTE_MS;
    use primitive_types::U256;

    fn node(i: u8) -> NodeId {
        NodeId::new([i; 32])
    }

    fn key() -> AssetKey {
        AssetKey::new("exchanges", Asset::new("USD"))
    }

    fn btc() -> Vec<Asset> {
        vec![Asset::new("BTC")]
    }

    fn membership(n: u8) -> ClusterMembership {
        ClusterMembership::new((1..=n).map(node)).unwrap()
    }

    fn report(trades: &Trades, from: u8, samples: Vec<RawVolumeSample>) {
        trades
            .push(
                node(from),
                key(),
                btc().into_iter().collect(),
                MINUTE_MS,
                &[samples],
            )
            .unwrap();
    }

    #[test]
    fn test_no_local_data_no_result() {
        let trades = Trades::new(node(1));
        report(&trades, 2, vec![RawVolumeSample::new("a", "1", "1")]);
        assert!(trades
            .consensus_trades(&key(), MINUTE_MS, &btc(), &membership(3))
            .is_none());
    }

    #[test]
    fn test_quorum_of_seven() {
        let trades = Trades::new(node(1));
        let confirmed = RawVolumeSample::new("confirmed", "10", "100");
        let weak = RawVolumeSample::new("weak", "5", "50");

        report(&trades, 1, vec![confirmed.clone(), weak.clone()]);
        // "confirmed" reported by 3 peers (4 with self), "weak" by 2 (3 with self)
        report(&trades, 2, vec![confirmed.clone(), weak.clone()]);
        report(&trades, 3, vec![confirmed.clone(), weak.clone()]);
        report(&trades, 4, vec![confirmed.clone()]);
        report(&trades, 5, vec![RawVolumeSample::new("weak", "6", "50")]);

        let result = trades
            .consensus_trades(&key(), MINUTE_MS, &btc(), &membership(7))
            .unwrap();
        assert_eq!(result[0].len(), 1);
        assert_eq!(result[0][0].source, "confirmed");
        assert_eq!(result[0][0].volume, U256::from(10));
    }

    #[test]
    fn test_peers_cannot_introduce_samples() {
        let trades = Trades::new(node(1));
        report(&trades, 1, vec![]);
        for peer in 2..=3 {
            report(&trades, peer, vec![RawVolumeSample::new("fake", "1", "1")]);
        }

        let result = trades
            .consensus_trades(&key(), MINUTE_MS, &btc(), &membership(3))
            .unwrap();
        assert!(result[0].is_empty());
    }

    #[test]
    fn test_non_members_do_not_confirm() {
        let trades = Trades::new(node(1));
        let sample = RawVolumeSample::new("a", "1", "1");
        report(&trades, 1, vec![sample.clone()]);
        report(&trades, 9, vec![sample]);

        let result = trades
            .consensus_trades(&key(), MINUTE_MS, &btc(), &membership(3))
            .unwrap();
        assert!(result[0].is_empty());
    }

    #[test]
    fn test_single_node_cluster_trusts_itself() {
        let trades = Trades::new(node(1));
        report(&trades, 1, vec![RawVolumeSample::new("a", "1", "1")]);
        let result = trades
            .consensus_trades(&key(), MINUTE_MS, &btc(), &membership(1))
            .unwrap();
        assert_eq!(result[0].len(), 1);
    }

    #[test]
    fn test_push_payload_rejects_malformed() {
        let trades = Trades::new(node(1));
        let payload = TradesPayload {
            key: key(),
            assets: btc(),
            timestamp: MINUTE_MS,
            trades: vec![vec![], vec![]],
        };
        assert!(matches!(
            trades.push_payload(node(2), &payload),
            Err(TradesError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_retain_members() {
        let trades = Trades::new(node(1));
        report(&trades, 1, vec![]);
        report(&trades, 2, vec![]);
        report(&trades, 9, vec![]);
        assert_eq!(trades.node_count(), 3);

        trades.retain_members(&membership(2));
        assert_eq!(trades.node_count(), 2);
        trades.clear_node(&node(2));
        assert_eq!(trades.node_count(), 1);
    }
}
