//! # Node Trades Cache
//!
//! Trade volumes reported by a single cluster member, grouped by
//! `(source, base asset)` and minute. Only the most recent minutes are kept
//! per key.

use hashbrown::HashMap;
use std::collections::BTreeMap;

use oracle_core::constants::MAX_TRADES_TIMESTAMPS;
use oracle_core::time::is_minute_aligned;
use oracle_core::{Asset, AssetKey};
use oracle_network::RawVolumeSample;

use crate::assets::AssetsMap;
use crate::error::{Result, TradesError};
use crate::sample::{normalize_samples, AssetVolumeSample, TimestampTradeData};

/// Samples of one minute together with the assets map they are indexed by
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CachedTrades {
    pub assets: AssetsMap,
    pub data: TimestampTradeData,
}

/// Bounded per-node trades store
#[derive(Clone, Debug)]
pub struct NodeTradesCache {
    entries: HashMap<AssetKey, BTreeMap<u64, CachedTrades>>,
    max_timestamps: usize,
}

impl Default for NodeTradesCache {
    fn default() -> Self {
        Self::new(MAX_TRADES_TIMESTAMPS)
    }
}

impl NodeTradesCache {
    pub fn new(max_timestamps: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_timestamps: max_timestamps.max(1),
        }
    }

    /// Store (or overwrite) the trades of `key` at `timestamp`
    ///
    /// Raw amounts are normalized; samples that fail are dropped. Trades
    /// beyond the assets map length are ignored, missing ones are empty.
    pub fn push(
        &mut self,
        key: AssetKey,
        assets: AssetsMap,
        timestamp: u64,
        trades: &[Vec<RawVolumeSample>],
    ) -> Result<()> {
        if !is_minute_aligned(timestamp) {
            return Err(TradesError::UnalignedTimestamp(timestamp));
        }

        let data: TimestampTradeData = (0..assets.len())
            .map(|i| trades.get(i).map(|raw| normalize_samples(raw)).unwrap_or_default())
            .collect();

        let minutes = self.entries.entry(key).or_default();
        minutes.insert(timestamp, CachedTrades { assets, data });

        while minutes.len() > self.max_timestamps {
            minutes.pop_first();
        }
        Ok(())
    }

    /// Samples of the requested assets, in request order
    ///
    /// `None` when nothing is stored for `key` at `timestamp`; an asset the
    /// stored map does not know yields an empty list.
    pub fn get_trades_data(
        &self,
        key: &AssetKey,
        timestamp: u64,
        assets: &[Asset],
    ) -> Option<Vec<Vec<AssetVolumeSample>>> {
        let cached = self.entries.get(key)?.get(&timestamp)?;
        Some(
            assets
                .iter()
                .map(|asset| {
                    cached
                        .assets
                        .index_of(asset)
                        .and_then(|i| cached.data.get(i))
                        .cloned()
                        .unwrap_or_default()
                })
                .collect(),
        )
    }

    /// Stored minutes for `key`, oldest first
    pub fn timestamps(&self, key: &AssetKey) -> Vec<u64> {
        self.entries
            .get(key)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn latest_timestamp(&self, key: &AssetKey) -> Option<u64> {
        self.entries.get(key)?.keys().next_back().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_core::time::MINUTE_MS;
    use primitive_types::U256;

    fn key() -> AssetKey {
        AssetKey::new("exchanges", Asset::new("USD"))
    }

    fn assets(codes: &[&str]) -> AssetsMap {
        codes.iter().map(|c| Asset::new(*c)).collect()
    }

    #[test]
    fn test_push_rejects_unaligned() {
        let mut cache = NodeTradesCache::default();
        let err = cache
            .push(key(), assets(&["BTC"]), MINUTE_MS + 1, &[vec![]])
            .unwrap_err();
        assert_eq!(err, TradesError::UnalignedTimestamp(MINUTE_MS + 1));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_eviction_keeps_most_recent() {
        let mut cache = NodeTradesCache::default();
        for i in 1..=16u64 {
            let trades = vec![vec![RawVolumeSample::new("a", i.to_string(), "1")]];
            cache
                .push(key(), assets(&["BTC"]), i * MINUTE_MS, &trades)
                .unwrap();
        }

        let stored = cache.timestamps(&key());
        assert_eq!(stored.len(), 15);
        assert_eq!(stored.first(), Some(&(2 * MINUTE_MS)));
        assert!(cache
            .get_trades_data(&key(), MINUTE_MS, &[Asset::new("BTC")])
            .is_none());
        for i in 2..=16u64 {
            let data = cache
                .get_trades_data(&key(), i * MINUTE_MS, &[Asset::new("BTC")])
                .unwrap();
            assert_eq!(data[0][0].volume, U256::from(i));
        }
        assert_eq!(cache.latest_timestamp(&key()), Some(16 * MINUTE_MS));
    }

    #[test]
    fn test_push_overwrites_same_minute() {
        let mut cache = NodeTradesCache::default();
        let first = vec![vec![RawVolumeSample::new("a", "1", "1")]];
        let second = vec![vec![RawVolumeSample::new("a", "2", "2")]];
        cache.push(key(), assets(&["BTC"]), MINUTE_MS, &first).unwrap();
        cache.push(key(), assets(&["BTC"]), MINUTE_MS, &second).unwrap();

        let data = cache
            .get_trades_data(&key(), MINUTE_MS, &[Asset::new("BTC")])
            .unwrap();
        assert_eq!(data[0].len(), 1);
        assert_eq!(data[0][0].volume, U256::from(2));
    }

    #[test]
    fn test_get_maps_assets_by_code() {
        let mut cache = NodeTradesCache::default();
        let trades = vec![
            vec![RawVolumeSample::new("a", "1", "10")],
            vec![RawVolumeSample::new("a", "2", "20")],
        ];
        cache
            .push(key(), assets(&["BTC", "ETH"]), MINUTE_MS, &trades)
            .unwrap();

        let data = cache
            .get_trades_data(
                &key(),
                MINUTE_MS,
                &[Asset::new("ETH"), Asset::new("DOGE"), Asset::new("BTC")],
            )
            .unwrap();
        assert_eq!(data[0][0].volume, U256::from(2));
        assert!(data[1].is_empty());
        assert_eq!(data[2][0].volume, U256::from(1));
    }
}
