//! Market data collaborators

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::RwLock;

use oracle_core::Asset;
use oracle_network::RawVolumeSample;

use crate::error::Result;

/// Supplier of per-minute trade volumes (exchange API, historical database)
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Source name as used in `AssetKey::source`
    fn name(&self) -> &str;

    /// Samples for each of `assets` quoted in `base_asset` during the minute
    /// starting at `timestamp`, in `assets` order
    async fn fetch_minute(
        &self,
        base_asset: &Asset,
        assets: &[Asset],
        timestamp: u64,
    ) -> Result<Vec<Vec<RawVolumeSample>>>;
}

/// Source serving samples set in memory
#[derive(Default)]
pub struct MemoryMarketData {
    name: String,
    samples: RwLock<HashMap<(Asset, Asset, u64), Vec<RawVolumeSample>>>,
}

impl MemoryMarketData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samples: RwLock::new(HashMap::new()),
        }
    }

    /// Set the samples of `asset` at `timestamp`
    pub fn set(
        &self,
        base_asset: Asset,
        asset: Asset,
        timestamp: u64,
        samples: Vec<RawVolumeSample>,
    ) {
        self.samples
            .write()
            .insert((base_asset, asset, timestamp), samples);
    }
}

#[async_trait]
impl MarketDataSource for MemoryMarketData {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_minute(
        &self,
        base_asset: &Asset,
        assets: &[Asset],
        timestamp: u64,
    ) -> Result<Vec<Vec<RawVolumeSample>>> {
        let samples = self.samples.read();
        Ok(assets
            .iter()
            .map(|asset| {
                samples
                    .get(&(base_asset.clone(), asset.clone(), timestamp))
                    .cloned()
                    .unwrap_or_default()
            })
            .collect())
    }
}
