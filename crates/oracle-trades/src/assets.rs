//! Append-only asset index

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use oracle_core::Asset;

/// Stable positional index of the assets tracked for one source/base pair
///
/// Indices are assigned on first insertion and never reused or removed, so a
/// sample addressed by index keeps its meaning for the map's lifetime.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetsMap {
    assets: IndexSet<Asset>,
}

impl AssetsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `asset`, appending it if unseen
    pub fn add(&mut self, asset: Asset) -> usize {
        self.assets.insert_full(asset).0
    }

    pub fn index_of(&self, asset: &Asset) -> Option<usize> {
        self.assets.get_index_of(asset)
    }

    pub fn get(&self, index: usize) -> Option<&Asset> {
        self.assets.get_index(index)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Assets in index order
    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.iter()
    }

    pub fn to_vec(&self) -> Vec<Asset> {
        self.assets.iter().cloned().collect()
    }
}

impl FromIterator<Asset> for AssetsMap {
    fn from_iter<I: IntoIterator<Item = Asset>>(iter: I) -> Self {
        let mut map = Self::new();
        for asset in iter {
            map.add(asset);
        }
        map
    }
}
