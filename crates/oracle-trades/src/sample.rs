//! Normalized trade samples

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use oracle_core::price::parse_amount;
use oracle_network::RawVolumeSample;

use crate::error::{Result, TradesError};

/// Traded volume of one asset from one source during one minute
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetVolumeSample {
    pub source: String,
    pub volume: U256,
    pub quote_volume: U256,
}

/// Samples per asset index for one minute
pub type TimestampTradeData = Vec<Vec<AssetVolumeSample>>;

impl AssetVolumeSample {
    pub fn new(source: impl Into<String>, volume: U256, quote_volume: U256) -> Self {
        Self {
            source: source.into(),
            volume,
            quote_volume,
        }
    }

    /// Parse wire amounts into their canonical integer form
    ///
    /// Leading zeros and surrounding whitespace are dropped, so `"007"` and
    /// `"7"` compare equal after normalization. Negative, fractional or
    /// non-numeric amounts are rejected.
    pub fn normalize(raw: &RawVolumeSample) -> Result<Self> {
        let invalid = |reason: String| TradesError::InvalidSample {
            source_name: raw.source.clone(),
            reason,
        };
        let volume = parse_amount(&raw.volume).map_err(|e| invalid(e.to_string()))?;
        let quote_volume = parse_amount(&raw.quote_volume).map_err(|e| invalid(e.to_string()))?;
        Ok(Self::new(raw.source.trim(), volume, quote_volume))
    }

    /// Wire form
    pub fn to_raw(&self) -> RawVolumeSample {
        RawVolumeSample::new(
            self.source.clone(),
            self.volume.to_string(),
            self.quote_volume.to_string(),
        )
    }

    /// Same source reporting identical amounts
    pub fn confirms(&self, other: &AssetVolumeSample) -> bool {
        self.source == other.source
            && self.volume == other.volume
            && self.quote_volume == other.quote_volume
    }
}

/// Normalize one asset's raw samples, dropping the ones that fail
pub fn normalize_samples(raw: &[RawVolumeSample]) -> Vec<AssetVolumeSample> {
    raw.iter()
        .filter_map(|sample| match AssetVolumeSample::normalize(sample) {
            Ok(sample) => Some(sample),
            Err(e) => {
                tracing::debug!("Dropping trade sample: {}", e);
                None
            }
        })
        .collect()
}
