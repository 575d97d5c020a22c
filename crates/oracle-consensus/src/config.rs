//! Per-contract settings supplied by the configuration collaborator

use serde::{Deserialize, Serialize};

use oracle_core::price::check_decimals;
use oracle_core::time::{check_timeframe, MINUTE_MS};
use oracle_core::{Asset, AssetKey, ContractId, ContractKind};

use crate::error::{ConsensusError, Result};

/// Settings of one managed contract
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    /// On-chain contract address
    pub id: ContractId,

    pub kind: ContractKind,

    /// Price update timeframe (oracle only)
    #[serde(default = "default_timeframe_ms")]
    pub timeframe_ms: u64,

    /// Fixed-point precision of prices
    #[serde(default = "default_decimals")]
    pub decimals: u32,

    /// Transaction fee in base units
    #[serde(default = "default_fee")]
    pub fee: u64,

    /// Market data source name (oracle only)
    #[serde(default)]
    pub data_source: Option<String>,

    /// Asset prices are expressed in
    #[serde(default)]
    pub base_asset: Option<Asset>,

    /// Tracked assets, in on-chain order
    #[serde(default)]
    pub assets: Vec<Asset>,

    /// Quote asset of the source data when it differs from `base_asset`
    #[serde(default)]
    pub cross_asset: Option<Asset>,

    /// Price history retention on chain
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// Base fee charged to subscriptions
    #[serde(default)]
    pub subscription_fee: u64,

    /// DAO unlock interval
    #[serde(default = "default_unlock_period_ms")]
    pub unlock_period_ms: u64,
}

fn default_timeframe_ms() -> u64 {
    5 * MINUTE_MS
}

fn default_decimals() -> u32 {
    14
}

fn default_fee() -> u64 {
    10_000_000
}

fn default_period_ms() -> u64 {
    24 * 60 * MINUTE_MS
}

fn default_unlock_period_ms() -> u64 {
    7 * 24 * 60 * MINUTE_MS
}

impl ContractConfig {
    /// Minimal config of `kind` with default settings
    pub fn new(id: impl Into<ContractId>, kind: ContractKind) -> Self {
        Self {
            id: id.into(),
            kind,
            timeframe_ms: default_timeframe_ms(),
            decimals: default_decimals(),
            fee: default_fee(),
            data_source: None,
            base_asset: None,
            assets: Vec::new(),
            cross_asset: None,
            period_ms: default_period_ms(),
            subscription_fee: 0,
            unlock_period_ms: default_unlock_period_ms(),
        }
    }

    /// Check settings required by the contract kind
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| ConsensusError::InvalidConfig {
            contract: self.id.clone(),
            reason,
        };

        check_decimals(self.decimals).map_err(|e| invalid(e.to_string()))?;

        if self.kind == ContractKind::Oracle {
            check_timeframe(self.timeframe_ms).map_err(|e| invalid(e.to_string()))?;
            self.require_data_source()?;
            self.require_base_asset()?;
            if self.assets.is_empty() {
                return Err(invalid("no assets configured".into()));
            }
            if self.period_ms < self.timeframe_ms {
                return Err(invalid("period shorter than timeframe".into()));
            }
        }
        if self.kind == ContractKind::Dao {
            check_timeframe(self.unlock_period_ms).map_err(|e| invalid(e.to_string()))?;
        }
        Ok(())
    }

    pub fn require_data_source(&self) -> Result<&str> {
        self.data_source
            .as_deref()
            .ok_or_else(|| ConsensusError::MissingConfig {
                contract: self.id.clone(),
                field: "data_source",
            })
    }

    pub fn require_base_asset(&self) -> Result<&Asset> {
        self.base_asset
            .as_ref()
            .ok_or_else(|| ConsensusError::MissingConfig {
                contract: self.id.clone(),
                field: "base_asset",
            })
    }

    /// Trades key the oracle reads and the assets tracked under it
    pub fn trades_subscription(&self) -> Result<(AssetKey, Vec<Asset>)> {
        let source = self.require_data_source()?;
        let base = self.require_base_asset()?;
        let mut assets = self.assets.clone();
        let quote = match &self.cross_asset {
            Some(cross) => {
                if !assets.contains(base) {
                    assets.push(base.clone());
                }
                cross.clone()
            }
            None => base.clone(),
        };
        Ok((AssetKey::new(source, quote), assets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> ContractConfig {
        ContractConfig {
            data_source: Some("exchanges".into()),
            base_asset: Some(Asset::new("USD")),
            assets: vec![Asset::new("BTC")],
            ..ContractConfig::new("CORACLE", ContractKind::Oracle)
        }
    }

    #[test]
    fn test_valid_oracle() {
        assert!(oracle().validate().is_ok());
    }

    #[test]
    fn test_oracle_requires_source() {
        let config = ContractConfig {
            data_source: None,
            ..oracle()
        };
        assert!(matches!(
            config.validate(),
            Err(ConsensusError::MissingConfig {
                field: "data_source",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_bad_timeframe_and_decimals() {
        let config = ContractConfig {
            timeframe_ms: 90_000,
            ..oracle()
        };
        assert!(config.validate().is_err());

        let config = ContractConfig {
            decimals: 19,
            ..oracle()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cross_subscription_tracks_base() {
        let config = ContractConfig {
            base_asset: Some(Asset::new("XLM")),
            cross_asset: Some(Asset::new("USD")),
            ..oracle()
        };
        let (key, assets) = config.trades_subscription().unwrap();
        assert_eq!(key, AssetKey::new("exchanges", Asset::new("USD")));
        assert_eq!(assets, vec![Asset::new("BTC"), Asset::new("XLM")]);
    }

    #[test]
    fn test_non_oracle_needs_no_source() {
        assert!(ContractConfig::new("CDAO", ContractKind::Dao)
            .validate()
            .is_ok());
    }
}
