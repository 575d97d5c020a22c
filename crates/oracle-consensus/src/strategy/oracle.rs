//! Price feed oracle contract
//!
//! A price update at `P` covers trades in `[P - timeframe, P)`. Each asset's
//! price is the median over sources of the per-source VWAP, computed only
//! from samples a quorum of the cluster reported identically. When that
//! yields nothing the previous on-chain price is carried forward.

use async_trait::async_trait;
use primitive_types::U256;

use oracle_core::price::{aggregate_by_source, cross_price, price_from_totals, Price};
use oracle_core::time::{align_to, minutes_in_frame, MINUTE_MS};
use oracle_core::{Asset, AssetKey, ContractKind};

use super::{candidate, read_state, Candidate, ContractStrategy};
use crate::config::ContractConfig;
use crate::context::NodeContext;
use crate::error::{ConsensusError, Result};
use crate::rpc::{ContractState, OracleState};
use crate::transaction::ContractOperation;

/// Builds oracle configuration and price update transactions
pub struct OracleStrategy {
    config: ContractConfig,
    key: AssetKey,
}

impl OracleStrategy {
    pub fn new(config: ContractConfig) -> Result<Self> {
        config.validate()?;
        let (key, _) = config.trades_subscription()?;
        Ok(Self { config, key })
    }

    /// Trades key prices are read from
    pub fn trades_key(&self) -> &AssetKey {
        &self.key
    }

    fn init_operation(&self) -> Result<ContractOperation> {
        Ok(ContractOperation::OracleInit {
            base_asset: self.config.require_base_asset()?.clone(),
            decimals: self.config.decimals,
            timeframe_ms: self.config.timeframe_ms,
            period_ms: self.config.period_ms,
            assets: self.config.assets.clone(),
        })
    }

    /// Prices for the on-chain asset list at `price_ts`
    pub fn compute_prices(&self, ctx: &NodeContext, state: &OracleState, price_ts: u64) -> Vec<Price> {
        let mut query: Vec<Asset> = state.assets.clone();
        let base_index = match &self.config.cross_asset {
            Some(_) => Some(match query.iter().position(|a| *a == state.base_asset) {
                Some(i) => i,
                None => {
                    query.push(state.base_asset.clone());
                    query.len() - 1
                }
            }),
            None => None,
        };

        let membership = ctx.membership();
        let mut samples: Vec<Vec<(String, U256, U256)>> = vec![Vec::new(); query.len()];
        for minute in minutes_in_frame(price_ts, state.timeframe_ms) {
            let data = match ctx
                .trades
                .consensus_trades(&self.key, minute, &query, &membership)
            {
                Some(data) => data,
                None => continue,
            };
            for (index, list) in data.into_iter().enumerate() {
                for sample in list {
                    samples[index].push((sample.source, sample.volume, sample.quote_volume));
                }
            }
        }

        let raw: Vec<Price> = samples
            .iter()
            .map(|list| {
                let totals = aggregate_by_source(list.iter().map(|(s, v, q)| (s.as_str(), *v, *q)));
                price_from_totals(&totals, state.decimals).unwrap_or_else(Price::zero)
            })
            .collect();
        let base_price = base_index.map(|i| raw[i]);

        state
            .assets
            .iter()
            .enumerate()
            .map(|(i, asset)| {
                let mut price = raw[i];
                if let Some(base_price) = base_price {
                    price = cross_price(price, base_price, state.decimals);
                }
                if price.is_zero() {
                    tracing::debug!("No price for {} at {}, keeping previous", asset, price_ts);
                    price = state.prices.get(i).copied().unwrap_or_else(Price::zero);
                }
                price
            })
            .collect()
    }
}

#[async_trait]
impl ContractStrategy for OracleStrategy {
    fn kind(&self) -> ContractKind {
        ContractKind::Oracle
    }

    fn config(&self) -> &ContractConfig {
        &self.config
    }

    fn timeframe(&self) -> u64 {
        self.config.timeframe_ms
    }

    /// Poll at most every minute, twice per timeframe for short ones
    fn next_timestamp(&self, current: u64) -> u64 {
        current + MINUTE_MS.min(self.config.timeframe_ms / 2)
    }

    async fn build_candidate(&self, ctx: &NodeContext, timestamp: u64) -> Result<Option<Candidate>> {
        let state = match read_state(ctx, &self.config.id).await? {
            ContractState::Uninitialized => {
                return candidate(ctx, &self.config, self.init_operation()?, timestamp).await
            }
            ContractState::Oracle(state) => state,
            _ => {
                return Err(ConsensusError::UnexpectedState {
                    contract: self.config.id.clone(),
                    expected: "oracle",
                })
            }
        };

        let missing: Vec<Asset> = self
            .config
            .assets
            .iter()
            .filter(|a| !state.assets.contains(a))
            .cloned()
            .collect();
        if !missing.is_empty() {
            let operation = ContractOperation::AssetsUpdate { assets: missing };
            return candidate(ctx, &self.config, operation, timestamp).await;
        }

        if state.period_ms != self.config.period_ms {
            let operation = ContractOperation::PeriodUpdate {
                period_ms: self.config.period_ms,
            };
            return candidate(ctx, &self.config, operation, timestamp).await;
        }

        let price_ts = align_to(timestamp, state.timeframe_ms);
        if price_ts == 0 || state.last_timestamp >= price_ts {
            return Ok(None);
        }

        let prices = self.compute_prices(ctx, &state, price_ts);
        if prices.iter().all(|p| p.is_zero()) {
            tracing::debug!("No prices available for {} at {}", self.config.id, price_ts);
            return Ok(None);
        }

        let operation = ContractOperation::PriceUpdate {
            timestamp: price_ts,
            prices,
        };
        candidate(ctx, &self.config, operation, timestamp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture;
    use crate::transaction::TransactionKind;
    use oracle_core::ContractId;
    use oracle_network::RawVolumeSample;
    use oracle_trades::AssetsMap;

    fn config() -> ContractConfig {
        ContractConfig {
            timeframe_ms: 2 * MINUTE_MS,
            decimals: 2,
            period_ms: 10 * MINUTE_MS,
            data_source: Some("exchanges".into()),
            base_asset: Some(Asset::new("USD")),
            assets: vec![Asset::new("BTC"), Asset::new("ETH")],
            ..ContractConfig::new("CORACLE", ContractKind::Oracle)
        }
    }

    fn oracle_state(prices: Vec<u64>) -> OracleState {
        OracleState {
            base_asset: Asset::new("USD"),
            decimals: 2,
            timeframe_ms: 2 * MINUTE_MS,
            period_ms: 10 * MINUTE_MS,
            assets: vec![Asset::new("BTC"), Asset::new("ETH")],
            last_timestamp: 0,
            prices: prices.into_iter().map(U256::from).collect(),
        }
    }

    fn sample(source: &str, volume: u64, quote: u64) -> RawVolumeSample {
        RawVolumeSample::new(source, volume.to_string(), quote.to_string())
    }

    #[test]
    fn test_next_timestamp_polls_within_frame() {
        let strategy = OracleStrategy::new(config()).unwrap();
        assert_eq!(strategy.next_timestamp(0), MINUTE_MS);

        let short = OracleStrategy::new(ContractConfig {
            timeframe_ms: MINUTE_MS,
            ..config()
        })
        .unwrap();
        assert_eq!(short.next_timestamp(0), 30_000);
    }

    #[tokio::test]
    async fn test_init_then_config_updates() {
        let f = fixture(1);
        let strategy = OracleStrategy::new(config()).unwrap();
        let id = ContractId::new("CORACLE");

        let init = strategy.build_candidate(&f.ctx, MINUTE_MS).await.unwrap().unwrap();
        assert_eq!(init.tx.unwrap().kind(), TransactionKind::Init);

        let mut state = oracle_state(vec![0, 0]);
        state.assets.truncate(1);
        f.ledger.set_contract(id.clone(), ContractState::Oracle(state));
        let update = strategy.build_candidate(&f.ctx, MINUTE_MS).await.unwrap().unwrap();
        assert_eq!(
            update.tx.unwrap().operation,
            ContractOperation::AssetsUpdate {
                assets: vec![Asset::new("ETH")]
            }
        );

        let mut state = oracle_state(vec![0, 0]);
        state.period_ms = 4 * MINUTE_MS;
        f.ledger.set_contract(id, ContractState::Oracle(state));
        let update = strategy.build_candidate(&f.ctx, MINUTE_MS).await.unwrap().unwrap();
        assert_eq!(update.tx.unwrap().kind(), TransactionKind::PeriodUpdate);
    }

    #[tokio::test]
    async fn test_price_update_from_local_trades() {
        let f = fixture(1);
        let strategy = OracleStrategy::new(config()).unwrap();
        f.ledger.set_contract(
            ContractId::new("CORACLE"),
            ContractState::Oracle(oracle_state(vec![0, 777])),
        );

        let assets: AssetsMap = [Asset::new("BTC"), Asset::new("ETH")].into_iter().collect();
        let key = strategy.trades_key().clone();
        // BTC traded in both minutes of the frame [2m, 4m); ETH has no data
        for minute in [2 * MINUTE_MS, 3 * MINUTE_MS] {
            f.ctx
                .trades
                .push(
                    f.ctx.node_id(),
                    key.clone(),
                    assets.clone(),
                    minute,
                    &[vec![sample("a", 1, 100), sample("b", 1, 102)], vec![]],
                )
                .unwrap();
        }

        let candidate = strategy
            .build_candidate(&f.ctx, 4 * MINUTE_MS + 30_000)
            .await
            .unwrap()
            .unwrap();
        match candidate.tx.unwrap().operation {
            ContractOperation::PriceUpdate { timestamp, prices } => {
                assert_eq!(timestamp, 4 * MINUTE_MS);
                // median of VWAPs 100.00 and 102.00, ETH keeps its last price
                assert_eq!(prices, vec![U256::from(10_100), U256::from(777)]);
            }
            other => panic!("unexpected operation: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_up_to_date_or_no_data_skips() {
        let f = fixture(1);
        let strategy = OracleStrategy::new(config()).unwrap();

        let mut state = oracle_state(vec![0, 0]);
        state.last_timestamp = 4 * MINUTE_MS;
        f.ledger
            .set_contract(ContractId::new("CORACLE"), ContractState::Oracle(state));
        assert!(strategy
            .build_candidate(&f.ctx, 5 * MINUTE_MS)
            .await
            .unwrap()
            .is_none());

        // next frame, but no trades and no previous prices
        assert!(strategy
            .build_candidate(&f.ctx, 6 * MINUTE_MS)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_cross_price() {
        let f = fixture(1);
        let strategy = OracleStrategy::new(ContractConfig {
            base_asset: Some(Asset::new("XLM")),
            cross_asset: Some(Asset::new("USD")),
            assets: vec![Asset::new("BTC")],
            ..config()
        })
        .unwrap();

        let mut state = oracle_state(vec![0]);
        state.base_asset = Asset::new("XLM");
        state.assets = vec![Asset::new("BTC")];

        let assets: AssetsMap = [Asset::new("BTC"), Asset::new("XLM")].into_iter().collect();
        f.ctx
            .trades
            .push(
                f.ctx.node_id(),
                strategy.trades_key().clone(),
                assets,
                MINUTE_MS,
                &[vec![sample("a", 1, 400)], vec![sample("a", 4, 2)]],
            )
            .unwrap();

        // BTC = 400.00 USD, XLM = 0.50 USD -> BTC = 800.00 XLM
        let prices = strategy.compute_prices(&f.ctx, &state, 2 * MINUTE_MS);
        assert_eq!(prices, vec![U256::from(80_000)]);
    }
}
