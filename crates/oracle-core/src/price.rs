//! Deterministic price math
//!
//! Prices are fixed-point integers scaled by `10^decimals`. All arithmetic
//! runs on 256-bit unsigned integers so every node derives bit-identical
//! values from the same samples. Zero is a sentinel for "no data".

use primitive_types::U256;
use std::collections::BTreeMap;

use crate::error::{CoreError, Result};
use crate::types::constants::{MAX_DECIMALS, MEDIAN_MAX_DEVIATION, PERCENT_SCALE};

/// Fixed-point price
pub type Price = U256;

fn pow10(exp: u32) -> U256 {
    U256::exp10(exp as usize)
}

/// Volume weighted average price
///
/// Volume is scaled by `10^decimals`, quote volume by `10^(2*decimals)`.
/// Returns zero when either side is zero or the scaled quote volume
/// overflows 256 bits.
pub fn vwap(volume: U256, quote_volume: U256, decimals: u32) -> Price {
    let volume = match volume.checked_mul(pow10(decimals)) {
        Some(v) => v,
        None => return Price::zero(),
    };
    let quote_volume = match quote_volume.checked_mul(pow10(decimals * 2)) {
        Some(v) => v,
        None => return Price::zero(),
    };
    if volume.is_zero() || quote_volume.is_zero() {
        return Price::zero();
    }
    quote_volume / volume
}

/// Price of one asset expressed in another: `quote * 10^decimals / base`
pub fn cross_price(quote_price: Price, base_price: Price, decimals: u32) -> Price {
    if quote_price.is_zero() || base_price.is_zero() {
        return Price::zero();
    }
    match quote_price.checked_mul(pow10(decimals)) {
        Some(scaled) => scaled / base_price,
        None => Price::zero(),
    }
}

/// Rescale a price between two precisions (truncating when reducing)
pub fn scale_price(price: Price, from_decimals: u32, to_decimals: u32) -> Price {
    if from_decimals == to_decimals {
        return price;
    }
    if to_decimals > from_decimals {
        price
            .checked_mul(pow10(to_decimals - from_decimals))
            .unwrap_or_else(Price::zero)
    } else {
        price / pow10(from_decimals - to_decimals)
    }
}

fn middle(sorted: &[Price]) -> Price {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        // (a + b) / 2 without overflowing on the sum
        let (a, b) = (sorted[mid - 1], sorted[mid]);
        let two = U256::from(2u8);
        a / two + b / two + (a % two + b % two) / two
    }
}

/// Deviation of `price` from `median` in percent scaled by `PERCENT_SCALE`
fn deviation(price: Price, median: Price) -> U256 {
    let diff = if price > median {
        price - median
    } else {
        median - price
    };
    diff.saturating_mul(U256::from(100 * PERCENT_SCALE)) / median
}

/// Median of non-zero prices with single-pass outlier rejection
///
/// Samples further than 4% from the first median are dropped and the median
/// is recomputed, but only when that removed something and more than one
/// sample survived. Otherwise the first median stands.
pub fn median(prices: &[Price]) -> Option<Price> {
    let mut sorted: Vec<Price> = prices.iter().copied().filter(|p| !p.is_zero()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort();

    let first = middle(&sorted);
    let max_deviation = U256::from(MEDIAN_MAX_DEVIATION);
    let filtered: Vec<Price> = sorted
        .iter()
        .copied()
        .filter(|p| deviation(*p, first) <= max_deviation)
        .collect();

    if filtered.len() != sorted.len() && filtered.len() > 1 {
        return Some(middle(&filtered));
    }
    Some(first)
}

/// Summed volumes of one source over a timeframe
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VolumeTotals {
    pub volume: U256,
    pub quote_volume: U256,
}

/// Sum `(source, volume, quote_volume)` samples per source
///
/// Keyed by source name in a sorted map so iteration order is identical on
/// every node.
pub fn aggregate_by_source<'a, I>(samples: I) -> BTreeMap<String, VolumeTotals>
where
    I: IntoIterator<Item = (&'a str, U256, U256)>,
{
    let mut totals: BTreeMap<String, VolumeTotals> = BTreeMap::new();
    for (source, volume, quote_volume) in samples {
        let entry = totals.entry(source.to_string()).or_default();
        entry.volume = entry.volume.saturating_add(volume);
        entry.quote_volume = entry.quote_volume.saturating_add(quote_volume);
    }
    totals
}

/// Per-source VWAP followed by the median across sources
pub fn price_from_totals(totals: &BTreeMap<String, VolumeTotals>, decimals: u32) -> Option<Price> {
    let prices: Vec<Price> = totals
        .values()
        .map(|t| vwap(t.volume, t.quote_volume, decimals))
        .collect();
    median(&prices)
}

/// Parse a non-negative decimal integer string into a `U256`
pub fn parse_amount(raw: &str) -> Result<U256> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoreError::InvalidNumber(raw.to_string()));
    }
    U256::from_dec_str(trimmed).map_err(|_| CoreError::InvalidNumber(raw.to_string()))
}

/// Validate a decimals setting
pub fn check_decimals(decimals: u32) -> Result<u32> {
    if decimals > MAX_DECIMALS {
        return Err(CoreError::UnsupportedDecimals(decimals));
    }
    Ok(decimals)
}
