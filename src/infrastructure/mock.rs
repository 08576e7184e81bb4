//! Deterministic in-memory candle source for tests, demos and dry runs.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::errors::EngineError;
use crate::domain::ports::CandleSource;
use crate::domain::types::{Candle, CandleInterval};

/// Serves a fixed, ascending series of 1-minute candles.
///
/// `get_candles` honors `since` and `limit`; the interval argument is not
/// resampled, so feed it the granularity your test queries.
#[derive(Debug, Clone, Default)]
pub struct StaticCandleSource {
    candles: Vec<Candle>,
}

impl StaticCandleSource {
    pub fn new(mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.timestamp);
        Self { candles }
    }

    /// Flat series: `count` candles of `price` starting at `start_ts`,
    /// spaced one minute apart.
    pub fn flat(start_ts: i64, count: usize, price: Decimal, volume: Decimal) -> Self {
        let candles = (0..count)
            .map(|i| Candle {
                timestamp: start_ts + i as i64 * 60_000,
                open: price,
                high: price,
                low: price,
                close: price,
                volume,
            })
            .collect();
        Self::new(candles)
    }

    /// Replaces the candle at `timestamp` (exact match) with `candle`.
    pub fn set_candle(&mut self, candle: Candle) {
        match self.candles.binary_search_by_key(&candle.timestamp, |c| c.timestamp) {
            Ok(i) => self.candles[i] = candle,
            Err(i) => self.candles.insert(i, candle),
        }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }
}

#[async_trait]
impl CandleSource for StaticCandleSource {
    async fn get_candles(
        &self,
        _symbol: &str,
        _interval: CandleInterval,
        since: i64,
        limit: usize,
    ) -> Result<Vec<Candle>, EngineError> {
        Ok(self
            .candles
            .iter()
            .filter(|c| c.timestamp >= since)
            .take(limit)
            .cloned()
            .collect())
    }
}
