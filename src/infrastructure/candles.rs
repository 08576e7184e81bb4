//! Candle-source decorators.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use crate::domain::errors::EngineError;
use crate::domain::ports::CandleSource;
use crate::domain::types::{Candle, CandleInterval};

/// Configuration for the anomalous-candle guard.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyFilterConfig {
    /// A candle is dropped when its min(OHLC) falls below
    /// `median / threshold_factor`.
    pub threshold_factor: Decimal,
    /// Below this many candles no median is computed and the batch passes
    /// through untouched.
    pub min_candles_for_median: usize,
}

impl Default for AnomalyFilterConfig {
    fn default() -> Self {
        Self {
            threshold_factor: Decimal::from(1000),
            min_candles_for_median: 5,
        }
    }
}

/// Drops candles whose prices collapse implausibly far below the batch
/// median. Exchanges occasionally report zero or near-zero OHLC rows during
/// outages; one such row poisons any VWAP computed over it.
pub struct AnomalyFilter {
    inner: Arc<dyn CandleSource>,
    config: AnomalyFilterConfig,
}

impl AnomalyFilter {
    pub fn new(inner: Arc<dyn CandleSource>, config: AnomalyFilterConfig) -> Self {
        Self { inner, config }
    }

    pub fn with_defaults(inner: Arc<dyn CandleSource>) -> Self {
        Self::new(inner, AnomalyFilterConfig::default())
    }

    /// Median of every OHLC value across the batch.
    fn median_ohlc(candles: &[Candle]) -> Option<Decimal> {
        if candles.is_empty() {
            return None;
        }
        let mut values: Vec<Decimal> = candles
            .iter()
            .flat_map(|c| [c.open, c.high, c.low, c.close])
            .collect();
        values.sort();
        let mid = values.len() / 2;
        if values.len() % 2 == 0 {
            Some((values[mid - 1] + values[mid]) / Decimal::from(2))
        } else {
            Some(values[mid])
        }
    }
}

#[async_trait]
impl CandleSource for AnomalyFilter {
    async fn get_candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        since: i64,
        limit: usize,
    ) -> Result<Vec<Candle>, EngineError> {
        let candles = self.inner.get_candles(symbol, interval, since, limit).await?;
        if candles.len() < self.config.min_candles_for_median {
            return Ok(candles);
        }
        let Some(median) = Self::median_ohlc(&candles) else {
            return Ok(candles);
        };
        let floor = median / self.config.threshold_factor;
        let before = candles.len();
        let filtered: Vec<Candle> = candles
            .into_iter()
            .filter(|c| c.min_ohlc() >= floor)
            .collect();
        if filtered.len() < before {
            debug!(
                symbol,
                dropped = before - filtered.len(),
                %median,
                "dropped anomalous candles below median floor"
            );
        }
        Ok(filtered)
    }
}
