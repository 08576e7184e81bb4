//! Context-bound market data access.
//!
//! [`MarketView`] is the only way strategy code reads candles. Every call
//! consults the task-local [`ExecutionContext`] for the symbol and the
//! temporal horizon, so a strategy can never see a candle at or after the
//! driver's current "now".

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::application::context::ExecutionContext;
use crate::domain::errors::EngineError;
use crate::domain::ports::CandleSource;
use crate::domain::types::{Candle, CandleInterval};

/// Volume-weighted average price over a candle window.
///
/// Falls back to the arithmetic mean of closes when the window traded no
/// volume at all.
pub fn vwap(candles: &[Candle]) -> Decimal {
    if candles.is_empty() {
        return Decimal::ZERO;
    }
    let total_volume: Decimal = candles.iter().map(|c| c.volume).sum();
    if total_volume.is_zero() {
        let total_close: Decimal = candles.iter().map(|c| c.close).sum();
        return total_close / Decimal::from(candles.len() as u64);
    }
    let weighted: Decimal = candles.iter().map(|c| c.typical_price() * c.volume).sum();
    weighted / total_volume
}

/// Read-only market access bound to the current execution context.
#[derive(Clone)]
pub struct MarketView {
    source: Arc<dyn CandleSource>,
    vwap_window: usize,
}

impl MarketView {
    pub fn new(source: Arc<dyn CandleSource>, vwap_window: usize) -> Self {
        Self { source, vwap_window }
    }

    pub fn source(&self) -> &Arc<dyn CandleSource> {
        &self.source
    }

    /// The last `limit` candles of `interval` strictly before the context's
    /// `now`, ascending.
    pub async fn candles(
        &self,
        interval: CandleInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, EngineError> {
        let ctx = ExecutionContext::current()?;
        let since = ctx.now - (limit as i64 + 2) * interval.as_millis();
        let mut candles = self
            .source
            .get_candles(&ctx.symbol, interval, since, limit + 2)
            .await?;
        candles.retain(|c| c.timestamp < ctx.now);
        if candles.len() > limit {
            let excess = candles.len() - limit;
            candles.drain(..excess);
        }
        Ok(candles)
    }

    /// The single reference price for "what is the price now": VWAP over the
    /// last `vwap_window` completed 1-minute candles strictly before `now`.
    pub async fn average_price(&self) -> Result<Decimal, EngineError> {
        let ctx = ExecutionContext::current()?;
        let interval = CandleInterval::OneMin;
        let since = ctx.now - (self.vwap_window as i64 + 2) * interval.as_millis();
        let mut candles = self
            .source
            .get_candles(&ctx.symbol, interval, since, self.vwap_window + 2)
            .await?;
        // Only completed candles count: the span must end at or before now
        candles.retain(|c| c.timestamp + interval.as_millis() <= ctx.now);
        if candles.len() < self.vwap_window {
            return Err(EngineError::InsufficientData {
                have: candles.len(),
                need: self.vwap_window,
            });
        }
        let excess = candles.len() - self.vwap_window;
        candles.drain(..excess);
        Ok(vwap(&candles))
    }
}
