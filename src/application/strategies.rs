//! Built-in reference strategies.
//!
//! These are small, deterministic strategies for wiring, smoke-testing and
//! walker comparisons. Each one reads its data exclusively through the
//! [`MarketView`], so it inherits the no-look-ahead guarantee for free.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::application::market_data::MarketView;
use crate::application::strategy_core::Strategy;
use crate::domain::signal::SignalDraft;
use crate::domain::types::{Candle, CandleInterval, Position};

fn sma(candles: &[Candle]) -> Option<Decimal> {
    if candles.is_empty() {
        return None;
    }
    let sum: Decimal = candles.iter().map(|c| c.close).sum();
    Some(sum / Decimal::from(candles.len() as u64))
}

/// Dual simple-moving-average crossover.
///
/// Goes long when the fast SMA sits above the slow SMA by more than the
/// threshold, short when below by more than the threshold. Take profit and
/// stop loss are placed at fixed percent distances from the current price.
#[derive(Debug, Clone)]
pub struct SmaCrossStrategy {
    pub fast_period: usize,
    pub slow_period: usize,
    /// Relative separation the fast SMA must clear, e.g. 0.001 = 0.1%.
    pub threshold: Decimal,
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
    pub minute_estimated_time: u64,
}

impl SmaCrossStrategy {
    pub fn new(fast_period: usize, slow_period: usize, threshold: Decimal) -> Self {
        Self {
            fast_period,
            slow_period,
            threshold,
            take_profit_pct: dec!(1),
            stop_loss_pct: dec!(1),
            minute_estimated_time: 240,
        }
    }

    fn draft(&self, position: Position, price: Decimal) -> SignalDraft {
        let tp_offset = price * self.take_profit_pct / Decimal::ONE_HUNDRED;
        let sl_offset = price * self.stop_loss_pct / Decimal::ONE_HUNDRED;
        let (price_take_profit, price_stop_loss) = match position {
            Position::Long => (price + tp_offset, price - sl_offset),
            Position::Short => (price - tp_offset, price + sl_offset),
        };
        SignalDraft {
            position,
            price_take_profit,
            price_stop_loss,
            minute_estimated_time: self.minute_estimated_time,
            price_open: None,
            note: Some(format!("sma cross {}x{}", self.fast_period, self.slow_period)),
            id: None,
        }
    }
}

#[async_trait]
impl Strategy for SmaCrossStrategy {
    async fn get_signal(
        &self,
        _symbol: &str,
        _now: i64,
        market: &MarketView,
    ) -> anyhow::Result<Option<SignalDraft>> {
        let candles = market.candles(CandleInterval::OneMin, self.slow_period).await?;
        if candles.len() < self.slow_period {
            return Ok(None);
        }
        let slow = sma(&candles);
        let fast = sma(&candles[candles.len() - self.fast_period..]);
        let (Some(fast), Some(slow)) = (fast, slow) else {
            return Ok(None);
        };
        let price = candles.last().map(|c| c.close).unwrap_or(slow);

        if fast > slow * (Decimal::ONE + self.threshold) {
            return Ok(Some(self.draft(Position::Long, price)));
        }
        if fast < slow * (Decimal::ONE - self.threshold) {
            return Ok(Some(self.draft(Position::Short, price)));
        }
        Ok(None)
    }
}

/// Mean-reversion limit entry: after a sharp move away from the recent
/// mean, posts a limit order part-way back toward it instead of chasing the
/// market price.
#[derive(Debug, Clone)]
pub struct PullbackStrategy {
    pub lookback: usize,
    /// Displacement from the mean that counts as stretched, e.g. 0.01 = 1%.
    pub stretch_pct: Decimal,
    pub minute_estimated_time: u64,
}

impl PullbackStrategy {
    pub fn new(lookback: usize, stretch_pct: Decimal) -> Self {
        Self {
            lookback,
            stretch_pct,
            minute_estimated_time: 120,
        }
    }
}

#[async_trait]
impl Strategy for PullbackStrategy {
    async fn get_signal(
        &self,
        _symbol: &str,
        _now: i64,
        market: &MarketView,
    ) -> anyhow::Result<Option<SignalDraft>> {
        let candles = market.candles(CandleInterval::OneMin, self.lookback).await?;
        if candles.len() < self.lookback {
            return Ok(None);
        }
        let Some(mean) = sma(&candles) else {
            return Ok(None);
        };
        let price = market.average_price().await?;
        let stretch = mean * self.stretch_pct;

        // Price stretched above the mean: wait for a dip half-way back
        if price > mean + stretch {
            let entry = mean + stretch / Decimal::from(2);
            return Ok(Some(SignalDraft {
                position: Position::Long,
                price_take_profit: entry * dec!(1.01),
                price_stop_loss: entry * dec!(0.99),
                minute_estimated_time: self.minute_estimated_time,
                price_open: Some(entry),
                note: Some("pullback entry".into()),
                id: None,
            }));
        }
        Ok(None)
    }
}
