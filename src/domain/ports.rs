use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::errors::EngineError;
use crate::domain::signal::{Signal, SignalRecord};
use crate::domain::types::{Candle, CandleInterval};

/// External market-data capability.
///
/// Returns at most `limit` candles with `timestamp >= since`, ascending.
/// The engine bounds every call with the execution context's `now` and
/// filters out candles at or after it before use; the fast-forward backtest
/// path is the only consumer that reads past `now`, on purpose.
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn get_candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        since: i64,
        limit: usize,
    ) -> Result<Vec<Candle>, EngineError>;
}

/// Crash-safe persistence for signals, two namespaces keyed by
/// (strategy, symbol): `active` for opened signals, `scheduled` for limit
/// signals awaiting activation.
///
/// A successful write must survive a process crash immediately after it
/// returns. Writing `None` deletes the record.
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn read_active(
        &self,
        strategy: &str,
        symbol: &str,
    ) -> Result<Option<SignalRecord>, EngineError>;

    async fn write_active(
        &self,
        strategy: &str,
        symbol: &str,
        record: Option<&SignalRecord>,
    ) -> Result<(), EngineError>;

    async fn read_scheduled(
        &self,
        strategy: &str,
        symbol: &str,
    ) -> Result<Option<SignalRecord>, EngineError>;

    async fn write_scheduled(
        &self,
        strategy: &str,
        symbol: &str,
        record: Option<&SignalRecord>,
    ) -> Result<(), EngineError>;
}

/// Everything a risk gate sees when deciding whether a signal may open.
#[derive(Debug, Clone)]
pub struct RiskCheckArgs<'a> {
    pub signal: &'a Signal,
    pub symbol: &'a str,
    pub strategy_name: &'a str,
    pub current_price: Decimal,
    pub timestamp: i64,
    /// Positions currently held across the strategies sharing this gate.
    pub active_positions: usize,
}

/// Portfolio-level admission control.
///
/// `check_signal` runs before a signal is created or a scheduled signal
/// activates; rejection surfaces as `EngineError::RiskRejected`. The
/// position view is process-memory only and is rebuilt on restart from the
/// store's active records.
#[async_trait]
pub trait RiskGate: Send + Sync {
    async fn check_signal(&self, args: &RiskCheckArgs<'_>) -> Result<(), EngineError>;

    /// Called when a signal opens.
    async fn add_signal(&self, strategy: &str, symbol: &str);

    /// Called when a signal closes or cancels.
    async fn remove_signal(&self, strategy: &str, symbol: &str);

    /// Number of positions currently registered with this gate.
    async fn position_count(&self) -> usize;
}
