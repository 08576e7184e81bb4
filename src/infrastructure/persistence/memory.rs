//! In-memory signal store, same contract as the file store minus
//! durability. Backs unit tests and throwaway backtest runs.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::errors::EngineError;
use crate::domain::ports::SignalStore;
use crate::domain::signal::SignalRecord;

#[derive(Default)]
struct Records {
    active: HashMap<(String, String), SignalRecord>,
    scheduled: HashMap<(String, String), SignalRecord>,
}

#[derive(Default)]
pub struct InMemorySignalStore {
    records: RwLock<Records>,
}

impl InMemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(strategy: &str, symbol: &str) -> (String, String) {
        (strategy.to_string(), symbol.to_string())
    }
}

#[async_trait]
impl SignalStore for InMemorySignalStore {
    async fn read_active(
        &self,
        strategy: &str,
        symbol: &str,
    ) -> Result<Option<SignalRecord>, EngineError> {
        let records = self.records.read().await;
        Ok(records.active.get(&Self::key(strategy, symbol)).cloned())
    }

    async fn write_active(
        &self,
        strategy: &str,
        symbol: &str,
        record: Option<&SignalRecord>,
    ) -> Result<(), EngineError> {
        let mut records = self.records.write().await;
        match record {
            Some(record) => {
                records.active.insert(Self::key(strategy, symbol), record.clone());
            }
            None => {
                records.active.remove(&Self::key(strategy, symbol));
            }
        }
        Ok(())
    }

    async fn read_scheduled(
        &self,
        strategy: &str,
        symbol: &str,
    ) -> Result<Option<SignalRecord>, EngineError> {
        let records = self.records.read().await;
        Ok(records.scheduled.get(&Self::key(strategy, symbol)).cloned())
    }

    async fn write_scheduled(
        &self,
        strategy: &str,
        symbol: &str,
        record: Option<&SignalRecord>,
    ) -> Result<(), EngineError> {
        let mut records = self.records.write().await;
        match record {
            Some(record) => {
                records
                    .scheduled
                    .insert(Self::key(strategy, symbol), record.clone());
            }
            None => {
                records.scheduled.remove(&Self::key(strategy, symbol));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::{Signal, SignalStatus};
    use crate::domain::types::Position;
    use rust_decimal_macros::dec;

    fn record() -> SignalRecord {
        SignalRecord::new(
            Signal {
                id: "s1".into(),
                symbol: "ETHUSDT".into(),
                strategy_name: "strat".into(),
                exchange_name: "binance".into(),
                position: Position::Short,
                price_open: dec!(3000),
                price_take_profit: dec!(2900),
                price_stop_loss: dec!(3100),
                minute_estimated_time: 30,
                scheduled_at: 5,
                pending_at: 5,
                is_scheduled: true,
                note: None,
            },
            SignalStatus::Scheduled,
            5,
        )
    }

    #[tokio::test]
    async fn test_roundtrip_and_delete() {
        let store = InMemorySignalStore::new();
        let rec = record();
        store.write_scheduled("strat", "ETHUSDT", Some(&rec)).await.unwrap();
        assert_eq!(
            store.read_scheduled("strat", "ETHUSDT").await.unwrap(),
            Some(rec)
        );
        assert!(store.read_active("strat", "ETHUSDT").await.unwrap().is_none());

        store.write_scheduled("strat", "ETHUSDT", None).await.unwrap();
        assert!(store.read_scheduled("strat", "ETHUSDT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_records_disjoint_per_pair() {
        let store = InMemorySignalStore::new();
        let rec = record();
        store.write_active("a", "ETHUSDT", Some(&rec)).await.unwrap();
        assert!(store.read_active("b", "ETHUSDT").await.unwrap().is_none());
        assert!(store.read_active("a", "BTCUSDT").await.unwrap().is_none());
    }
}
