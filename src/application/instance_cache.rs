//! Memoized strategy cores.
//!
//! Keyed by `"<strategy>:<symbol>"`: the same strategy on two symbols gets
//! two instances with fully isolated lifecycle state. Construction is lazy
//! and happens under the lock, so a key races to exactly one instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::application::strategy_core::{EngineDeps, Strategy, StrategyCore, StrategySpec};

#[derive(Default)]
pub struct InstanceCache {
    entries: Mutex<HashMap<String, Arc<StrategyCore>>>,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(strategy_name: &str, symbol: &str) -> String {
        format!("{strategy_name}:{symbol}")
    }

    pub fn get_or_create(
        &self,
        symbol: &str,
        spec: &StrategySpec,
        strategy: &Arc<dyn Strategy>,
        deps: &EngineDeps,
    ) -> Arc<StrategyCore> {
        let key = Self::key(&spec.strategy_name, symbol);
        let mut entries = self.entries.lock().expect("instance cache lock poisoned");
        Arc::clone(entries.entry(key).or_insert_with(|| {
            Arc::new(StrategyCore::new(
                symbol,
                spec.clone(),
                Arc::clone(strategy),
                deps.clone(),
            ))
        }))
    }

    pub fn get(&self, strategy_name: &str, symbol: &str) -> Option<Arc<StrategyCore>> {
        let entries = self.entries.lock().expect("instance cache lock poisoned");
        entries.get(&Self::key(strategy_name, symbol)).cloned()
    }

    /// Drops one pair's instance; the next lookup rebuilds it fresh.
    pub fn invalidate(&self, strategy_name: &str, symbol: &str) {
        let mut entries = self.entries.lock().expect("instance cache lock poisoned");
        entries.remove(&Self::key(strategy_name, symbol));
    }

    pub fn clear(&self) {
        self.entries.lock().expect("instance cache lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("instance cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::market_data::MarketView;
    use crate::application::risk::NoRiskGate;
    use crate::config::EngineConfig;
    use crate::domain::signal::SignalDraft;
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::mock::StaticCandleSource;
    use crate::infrastructure::persistence::InMemorySignalStore;
    use async_trait::async_trait;

    struct NullStrategy;

    #[async_trait]
    impl Strategy for NullStrategy {
        async fn get_signal(
            &self,
            _symbol: &str,
            _now: i64,
            _market: &MarketView,
        ) -> anyhow::Result<Option<SignalDraft>> {
            Ok(None)
        }
    }

    fn deps() -> EngineDeps {
        EngineDeps {
            config: Arc::new(EngineConfig::default()),
            candles: Arc::new(StaticCandleSource::default()),
            store: Arc::new(InMemorySignalStore::new()),
            risk: Arc::new(NoRiskGate),
            bus: EventBus::new(),
        }
    }

    fn spec(name: &str) -> StrategySpec {
        StrategySpec {
            strategy_name: name.into(),
            exchange_name: "binance".into(),
            interval: crate::domain::types::SignalInterval::OneMin,
        }
    }

    #[tokio::test]
    async fn test_same_pair_same_instance() {
        let cache = InstanceCache::new();
        let strategy: Arc<dyn Strategy> = Arc::new(NullStrategy);
        let deps = deps();
        let a = cache.get_or_create("BTCUSDT", &spec("s"), &strategy, &deps);
        let b = cache.get_or_create("BTCUSDT", &spec("s"), &strategy, &deps);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_different_symbol_different_instance() {
        let cache = InstanceCache::new();
        let strategy: Arc<dyn Strategy> = Arc::new(NullStrategy);
        let deps = deps();
        let a = cache.get_or_create("BTCUSDT", &spec("s"), &strategy, &deps);
        let b = cache.get_or_create("ETHUSDT", &spec("s"), &strategy, &deps);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_invalidation() {
        let cache = InstanceCache::new();
        let strategy: Arc<dyn Strategy> = Arc::new(NullStrategy);
        let deps = deps();
        let a = cache.get_or_create("BTCUSDT", &spec("s"), &strategy, &deps);
        cache.invalidate("s", "BTCUSDT");
        let b = cache.get_or_create("BTCUSDT", &spec("s"), &strategy, &deps);
        assert!(!Arc::ptr_eq(&a, &b));

        cache.get_or_create("ETHUSDT", &spec("s"), &strategy, &deps);
        cache.clear();
        assert!(cache.is_empty());
    }
}
