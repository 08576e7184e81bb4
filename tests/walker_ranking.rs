//! Walker: several strategies over the same frame, ranked by metric.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::Mutex;

use sigmill::application::drivers::{WalkerDriver, WalkerEntry};
use sigmill::application::frame::Frame;
use sigmill::application::market_data::MarketView;
use sigmill::application::risk::NoRiskGate;
use sigmill::application::stats::WalkerMetric;
use sigmill::application::strategy_core::{EngineDeps, Strategy, StrategySpec};
use sigmill::config::EngineConfig;
use sigmill::domain::events::{EngineEvent, EventListener};
use sigmill::domain::signal::SignalDraft;
use sigmill::domain::types::{Candle, FrameInterval, Position, SignalInterval};
use sigmill::infrastructure::event_bus::EventBus;
use sigmill::infrastructure::mock::StaticCandleSource;
use sigmill::infrastructure::persistence::InMemorySignalStore;

const T0: i64 = 600_000;

/// Buys with a tight take profit the candles will hit.
struct Winner;

#[async_trait]
impl Strategy for Winner {
    async fn get_signal(
        &self,
        _symbol: &str,
        now: i64,
        _market: &MarketView,
    ) -> anyhow::Result<Option<SignalDraft>> {
        if now != T0 {
            return Ok(None);
        }
        Ok(Some(SignalDraft {
            position: Position::Long,
            price_take_profit: dec!(101000),
            price_stop_loss: dec!(99000),
            minute_estimated_time: 60,
            price_open: None,
            note: None,
            id: None,
        }))
    }
}

/// Shorts into the same rally and gets stopped out.
struct Loser;

#[async_trait]
impl Strategy for Loser {
    async fn get_signal(
        &self,
        _symbol: &str,
        now: i64,
        _market: &MarketView,
    ) -> anyhow::Result<Option<SignalDraft>> {
        if now != T0 {
            return Ok(None);
        }
        Ok(Some(SignalDraft {
            position: Position::Short,
            price_take_profit: dec!(99000),
            price_stop_loss: dec!(101000),
            minute_estimated_time: 60,
            price_open: None,
            note: None,
            id: None,
        }))
    }
}

/// Never trades.
struct Bystander;

#[async_trait]
impl Strategy for Bystander {
    async fn get_signal(
        &self,
        _symbol: &str,
        _now: i64,
        _market: &MarketView,
    ) -> anyhow::Result<Option<SignalDraft>> {
        Ok(None)
    }
}

struct DoneTap {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl EventListener for DoneTap {
    async fn on_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::StrategyDone { strategy_name, .. } => {
                self.seen.lock().await.push(format!("strategy_done:{strategy_name}"));
            }
            EngineEvent::Done { .. } => {
                self.seen.lock().await.push("done".into());
            }
            _ => {}
        }
    }
}

fn rally_candles() -> Vec<Candle> {
    let mut candles: Vec<Candle> = (0..10)
        .map(|i| Candle {
            timestamp: i * 60_000,
            open: dec!(100000),
            high: dec!(100000),
            low: dec!(100000),
            close: dec!(100000),
            volume: dec!(1),
        })
        .collect();
    candles.push(Candle {
        timestamp: T0,
        open: dec!(100000),
        high: dec!(101500),
        low: dec!(99500),
        close: dec!(101200),
        volume: dec!(1),
    });
    candles
}

fn spec(name: &str) -> StrategySpec {
    StrategySpec {
        strategy_name: name.into(),
        exchange_name: "binance".into(),
        interval: SignalInterval::OneMin,
    }
}

#[tokio::test]
async fn walker_ranks_by_total_pnl() {
    let bus = EventBus::new();
    let deps = EngineDeps {
        config: Arc::new(EngineConfig::default()),
        candles: Arc::new(StaticCandleSource::new(rally_candles())),
        store: Arc::new(InMemorySignalStore::new()),
        risk: Arc::new(NoRiskGate),
        bus: bus.clone(),
    };
    let tap = Arc::new(DoneTap { seen: Mutex::new(Vec::new()) });
    bus.subscribe(Arc::clone(&tap) as Arc<dyn EventListener>).await;

    let frame = Frame::from_millis(T0, T0 + 300_000, FrameInterval::OneMin).with_name("rally");
    let walker = WalkerDriver::new(
        "BTCUSDT",
        frame,
        vec![
            WalkerEntry { spec: spec("loser"), strategy: Arc::new(Loser) },
            WalkerEntry { spec: spec("winner"), strategy: Arc::new(Winner) },
            WalkerEntry { spec: spec("bystander"), strategy: Arc::new(Bystander) },
        ],
        WalkerMetric::TotalPnl,
        deps,
    );

    let report = walker.run().await.unwrap();
    assert_eq!(report.ranked.len(), 3);
    assert_eq!(report.best().unwrap().strategy_name, "winner");
    assert!(report.ranked[0].total_pnl_pct > Decimal::ZERO);
    assert_eq!(report.ranked[1].strategy_name, "bystander");
    assert_eq!(report.ranked[1].closed_trades, 0);
    assert_eq!(report.ranked[2].strategy_name, "loser");
    assert!(report.ranked[2].total_pnl_pct < Decimal::ZERO);

    assert_eq!(report.ranked[0].wins, 1);
    assert_eq!(report.ranked[2].losses, 1);

    // One completion event per strategy, then the overall one
    bus.flush().await;
    let seen = tap.seen.lock().await;
    assert_eq!(
        *seen,
        vec![
            "strategy_done:loser".to_string(),
            "strategy_done:winner".to_string(),
            "strategy_done:bystander".to_string(),
            "done".to_string(),
        ]
    );
}

#[tokio::test]
async fn walker_ranks_by_win_rate() {
    let deps = EngineDeps {
        config: Arc::new(EngineConfig::default()),
        candles: Arc::new(StaticCandleSource::new(rally_candles())),
        store: Arc::new(InMemorySignalStore::new()),
        risk: Arc::new(NoRiskGate),
        bus: EventBus::new(),
    };
    let frame = Frame::from_millis(T0, T0 + 300_000, FrameInterval::OneMin);
    let walker = WalkerDriver::new(
        "BTCUSDT",
        frame,
        vec![
            WalkerEntry { spec: spec("loser"), strategy: Arc::new(Loser) },
            WalkerEntry { spec: spec("winner"), strategy: Arc::new(Winner) },
        ],
        WalkerMetric::WinRate,
        deps,
    );
    let report = walker.run().await.unwrap();
    assert_eq!(report.best().unwrap().strategy_name, "winner");
    assert_eq!(report.best().unwrap().win_rate_pct, dec!(100));
}
