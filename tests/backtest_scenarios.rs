//! End-to-end backtest scenarios through the full driver stack.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::Arc;

use sigmill::application::drivers::BacktestDriver;
use sigmill::application::frame::Frame;
use sigmill::application::market_data::MarketView;
use sigmill::application::risk::NoRiskGate;
use sigmill::application::strategy_core::{EngineDeps, Strategy, StrategyCore, StrategySpec};
use sigmill::config::EngineConfig;
use sigmill::domain::signal::{CancelReason, CloseReason, SignalDraft, TickResult};
use sigmill::domain::types::{Candle, FrameInterval, Position, SignalInterval};
use sigmill::infrastructure::event_bus::EventBus;
use sigmill::infrastructure::mock::StaticCandleSource;
use sigmill::infrastructure::persistence::InMemorySignalStore;

const SYMBOL: &str = "BTCUSDT";
const T0: i64 = 600_000;

struct Scripted {
    drafts: std::sync::Mutex<VecDeque<SignalDraft>>,
}

impl Scripted {
    fn once(draft: SignalDraft) -> Arc<Self> {
        Arc::new(Self {
            drafts: std::sync::Mutex::new(VecDeque::from(vec![draft])),
        })
    }
}

#[async_trait]
impl Strategy for Scripted {
    async fn get_signal(
        &self,
        _symbol: &str,
        _now: i64,
        _market: &MarketView,
    ) -> anyhow::Result<Option<SignalDraft>> {
        Ok(self.drafts.lock().unwrap().pop_front())
    }
}

fn flat_candle(ts: i64, price: Decimal) -> Candle {
    Candle {
        timestamp: ts,
        open: price,
        high: price,
        low: price,
        close: price,
        volume: dec!(1),
    }
}

fn wide_candle(ts: i64, low: Decimal, high: Decimal, close: Decimal) -> Candle {
    Candle {
        timestamp: ts,
        open: close,
        high,
        low,
        close,
        volume: dec!(1),
    }
}

/// Ten minutes of flat history before T0 so the VWAP at T0 is `base`.
fn history(base: Decimal) -> Vec<Candle> {
    (0..10).map(|i| flat_candle(i * 60_000, base)).collect()
}

fn driver_for(candles: Vec<Candle>, draft: SignalDraft, frame_end: i64) -> Arc<BacktestDriver> {
    let deps = EngineDeps {
        config: Arc::new(EngineConfig::default()),
        candles: Arc::new(StaticCandleSource::new(candles)),
        store: Arc::new(InMemorySignalStore::new()),
        risk: Arc::new(NoRiskGate),
        bus: EventBus::new(),
    };
    let core = Arc::new(StrategyCore::new(
        SYMBOL,
        StrategySpec {
            strategy_name: "scenario".into(),
            exchange_name: "binance".into(),
            interval: SignalInterval::OneMin,
        },
        Scripted::once(draft) as Arc<dyn Strategy>,
        deps,
    ));
    let frame = Frame::from_millis(T0, frame_end, FrameInterval::OneMin).with_name("scenario");
    Arc::new(BacktestDriver::new(core, frame))
}

fn long_market_draft() -> SignalDraft {
    SignalDraft {
        position: Position::Long,
        price_take_profit: dec!(101000),
        price_stop_loss: dec!(99000),
        minute_estimated_time: 60,
        price_open: None,
        note: None,
        id: None,
    }
}

fn long_limit_draft() -> SignalDraft {
    SignalDraft {
        position: Position::Long,
        price_take_profit: dec!(100500),
        price_stop_loss: dec!(99000),
        minute_estimated_time: 60,
        price_open: Some(dec!(99500)),
        note: None,
        id: None,
    }
}

fn meaningful(results: &[TickResult]) -> Vec<&TickResult> {
    results.iter().filter(|r| r.kind() != "idle").collect()
}

#[tokio::test]
async fn e1_immediate_long_take_profit() {
    let mut candles = history(dec!(100000));
    candles.push(wide_candle(T0, dec!(99500), dec!(101500), dec!(100900)));
    let driver = driver_for(candles, long_market_draft(), T0 + 600_000);

    let results = driver.run().await.unwrap();
    let stream = meaningful(&results);
    assert_eq!(stream.len(), 2);

    match stream[0] {
        TickResult::Opened { signal, current_price } => {
            assert_eq!(signal.price_open, dec!(100000));
            assert_eq!(*current_price, dec!(100000));
        }
        other => panic!("expected opened, got {other:?}"),
    }
    match stream[1] {
        TickResult::Closed { close_reason, price_close, pnl, .. } => {
            assert_eq!(*close_reason, CloseReason::TakeProfit);
            assert_eq!(*price_close, dec!(101000));
            assert!((pnl.pnl_percentage - dec!(0.5968)).abs() < dec!(0.001));
            assert!(pnl.pnl_percentage > Decimal::ZERO);
        }
        other => panic!("expected closed, got {other:?}"),
    }
}

#[tokio::test]
async fn e2_immediate_long_stop_loss() {
    let mut candles = history(dec!(100000));
    candles.push(wide_candle(T0, dec!(98500), dec!(100200), dec!(98700)));
    let driver = driver_for(candles, long_market_draft(), T0 + 600_000);

    let results = driver.run().await.unwrap();
    let stream = meaningful(&results);
    assert_eq!(stream.len(), 2);
    assert_eq!(stream[0].kind(), "opened");
    match stream[1] {
        TickResult::Closed { close_reason, price_close, pnl, .. } => {
            assert_eq!(*close_reason, CloseReason::StopLoss);
            assert_eq!(*price_close, dec!(99000));
            assert!((pnl.pnl_percentage - dec!(-1.3952)).abs() < dec!(0.001));
        }
        other => panic!("expected closed, got {other:?}"),
    }
}

#[tokio::test]
async fn e3_scheduled_long_activates_then_take_profit() {
    let mut candles = history(dec!(100000));
    candles.push(flat_candle(T0, dec!(100000)));
    candles.push(wide_candle(T0 + 60_000, dec!(99400), dec!(99800), dec!(99600)));
    candles.push(wide_candle(T0 + 120_000, dec!(99700), dec!(100600), dec!(100400)));
    let driver = driver_for(candles, long_limit_draft(), T0 + 600_000);

    let results = driver.run().await.unwrap();
    let stream = meaningful(&results);
    assert_eq!(stream.len(), 3);

    assert_eq!(stream[0].kind(), "scheduled");
    match stream[1] {
        TickResult::Opened { signal, .. } => {
            assert_eq!(signal.scheduled_at, T0);
            assert_eq!(signal.pending_at, T0 + 120_000);
        }
        other => panic!("expected opened, got {other:?}"),
    }
    match stream[2] {
        TickResult::Closed { close_reason, close_timestamp, .. } => {
            assert_eq!(*close_reason, CloseReason::TakeProfit);
            assert_eq!(*close_timestamp, T0 + 120_000);
        }
        other => panic!("expected closed, got {other:?}"),
    }
}

#[tokio::test]
async fn e4_scheduled_long_cancelled_by_pre_activation_stop() {
    let mut candles = history(dec!(100000));
    candles.push(flat_candle(T0, dec!(100000)));
    candles.push(wide_candle(T0 + 60_000, dec!(98900), dec!(100000), dec!(99100)));
    let driver = driver_for(candles, long_limit_draft(), T0 + 600_000);

    let results = driver.run().await.unwrap();
    let stream = meaningful(&results);
    assert_eq!(stream.len(), 2);
    assert_eq!(stream[0].kind(), "scheduled");
    match stream[1] {
        TickResult::Cancelled { reason, close_timestamp, .. } => {
            assert_eq!(*reason, CancelReason::PreActivationStopLoss);
            assert_eq!(*close_timestamp, T0 + 60_000);
        }
        other => panic!("expected cancelled, got {other:?}"),
    }
    // No opened, no closed, no pnl anywhere in the stream
    assert!(results.iter().all(|r| !matches!(r, TickResult::Opened { .. })));
    assert!(results.iter().all(|r| !matches!(r, TickResult::Closed { .. })));
}

#[tokio::test]
async fn e5_scheduled_timeout_cancellation() {
    // Price hovers above the limit entry for the whole await window
    let mut candles = history(dec!(100000));
    for i in 0..135 {
        candles.push(flat_candle(T0 + i * 60_000, dec!(100000)));
    }
    let driver = driver_for(candles, long_limit_draft(), T0 + 8_000_000);

    let results = driver.run().await.unwrap();
    let stream = meaningful(&results);
    assert_eq!(stream.len(), 2);
    assert_eq!(stream[0].kind(), "scheduled");
    match stream[1] {
        TickResult::Cancelled { reason, close_timestamp, .. } => {
            assert_eq!(*reason, CancelReason::Timeout);
            assert_eq!(*close_timestamp, T0 + 7_200_000);
        }
        other => panic!("expected cancelled, got {other:?}"),
    }
}

#[tokio::test]
async fn backtest_runs_are_deterministic() {
    let mut candles = history(dec!(100000));
    candles.push(flat_candle(T0, dec!(100000)));
    candles.push(wide_candle(T0 + 60_000, dec!(99400), dec!(99800), dec!(99600)));
    candles.push(wide_candle(T0 + 120_000, dec!(99700), dec!(100600), dec!(100400)));

    let first = driver_for(candles.clone(), long_limit_draft(), T0 + 600_000)
        .run()
        .await
        .unwrap();
    let second = driver_for(candles, long_limit_draft(), T0 + 600_000)
        .run()
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn stream_consumer_can_stop_early() {
    let mut candles = history(dec!(100000));
    for i in 0..30 {
        candles.push(flat_candle(T0 + i * 60_000, dec!(100000)));
    }
    let driver = driver_for(candles, long_limit_draft(), T0 + 1_800_000);

    let mut rx = driver.stream();
    let first = rx.recv().await.expect("at least one result");
    assert_eq!(first.kind(), "scheduled");
    drop(rx);
    // Dropping the receiver is enough; the run aborts on its next send
    tokio::task::yield_now().await;
}
