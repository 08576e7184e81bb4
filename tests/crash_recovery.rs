//! Crash-safety of the file-backed store through the live strategy core:
//! a signal whose write returned success must survive a process crash and
//! resume monitoring without duplication.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::{Arc, Once};

use sigmill::application::context::ExecutionContext;
use sigmill::application::market_data::MarketView;
use sigmill::application::risk::RiskProfile;
use sigmill::application::strategy_core::{EngineDeps, Strategy, StrategyCore, StrategySpec};
use sigmill::config::EngineConfig;
use sigmill::domain::ports::{RiskGate, SignalStore};
use sigmill::domain::signal::{CloseReason, SignalDraft, TickResult};
use sigmill::domain::types::{Candle, Position, SignalInterval};
use sigmill::infrastructure::event_bus::EventBus;
use sigmill::infrastructure::mock::StaticCandleSource;
use sigmill::infrastructure::persistence::FileSignalStore;

const SYMBOL: &str = "BTCUSDT";

static INIT: Once = Once::new();

fn setup_logging() {
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

struct Scripted {
    drafts: std::sync::Mutex<VecDeque<SignalDraft>>,
}

impl Scripted {
    fn new(drafts: Vec<SignalDraft>) -> Arc<Self> {
        Arc::new(Self {
            drafts: std::sync::Mutex::new(drafts.into()),
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

fn stepped(total_min: i64, segments: &[(i64, Decimal)]) -> StaticCandleSource {
    let candles = (0..total_min)
        .map(|i| {
            let price = segments
                .iter()
                .rev()
                .find(|(from, _)| i >= *from)
                .map(|(_, p)| *p)
                .unwrap_or(dec!(100000));
            Candle {
                timestamp: i * 60_000,
                open: price,
                high: price,
                low: price,
                close: price,
                volume: dec!(1),
            }
        })
        .collect();
    StaticCandleSource::new(candles)
}

fn make_core(
    root: &std::path::Path,
    source: StaticCandleSource,
    gate: Arc<dyn RiskGate>,
    drafts: Vec<SignalDraft>,
) -> Arc<StrategyCore> {
    let deps = EngineDeps {
        config: Arc::new(EngineConfig::default()),
        candles: Arc::new(source),
        store: Arc::new(FileSignalStore::new(root)) as Arc<dyn SignalStore>,
        risk: gate,
        bus: EventBus::new(),
    };
    Arc::new(StrategyCore::new(
        SYMBOL,
        StrategySpec {
            strategy_name: "resilient".into(),
            exchange_name: "binance".into(),
            interval: SignalInterval::OneMin,
        },
        Scripted::new(drafts) as Arc<dyn Strategy>,
        deps,
    ))
}

async fn live_tick(core: &Arc<StrategyCore>, now: i64) -> TickResult {
    let ctx = ExecutionContext {
        symbol: SYMBOL.into(),
        now,
        is_backtest: false,
    };
    ExecutionContext::run(ctx, core.tick()).await.unwrap()
}

async fn live_init(core: &Arc<StrategyCore>, now: i64) {
    let ctx = ExecutionContext {
        symbol: SYMBOL.into(),
        now,
        is_backtest: false,
    };
    ExecutionContext::run(ctx, core.init()).await.unwrap()
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

#[tokio::test]
async fn active_signal_survives_crash_and_closes() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();

    // First process: open a position, then "crash" (drop everything)
    let source = stepped(40, &[(0, dec!(100000))]);
    let gate: Arc<dyn RiskGate> = Arc::new(RiskProfile::new("book"));
    let core = make_core(dir.path(), source, gate, vec![long_market_draft()]);
    let result = live_tick(&core, 600_000).await;
    assert_eq!(result.kind(), "opened");
    let opened_id = result.signal().unwrap().id.clone();
    drop(core);

    assert!(dir.path().join("signal/resilient/BTCUSDT.json").exists());

    // Second process: restore, monitor, hit the take profit
    let source = stepped(40, &[(0, dec!(100000)), (12, dec!(101500))]);
    let gate = Arc::new(RiskProfile::new("book"));
    let core = make_core(
        dir.path(),
        source,
        Arc::clone(&gate) as Arc<dyn RiskGate>,
        vec![],
    );
    live_init(&core, 660_000).await;
    assert!(core.has_active_signal().await);
    assert_eq!(gate.position_count().await, 1);

    let result = live_tick(&core, 1_080_000).await;
    match result {
        TickResult::Closed { signal, close_reason, .. } => {
            assert_eq!(signal.id, opened_id);
            assert_eq!(close_reason, CloseReason::TakeProfit);
        }
        other => panic!("expected closed, got {other:?}"),
    }
    assert_eq!(gate.position_count().await, 0);
    assert!(!dir.path().join("signal/resilient/BTCUSDT.json").exists());
}

#[tokio::test]
async fn scheduled_signal_survives_crash_and_activates() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();

    let source = stepped(40, &[(0, dec!(100000))]);
    let gate: Arc<dyn RiskGate> = Arc::new(RiskProfile::new("book"));
    let core = make_core(dir.path(), source, gate, vec![long_limit_draft()]);
    let result = live_tick(&core, 600_000).await;
    assert_eq!(result.kind(), "scheduled");
    drop(core);

    assert!(dir.path().join("schedule/resilient/BTCUSDT.json").exists());

    // Restart: the scheduled record is still waiting, then activates once
    // the price reaches the limit
    let source = stepped(40, &[(0, dec!(100000)), (15, dec!(99400))]);
    let gate: Arc<dyn RiskGate> = Arc::new(RiskProfile::new("book"));
    let core = make_core(dir.path(), source, gate, vec![]);
    live_init(&core, 660_000).await;
    assert!(core.has_scheduled_signal().await);
    assert!(!core.has_active_signal().await);

    let result = live_tick(&core, 1_260_000).await;
    match result {
        TickResult::Opened { signal, .. } => {
            assert_eq!(signal.scheduled_at, 600_000);
            assert_eq!(signal.pending_at, 1_260_000);
        }
        other => panic!("expected opened, got {other:?}"),
    }
    assert!(!dir.path().join("schedule/resilient/BTCUSDT.json").exists());
    assert!(dir.path().join("signal/resilient/BTCUSDT.json").exists());
}

#[tokio::test]
async fn restart_without_records_is_clean() {
    setup_logging();
    let dir = tempfile::tempdir().unwrap();
    let source = stepped(40, &[(0, dec!(100000))]);
    let gate: Arc<dyn RiskGate> = Arc::new(RiskProfile::new("book"));
    let core = make_core(dir.path(), source, gate, vec![]);
    live_init(&core, 600_000).await;
    assert!(!core.has_active_signal().await);
    assert!(!core.has_scheduled_signal().await);
    let result = live_tick(&core, 600_000).await;
    assert_eq!(result.kind(), "idle");
}
