//! The per-(strategy, symbol) signal lifecycle state machine.
//!
//! One `StrategyCore` instance exclusively owns the active and scheduled
//! signal slots for its pair. All mutation happens under a single async
//! mutex, so each `tick()` runs to completion before the next starts; two
//! different pairs share nothing but the risk gate and the store.
//!
//! The same instance serves both execution modes. Live ticks persist every
//! state change before advancing memory, so the machine can always resume
//! from its last durable state after a crash. Backtest ticks skip the store
//! entirely and additionally get a `backtest(candles)` fast path that
//! resolves an open or scheduled signal against raw candle highs/lows
//! without walking the frame tick by tick.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::context::ExecutionContext;
use crate::application::market_data::MarketView;
use crate::config::EngineConfig;
use crate::domain::errors::EngineError;
use crate::domain::events::{EngineEvent, MilestoneKind};
use crate::domain::pnl::compute_pnl;
use crate::domain::ports::{CandleSource, RiskCheckArgs, RiskGate, SignalStore};
use crate::domain::signal::{
    CancelReason, CloseReason, Signal, SignalDraft, SignalRecord, SignalStatus, TickResult,
};
use crate::domain::types::{Candle, Position, SignalInterval};
use crate::domain::validation::validate_signal;
use crate::infrastructure::event_bus::EventBus;

/// User-supplied signal generator.
///
/// `market` is the only sanctioned data access: it resolves `symbol` and the
/// temporal horizon from the task-local execution context, so the callback
/// sees exactly the data available at the simulated or wall-clock `now` it
/// was invoked for.
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn get_signal(
        &self,
        symbol: &str,
        now: i64,
        market: &MarketView,
    ) -> anyhow::Result<Option<SignalDraft>>;
}

/// Everything a core shares with its siblings.
#[derive(Clone)]
pub struct EngineDeps {
    pub config: Arc<EngineConfig>,
    pub candles: Arc<dyn CandleSource>,
    pub store: Arc<dyn SignalStore>,
    pub risk: Arc<dyn RiskGate>,
    pub bus: EventBus,
}

/// Identity and cadence of one strategy registration.
#[derive(Debug, Clone)]
pub struct StrategySpec {
    pub strategy_name: String,
    pub exchange_name: String,
    pub interval: SignalInterval,
}

/// Take-profit/stop-loss adjustment bookkeeping for the current active
/// signal. Distances are the original ones at open time; trailing deltas
/// are expressed against them.
#[derive(Debug, Clone)]
struct TrailState {
    original_tp_distance: Decimal,
    original_sl_distance: Decimal,
    /// +1 extending, -1 pulling in; fixed by the first trailing_profit call.
    tp_direction: Option<i8>,
}

impl TrailState {
    fn seed(signal: &Signal) -> Self {
        Self {
            original_tp_distance: (signal.price_take_profit - signal.price_open).abs(),
            original_sl_distance: (signal.price_open - signal.price_stop_loss).abs(),
            tp_direction: None,
        }
    }
}

#[derive(Default)]
struct CoreState {
    active: Option<Signal>,
    scheduled: Option<Signal>,
    last_attempt: Option<i64>,
    stopped: bool,
    initialized: bool,
    trail: Option<TrailState>,
    fired_profit_milestones: HashSet<usize>,
    fired_loss_milestones: HashSet<usize>,
}

impl CoreState {
    fn arm_active(&mut self, signal: Signal) {
        self.trail = Some(TrailState::seed(&signal));
        self.fired_profit_milestones.clear();
        self.fired_loss_milestones.clear();
        self.active = Some(signal);
    }

    fn disarm_active(&mut self) {
        self.active = None;
        self.trail = None;
        self.fired_profit_milestones.clear();
        self.fired_loss_milestones.clear();
    }
}

pub struct StrategyCore {
    symbol: String,
    spec: StrategySpec,
    strategy: Arc<dyn Strategy>,
    market: MarketView,
    deps: EngineDeps,
    state: Mutex<CoreState>,
}

impl StrategyCore {
    pub fn new(symbol: impl Into<String>, spec: StrategySpec, strategy: Arc<dyn Strategy>, deps: EngineDeps) -> Self {
        let market = MarketView::new(Arc::clone(&deps.candles), deps.config.vwap_window);
        Self {
            symbol: symbol.into(),
            spec,
            strategy,
            market,
            deps,
            state: Mutex::new(CoreState::default()),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn strategy_name(&self) -> &str {
        &self.spec.strategy_name
    }

    pub fn market(&self) -> &MarketView {
        &self.market
    }

    pub fn spec(&self) -> &StrategySpec {
        &self.spec
    }

    pub fn deps(&self) -> &EngineDeps {
        &self.deps
    }

    /// Restores durable state. Runs at most once per instance; a no-op in
    /// backtest mode. Restored actives are re-registered with the risk gate
    /// and surface one `active` event so listeners learn about them.
    pub async fn init(&self) -> Result<(), EngineError> {
        let ctx = ExecutionContext::current()?;
        let mut state = self.state.lock().await;
        if state.initialized {
            return Ok(());
        }
        state.initialized = true;
        if ctx.is_backtest {
            return Ok(());
        }

        if let Some(record) = self
            .deps
            .store
            .read_active(&self.spec.strategy_name, &self.symbol)
            .await?
        {
            info!(
                symbol = %self.symbol,
                strategy = %self.spec.strategy_name,
                id = %record.signal.id,
                "restored active signal from store"
            );
            state.arm_active(record.signal.clone());
            self.deps
                .risk
                .add_signal(&self.spec.strategy_name, &self.symbol)
                .await;
            match self.market.average_price().await {
                Ok(price) => {
                    let signal = record.signal;
                    let result = TickResult::Active {
                        progress_take_profit_pct: signal.progress_take_profit_pct(price),
                        progress_stop_loss_pct: signal.progress_stop_loss_pct(price),
                        signal,
                        current_price: price,
                    };
                    self.emit_tick(&result).await;
                }
                Err(e) => {
                    warn!(symbol = %self.symbol, "no price available while restoring: {e}");
                }
            }
        }

        if let Some(record) = self
            .deps
            .store
            .read_scheduled(&self.spec.strategy_name, &self.symbol)
            .await?
        {
            // A crash between the schedule-namespace delete and the active
            // write can leave both records; the active copy wins.
            if state.active.as_ref().map(|s| s.id.as_str()) == Some(record.signal.id.as_str()) {
                self.deps
                    .store
                    .write_scheduled(&self.spec.strategy_name, &self.symbol, None)
                    .await?;
            } else {
                info!(
                    symbol = %self.symbol,
                    strategy = %self.spec.strategy_name,
                    id = %record.signal.id,
                    "restored scheduled signal from store"
                );
                state.scheduled = Some(record.signal);
            }
        }

        Ok(())
    }

    /// One evaluation of the state machine at the context's `now`.
    ///
    /// User-code and data failures are contained: they surface on the error
    /// channel and the tick resolves to `idle` with no state change.
    pub async fn tick(&self) -> Result<TickResult, EngineError> {
        let ctx = ExecutionContext::current()?;
        let mut state = self.state.lock().await;
        let now = ctx.now;

        if state.stopped && state.active.is_none() && state.scheduled.is_none() {
            return Ok(TickResult::Idle { current_price: None });
        }

        if state.active.is_some() {
            let price = match self.market.average_price().await {
                Ok(price) => price,
                Err(e) => return Ok(self.contain("monitor_active", now, e).await),
            };
            return self.monitor_active(&mut state, ctx.is_backtest, now, price).await;
        }

        if state.scheduled.is_some() {
            let price = match self.market.average_price().await {
                Ok(price) => price,
                Err(e) => return Ok(self.contain("monitor_scheduled", now, e).await),
            };
            return self
                .monitor_scheduled(&mut state, ctx.is_backtest, now, price)
                .await;
        }

        if state.stopped {
            return Ok(TickResult::Idle { current_price: None });
        }

        // Idle: throttle signal generation to the configured interval
        if let Some(last) = state.last_attempt {
            if now - last < self.spec.interval.as_millis() {
                return Ok(TickResult::Idle { current_price: None });
            }
        }
        state.last_attempt = Some(now);

        let price = match self.market.average_price().await {
            Ok(price) => price,
            Err(e) => return Ok(self.contain("get_signal", now, e).await),
        };

        let budget = Duration::from_secs(self.deps.config.max_signal_generation_seconds);
        let draft = match tokio::time::timeout(
            budget,
            self.strategy.get_signal(&self.symbol, now, &self.market),
        )
        .await
        {
            Err(_) => {
                let err = EngineError::GenerationTimeout {
                    budget_secs: self.deps.config.max_signal_generation_seconds,
                };
                return Ok(self.contain("get_signal", now, err).await);
            }
            Ok(Err(e)) => {
                let err = EngineError::InvalidSignal(format!("get_signal failed: {e}"));
                return Ok(self.contain("get_signal", now, err).await);
            }
            Ok(Ok(None)) => return Ok(TickResult::Idle { current_price: Some(price) }),
            Ok(Ok(Some(draft))) => draft,
        };

        self.open_or_schedule(&mut state, ctx.is_backtest, now, price, draft)
            .await
    }

    /// Validation, risk admission and the market/limit branch of a fresh
    /// draft.
    async fn open_or_schedule(
        &self,
        state: &mut CoreState,
        is_backtest: bool,
        now: i64,
        current_price: Decimal,
        draft: SignalDraft,
    ) -> Result<TickResult, EngineError> {
        let has_limit_price = draft.price_open.is_some();
        let price_open = draft.price_open.unwrap_or(current_price);

        let mut signal = Signal {
            id: self.assign_id(draft.id, is_backtest, now),
            symbol: self.symbol.clone(),
            strategy_name: self.spec.strategy_name.clone(),
            exchange_name: self.spec.exchange_name.clone(),
            position: draft.position,
            price_open,
            price_take_profit: draft.price_take_profit,
            price_stop_loss: draft.price_stop_loss,
            minute_estimated_time: draft.minute_estimated_time,
            scheduled_at: now,
            pending_at: now,
            is_scheduled: false,
            note: draft.note,
        };

        let opens_immediately = !has_limit_price || signal.activation_reached(current_price);
        signal.is_scheduled = !opens_immediately;

        if let Err(e) = validate_signal(
            &signal,
            current_price,
            !opens_immediately,
            &self.deps.config.validation_limits(),
        ) {
            return Ok(self.contain("validate", now, e).await);
        }

        let args = RiskCheckArgs {
            signal: &signal,
            symbol: &self.symbol,
            strategy_name: &self.spec.strategy_name,
            current_price,
            timestamp: now,
            active_positions: self.deps.risk.position_count().await,
        };
        if let Err(e) = self.deps.risk.check_signal(&args).await {
            return Ok(self.contain("risk_check", now, e).await);
        }

        if opens_immediately {
            if !is_backtest {
                let record = SignalRecord::new(signal.clone(), SignalStatus::Opened, now);
                if let Err(e) = self
                    .deps
                    .store
                    .write_active(&self.spec.strategy_name, &self.symbol, Some(&record))
                    .await
                {
                    return Ok(self.contain("persist_open", now, e).await);
                }
            }
            state.arm_active(signal.clone());
            self.deps
                .risk
                .add_signal(&self.spec.strategy_name, &self.symbol)
                .await;
            info!(
                symbol = %self.symbol,
                strategy = %self.spec.strategy_name,
                id = %signal.id,
                position = %signal.position,
                price_open = %signal.price_open,
                "signal opened"
            );
            Ok(TickResult::Opened { signal, current_price })
        } else {
            if !is_backtest {
                let record = SignalRecord::new(signal.clone(), SignalStatus::Scheduled, now);
                if let Err(e) = self
                    .deps
                    .store
                    .write_scheduled(&self.spec.strategy_name, &self.symbol, Some(&record))
                    .await
                {
                    return Ok(self.contain("persist_schedule", now, e).await);
                }
            }
            state.scheduled = Some(signal.clone());
            info!(
                symbol = %self.symbol,
                strategy = %self.spec.strategy_name,
                id = %signal.id,
                price_open = %signal.price_open,
                "signal scheduled, awaiting entry price"
            );
            Ok(TickResult::Scheduled { signal, current_price })
        }
    }

    /// Scheduled-slot monitoring: timeout, then pre-activation stop loss,
    /// then activation. The stop-loss check strictly precedes activation so
    /// a price that crosses both cancels rather than opens.
    async fn monitor_scheduled(
        &self,
        state: &mut CoreState,
        is_backtest: bool,
        now: i64,
        current_price: Decimal,
    ) -> Result<TickResult, EngineError> {
        let signal = state.scheduled.clone().expect("scheduled slot checked by caller");

        if now - signal.scheduled_at >= self.deps.config.schedule_await_ms() {
            return self
                .cancel_scheduled_slot(state, is_backtest, signal, now, current_price, CancelReason::Timeout)
                .await;
        }

        if signal.hits_stop_loss(current_price) {
            return self
                .cancel_scheduled_slot(
                    state,
                    is_backtest,
                    signal,
                    now,
                    current_price,
                    CancelReason::PreActivationStopLoss,
                )
                .await;
        }

        if signal.activation_reached(current_price) {
            let args = RiskCheckArgs {
                signal: &signal,
                symbol: &self.symbol,
                strategy_name: &self.spec.strategy_name,
                current_price,
                timestamp: now,
                active_positions: self.deps.risk.position_count().await,
            };
            if let Err(e) = self.deps.risk.check_signal(&args).await {
                self.emit_error("risk_check", now, &e).await;
                return self
                    .cancel_scheduled_slot(
                        state,
                        is_backtest,
                        signal,
                        now,
                        current_price,
                        CancelReason::RiskRejected,
                    )
                    .await;
            }

            let mut activated = signal;
            // The actual activation time; the estimated lifetime starts here,
            // not at creation
            activated.pending_at = now;

            if !is_backtest {
                if let Err(e) = self
                    .deps
                    .store
                    .write_scheduled(&self.spec.strategy_name, &self.symbol, None)
                    .await
                {
                    return Ok(self.contain("persist_activation", now, e).await);
                }
                let record = SignalRecord::new(activated.clone(), SignalStatus::Opened, now);
                if let Err(e) = self
                    .deps
                    .store
                    .write_active(&self.spec.strategy_name, &self.symbol, Some(&record))
                    .await
                {
                    return Ok(self.contain("persist_activation", now, e).await);
                }
            }

            state.scheduled = None;
            state.arm_active(activated.clone());
            self.deps
                .risk
                .add_signal(&self.spec.strategy_name, &self.symbol)
                .await;
            info!(
                symbol = %self.symbol,
                strategy = %self.spec.strategy_name,
                id = %activated.id,
                pending_at = activated.pending_at,
                "scheduled signal activated"
            );
            return Ok(TickResult::Opened { signal: activated, current_price });
        }

        Ok(TickResult::Scheduled { signal, current_price })
    }

    /// Active-slot monitoring in strict order: time expiration, take profit,
    /// stop loss.
    async fn monitor_active(
        &self,
        state: &mut CoreState,
        is_backtest: bool,
        now: i64,
        current_price: Decimal,
    ) -> Result<TickResult, EngineError> {
        let signal = state.active.clone().expect("active slot checked by caller");

        if now >= signal.expires_at() {
            return self
                .close_active_slot(state, is_backtest, signal, current_price, CloseReason::TimeExpired, now)
                .await;
        }
        if signal.hits_take_profit(current_price) {
            let price_close = signal.price_take_profit;
            return self
                .close_active_slot(state, is_backtest, signal, price_close, CloseReason::TakeProfit, now)
                .await;
        }
        if signal.hits_stop_loss(current_price) {
            let price_close = signal.price_stop_loss;
            return self
                .close_active_slot(state, is_backtest, signal, price_close, CloseReason::StopLoss, now)
                .await;
        }

        self.fire_milestones(state, &signal, current_price, now).await;

        Ok(TickResult::Active {
            progress_take_profit_pct: signal.progress_take_profit_pct(current_price),
            progress_stop_loss_pct: signal.progress_stop_loss_pct(current_price),
            signal,
            current_price,
        })
    }

    /// Fast-forwards an open or scheduled signal through raw 1-minute
    /// candles. Returns every result produced, in order; the last one is
    /// terminal iff the signal resolved within the batch.
    ///
    /// Conventions: a candle activating a scheduled signal sets
    /// `pending_at` to the next minute boundary and take-profit/stop-loss
    /// evaluation starts on the following candle; a candle spanning both
    /// take profit and stop loss closes at the take profit.
    pub async fn backtest(&self, candles: &[Candle]) -> Result<Vec<TickResult>, EngineError> {
        let _ctx = ExecutionContext::current()?;
        let mut state = self.state.lock().await;
        let mut results = Vec::new();

        for candle in candles {
            if let Some(signal) = state.scheduled.clone() {
                if candle.timestamp - signal.scheduled_at >= self.deps.config.schedule_await_ms() {
                    state.scheduled = None;
                    results.push(TickResult::Cancelled {
                        signal,
                        current_price: candle.close,
                        close_timestamp: candle.timestamp,
                        reason: CancelReason::Timeout,
                    });
                    break;
                }

                // Activation and stop-loss probes read the candle extreme in
                // the adverse direction; stop loss wins when both trigger
                let probe = match signal.position {
                    Position::Long => candle.low,
                    Position::Short => candle.high,
                };
                if signal.hits_stop_loss(probe) {
                    state.scheduled = None;
                    results.push(TickResult::Cancelled {
                        signal,
                        current_price: candle.close,
                        close_timestamp: candle.timestamp,
                        reason: CancelReason::PreActivationStopLoss,
                    });
                    break;
                }
                if signal.activation_reached(probe) {
                    let args = RiskCheckArgs {
                        signal: &signal,
                        symbol: &self.symbol,
                        strategy_name: &self.spec.strategy_name,
                        current_price: signal.price_open,
                        timestamp: candle.timestamp,
                        active_positions: self.deps.risk.position_count().await,
                    };
                    if let Err(e) = self.deps.risk.check_signal(&args).await {
                        self.emit_error("risk_check", candle.timestamp, &e).await;
                        state.scheduled = None;
                        results.push(TickResult::Cancelled {
                            signal,
                            current_price: candle.close,
                            close_timestamp: candle.timestamp,
                            reason: CancelReason::RiskRejected,
                        });
                        break;
                    }
                    let mut activated = signal;
                    // Next minute boundary: the position gets no credit for
                    // activity inside the activation candle
                    activated.pending_at = candle.timestamp + 60_000;
                    state.scheduled = None;
                    state.arm_active(activated.clone());
                    self.deps
                        .risk
                        .add_signal(&self.spec.strategy_name, &self.symbol)
                        .await;
                    results.push(TickResult::Opened {
                        signal: activated,
                        current_price: candle.close,
                    });
                    continue;
                }
                continue;
            }

            if let Some(signal) = state.active.clone() {
                if candle.timestamp < signal.pending_at {
                    continue;
                }
                let (tp_probe, sl_probe) = match signal.position {
                    Position::Long => (candle.high, candle.low),
                    Position::Short => (candle.low, candle.high),
                };
                let hits_tp = signal.hits_take_profit(tp_probe);
                let hits_sl = signal.hits_stop_loss(sl_probe);

                if hits_tp {
                    // Take profit wins when one candle spans both levels
                    let price_close = signal.price_take_profit;
                    let result = self
                        .close_active_slot(
                            &mut state,
                            true,
                            signal,
                            price_close,
                            CloseReason::TakeProfit,
                            candle.timestamp,
                        )
                        .await?;
                    results.push(result);
                    break;
                }
                if hits_sl {
                    let price_close = signal.price_stop_loss;
                    let result = self
                        .close_active_slot(
                            &mut state,
                            true,
                            signal,
                            price_close,
                            CloseReason::StopLoss,
                            candle.timestamp,
                        )
                        .await?;
                    results.push(result);
                    break;
                }
                if candle.timestamp >= signal.expires_at() {
                    let result = self
                        .close_active_slot(
                            &mut state,
                            true,
                            signal,
                            candle.close,
                            CloseReason::TimeExpired,
                            candle.timestamp,
                        )
                        .await?;
                    results.push(result);
                    break;
                }
                continue;
            }

            break;
        }

        Ok(results)
    }

    // ----- manual control operations, callable from strategy code -----

    /// Stops new signal generation. Existing signals continue to be
    /// monitored to completion.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.stopped = true;
        info!(symbol = %self.symbol, strategy = %self.spec.strategy_name, "strategy stopped");
    }

    pub async fn is_stopped(&self) -> bool {
        self.state.lock().await.stopped
    }

    pub async fn has_active_signal(&self) -> bool {
        self.state.lock().await.active.is_some()
    }

    pub async fn has_scheduled_signal(&self) -> bool {
        self.state.lock().await.scheduled.is_some()
    }

    /// Cancels a waiting scheduled signal, if any. Emits the `cancelled`
    /// result on the bus and returns it.
    pub async fn cancel_scheduled(&self) -> Result<Option<TickResult>, EngineError> {
        let ctx = ExecutionContext::current()?;
        let mut state = self.state.lock().await;
        let Some(signal) = state.scheduled.clone() else {
            return Ok(None);
        };
        let current_price = self
            .market
            .average_price()
            .await
            .unwrap_or(signal.price_open);
        let result = self
            .cancel_scheduled_slot(
                &mut state,
                ctx.is_backtest,
                signal,
                ctx.now,
                current_price,
                CancelReason::ManualCancel,
            )
            .await?;
        self.emit_tick(&result).await;
        Ok(Some(result))
    }

    /// Records a partial-profit milestone without touching the signal.
    pub async fn partial_profit(&self, pct: Decimal) -> Result<(), EngineError> {
        let ctx = ExecutionContext::current()?;
        self.emit_milestone(MilestoneKind::PartialProfit, pct, ctx.now).await;
        Ok(())
    }

    /// Records a partial-loss milestone without touching the signal.
    pub async fn partial_loss(&self, pct: Decimal) -> Result<(), EngineError> {
        let ctx = ExecutionContext::current()?;
        self.emit_milestone(MilestoneKind::PartialLoss, pct, ctx.now).await;
        Ok(())
    }

    /// Moves the stop loss by `delta_pct` percent of the original
    /// entry-to-stop distance, toward the current price only. Returns
    /// whether the move was applied.
    pub async fn trailing_stop(&self, delta_pct: Decimal) -> Result<bool, EngineError> {
        let ctx = ExecutionContext::current()?;
        let mut state = self.state.lock().await;
        let (Some(signal), Some(trail)) = (state.active.clone(), state.trail.clone()) else {
            return Ok(false);
        };
        let price = self.market.average_price().await?;
        let step = trail.original_sl_distance * delta_pct / Decimal::ONE_HUNDRED;
        let candidate = match signal.position {
            Position::Long => signal.price_stop_loss + step,
            Position::Short => signal.price_stop_loss - step,
        };
        let toward_price_and_safe = match signal.position {
            Position::Long => candidate > signal.price_stop_loss && candidate < price,
            Position::Short => candidate < signal.price_stop_loss && candidate > price,
        };
        if !toward_price_and_safe {
            debug!(symbol = %self.symbol, %candidate, "trailing stop rejected");
            return Ok(false);
        }
        let mut updated = signal;
        updated.price_stop_loss = candidate;
        self.rewrite_active(&mut state, ctx.is_backtest, updated, ctx.now).await?;
        Ok(true)
    }

    /// Moves the take profit by `delta_pct` percent of the original
    /// entry-to-target distance. The first call fixes the direction; later
    /// calls must keep moving the same way. Returns whether the move was
    /// applied.
    pub async fn trailing_profit(&self, delta_pct: Decimal) -> Result<bool, EngineError> {
        let ctx = ExecutionContext::current()?;
        let mut state = self.state.lock().await;
        let (Some(signal), Some(trail)) = (state.active.clone(), state.trail.clone()) else {
            return Ok(false);
        };
        if delta_pct.is_zero() {
            return Ok(false);
        }
        let direction: i8 = if delta_pct > Decimal::ZERO { 1 } else { -1 };
        if let Some(fixed) = trail.tp_direction {
            if fixed != direction {
                debug!(symbol = %self.symbol, "trailing profit direction reversal rejected");
                return Ok(false);
            }
        }
        let step = trail.original_tp_distance * delta_pct / Decimal::ONE_HUNDRED;
        let candidate = match signal.position {
            Position::Long => signal.price_take_profit + step,
            Position::Short => signal.price_take_profit - step,
        };
        // The target must stay on the profitable side of the entry
        let keeps_ordering = match signal.position {
            Position::Long => candidate > signal.price_open,
            Position::Short => candidate < signal.price_open,
        };
        if !keeps_ordering {
            return Ok(false);
        }
        let mut updated = signal;
        updated.price_take_profit = candidate;
        if let Some(trail) = state.trail.as_mut() {
            trail.tp_direction = Some(direction);
        }
        self.rewrite_active(&mut state, ctx.is_backtest, updated, ctx.now).await?;
        Ok(true)
    }

    /// Moves the stop loss to the entry price once the trade is in profit by
    /// at least twice the per-side round-trip cost. Returns whether the move
    /// was applied.
    pub async fn breakeven(&self) -> Result<bool, EngineError> {
        let ctx = ExecutionContext::current()?;
        let mut state = self.state.lock().await;
        let Some(signal) = state.active.clone() else {
            return Ok(false);
        };
        let price = self.market.average_price().await?;
        let cushion = (self.deps.config.slippage_pct + self.deps.config.fee_pct)
            * Decimal::from(2)
            / Decimal::ONE_HUNDRED;
        let cleared = match signal.position {
            Position::Long => price >= signal.price_open * (Decimal::ONE + cushion),
            Position::Short => price <= signal.price_open * (Decimal::ONE - cushion),
        };
        if !cleared || signal.price_stop_loss == signal.price_open {
            return Ok(false);
        }
        let mut updated = signal;
        updated.price_stop_loss = updated.price_open;
        self.rewrite_active(&mut state, ctx.is_backtest, updated, ctx.now).await?;
        Ok(true)
    }

    // ----- internals -----

    fn assign_id(&self, draft_id: Option<String>, is_backtest: bool, scheduled_at: i64) -> String {
        if let Some(id) = draft_id {
            return id;
        }
        if is_backtest {
            // Deterministic ids keep two identical backtest runs
            // byte-identical
            format!("{}-{}-{}", self.spec.strategy_name, self.symbol, scheduled_at)
        } else {
            Uuid::new_v4().to_string()
        }
    }

    async fn cancel_scheduled_slot(
        &self,
        state: &mut CoreState,
        is_backtest: bool,
        signal: Signal,
        now: i64,
        current_price: Decimal,
        reason: CancelReason,
    ) -> Result<TickResult, EngineError> {
        if !is_backtest {
            if let Err(e) = self
                .deps
                .store
                .write_scheduled(&self.spec.strategy_name, &self.symbol, None)
                .await
            {
                return Ok(self.contain("persist_cancel", now, e).await);
            }
        }
        state.scheduled = None;
        info!(
            symbol = %self.symbol,
            strategy = %self.spec.strategy_name,
            id = %signal.id,
            %reason,
            "scheduled signal cancelled"
        );
        Ok(TickResult::Cancelled {
            signal,
            current_price,
            close_timestamp: now,
            reason,
        })
    }

    async fn close_active_slot(
        &self,
        state: &mut CoreState,
        is_backtest: bool,
        signal: Signal,
        price_close: Decimal,
        close_reason: CloseReason,
        now: i64,
    ) -> Result<TickResult, EngineError> {
        if !is_backtest {
            if let Err(e) = self
                .deps
                .store
                .write_active(&self.spec.strategy_name, &self.symbol, None)
                .await
            {
                return Ok(self.contain("persist_close", now, e).await);
            }
        }
        state.disarm_active();
        self.deps
            .risk
            .remove_signal(&self.spec.strategy_name, &self.symbol)
            .await;
        let pnl = compute_pnl(
            signal.position,
            signal.price_open,
            price_close,
            self.deps.config.slippage_pct,
            self.deps.config.fee_pct,
        );
        info!(
            symbol = %self.symbol,
            strategy = %self.spec.strategy_name,
            id = %signal.id,
            %close_reason,
            %price_close,
            pnl_pct = %pnl.pnl_percentage,
            "signal closed"
        );
        Ok(TickResult::Closed {
            signal,
            price_close,
            close_reason,
            close_timestamp: now,
            pnl,
        })
    }

    /// Persists then applies an adjusted active signal.
    async fn rewrite_active(
        &self,
        state: &mut CoreState,
        is_backtest: bool,
        updated: Signal,
        now: i64,
    ) -> Result<(), EngineError> {
        if !is_backtest {
            let record = SignalRecord::new(updated.clone(), SignalStatus::Opened, now).touched(now);
            self.deps
                .store
                .write_active(&self.spec.strategy_name, &self.symbol, Some(&record))
                .await?;
        }
        state.active = Some(updated);
        Ok(())
    }

    async fn fire_milestones(
        &self,
        state: &mut CoreState,
        signal: &Signal,
        current_price: Decimal,
        now: i64,
    ) {
        let tp_progress = signal.progress_take_profit_pct(current_price);
        let sl_progress = signal.progress_stop_loss_pct(current_price);
        let thresholds = self.deps.config.milestone_pcts.clone();
        for (i, threshold) in thresholds.iter().enumerate() {
            if tp_progress >= *threshold && state.fired_profit_milestones.insert(i) {
                self.emit_milestone(MilestoneKind::PartialProfit, *threshold, now).await;
            }
            if sl_progress >= *threshold && state.fired_loss_milestones.insert(i) {
                self.emit_milestone(MilestoneKind::PartialLoss, *threshold, now).await;
            }
        }
    }

    /// Logs, emits on the error channel and resolves the tick to idle.
    async fn contain(&self, method: &str, now: i64, err: EngineError) -> TickResult {
        error!(
            symbol = %self.symbol,
            strategy = %self.spec.strategy_name,
            method,
            "tick error: {err}"
        );
        self.emit_error(method, now, &err).await;
        TickResult::Idle { current_price: None }
    }

    async fn emit_error(&self, method: &str, now: i64, err: &EngineError) {
        self.deps
            .bus
            .emit(EngineEvent::Error {
                symbol: self.symbol.clone(),
                strategy_name: self.spec.strategy_name.clone(),
                method: method.to_string(),
                timestamp: now,
                message: err.to_string(),
            })
            .await;
    }

    async fn emit_milestone(&self, kind: MilestoneKind, pct: Decimal, now: i64) {
        self.deps
            .bus
            .emit(EngineEvent::Milestone {
                symbol: self.symbol.clone(),
                strategy_name: self.spec.strategy_name.clone(),
                kind,
                pct,
                timestamp: now,
            })
            .await;
    }

    async fn emit_tick(&self, result: &TickResult) {
        self.deps
            .bus
            .emit(EngineEvent::Tick {
                symbol: self.symbol.clone(),
                strategy_name: self.spec.strategy_name.clone(),
                exchange_name: self.spec.exchange_name.clone(),
                result: result.clone(),
            })
            .await;
    }
}
