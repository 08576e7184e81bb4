//! Backtest execution driver.
//!
//! Walks a frame of simulated timestamps, wrapping every strategy-core
//! invocation in the execution/method contexts. When a tick produces an
//! `opened` or `scheduled` result the driver hands raw 1-minute candles to
//! the core's fast path and skips the frame forward past the resolution, so
//! a 6-hour position does not cost 360 ticks of VWAP recomputation.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::context::{ExecutionContext, MethodContext};
use crate::application::frame::Frame;
use crate::application::strategy_core::StrategyCore;
use crate::domain::errors::EngineError;
use crate::domain::events::EngineEvent;
use crate::domain::signal::TickResult;
use crate::domain::types::CandleInterval;

pub struct BacktestDriver {
    core: Arc<StrategyCore>,
    frame: Frame,
    emit_done: bool,
}

impl BacktestDriver {
    pub fn new(core: Arc<StrategyCore>, frame: Frame) -> Self {
        Self {
            core,
            frame,
            emit_done: true,
        }
    }

    /// Suppresses the terminal `done` event; the walker emits its own.
    pub fn without_done_event(mut self) -> Self {
        self.emit_done = false;
        self
    }

    /// Runs the whole frame and returns the tick stream in order.
    pub async fn run(&self) -> Result<Vec<TickResult>, EngineError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.drive(tx).await?;
        let mut results = Vec::new();
        while let Ok(result) = rx.try_recv() {
            results.push(result);
        }
        Ok(results)
    }

    /// Streams results as they are produced. Dropping the receiver stops the
    /// run cleanly after the in-flight tick.
    pub fn stream(self: Arc<Self>) -> mpsc::UnboundedReceiver<TickResult> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            if let Err(e) = self.drive(tx).await {
                warn!(symbol = %self.core.symbol(), "backtest stream aborted: {e}");
            }
        });
        rx
    }

    async fn drive(&self, sink: mpsc::UnboundedSender<TickResult>) -> Result<(), EngineError> {
        let symbol = self.core.symbol().to_string();
        let spec = self.core.spec().clone();
        let config = Arc::clone(&self.core.deps().config);
        let bus = self.core.deps().bus.clone();
        info!(
            %symbol,
            strategy = %spec.strategy_name,
            frame = %spec_frame(&self.frame),
            "backtest started"
        );

        let mut skip_until: Option<i64> = None;
        for now in self.frame.timestamps() {
            if let Some(resume_after) = skip_until {
                if now <= resume_after {
                    continue;
                }
                skip_until = None;
            }

            let exec = ExecutionContext {
                symbol: symbol.clone(),
                now,
                is_backtest: true,
            };
            let method = MethodContext {
                strategy_name: spec.strategy_name.clone(),
                exchange_name: spec.exchange_name.clone(),
                frame_name: self.frame.name.clone(),
            };

            let result = ExecutionContext::run(
                exec.clone(),
                MethodContext::run(method.clone(), self.core.tick()),
            )
            .await?;

            self.emit_tick(&result).await;
            let fast_forward = matches!(
                result,
                TickResult::Opened { .. } | TickResult::Scheduled { .. }
            );
            let horizon = result
                .signal()
                .map(|s| fast_forward_horizon(&config, s.minute_estimated_time));
            if sink.send(result).is_err() {
                debug!(%symbol, "backtest consumer gone, stopping early");
                return Ok(());
            }

            if fast_forward {
                let limit = horizon.unwrap_or(0);
                let candles = match self
                    .core
                    .deps()
                    .candles
                    .get_candles(&symbol, CandleInterval::OneMin, now, limit)
                    .await
                {
                    Ok(candles) => candles,
                    Err(e) => {
                        bus.emit(EngineEvent::Error {
                            symbol: symbol.clone(),
                            strategy_name: spec.strategy_name.clone(),
                            method: "fast_forward_fetch".into(),
                            timestamp: now,
                            message: e.to_string(),
                        })
                        .await;
                        return Err(e);
                    }
                };

                let fast_results = ExecutionContext::run(
                    exec,
                    MethodContext::run(method, self.core.backtest(&candles)),
                )
                .await?;

                for fast in fast_results {
                    self.emit_tick(&fast).await;
                    if let Some(close_ts) = fast.close_timestamp() {
                        skip_until = Some(close_ts);
                    }
                    if sink.send(fast).is_err() {
                        debug!(%symbol, "backtest consumer gone, stopping early");
                        return Ok(());
                    }
                }
            }
        }

        if self.emit_done {
            bus.emit(EngineEvent::Done {
                timestamp: Utc::now().timestamp_millis(),
            })
            .await;
        }
        info!(%symbol, strategy = %spec.strategy_name, "backtest finished");
        Ok(())
    }

    async fn emit_tick(&self, result: &TickResult) {
        let spec = self.core.spec();
        self.core
            .deps()
            .bus
            .emit(EngineEvent::Tick {
                symbol: self.core.symbol().to_string(),
                strategy_name: spec.strategy_name.clone(),
                exchange_name: spec.exchange_name.clone(),
                result: result.clone(),
            })
            .await;
    }
}

/// Enough 1-minute candles to resolve the signal: the full schedule-await
/// window plus the estimated lifetime, with a small margin.
fn fast_forward_horizon(
    config: &crate::config::EngineConfig,
    minute_estimated_time: u64,
) -> usize {
    (config.schedule_await_minutes + minute_estimated_time + 2) as usize
}

fn spec_frame(frame: &Frame) -> String {
    frame.name.clone().unwrap_or_else(|| "unnamed".to_string())
}
