//! Live execution driver.
//!
//! An infinite tick loop against the wall clock: restore durable state,
//! then evaluate the core once per tick interval until cancelled. With
//! `graceful_close_open` the driver stops generating new signals on cancel
//! but keeps monitoring until the active signal closes, bounded by the
//! configured hard timeout.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::application::context::{ExecutionContext, MethodContext};
use crate::application::strategy_core::StrategyCore;
use crate::domain::errors::EngineError;
use crate::domain::events::EngineEvent;
use crate::domain::signal::TickResult;

/// Cancels the loop from outside; cheap to clone.
#[derive(Clone)]
pub struct LiveHandle {
    cancel: watch::Sender<bool>,
}

impl LiveHandle {
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }
}

pub struct LiveDriver {
    core: Arc<StrategyCore>,
    graceful_close_open: bool,
    cancel_rx: watch::Receiver<bool>,
}

impl LiveDriver {
    pub fn new(core: Arc<StrategyCore>, graceful_close_open: bool) -> (Self, LiveHandle) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (
            Self {
                core,
                graceful_close_open,
                cancel_rx,
            },
            LiveHandle { cancel: cancel_tx },
        )
    }

    pub async fn run(&self) -> Result<(), EngineError> {
        let symbol = self.core.symbol().to_string();
        let spec = self.core.spec().clone();
        let config = Arc::clone(&self.core.deps().config);
        let bus = self.core.deps().bus.clone();
        let tick_interval = Duration::from_millis(config.tick_interval_ms);
        let mut cancel_rx = self.cancel_rx.clone();

        // Restore any durable state before the first tick
        let init = self
            .in_contexts(&symbol, &spec.strategy_name, &spec.exchange_name, self.core.init())
            .await;
        if let Err(e) = init {
            error!(%symbol, strategy = %spec.strategy_name, "init failed: {e}");
            bus.emit(EngineEvent::Exit {
                message: format!("init failed: {e}"),
                timestamp: Utc::now().timestamp_millis(),
            })
            .await;
            return Err(e);
        }
        info!(%symbol, strategy = %spec.strategy_name, "live driver started");

        let mut cancel_deadline: Option<Instant> = None;

        loop {
            if *cancel_rx.borrow() {
                if cancel_deadline.is_none() {
                    // First observation of the cancel: stop generating and,
                    // unless asked to drain the open signal, leave now
                    self.core.stop().await;
                    if !self.graceful_close_open {
                        break;
                    }
                    cancel_deadline = Some(
                        Instant::now() + Duration::from_millis(config.graceful_close_timeout_ms),
                    );
                }
                if !self.core.has_active_signal().await {
                    break;
                }
                if let Some(deadline) = cancel_deadline {
                    if Instant::now() >= deadline {
                        warn!(
                            %symbol,
                            strategy = %spec.strategy_name,
                            "graceful close timed out with signal still active"
                        );
                        break;
                    }
                }
            }

            let result = self
                .in_contexts(&symbol, &spec.strategy_name, &spec.exchange_name, self.core.tick())
                .await?;
            bus.emit(EngineEvent::Tick {
                symbol: symbol.clone(),
                strategy_name: spec.strategy_name.clone(),
                exchange_name: spec.exchange_name.clone(),
                result: result.clone(),
            })
            .await;

            if *cancel_rx.borrow()
                && matches!(result, TickResult::Closed { .. })
                && !self.core.has_active_signal().await
            {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(tick_interval) => {}
                _ = cancel_rx.changed() => {}
            }
        }

        bus.emit(EngineEvent::Done {
            timestamp: Utc::now().timestamp_millis(),
        })
        .await;
        info!(%symbol, strategy = %spec.strategy_name, "live driver stopped");
        Ok(())
    }

    async fn in_contexts<T>(
        &self,
        symbol: &str,
        strategy_name: &str,
        exchange_name: &str,
        fut: impl Future<Output = T>,
    ) -> T {
        let exec = ExecutionContext {
            symbol: symbol.to_string(),
            now: Utc::now().timestamp_millis(),
            is_backtest: false,
        };
        let method = MethodContext {
            strategy_name: strategy_name.to_string(),
            exchange_name: exchange_name.to_string(),
            frame_name: None,
        };
        ExecutionContext::run(exec, MethodContext::run(method, fut)).await
    }
}
