//! Walker: sequential multi-strategy backtests over one frame, ranked.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::application::drivers::backtest::BacktestDriver;
use crate::application::frame::Frame;
use crate::application::stats::{TradeStats, WalkerMetric};
use crate::application::strategy_core::{EngineDeps, Strategy, StrategyCore, StrategySpec};
use crate::domain::errors::EngineError;
use crate::domain::events::EngineEvent;

pub struct WalkerEntry {
    pub spec: StrategySpec,
    pub strategy: Arc<dyn Strategy>,
}

/// Ranking of every strategy walked, best first.
#[derive(Debug, Clone)]
pub struct WalkerReport {
    pub metric: WalkerMetric,
    pub ranked: Vec<TradeStats>,
}

impl WalkerReport {
    pub fn best(&self) -> Option<&TradeStats> {
        self.ranked.first()
    }
}

pub struct WalkerDriver {
    symbol: String,
    frame: Frame,
    entries: Vec<WalkerEntry>,
    metric: WalkerMetric,
    deps: EngineDeps,
}

impl WalkerDriver {
    pub fn new(
        symbol: impl Into<String>,
        frame: Frame,
        entries: Vec<WalkerEntry>,
        metric: WalkerMetric,
        deps: EngineDeps,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            frame,
            entries,
            metric,
            deps,
        }
    }

    /// Backtests every strategy on the same symbol/frame, one after another,
    /// each on a fresh core so no lifecycle state leaks between runs.
    pub async fn run(&self) -> Result<WalkerReport, EngineError> {
        let mut ranked = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            info!(
                symbol = %self.symbol,
                strategy = %entry.spec.strategy_name,
                "walker: backtesting strategy"
            );
            let core = Arc::new(StrategyCore::new(
                &self.symbol,
                entry.spec.clone(),
                Arc::clone(&entry.strategy),
                self.deps.clone(),
            ));
            let driver = BacktestDriver::new(core, self.frame.clone()).without_done_event();
            let results = driver.run().await?;
            let stats = TradeStats::from_results(&entry.spec.strategy_name, &results);
            self.deps
                .bus
                .emit(EngineEvent::StrategyDone {
                    symbol: self.symbol.clone(),
                    strategy_name: entry.spec.strategy_name.clone(),
                    timestamp: Utc::now().timestamp_millis(),
                })
                .await;
            ranked.push(stats);
        }

        ranked.sort_by(|a, b| {
            b.score(self.metric)
                .partial_cmp(&a.score(self.metric))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        self.deps
            .bus
            .emit(EngineEvent::Done {
                timestamp: Utc::now().timestamp_millis(),
            })
            .await;

        info!(
            symbol = %self.symbol,
            best = ranked.first().map(|s| s.strategy_name.as_str()).unwrap_or("-"),
            "walker finished"
        );
        Ok(WalkerReport {
            metric: self.metric,
            ranked,
        })
    }
}
