use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::signal::TickResult;

/// Partial-profit / partial-loss milestone direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MilestoneKind {
    PartialProfit,
    PartialLoss,
}

/// Everything the engine fans out to listeners.
///
/// `Tick` carries the full tagged result; listeners branch on
/// `result.kind()`. `Error` is the dedicated non-fatal error channel with
/// enough context to attribute the failure. `Exit` is fatal and accompanies
/// driver termination.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Tick {
        symbol: String,
        strategy_name: String,
        exchange_name: String,
        result: TickResult,
    },
    Milestone {
        symbol: String,
        strategy_name: String,
        kind: MilestoneKind,
        pct: Decimal,
        timestamp: i64,
    },
    Error {
        symbol: String,
        strategy_name: String,
        method: String,
        timestamp: i64,
        message: String,
    },
    /// One strategy finished its backtest run (walker emits one per strategy).
    StrategyDone {
        symbol: String,
        strategy_name: String,
        timestamp: i64,
    },
    /// A driver finished its whole run.
    Done { timestamp: i64 },
    Exit { message: String, timestamp: i64 },
}

impl EngineEvent {
    /// Coarse category, usable as a subscription filter.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::Tick { result, .. } => result.kind(),
            EngineEvent::Milestone { .. } => "milestone",
            EngineEvent::Error { .. } => "error",
            EngineEvent::StrategyDone { .. } => "strategy_done",
            EngineEvent::Done { .. } => "done",
            EngineEvent::Exit { .. } => "exit",
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            EngineEvent::Tick { symbol, .. }
            | EngineEvent::Milestone { symbol, .. }
            | EngineEvent::Error { symbol, .. }
            | EngineEvent::StrategyDone { symbol, .. } => Some(symbol),
            EngineEvent::Done { .. } | EngineEvent::Exit { .. } => None,
        }
    }
}

/// Listener callbacks may be async; the bus guarantees a listener never sees
/// event N+1 before its callback for event N returned.
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn on_event(&self, event: &EngineEvent);
}
