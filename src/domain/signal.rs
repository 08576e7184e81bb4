use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::types::Position;

/// What a strategy callback returns when it wants to enter the market.
///
/// `price_open` absent means a market signal (entry at the current VWAP);
/// present means a limit signal that waits for the price to reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDraft {
    pub position: Position,
    pub price_take_profit: Decimal,
    pub price_stop_loss: Decimal,
    /// Maximum lifetime of the position once activated, in minutes.
    pub minute_estimated_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_open: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A validated, engine-augmented signal.
///
/// `scheduled_at` is when the signal was created; `pending_at` is when it
/// entered (or will be treated as having entered) the market. For market
/// signals the two are equal. For limit signals `pending_at` is rewritten at
/// activation time, so the estimated lifetime is never consumed while
/// waiting for the entry price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub symbol: String,
    pub strategy_name: String,
    pub exchange_name: String,
    pub position: Position,
    pub price_open: Decimal,
    pub price_take_profit: Decimal,
    pub price_stop_loss: Decimal,
    pub minute_estimated_time: u64,
    pub scheduled_at: i64,
    pub pending_at: i64,
    pub is_scheduled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Signal {
    /// Timestamp after which the active signal closes by time expiration.
    pub fn expires_at(&self) -> i64 {
        self.pending_at + self.minute_estimated_time as i64 * 60_000
    }

    /// Would `price` trigger the take profit of an open position?
    pub fn hits_take_profit(&self, price: Decimal) -> bool {
        match self.position {
            Position::Long => price >= self.price_take_profit,
            Position::Short => price <= self.price_take_profit,
        }
    }

    /// Would `price` trigger the stop loss of an open position?
    pub fn hits_stop_loss(&self, price: Decimal) -> bool {
        match self.position {
            Position::Long => price <= self.price_stop_loss,
            Position::Short => price >= self.price_stop_loss,
        }
    }

    /// Has the limit entry price been reached?
    pub fn activation_reached(&self, price: Decimal) -> bool {
        match self.position {
            Position::Long => price <= self.price_open,
            Position::Short => price >= self.price_open,
        }
    }

    /// Percent progress of `price` from entry toward the take profit.
    /// Negative while the price moves the wrong way.
    pub fn progress_take_profit_pct(&self, price: Decimal) -> Decimal {
        let span = self.price_take_profit - self.price_open;
        if span.is_zero() {
            return Decimal::ZERO;
        }
        (price - self.price_open) / span * Decimal::ONE_HUNDRED
    }

    /// Percent progress of `price` from entry toward the stop loss.
    pub fn progress_stop_loss_pct(&self, price: Decimal) -> Decimal {
        let span = self.price_stop_loss - self.price_open;
        if span.is_zero() {
            return Decimal::ZERO;
        }
        (price - self.price_open) / span * Decimal::ONE_HUNDRED
    }
}

/// Why an active signal closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    TimeExpired,
    ManualClose,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::TakeProfit => "take_profit",
            CloseReason::StopLoss => "stop_loss",
            CloseReason::TimeExpired => "time_expired",
            CloseReason::ManualClose => "manual_close",
        };
        write!(f, "{}", s)
    }
}

/// Why a signal was cancelled before (or instead of) closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    Timeout,
    PreActivationStopLoss,
    RiskRejected,
    ManualCancel,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CancelReason::Timeout => "timeout",
            CancelReason::PreActivationStopLoss => "pre_activation_stoploss",
            CancelReason::RiskRejected => "risk_rejected",
            CancelReason::ManualCancel => "manual_cancel",
        };
        write!(f, "{}", s)
    }
}

/// Cost-adjusted profit and loss of a closed signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pnl {
    pub price_open_with_costs: Decimal,
    pub price_close_with_costs: Decimal,
    pub pnl_percentage: Decimal,
}

/// The outcome of one evaluation of the strategy core at a given `now`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TickResult {
    Idle {
        current_price: Option<Decimal>,
    },
    Scheduled {
        signal: Signal,
        current_price: Decimal,
    },
    Opened {
        signal: Signal,
        current_price: Decimal,
    },
    Active {
        signal: Signal,
        current_price: Decimal,
        progress_take_profit_pct: Decimal,
        progress_stop_loss_pct: Decimal,
    },
    Closed {
        signal: Signal,
        price_close: Decimal,
        close_reason: CloseReason,
        close_timestamp: i64,
        pnl: Pnl,
    },
    Cancelled {
        signal: Signal,
        current_price: Decimal,
        close_timestamp: i64,
        reason: CancelReason,
    },
}

impl TickResult {
    /// Discriminator, matching the serialized `action` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            TickResult::Idle { .. } => "idle",
            TickResult::Scheduled { .. } => "scheduled",
            TickResult::Opened { .. } => "opened",
            TickResult::Active { .. } => "active",
            TickResult::Closed { .. } => "closed",
            TickResult::Cancelled { .. } => "cancelled",
        }
    }

    /// Terminal timestamp for `Closed`/`Cancelled` results.
    pub fn close_timestamp(&self) -> Option<i64> {
        match self {
            TickResult::Closed { close_timestamp, .. }
            | TickResult::Cancelled { close_timestamp, .. } => Some(*close_timestamp),
            _ => None,
        }
    }

    pub fn signal(&self) -> Option<&Signal> {
        match self {
            TickResult::Idle { .. } => None,
            TickResult::Scheduled { signal, .. }
            | TickResult::Opened { signal, .. }
            | TickResult::Active { signal, .. }
            | TickResult::Closed { signal, .. }
            | TickResult::Cancelled { signal, .. } => Some(signal),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TickResult::Closed { .. } | TickResult::Cancelled { .. })
    }
}

/// Durable status of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Opened,
    Scheduled,
    Closed,
    Cancelled,
}

/// The on-disk shape of a signal: the signal itself plus store metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    #[serde(flatten)]
    pub signal: Signal,
    pub status: SignalStatus,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub priority: i64,
}

impl SignalRecord {
    pub fn new(signal: Signal, status: SignalStatus, now: i64) -> Self {
        Self {
            signal,
            status,
            created_at: now,
            updated_at: now,
            priority: 0,
        }
    }

    pub fn touched(mut self, now: i64) -> Self {
        self.updated_at = now;
        self
    }
}
