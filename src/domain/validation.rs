use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::errors::EngineError;
use crate::domain::signal::Signal;
use crate::domain::types::Position;

/// Economic thresholds the validator enforces, in percent of `price_open`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationLimits {
    /// Minimum take-profit distance. Profits below this cannot cover
    /// entry+exit fees plus slippage.
    pub min_tp_distance_pct: Decimal,
    /// Minimum stop-loss distance. Anything tighter gets stopped out by
    /// ordinary volatility.
    pub min_sl_distance_pct: Decimal,
    /// Maximum stop-loss distance. Caps the single-trade catastrophic loss.
    pub max_sl_distance_pct: Decimal,
    pub max_signal_lifetime_minutes: u64,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            min_tp_distance_pct: dec!(0.5),
            min_sl_distance_pct: dec!(0.5),
            max_sl_distance_pct: dec!(20),
            max_signal_lifetime_minutes: 1440,
        }
    }
}

/// Validates a fully-augmented signal before it may affect any state.
///
/// All rules run and every violation is collected; the result carries the
/// complete list so a bad strategy sees everything wrong with its draft at
/// once rather than one failure per attempt.
pub fn validate_signal(
    signal: &Signal,
    current_price: Decimal,
    is_scheduled: bool,
    limits: &ValidationLimits,
) -> Result<(), EngineError> {
    let mut violations: Vec<String> = Vec::new();

    // Structural
    if signal.id.trim().is_empty() {
        violations.push("id must be a nonempty string".into());
    }
    if signal.symbol.trim().is_empty() {
        violations.push("symbol must be nonempty".into());
    }
    if signal.strategy_name.trim().is_empty() {
        violations.push("strategy_name must be nonempty".into());
    }
    if signal.exchange_name.trim().is_empty() {
        violations.push("exchange_name must be nonempty".into());
    }

    // Numeric
    for (name, value) in [
        ("current_price", current_price),
        ("price_open", signal.price_open),
        ("price_take_profit", signal.price_take_profit),
        ("price_stop_loss", signal.price_stop_loss),
    ] {
        if value <= Decimal::ZERO {
            violations.push(format!("{} must be strictly positive, got {}", name, value));
        }
    }

    // Position ordering
    let ordering_ok = match signal.position {
        Position::Long => {
            signal.price_stop_loss < signal.price_open
                && signal.price_open < signal.price_take_profit
        }
        Position::Short => {
            signal.price_take_profit < signal.price_open
                && signal.price_open < signal.price_stop_loss
        }
    };
    if !ordering_ok {
        violations.push(format!(
            "{} ordering violated: stop_loss={} open={} take_profit={}",
            signal.position, signal.price_stop_loss, signal.price_open, signal.price_take_profit,
        ));
    }

    // Closure prevention: the price the position would effectively open at
    // must sit strictly inside the (stop_loss, take_profit) corridor, or the
    // signal closes on the very tick that opens it.
    let reference = if is_scheduled {
        signal.price_open
    } else {
        current_price
    };
    let corridor_ok = match signal.position {
        Position::Long => {
            reference > signal.price_stop_loss && reference < signal.price_take_profit
        }
        Position::Short => {
            reference < signal.price_stop_loss && reference > signal.price_take_profit
        }
    };
    if !corridor_ok {
        let what = if is_scheduled {
            "activation price"
        } else {
            "current price"
        };
        violations.push(format!(
            "{} {} would close the signal immediately (stop_loss={}, take_profit={})",
            what, reference, signal.price_stop_loss, signal.price_take_profit,
        ));
    }

    // Distance thresholds, percent of price_open
    if signal.price_open > Decimal::ZERO {
        let tp_distance_pct = (signal.price_take_profit - signal.price_open).abs()
            / signal.price_open
            * Decimal::ONE_HUNDRED;
        let sl_distance_pct = (signal.price_open - signal.price_stop_loss).abs()
            / signal.price_open
            * Decimal::ONE_HUNDRED;

        if tp_distance_pct < limits.min_tp_distance_pct {
            violations.push(format!(
                "take-profit distance {:.4}% below minimum {}%",
                tp_distance_pct, limits.min_tp_distance_pct,
            ));
        }
        if sl_distance_pct < limits.min_sl_distance_pct {
            violations.push(format!(
                "stop-loss distance {:.4}% below minimum {}%",
                sl_distance_pct, limits.min_sl_distance_pct,
            ));
        }
        if sl_distance_pct > limits.max_sl_distance_pct {
            violations.push(format!(
                "stop-loss distance {:.4}% above maximum {}%",
                sl_distance_pct, limits.max_sl_distance_pct,
            ));
        }
    }

    // Lifetime
    if signal.minute_estimated_time == 0 {
        violations.push("minute_estimated_time must be a positive integer".into());
    } else if signal.minute_estimated_time > limits.max_signal_lifetime_minutes {
        violations.push(format!(
            "minute_estimated_time {} exceeds maximum {} minutes",
            signal.minute_estimated_time, limits.max_signal_lifetime_minutes,
        ));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(EngineError::InvalidSignal(violations.join("; ")))
    }
}
