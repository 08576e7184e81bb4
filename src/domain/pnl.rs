use rust_decimal::Decimal;

use crate::domain::signal::Pnl;
use crate::domain::types::Position;

/// Cost-adjusted PnL for a round trip, applied identically in live and
/// backtest paths.
///
/// `slippage_pct` and `fee_pct` are percent values (0.1 means 0.1%). Entry
/// and exit each pay both costs, so a take profit only nets out positive
/// once it clears roughly `2 * (slippage + fee)` of distance.
pub fn compute_pnl(
    position: Position,
    price_open: Decimal,
    price_close: Decimal,
    slippage_pct: Decimal,
    fee_pct: Decimal,
) -> Pnl {
    let slippage = slippage_pct / Decimal::ONE_HUNDRED;
    let fee = fee_pct / Decimal::ONE_HUNDRED;

    let (entry, exit, pnl_percentage) = match position {
        Position::Long => {
            let entry = price_open * (Decimal::ONE + slippage + fee);
            let exit = price_close * (Decimal::ONE - slippage - fee);
            let pnl = if entry.is_zero() {
                Decimal::ZERO
            } else {
                (exit - entry) / entry * Decimal::ONE_HUNDRED
            };
            (entry, exit, pnl)
        }
        Position::Short => {
            let entry = price_open * (Decimal::ONE - slippage + fee);
            let exit = price_close * (Decimal::ONE + slippage + fee);
            let pnl = if entry.is_zero() {
                Decimal::ZERO
            } else {
                (entry - exit) / entry * Decimal::ONE_HUNDRED
            };
            (entry, exit, pnl)
        }
    };

    Pnl {
        price_open_with_costs: entry,
        price_close_with_costs: exit,
        pnl_percentage,
    }
}
