//! Per-strategy backtest summaries used by the walker ranking.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use crate::domain::signal::TickResult;

/// Metric the walker ranks strategies by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkerMetric {
    TotalPnl,
    WinRate,
    Sharpe,
}

/// Aggregate outcome of one strategy's backtest over a frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeStats {
    pub strategy_name: String,
    pub closed_trades: usize,
    pub cancelled_signals: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate_pct: Decimal,
    pub total_pnl_pct: Decimal,
    pub avg_pnl_pct: Decimal,
    /// Mean over standard deviation of per-trade returns; 0 below two trades.
    pub sharpe: f64,
    /// Worst peak-to-trough drop of the cumulative PnL curve.
    pub max_drawdown_pct: Decimal,
}

impl TradeStats {
    pub fn from_results(strategy_name: impl Into<String>, results: &[TickResult]) -> Self {
        let mut pnls: Vec<Decimal> = Vec::new();
        let mut cancelled = 0usize;
        for result in results {
            match result {
                TickResult::Closed { pnl, .. } => pnls.push(pnl.pnl_percentage),
                TickResult::Cancelled { .. } => cancelled += 1,
                _ => {}
            }
        }

        let closed = pnls.len();
        let wins = pnls.iter().filter(|p| **p > Decimal::ZERO).count();
        let losses = closed - wins;
        let total: Decimal = pnls.iter().copied().sum();
        let win_rate_pct = if closed == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(wins as u64) / Decimal::from(closed as u64) * Decimal::ONE_HUNDRED
        };
        let avg = if closed == 0 {
            Decimal::ZERO
        } else {
            total / Decimal::from(closed as u64)
        };

        Self {
            strategy_name: strategy_name.into(),
            closed_trades: closed,
            cancelled_signals: cancelled,
            wins,
            losses,
            win_rate_pct,
            total_pnl_pct: total,
            avg_pnl_pct: avg,
            sharpe: sharpe(&pnls),
            max_drawdown_pct: max_drawdown(&pnls),
        }
    }

    /// Scalar used for ranking; higher is better for every metric.
    pub fn score(&self, metric: WalkerMetric) -> f64 {
        match metric {
            WalkerMetric::TotalPnl => self.total_pnl_pct.to_f64().unwrap_or(0.0),
            WalkerMetric::WinRate => self.win_rate_pct.to_f64().unwrap_or(0.0),
            WalkerMetric::Sharpe => self.sharpe,
        }
    }
}

fn sharpe(pnls: &[Decimal]) -> f64 {
    if pnls.len() < 2 {
        return 0.0;
    }
    let returns: Vec<f64> = pnls.iter().map(|p| p.to_f64().unwrap_or(0.0)).collect();
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 { 0.0 } else { mean / std_dev }
}

fn max_drawdown(pnls: &[Decimal]) -> Decimal {
    let mut cumulative = Decimal::ZERO;
    let mut peak = Decimal::ZERO;
    let mut worst = Decimal::ZERO;
    for pnl in pnls {
        cumulative += *pnl;
        if cumulative > peak {
            peak = cumulative;
        }
        let drawdown = peak - cumulative;
        if drawdown > worst {
            worst = drawdown;
        }
    }
    worst
}
