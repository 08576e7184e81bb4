//! Engine configuration.
//!
//! Every economically meaningful constant of the engine is runtime-tunable:
//! validation distances, cost model, schedule/lifetime windows, generation
//! timeout, tick cadence and the candle anomaly guard. Values load from
//! environment variables with sane defaults, so a bare `EngineConfig::default()`
//! behaves identically to an empty environment.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::env;
use std::str::FromStr;

use crate::domain::validation::ValidationLimits;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    // Validation distances, percent of price_open
    pub min_tp_distance_pct: Decimal,
    pub min_sl_distance_pct: Decimal,
    pub max_sl_distance_pct: Decimal,
    pub max_signal_lifetime_minutes: u64,

    // Scheduled-signal activation window
    pub schedule_await_minutes: u64,

    // Cost model, percent per side
    pub slippage_pct: Decimal,
    pub fee_pct: Decimal,

    // Budget for one user getSignal invocation
    pub max_signal_generation_seconds: u64,

    // Live tick cadence; the extra millisecond keeps ticks from landing
    // exactly on candle boundaries
    pub tick_interval_ms: u64,

    // Graceful shutdown: how long the live driver keeps monitoring an open
    // signal after a cancel before giving up
    pub graceful_close_timeout_ms: u64,

    // Candle anomaly guard
    pub anomaly_threshold_factor: Decimal,
    pub min_candles_for_median: usize,

    // VWAP window, completed 1-minute candles
    pub vwap_window: usize,

    // Partial profit/loss milestone thresholds, percent progress toward
    // take-profit (profit) or stop-loss (loss)
    pub milestone_pcts: Vec<Decimal>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_tp_distance_pct: dec!(0.5),
            min_sl_distance_pct: dec!(0.5),
            max_sl_distance_pct: dec!(20),
            max_signal_lifetime_minutes: 1440,
            schedule_await_minutes: 120,
            slippage_pct: dec!(0.1),
            fee_pct: dec!(0.1),
            max_signal_generation_seconds: 180,
            tick_interval_ms: 60_001,
            graceful_close_timeout_ms: 30 * 60_000,
            anomaly_threshold_factor: dec!(1000),
            min_candles_for_median: 5,
            vwap_window: 5,
            milestone_pcts: vec![dec!(10), dec!(20), dec!(30)],
        }
    }
}

impl EngineConfig {
    /// Loads the configuration from the environment (after `.env`, if any).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let milestone_pcts = match env::var("MILESTONE_PCTS") {
            Ok(raw) => raw
                .split(',')
                .map(|s| {
                    Decimal::from_str(s.trim())
                        .context(format!("Failed to parse MILESTONE_PCTS entry '{}'", s))
                })
                .collect::<Result<Vec<_>>>()?,
            Err(_) => defaults.milestone_pcts.clone(),
        };

        Ok(Self {
            min_tp_distance_pct: parse_decimal("MIN_TP_DISTANCE_PCT", defaults.min_tp_distance_pct)?,
            min_sl_distance_pct: parse_decimal("MIN_SL_DISTANCE_PCT", defaults.min_sl_distance_pct)?,
            max_sl_distance_pct: parse_decimal("MAX_SL_DISTANCE_PCT", defaults.max_sl_distance_pct)?,
            max_signal_lifetime_minutes: parse_u64(
                "MAX_SIGNAL_LIFETIME_MINUTES",
                defaults.max_signal_lifetime_minutes,
            )?,
            schedule_await_minutes: parse_u64(
                "SCHEDULE_AWAIT_MINUTES",
                defaults.schedule_await_minutes,
            )?,
            slippage_pct: parse_decimal("SLIPPAGE_PCT", defaults.slippage_pct)?,
            fee_pct: parse_decimal("FEE_PCT", defaults.fee_pct)?,
            max_signal_generation_seconds: parse_u64(
                "MAX_SIGNAL_GENERATION_SECONDS",
                defaults.max_signal_generation_seconds,
            )?,
            tick_interval_ms: parse_u64("TICK_INTERVAL_MS", defaults.tick_interval_ms)?,
            graceful_close_timeout_ms: parse_u64(
                "GRACEFUL_CLOSE_TIMEOUT_MS",
                defaults.graceful_close_timeout_ms,
            )?,
            anomaly_threshold_factor: parse_decimal(
                "GET_CANDLES_ANOMALY_THRESHOLD_FACTOR",
                defaults.anomaly_threshold_factor,
            )?,
            min_candles_for_median: parse_usize(
                "GET_CANDLES_MIN_CANDLES_FOR_MEDIAN",
                defaults.min_candles_for_median,
            )?,
            vwap_window: parse_usize("VWAP_WINDOW", defaults.vwap_window)?,
            milestone_pcts,
        })
    }

    /// The subset the validator consumes.
    pub fn validation_limits(&self) -> ValidationLimits {
        ValidationLimits {
            min_tp_distance_pct: self.min_tp_distance_pct,
            min_sl_distance_pct: self.min_sl_distance_pct,
            max_sl_distance_pct: self.max_sl_distance_pct,
            max_signal_lifetime_minutes: self.max_signal_lifetime_minutes,
        }
    }

    pub fn schedule_await_ms(&self) -> i64 {
        self.schedule_await_minutes as i64 * 60_000
    }
}

fn parse_decimal(key: &str, default: Decimal) -> Result<Decimal> {
    match env::var(key) {
        Ok(raw) => Decimal::from_str(&raw).context(format!("Failed to parse {}", key)),
        Err(_) => Ok(default),
    }
}

fn parse_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(raw) => raw.parse::<u64>().context(format!("Failed to parse {}", key)),
        Err(_) => Ok(default),
    }
}

fn parse_usize(key: &str, default: usize) -> Result<usize> {
    match env::var(key) {
        Ok(raw) => raw.parse::<usize>().context(format!("Failed to parse {}", key)),
        Err(_) => Ok(default),
    }
}
