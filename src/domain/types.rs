use anyhow::{Result, anyhow};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single OHLCV record spanning `[timestamp, timestamp + interval)`.
///
/// Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Typical price used for VWAP weighting: (high + low + close) / 3.
    pub fn typical_price(&self) -> Decimal {
        (self.high + self.low + self.close) / Decimal::from(3)
    }

    /// Smallest of the four OHLC values.
    pub fn min_ohlc(&self) -> Decimal {
        self.open.min(self.high).min(self.low).min(self.close)
    }
}

/// Direction of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Long,
    Short,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Long => write!(f, "long"),
            Position::Short => write!(f, "short"),
        }
    }
}

impl FromStr for Position {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "long" => Ok(Position::Long),
            "short" => Ok(Position::Short),
            _ => Err(anyhow!("invalid position: {}. Must be 'long' or 'short'", s)),
        }
    }
}

/// Throttle interval between signal-generation attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalInterval {
    OneMin,
    ThreeMin,
    FiveMin,
    FifteenMin,
    ThirtyMin,
    OneHour,
}

impl SignalInterval {
    pub fn as_millis(&self) -> i64 {
        match self {
            SignalInterval::OneMin => 60_000,
            SignalInterval::ThreeMin => 180_000,
            SignalInterval::FiveMin => 300_000,
            SignalInterval::FifteenMin => 900_000,
            SignalInterval::ThirtyMin => 1_800_000,
            SignalInterval::OneHour => 3_600_000,
        }
    }
}

/// Interval a candle source is queried at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleInterval {
    OneMin,
    ThreeMin,
    FiveMin,
    FifteenMin,
    ThirtyMin,
    OneHour,
    TwoHour,
    FourHour,
    SixHour,
    EightHour,
}

impl CandleInterval {
    pub fn as_millis(&self) -> i64 {
        match self {
            CandleInterval::OneMin => 60_000,
            CandleInterval::ThreeMin => 180_000,
            CandleInterval::FiveMin => 300_000,
            CandleInterval::FifteenMin => 900_000,
            CandleInterval::ThirtyMin => 1_800_000,
            CandleInterval::OneHour => 3_600_000,
            CandleInterval::TwoHour => 7_200_000,
            CandleInterval::FourHour => 14_400_000,
            CandleInterval::SixHour => 21_600_000,
            CandleInterval::EightHour => 28_800_000,
        }
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CandleInterval::OneMin => "1m",
            CandleInterval::ThreeMin => "3m",
            CandleInterval::FiveMin => "5m",
            CandleInterval::FifteenMin => "15m",
            CandleInterval::ThirtyMin => "30m",
            CandleInterval::OneHour => "1h",
            CandleInterval::TwoHour => "2h",
            CandleInterval::FourHour => "4h",
            CandleInterval::SixHour => "6h",
            CandleInterval::EightHour => "8h",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for CandleInterval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(CandleInterval::OneMin),
            "3m" => Ok(CandleInterval::ThreeMin),
            "5m" => Ok(CandleInterval::FiveMin),
            "15m" => Ok(CandleInterval::FifteenMin),
            "30m" => Ok(CandleInterval::ThirtyMin),
            "1h" => Ok(CandleInterval::OneHour),
            "2h" => Ok(CandleInterval::TwoHour),
            "4h" => Ok(CandleInterval::FourHour),
            "6h" => Ok(CandleInterval::SixHour),
            "8h" => Ok(CandleInterval::EightHour),
            _ => Err(anyhow!("invalid candle interval: {}", s)),
        }
    }
}

/// Spacing of the simulated "now" timestamps a backtest walks over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameInterval {
    OneMin,
    ThreeMin,
    FiveMin,
    FifteenMin,
    ThirtyMin,
    OneHour,
    TwoHour,
    FourHour,
    SixHour,
    EightHour,
    TwelveHour,
    OneDay,
    ThreeDay,
}

impl FrameInterval {
    pub fn as_millis(&self) -> i64 {
        match self {
            FrameInterval::OneMin => 60_000,
            FrameInterval::ThreeMin => 180_000,
            FrameInterval::FiveMin => 300_000,
            FrameInterval::FifteenMin => 900_000,
            FrameInterval::ThirtyMin => 1_800_000,
            FrameInterval::OneHour => 3_600_000,
            FrameInterval::TwoHour => 7_200_000,
            FrameInterval::FourHour => 14_400_000,
            FrameInterval::SixHour => 21_600_000,
            FrameInterval::EightHour => 28_800_000,
            FrameInterval::TwelveHour => 43_200_000,
            FrameInterval::OneDay => 86_400_000,
            FrameInterval::ThreeDay => 259_200_000,
        }
    }

    /// Floors a timestamp to the canonical start of the period containing it.
    pub fn align(&self, timestamp_ms: i64) -> i64 {
        let period = self.as_millis();
        timestamp_ms.div_euclid(period) * period
    }
}
