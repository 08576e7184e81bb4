//! Backtest frames: the ordered sequence of simulated "now" timestamps.

use chrono::{DateTime, Utc};

use crate::domain::types::FrameInterval;

/// A finite, restartable range of aligned timestamps spaced by `interval`,
/// bounded by the end inclusive. Every produced timestamp is floored to the
/// interval boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub name: Option<String>,
    start_ms: i64,
    end_ms: i64,
    interval: FrameInterval,
}

impl Frame {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, interval: FrameInterval) -> Self {
        Self::from_millis(start.timestamp_millis(), end.timestamp_millis(), interval)
    }

    pub fn from_millis(start_ms: i64, end_ms: i64, interval: FrameInterval) -> Self {
        Self {
            name: None,
            start_ms,
            end_ms,
            interval,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn interval(&self) -> FrameInterval {
        self.interval
    }

    /// A fresh iterator over the frame; calling this again restarts from the
    /// beginning.
    pub fn timestamps(&self) -> FrameTimestamps {
        FrameTimestamps {
            next: self.interval.align(self.start_ms),
            end: self.end_ms,
            step: self.interval.as_millis(),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps().count()
    }

    pub fn is_empty(&self) -> bool {
        self.interval.align(self.start_ms) > self.end_ms
    }
}

#[derive(Debug, Clone)]
pub struct FrameTimestamps {
    next: i64,
    end: i64,
    step: i64,
}

impl Iterator for FrameTimestamps {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if self.next > self.end {
            return None;
        }
        let current = self.next;
        self.next += self.step;
        Some(current)
    }
}
