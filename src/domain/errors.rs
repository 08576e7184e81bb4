use thiserror::Error;

/// Errors produced by the signal engine core.
///
/// User-code failures (`InvalidSignal`, `RiskRejected`, `GenerationTimeout`,
/// `InsufficientData`) are contained: the tick that hit them resolves to
/// `idle` and the state machine is unchanged. `Persistence` failures in live
/// mode pause state advancement until a write succeeds. `MissingContext` is a
/// programmer error and propagates to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid signal: {0}")]
    InvalidSignal(String),

    #[error("risk rejected: {0}")]
    RiskRejected(String),

    #[error("signal generation exceeded {budget_secs}s budget")]
    GenerationTimeout { budget_secs: u64 },

    #[error("no execution context established for this task")]
    MissingContext,

    #[error("insufficient candle data: have {have}, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("signal store failure: {0}")]
    Persistence(String),

    #[error("candle source failure: {0}")]
    CandleSource(String),

    #[error("stop requested")]
    StopRequested,
}

impl EngineError {
    /// Whether the error is contained by the tick loop (resolves to idle)
    /// rather than propagated to the driver.
    pub fn is_contained(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidSignal(_)
                | EngineError::RiskRejected(_)
                | EngineError::GenerationTimeout { .. }
                | EngineError::InsufficientData { .. }
                | EngineError::CandleSource(_)
        )
    }
}
