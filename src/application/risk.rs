//! Portfolio-level admission control.
//!
//! A gate decides whether a signal may open, and tracks which
//! (strategy, symbol) pairs currently hold positions. Position state is
//! process memory only; on live restart the strategy core re-registers
//! restored actives during init.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::errors::EngineError;
use crate::domain::ports::{RiskCheckArgs, RiskGate};

/// One named admission predicate. Predicates run in order and the first
/// rejection wins.
#[async_trait]
pub trait RiskPredicate: Send + Sync {
    fn name(&self) -> &str;

    /// `Err(reason)` rejects the signal with that reason.
    async fn check(&self, args: &RiskCheckArgs<'_>) -> Result<(), String>;
}

/// Gate that admits everything and tracks nothing.
#[derive(Debug, Default)]
pub struct NoRiskGate;

#[async_trait]
impl RiskGate for NoRiskGate {
    async fn check_signal(&self, _args: &RiskCheckArgs<'_>) -> Result<(), EngineError> {
        Ok(())
    }

    async fn add_signal(&self, _strategy: &str, _symbol: &str) {}

    async fn remove_signal(&self, _strategy: &str, _symbol: &str) {}

    async fn position_count(&self) -> usize {
        0
    }
}

/// A concrete risk profile: an optional cap on concurrently-open positions
/// plus an ordered, fail-fast predicate list.
pub struct RiskProfile {
    name: String,
    max_concurrent_positions: Option<usize>,
    predicates: Vec<Box<dyn RiskPredicate>>,
    held: Mutex<HashSet<(String, String)>>,
}

impl RiskProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_concurrent_positions: None,
            predicates: Vec::new(),
            held: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_max_positions(mut self, max: usize) -> Self {
        self.max_concurrent_positions = Some(max);
        self
    }

    pub fn with_predicate(mut self, predicate: Box<dyn RiskPredicate>) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl RiskGate for RiskProfile {
    async fn check_signal(&self, args: &RiskCheckArgs<'_>) -> Result<(), EngineError> {
        if let Some(max) = self.max_concurrent_positions {
            let held = self.held.lock().await.len();
            if held >= max {
                warn!(
                    gate = %self.name,
                    held,
                    max,
                    symbol = args.symbol,
                    "position cap reached, rejecting signal"
                );
                return Err(EngineError::RiskRejected(format!(
                    "{}: position cap reached ({held}/{max})",
                    self.name
                )));
            }
        }
        for predicate in &self.predicates {
            if let Err(reason) = predicate.check(args).await {
                warn!(
                    gate = %self.name,
                    predicate = predicate.name(),
                    symbol = args.symbol,
                    %reason,
                    "risk predicate rejected signal"
                );
                return Err(EngineError::RiskRejected(format!(
                    "{}: {reason}",
                    predicate.name()
                )));
            }
            debug!(gate = %self.name, predicate = predicate.name(), "risk predicate passed");
        }
        Ok(())
    }

    async fn add_signal(&self, strategy: &str, symbol: &str) {
        self.held
            .lock()
            .await
            .insert((strategy.to_string(), symbol.to_string()));
    }

    async fn remove_signal(&self, strategy: &str, symbol: &str) {
        self.held
            .lock()
            .await
            .remove(&(strategy.to_string(), symbol.to_string()));
    }

    async fn position_count(&self) -> usize {
        self.held.lock().await.len()
    }
}

/// Used when a strategy references several risk profiles: admits a signal
/// iff every child admits it; add/remove fan out to every child.
pub struct CompositeRiskGate {
    gates: Vec<Arc<dyn RiskGate>>,
}

impl CompositeRiskGate {
    pub fn new(gates: Vec<Arc<dyn RiskGate>>) -> Self {
        Self { gates }
    }
}

#[async_trait]
impl RiskGate for CompositeRiskGate {
    async fn check_signal(&self, args: &RiskCheckArgs<'_>) -> Result<(), EngineError> {
        for gate in &self.gates {
            gate.check_signal(args).await?;
        }
        Ok(())
    }

    async fn add_signal(&self, strategy: &str, symbol: &str) {
        for gate in &self.gates {
            gate.add_signal(strategy, symbol).await;
        }
    }

    async fn remove_signal(&self, strategy: &str, symbol: &str) {
        for gate in &self.gates {
            gate.remove_signal(strategy, symbol).await;
        }
    }

    async fn position_count(&self) -> usize {
        let mut max = 0;
        for gate in &self.gates {
            max = max.max(gate.position_count().await);
        }
        max
    }
}
