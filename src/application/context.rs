//! Task-local execution contexts.
//!
//! Drivers wrap every strategy-core invocation in an [`ExecutionContext`]
//! (the simulated or wall-clock "now" plus the symbol) and a
//! [`MethodContext`] (schema identity). Data-access helpers read the
//! task-local binding instead of taking `now` as a parameter, which is what
//! makes look-ahead structurally impossible: user code physically cannot ask
//! for data at a time other than the one the driver established.
//!
//! Contexts are per-task. Concurrent drivers on different symbols each hold
//! their own binding; a task spawned from inside a scope must be re-wrapped
//! explicitly.

use std::future::Future;

use crate::domain::errors::EngineError;

/// `{symbol, now, is_backtest}` for the current logical tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub symbol: String,
    /// Milliseconds since epoch; the temporal horizon for all data access.
    pub now: i64,
    pub is_backtest: bool,
}

/// Schema identity of the current execution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodContext {
    pub strategy_name: String,
    pub exchange_name: String,
    pub frame_name: Option<String>,
}

tokio::task_local! {
    static EXECUTION_CONTEXT: ExecutionContext;
    static METHOD_CONTEXT: MethodContext;
}

impl ExecutionContext {
    /// Establishes `ctx` for the duration of `fut` and everything it awaits.
    pub async fn run<F: Future>(ctx: Self, fut: F) -> F::Output {
        EXECUTION_CONTEXT.scope(ctx, fut).await
    }

    /// The currently-established context. Calling this outside a
    /// [`ExecutionContext::run`] scope is a programmer error.
    pub fn current() -> Result<Self, EngineError> {
        EXECUTION_CONTEXT
            .try_with(Clone::clone)
            .map_err(|_| EngineError::MissingContext)
    }

    pub fn is_established() -> bool {
        EXECUTION_CONTEXT.try_with(|_| ()).is_ok()
    }
}

impl MethodContext {
    pub async fn run<F: Future>(ctx: Self, fut: F) -> F::Output {
        METHOD_CONTEXT.scope(ctx, fut).await
    }

    pub fn current() -> Result<Self, EngineError> {
        METHOD_CONTEXT
            .try_with(Clone::clone)
            .map_err(|_| EngineError::MissingContext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(symbol: &str, now: i64) -> ExecutionContext {
        ExecutionContext {
            symbol: symbol.to_string(),
            now,
            is_backtest: true,
        }
    }

    #[tokio::test]
    async fn test_missing_context_fails() {
        let err = ExecutionContext::current().unwrap_err();
        assert!(matches!(err, EngineError::MissingContext));
        assert!(!ExecutionContext::is_established());
    }

    #[tokio::test]
    async fn test_scope_establishes_and_clears() {
        ExecutionContext::run(ctx("BTCUSDT", 42), async {
            let current = ExecutionContext::current().unwrap();
            assert_eq!(current.symbol, "BTCUSDT");
            assert_eq!(current.now, 42);
            assert!(current.is_backtest);
        })
        .await;
        assert!(ExecutionContext::current().is_err());
    }

    #[tokio::test]
    async fn test_context_survives_await_points() {
        ExecutionContext::run(ctx("ETHUSDT", 7), async {
            tokio::task::yield_now().await;
            assert_eq!(ExecutionContext::current().unwrap().now, 7);
        })
        .await;
    }

    #[tokio::test]
    async fn test_concurrent_tasks_are_isolated() {
        let a = tokio::spawn(ExecutionContext::run(ctx("BTCUSDT", 1), async {
            tokio::task::yield_now().await;
            ExecutionContext::current().unwrap().symbol
        }));
        let b = tokio::spawn(ExecutionContext::run(ctx("ETHUSDT", 2), async {
            tokio::task::yield_now().await;
            ExecutionContext::current().unwrap().symbol
        }));
        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(a, "BTCUSDT");
        assert_eq!(b, "ETHUSDT");
    }

    #[tokio::test]
    async fn test_method_context_nests_with_execution_context() {
        let method = MethodContext {
            strategy_name: "strat".into(),
            exchange_name: "binance".into(),
            frame_name: Some("frame-1h".into()),
        };
        ExecutionContext::run(ctx("BTCUSDT", 99), async move {
            MethodContext::run(method, async {
                assert_eq!(MethodContext::current().unwrap().strategy_name, "strat");
                assert_eq!(ExecutionContext::current().unwrap().now, 99);
            })
            .await
        })
        .await;
    }
}
