pub mod backtest;
pub mod live;
pub mod walker;

pub use backtest::BacktestDriver;
pub use live::{LiveDriver, LiveHandle};
pub use walker::{WalkerDriver, WalkerEntry, WalkerReport};
