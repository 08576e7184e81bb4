pub mod context;
pub mod drivers;
pub mod frame;
pub mod instance_cache;
pub mod market_data;
pub mod risk;
pub mod stats;
pub mod strategies;
pub mod strategy_core;
