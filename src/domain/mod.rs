// Core trading domain: candles, signals, lifecycle results
pub mod signal;
pub mod types;

// Lifecycle event model
pub mod events;

// Port interfaces
pub mod ports;

// Pure signal validation
pub mod validation;

// Cost-aware profit/loss accounting
pub mod pnl;

// Domain-specific error types
pub mod errors;
