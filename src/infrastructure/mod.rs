pub mod candles;
pub mod event_bus;
pub mod mock;
pub mod persistence;
