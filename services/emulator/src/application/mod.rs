//! 应用层

pub mod trading;

pub use trading::{Execution, TradingService};
