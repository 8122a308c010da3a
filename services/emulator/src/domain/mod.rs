//! 领域层

pub mod account;
pub mod book;
pub mod events;
pub mod instrument;
pub mod matching;
pub mod order;
pub mod orderbook;
pub mod position;

pub use account::AccountManager;
pub use book::{OrderBook, OrderBookSnapshot, PriceLevel};
pub use events::{EngineEvent, EventBus};
pub use instrument::{Instrument, InstrumentCatalog};
pub use matching::ProRataMatchingEngine;
pub use order::{Order, OrderDirection, OrderSource, OrderStatus, OrderType, Trade};
pub use orderbook::OrderBookManager;
pub use position::{Account, Position};
