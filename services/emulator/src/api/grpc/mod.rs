//! gRPC 服务模块

mod instruments_service;
mod market_data_service;
mod market_data_stream_service;
pub mod mapper;
mod operations_service;
mod orders_service;
mod orders_stream_service;
mod users_service;

pub use instruments_service::InstrumentsServiceImpl;
pub use market_data_service::MarketDataServiceImpl;
pub use market_data_stream_service::MarketDataStreamServiceImpl;
pub use operations_service::OperationsServiceImpl;
pub use orders_service::OrdersServiceImpl;
pub use orders_stream_service::OrdersStreamServiceImpl;
pub use users_service::UsersServiceImpl;
