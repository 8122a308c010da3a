//! gRPC 流推送

pub mod dispatcher;
pub mod manager;

pub use dispatcher::{run_dispatcher, run_keepalive};
pub use manager::StreamManager;
