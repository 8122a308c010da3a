//! broker-emulator - 单标的交易所模拟器
//!
//! 对交易机器人暴露 T-Invest gRPC 协议子集，对运营人员暴露管理面板。
//! 撮合采用按比例分配 (pro-rata)，同价位内按挂单剩余量分摊成交。

pub mod api;
pub mod app;
pub mod application;
pub mod domain;
pub mod error;
pub mod stream;

pub use app::Emulator;

pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("emulator_descriptor");
