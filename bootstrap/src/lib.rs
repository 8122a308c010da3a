//! emu-bootstrap - 服务启动骨架
//!
//! 配置加载、日志初始化、健康检查、metrics、gRPC + HTTP 双监听与优雅关闭

pub mod health;
mod interceptor;
pub mod metrics;
pub mod reflection;
mod runtime;
mod shutdown;
mod starter;

pub use interceptor::*;
pub use runtime::*;
pub use shutdown::*;
pub use starter::*;
