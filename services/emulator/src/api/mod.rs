//! 对外接口：gRPC (T-Invest 协议子集) 与管理面板 HTTP

pub mod grpc;
pub mod http;
pub mod proto;
