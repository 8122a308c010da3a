//! gRPC 生成代码引入

pub mod invest {
    tonic::include_proto!("tinkoff.public.invest.api.contract.v1");
}
