//! gRPC Interceptors

use tonic::{Request, Status};
use tracing::{debug, trace};

/// 请求携带的 Bearer token（模拟器不校验，只透传）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(pub String);

/// 认证拦截器
///
/// 模拟器接受任意 token：存在 `Bearer` 头时记录并放入扩展，缺失时只记录 debug 日志。
/// 请求永远不会被拒绝。
#[allow(clippy::result_large_err)]
pub fn auth_interceptor(mut request: Request<()>) -> Result<Request<()>, Status> {
    match extract_token(&request) {
        Some(token) => {
            trace!(token_len = token.len(), "Bearer token received");
            request.extensions_mut().insert(BearerToken(token));
        }
        None => debug!("No bearer token in request"),
    }
    Ok(request)
}

/// 从请求中提取 token
fn extract_token<T>(request: &Request<T>) -> Option<String> {
    let auth_str = request.metadata().get("authorization")?.to_str().ok()?;
    auth_str.strip_prefix("Bearer ").map(str::to_string)
}
