//! emu-errors - 统一错误处理
//!
//! 基于 RFC 7807 Problem Details 规范

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn failed_precondition(msg: impl Into<String>) -> Self {
        Self::FailedPrecondition(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 转换为 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::PermissionDenied(_) => 403,
            Self::Conflict(_) => 409,
            Self::FailedPrecondition(_) => 412,
            Self::Internal(_) => 500,
        }
    }

    /// 转换为 gRPC 状态码
    pub fn grpc_code(&self) -> tonic::Code {
        match self {
            Self::NotFound(_) => tonic::Code::NotFound,
            Self::Validation(_) => tonic::Code::InvalidArgument,
            Self::PermissionDenied(_) => tonic::Code::PermissionDenied,
            Self::Conflict(_) => tonic::Code::AlreadyExists,
            Self::FailedPrecondition(_) => tonic::Code::FailedPrecondition,
            Self::Internal(_) => tonic::Code::Internal,
        }
    }

    /// 转换为 Problem Details
    pub fn to_problem_details(&self) -> ProblemDetails {
        ProblemDetails {
            r#type: self.problem_type(),
            title: self.problem_title(),
            status: self.status_code(),
            detail: self.to_string(),
            instance: None,
        }
    }

    fn problem_type(&self) -> String {
        let slug = match self {
            Self::NotFound(_) => "not-found",
            Self::Validation(_) => "validation",
            Self::PermissionDenied(_) => "permission-denied",
            Self::Conflict(_) => "conflict",
            Self::FailedPrecondition(_) => "failed-precondition",
            Self::Internal(_) => "internal",
        };
        format!("https://emulator.invest.local/problems/{}", slug)
    }

    fn problem_title(&self) -> String {
        match self {
            Self::NotFound(_) => "Resource Not Found",
            Self::Validation(_) => "Validation Error",
            Self::PermissionDenied(_) => "Permission Denied",
            Self::Conflict(_) => "Conflict",
            Self::FailedPrecondition(_) => "Failed Precondition",
            Self::Internal(_) => "Internal Server Error",
        }
        .to_string()
    }
}

impl From<AppError> for tonic::Status {
    fn from(err: AppError) -> Self {
        tonic::Status::new(err.grpc_code(), err.to_string())
    }
}

/// RFC 7807 Problem Details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl ProblemDetails {
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grpc_mapping() {
        assert_eq!(
            AppError::validation("qty").grpc_code(),
            tonic::Code::InvalidArgument
        );
        assert_eq!(
            AppError::permission_denied("owner").grpc_code(),
            tonic::Code::PermissionDenied
        );
        assert_eq!(AppError::not_found("order").grpc_code(), tonic::Code::NotFound);
    }

    #[test]
    fn test_status_conversion_keeps_message() {
        let status: tonic::Status = AppError::not_found("order 42").into();
        assert_eq!(status.code(), tonic::Code::NotFound);
        assert!(status.message().contains("order 42"));
    }

    #[test]
    fn test_problem_details() {
        let problem = AppError::validation("quantity must be positive")
            .to_problem_details()
            .with_instance("/api/orders");
        assert_eq!(problem.status, 400);
        assert_eq!(problem.title, "Validation Error");
        assert!(problem.r#type.ends_with("/validation"));
        assert_eq!(problem.instance.as_deref(), Some("/api/orders"));

        let json = serde_json::to_value(&problem).unwrap();
        assert_eq!(json["status"], 400);
    }
}
