//! 健康检查模块
//!
//! 提供 /health、/ready、/actuator/health 和 /metrics 端点

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;

use crate::metrics::MetricsRecorder;

/// 健康检查状态
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub checks: Vec<ComponentHealth>,
}

/// 组件健康状态
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthStatus {
    pub fn healthy() -> Self {
        Self {
            status: "UP".to_string(),
            checks: vec![],
        }
    }

    pub fn add_check(&mut self, check: ComponentHealth) {
        if check.status != "UP" {
            self.status = "DOWN".to_string();
        }
        self.checks.push(check);
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "UP"
    }
}

impl ComponentHealth {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: "UP".to_string(),
            message: None,
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: "DOWN".to_string(),
            message: Some(message.into()),
        }
    }
}

/// 就绪探针，由各服务按自己的依赖实现
pub trait ReadinessProbe: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self) -> Result<(), String>;
}

/// 健康检查器
#[derive(Default)]
pub struct HealthChecker {
    probes: Vec<Arc<dyn ReadinessProbe>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    /// 执行存活检查（liveness）
    ///
    /// 只检查服务是否在运行，不检查依赖
    pub fn liveness(&self) -> HealthStatus {
        HealthStatus::healthy()
    }

    /// 执行就绪检查（readiness）
    pub fn readiness(&self) -> HealthStatus {
        let mut status = HealthStatus::healthy();
        for probe in &self.probes {
            let check = match probe.check() {
                Ok(()) => ComponentHealth::healthy(probe.name()),
                Err(msg) => ComponentHealth::unhealthy(probe.name(), msg),
            };
            status.add_check(check);
        }
        status
    }
}

/// 健康检查路由状态
#[derive(Clone)]
struct HealthState {
    checker: Arc<HealthChecker>,
    metrics: Arc<MetricsRecorder>,
}

/// 构建健康检查 + metrics 路由
pub fn health_router(checker: Arc<HealthChecker>, metrics: Arc<MetricsRecorder>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/actuator/health", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(HealthState { checker, metrics })
}

/// Liveness 端点处理器
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.checker.liveness()))
}

/// Readiness 端点处理器
async fn ready_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let status = state.checker.readiness();
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

/// Metrics 端点处理器
async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}
