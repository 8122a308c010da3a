//! Metrics 模块
//!
//! 提供 Prometheus metrics 导出

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Metrics 记录器
pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl MetricsRecorder {
    /// 安装全局 Prometheus recorder（每个进程只能调用一次）
    pub fn install() -> Result<Self, BuildError> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        Ok(Self { handle })
    }

    /// 不注册为全局 recorder，只用于测试和嵌入场景
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: recorder.handle(),
        }
    }

    /// 获取 Prometheus 格式的 metrics
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// 记录 gRPC 请求
pub fn record_grpc_request(service: &str, method: &str, status: &str, duration_ms: f64) {
    let labels = [
        ("service", service.to_string()),
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];

    counter!("grpc_requests_total", &labels).increment(1);
    histogram!("grpc_request_duration_ms", &labels).record(duration_ms);
}

/// 记录提交的订单
pub fn record_order_submitted(source: &str, order_type: &str, status: &str) {
    let labels = [
        ("source", source.to_string()),
        ("order_type", order_type.to_string()),
        ("status", status.to_string()),
    ];
    counter!("emulator_orders_submitted_total", &labels).increment(1);
}

/// 记录撤单
pub fn record_order_cancelled(source: &str) {
    let labels = [("source", source.to_string())];
    counter!("emulator_orders_cancelled_total", &labels).increment(1);
}

/// 记录一次撮合产生的成交
pub fn record_trades(count: usize, lots: i64) {
    counter!("emulator_trades_total").increment(count as u64);
    counter!("emulator_lots_traded_total").increment(lots.max(0) as u64);
}

/// 设置活跃流订阅数
pub fn set_stream_subscribers(kind: &str, count: usize) {
    let labels = [("kind", kind.to_string())];
    gauge!("emulator_stream_subscribers", &labels).set(count as f64);
}

/// 记录事件总线上被跳过的事件
pub fn record_events_lagged(consumer: &str, skipped: u64) {
    let labels = [("consumer", consumer.to_string())];
    counter!("emulator_events_lagged_total", &labels).increment(skipped);
}

/// 请求计时器
pub struct RequestTimer {
    start: Instant,
    service: &'static str,
    method: &'static str,
}

impl RequestTimer {
    pub fn new(service: &'static str, method: &'static str) -> Self {
        Self {
            start: Instant::now(),
            service,
            method,
        }
    }

    pub fn finish(self, status: &str) {
        let duration = self.start.elapsed().as_secs_f64() * 1000.0;
        record_grpc_request(self.service, self.method, status, duration);
    }

    /// 按结果记录，错误时使用 gRPC 状态码作为标签
    pub fn observe<T>(self, result: &Result<T, tonic::Status>) {
        match result {
            Ok(_) => self.finish("ok"),
            Err(status) => self.finish(&format!("{:?}", status.code())),
        }
    }
}
