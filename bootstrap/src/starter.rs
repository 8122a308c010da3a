//! 服务启动器
//!
//! 一个进程内同时监听 gRPC 与 HTTP 两个端口，共享同一个关闭信号

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use emu_config::AppConfig;
use tonic::service::Routes;
use tonic::transport::Server;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::health::{HealthChecker, ReadinessProbe, health_router};
use crate::metrics::MetricsRecorder;
use crate::runtime::{init_runtime, shutdown_signal};
use crate::shutdown::ShutdownController;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 传给服务构建闭包的上下文
pub struct ServerContext {
    pub config: AppConfig,
    /// 后台任务应在关闭时退出
    pub shutdown: ShutdownController,
}

/// 服务构建闭包的产物
pub struct ServiceParts {
    pub grpc: Routes,
    pub http: Router,
    pub probes: Vec<Arc<dyn ReadinessProbe>>,
}

/// 运行服务
///
/// 1. 加载配置
/// 2. 初始化日志（控制台 + 会话文件）和 metrics
/// 3. 调用闭包构建 gRPC 路由、HTTP 路由与就绪探针
/// 4. 同时启动两个监听并处理 graceful shutdown
///
/// # 示例
///
/// ```ignore
/// emu_bootstrap::run_server("config", |ctx| async move {
///     let app = build(ctx.config)?;
///     Ok(ServiceParts { grpc: app.grpc_routes(), http: app.http_router(), probes: vec![] })
/// }).await
/// ```
pub async fn run_server<F, Fut>(config_dir: &str, service_builder: F) -> Result<(), BoxError>
where
    F: FnOnce(ServerContext) -> Fut,
    Fut: Future<Output = Result<ServiceParts, BoxError>>,
{
    // 1. 加载配置
    let config = AppConfig::load(config_dir)?;

    // 2. 初始化运行时
    let _telemetry = init_runtime(&config)?;
    let metrics = Arc::new(MetricsRecorder::install()?);

    info!("Starting {} service", config.app_name);

    // 3. 构建服务
    let shutdown = ShutdownController::new();
    let parts = service_builder(ServerContext {
        config: config.clone(),
        shutdown: shutdown.clone(),
    })
    .await?;

    let checker = parts
        .probes
        .into_iter()
        .fold(HealthChecker::new(), |checker, probe| checker.with_probe(probe));

    let http_app = parts
        .http
        .merge(health_router(Arc::new(checker), metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let grpc_addr: SocketAddr = config.server.grpc_addr().parse()?;
    let http_addr: SocketAddr = config.server.http_addr().parse()?;

    // 4. 信号 -> 关闭控制器
    let signal_ctl = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_ctl.shutdown();
    });

    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    info!(%http_addr, "HTTP server starting");
    info!(%grpc_addr, "gRPC server starting");

    let http_ctl = shutdown.clone();
    let http = async move {
        let result = axum::serve(listener, http_app)
            .with_graceful_shutdown(http_ctl.wait())
            .await;
        // 任一监听退出都会带停另一个
        http_ctl.shutdown();
        result
    };

    let grpc_ctl = shutdown.clone();
    let grpc = async move {
        let result = Server::builder()
            .add_routes(parts.grpc)
            .serve_with_shutdown(grpc_addr, grpc_ctl.wait())
            .await;
        grpc_ctl.shutdown();
        result
    };

    let (http_result, grpc_result) = tokio::join!(http, grpc);

    if let Err(e) = &http_result {
        error!(error = %e, "HTTP server error");
    }
    if let Err(e) = &grpc_result {
        error!(error = %e, "gRPC server error");
    }

    info!("Service stopped");

    http_result?;
    grpc_result?;
    Ok(())
}
