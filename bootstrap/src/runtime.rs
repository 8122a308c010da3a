//! 服务运行时

use std::path::PathBuf;

use emu_config::AppConfig;
use emu_telemetry::{SessionLogOptions, TelemetryError, TelemetryGuard, init_session_tracing};
use tracing::{info, warn};

/// 初始化服务运行时
///
/// 返回的 guard 需要在 main 中持有到进程结束
pub fn init_runtime(config: &AppConfig) -> Result<TelemetryGuard, TelemetryError> {
    let opts = SessionLogOptions {
        log_level: config.telemetry.log_level.clone(),
        json: config.is_production(),
        log_dir: config
            .telemetry
            .file_logging
            .then(|| PathBuf::from(&config.telemetry.log_dir)),
        max_files: config.telemetry.max_log_files,
    };
    let guard = init_session_tracing(&opts)?;

    info!(
        app_name = %config.app_name,
        app_env = %config.app_env,
        session_log = ?guard.session_file,
        "Runtime initialized"
    );

    Ok(guard)
}

/// 等待关闭信号 (Ctrl+C / SIGTERM)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
