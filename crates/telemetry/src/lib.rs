//! telemetry - 可观测性库
//!
//! 控制台日志 + 可选的会话日志文件 (`<dir>/emulator_<timestamp>.log`)

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const SESSION_LOG_PREFIX: &str = "emulator_";
pub const SESSION_LOG_SUFFIX: &str = ".log";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to prepare log directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// 初始化 tracing
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

/// 初始化 JSON 格式的 tracing（生产环境）
pub fn init_tracing_json(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .init();
}

/// 会话日志选项
#[derive(Debug, Clone)]
pub struct SessionLogOptions {
    pub log_level: String,
    pub json: bool,
    /// None 表示只输出到控制台
    pub log_dir: Option<PathBuf>,
    pub max_files: usize,
}

/// 持有后台写线程，drop 时刷新剩余日志
#[must_use]
pub struct TelemetryGuard {
    _file: Option<WorkerGuard>,
    pub session_file: Option<PathBuf>,
}

/// 初始化控制台 + 会话文件日志，并清理超出保留数量的旧会话日志
pub fn init_session_tracing(opts: &SessionLogOptions) -> Result<TelemetryGuard, TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(opts.log_level.as_str()));

    let (file_writer, guard, session_file) = match &opts.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let name = session_log_name(chrono::Local::now());
            let appender = tracing_appender::rolling::never(dir, &name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard), Some(dir.join(name)))
        }
        None => (None, None, None),
    };

    if opts.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .with(file_writer.map(|w| fmt::layer().with_writer(w).with_ansi(false)))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .with(file_writer.map(|w| fmt::layer().with_writer(w).with_ansi(false)))
            .try_init()?;
    }

    if let Some(dir) = &opts.log_dir {
        match cleanup_old_logs(dir, opts.max_files) {
            Ok(0) => tracing::debug!(dir = %dir.display(), "Session log count within limit"),
            Ok(removed) => tracing::info!(removed, keep = opts.max_files, "Removed old session logs"),
            Err(e) => tracing::warn!(error = %e, "Failed to cleanup old log files"),
        }
    }

    Ok(TelemetryGuard {
        _file: guard,
        session_file,
    })
}

/// 会话日志文件名，例如 `emulator_20240131_235959.log`
pub fn session_log_name<Tz: chrono::TimeZone>(at: chrono::DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}{}{}",
        SESSION_LOG_PREFIX,
        at.format("%Y%m%d_%H%M%S"),
        SESSION_LOG_SUFFIX
    )
}

/// 只保留最新的 `keep` 个会话日志（按修改时间），返回删除数量
///
/// 目录不存在时什么都不做。单个文件删除失败只记录警告。
pub fn cleanup_old_logs(dir: &Path, keep: usize) -> std::io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut sessions: Vec<(PathBuf, SystemTime)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(SESSION_LOG_PREFIX) || !name.ends_with(SESSION_LOG_SUFFIX) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        sessions.push((path, modified));
    }

    if sessions.len() <= keep {
        return Ok(0);
    }

    // 最新的在前
    sessions.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in sessions.into_iter().skip(keep) {
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(file = %path.display(), "Deleted old log file");
                removed += 1;
            }
            Err(e) => tracing::warn!(file = %path.display(), error = %e, "Failed to delete old log file"),
        }
    }
    Ok(removed)
}
