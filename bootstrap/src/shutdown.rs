//! Graceful Shutdown

use std::future::Future;

use tokio::sync::watch;
use tracing::info;

/// Shutdown 控制器
///
/// 克隆后分发给各个后台任务，任意一处触发后所有等待者都会被唤醒，
/// 包括触发之后才开始等待的任务。
#[derive(Clone)]
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// 触发关闭
    pub fn shutdown(&self) {
        info!("Triggering shutdown");
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// 创建一个可以等待关闭的 future
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            // 发送端随控制器一起存活，Err 只会在全部控制器 drop 后出现
            let _ = rx.wait_for(|stopped| *stopped).await;
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// 运行任务直到完成或收到关闭信号
pub async fn run_until_shutdown<Fut>(shutdown: ShutdownController, name: &'static str, task: Fut)
where
    Fut: Future<Output = ()> + Send,
{
    tokio::select! {
        _ = task => {},
        _ = shutdown.wait() => {
            info!(task = name, "Task cancelled due to shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_late_waiter_sees_shutdown() {
        let ctl = ShutdownController::new();
        ctl.shutdown();
        assert!(ctl.is_shutdown());
        tokio::time::timeout(Duration::from_millis(100), ctl.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_until_shutdown_cancels() {
        let ctl = ShutdownController::new();
        let handle = tokio::spawn(run_until_shutdown(
            ctl.clone(),
            "forever",
            std::future::pending::<()>(),
        ));
        ctl.shutdown();
        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
