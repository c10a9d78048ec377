use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// 优雅关闭管理器
#[derive(Clone)]
pub struct ShutdownManager {
    /// 关闭信号发送器，触发关闭后置空
    shutdown_tx: Arc<RwLock<Option<broadcast::Sender<()>>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            shutdown_tx: Arc::new(RwLock::new(Some(shutdown_tx))),
        }
    }

    /// 订阅关闭信号，已经关闭时返回立即触发的接收器
    pub async fn subscribe(&self) -> broadcast::Receiver<()> {
        let shutdown_tx = self.shutdown_tx.read().await;
        match shutdown_tx.as_ref() {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(1);
                let _ = tx.send(());
                rx
            }
        }
    }

    /// 触发关闭，重复调用无副作用
    pub async fn shutdown(&self) {
        let mut shutdown_tx = self.shutdown_tx.write().await;
        let Some(tx) = shutdown_tx.take() else {
            debug!("关闭管理器已经触发过关闭");
            return;
        };

        debug!("发送关闭信号给 {} 个订阅者", tx.receiver_count());
        let _ = tx.send(());
        info!("关闭信号已发送");
    }

    pub async fn is_shutdown(&self) -> bool {
        self.shutdown_tx.read().await.is_none()
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 等待关闭信号并收尾
///
/// 收到 `signal` 后触发关闭，然后一直等到应用结束，在途任务没有截止时间。
/// 应用在信号之前退出时返回错误，进程以非零状态退出。
pub async fn run_until_shutdown<F>(
    mut app: JoinHandle<anyhow::Result<()>>,
    shutdown_manager: &ShutdownManager,
    signal: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::select! {
        _ = signal => {}
        result = &mut app => {
            return match result {
                Ok(Ok(())) => Err(anyhow!("应用在收到关闭信号之前退出")),
                Ok(Err(e)) => Err(e.context("应用运行失败")),
                Err(e) => Err(anyhow::Error::new(e).context("应用任务异常")),
            };
        }
    }

    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match app.await {
        Ok(result) => result.context("应用关闭时发生错误"),
        Err(e) => Err(anyhow::Error::new(e).context("应用任务异常")),
    }
}
