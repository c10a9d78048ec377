use std::sync::Arc;
use std::time::Duration;

use erasure_core::{ErasureError, ErasureResult};
use erasure_dispatcher::{Dispatcher, ReliableQueue};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use super::LivenessReporter;

/// 工作进程生命周期
///
/// 启动顺序：恢复滞留条目 → 启动存活标记 → 启动调度循环。
/// 收到停机信号后停止认领、清除存活标记，并等待执行中的任务完成。
pub struct WorkerLifecycle {
    worker_id: String,
    queue: Arc<ReliableQueue>,
    dispatcher: Arc<Dispatcher>,
    liveness: Arc<LivenessReporter>,
    recovery_backoff: Duration,
}

impl WorkerLifecycle {
    pub fn new(
        queue: Arc<ReliableQueue>,
        dispatcher: Arc<Dispatcher>,
        liveness: Arc<LivenessReporter>,
        recovery_backoff: Duration,
    ) -> Self {
        let worker_id = hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            worker_id,
            queue,
            dispatcher,
            liveness,
            recovery_backoff,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// 运行到收到停机信号并完成收尾
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> ErasureResult<()> {
        info!(worker_id = %self.worker_id, "Starting erasure worker");

        if !self.recover_stalled(&mut shutdown_rx).await {
            info!("Shutdown requested during recovery");
            return Ok(());
        }

        let (stop_tx, _) = broadcast::channel(1);

        let liveness_handle = {
            let liveness = Arc::clone(&self.liveness);
            let stop_rx = stop_tx.subscribe();
            tokio::spawn(async move { liveness.run(stop_rx).await })
        };

        let mut dispatcher_handle = {
            let dispatcher = Arc::clone(&self.dispatcher);
            let stop_rx = stop_tx.subscribe();
            tokio::spawn(async move { dispatcher.run(stop_rx).await })
        };

        info!(worker_id = %self.worker_id, "Erasure worker is now running");

        let dispatch_result = tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("停止认领新请求，等待执行中的任务完成");
                let _ = stop_tx.send(());
                (&mut dispatcher_handle).await
            }
            result = &mut dispatcher_handle => {
                warn!("Dispatcher stopped unexpectedly");
                let _ = stop_tx.send(());
                result
            }
        };

        if let Err(e) = liveness_handle.await {
            error!("Heartbeat task failed: {}", e);
        }

        let result = dispatch_result
            .map_err(|e| ErasureError::Internal(format!("dispatcher task failed: {e}")))
            .and_then(|result| result);
        info!(worker_id = %self.worker_id, "Erasure worker stopped");
        result
    }

    /// 在第一次认领前恢复滞留条目，存储不可用时退避重试
    ///
    /// 恢复完成返回 `true`，期间收到停机信号返回 `false`。
    async fn recover_stalled(&self, shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
        loop {
            match self.queue.recover_stalled().await {
                Ok(count) => {
                    if count > 0 {
                        warn!(count = count, "Recovered stalled requests from previous run");
                    }
                    return true;
                }
                Err(e) => {
                    error!(
                        "Failed to recover stalled requests, retrying in {:?}: {}",
                        self.recovery_backoff, e
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.recovery_backoff) => {}
                        _ = shutdown_rx.recv() => return false,
                    }
                }
            }
        }
    }
}
