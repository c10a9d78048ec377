use std::sync::Arc;

use erasure_core::ErasureResult;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::reliable_queue::ReliableQueue;
use crate::slot_pool::SlotPool;
use crate::task_execution::TaskExecutor;

/// 单消费者调度循环
///
/// 每一轮先占用槽位再认领条目，认领到的条目总有槽位可用；
/// 停机时不会留下已认领但未执行的条目。
pub struct Dispatcher {
    queue: Arc<ReliableQueue>,
    executor: Arc<TaskExecutor>,
    slots: SlotPool,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<ReliableQueue>,
        executor: Arc<TaskExecutor>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            queue,
            executor,
            slots: SlotPool::new(max_concurrency),
        }
    }

    pub fn slots(&self) -> &SlotPool {
        &self.slots
    }

    /// 运行到收到停机信号，返回前等待所有执行中的任务完成
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> ErasureResult<()> {
        info!(
            max_concurrency = self.slots.capacity(),
            "Dispatcher started"
        );

        loop {
            let permit = tokio::select! {
                permit = self.slots.acquire() => permit?,
                _ = shutdown.recv() => break,
            };

            let Some(item) = self.queue.claim_next(&mut shutdown).await else {
                break;
            };

            debug!(
                request_id = %item.request_id,
                in_use = self.slots.in_use(),
                "Dispatching claimed item"
            );
            let executor = Arc::clone(&self.executor);
            tokio::spawn(async move {
                let _permit = permit;
                executor.execute(item).await;
            });
        }

        info!(
            in_use = self.slots.in_use(),
            "Dispatcher stopped claiming, waiting for running tasks"
        );
        self.slots.wait_idle().await?;
        info!("Dispatcher drained");
        Ok(())
    }
}
