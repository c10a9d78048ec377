use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use erasure_config::LivenessConfig;
use erasure_core::{traits::QueueStore, ErasureResult};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// 存活标记
///
/// 定期写入带过期时间的当前Unix时间戳，停机时删除。
/// 写入失败只记录日志。
pub struct LivenessReporter {
    store: Arc<dyn QueueStore>,
    key: String,
    interval: Duration,
    ttl: Duration,
}

impl LivenessReporter {
    pub fn new(
        store: Arc<dyn QueueStore>,
        key: impl Into<String>,
        config: &LivenessConfig,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            interval: config.interval(),
            ttl: config.ttl(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn beat(&self) -> ErasureResult<()> {
        let timestamp = Utc::now().timestamp();
        self.store
            .set_with_expiry(&self.key, &timestamp.to_string(), self.ttl)
            .await?;
        debug!(timestamp = timestamp, "Heartbeat sent");
        Ok(())
    }

    pub async fn clear(&self) -> ErasureResult<()> {
        self.store.delete(&self.key).await
    }

    pub async fn is_alive(&self) -> ErasureResult<bool> {
        Ok(self
            .store
            .get(&self.key)
            .await?
            .is_some_and(|value| !value.is_empty()))
    }

    /// 立即写入一次，之后按间隔刷新，收到停机信号后删除标记
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(key = %self.key, interval = ?self.interval, "Starting heartbeat");
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.beat().await {
                        error!("Failed to send heartbeat: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Heartbeat stopped");
                    break;
                }
            }
        }

        if let Err(e) = self.clear().await {
            error!("Failed to clear heartbeat on shutdown: {}", e);
        }
    }
}
