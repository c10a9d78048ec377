use std::sync::Arc;

use anyhow::{Context, Result};
use erasure_config::AppConfig;
use erasure_core::traits::QueueStore;
use erasure_dispatcher::{Dispatcher, ExecutionSettings, ReliableQueue, TaskExecutor};
use erasure_infrastructure::{
    DatabaseManager, DiscordRestClient, HttpTranscriptArchive, PostgresTicketRepository,
    RedisConnectionManager, RedisQueueStore,
};
use erasure_worker::{
    DiscordNotifier, ErasureProcessor, LivenessReporter, LocaleCatalog, WorkerLifecycle,
};
use tokio::sync::broadcast;
use tracing::info;

/// 主应用程序，负责组装各组件
pub struct Application {
    lifecycle: WorkerLifecycle,
    database: DatabaseManager,
}

impl Application {
    /// 连接外部依赖并构建工作进程
    pub async fn new(config: &AppConfig) -> Result<Self> {
        info!("初始化应用程序");

        let redis = RedisConnectionManager::new(&config.redis, config.queue.claim_poll())
            .await
            .context("连接Redis失败")?;
        let store: Arc<dyn QueueStore> = Arc::new(RedisQueueStore::new(redis));

        let database = DatabaseManager::new(&config.database)
            .await
            .context("连接数据库失败")?;
        let tickets = Arc::new(PostgresTicketRepository::new(database.pool().clone()));

        let archive =
            Arc::new(HttpTranscriptArchive::new(&config.archiver).context("创建归档客户端失败")?);
        let discord =
            Arc::new(DiscordRestClient::new(&config.discord).context("创建Discord客户端失败")?);
        let locales = Arc::new(
            LocaleCatalog::load(&config.worker.locale_path)
                .with_context(|| format!("加载语言包失败: {}", config.worker.locale_path))?,
        );

        let processor = Arc::new(ErasureProcessor::new(
            tickets.clone(),
            archive,
            discord.clone(),
        ));
        let notifier = Arc::new(DiscordNotifier::new(discord, locales));

        let queue = Arc::new(ReliableQueue::new(
            store.clone(),
            &config.queue,
            config.worker.max_attempts,
        ));
        let executor = TaskExecutor::new(
            queue.clone(),
            processor,
            ExecutionSettings::from_config(&config.queue, &config.notification),
        )
        .with_notifier(notifier)
        .with_status_log(tickets);
        let dispatcher = Arc::new(Dispatcher::new(
            queue.clone(),
            Arc::new(executor),
            config.worker.max_concurrency,
        ));

        let liveness = Arc::new(LivenessReporter::new(
            store,
            config.queue.heartbeat_key(),
            &config.liveness,
        ));
        let lifecycle = WorkerLifecycle::new(
            queue,
            dispatcher,
            liveness,
            config.queue.store_backoff(),
        );

        Ok(Self {
            lifecycle,
            database,
        })
    }

    /// 运行到收到关闭信号并完成收尾
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(
            worker_id = %self.lifecycle.worker_id(),
            "应用程序开始运行"
        );

        let result = self.lifecycle.run(shutdown_rx).await;
        self.database.close().await;
        result.context("工作进程异常退出")
    }
}
