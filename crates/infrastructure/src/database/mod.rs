pub mod postgres;

use std::time::Duration;

use erasure_config::DatabaseConfig;
use erasure_core::ErasureResult;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

/// 数据库连接池管理器
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    /// 创建新的数据库管理器
    pub async fn new(config: &DatabaseConfig) -> ErasureResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.threads)
            .acquire_timeout(config.connection_timeout())
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.connection_url())
            .await?;

        info!(host = %config.host, database = %config.name, "Connected to database");
        Ok(Self { pool })
    }

    /// 获取数据库连接池
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 关闭数据库连接池
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
