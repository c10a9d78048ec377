use std::time::Duration;

use erasure_config::RedisConfig;
use erasure_core::{ErasureError, ErasureResult};
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::Client;
use tracing::{debug, error};

/// 阻塞命令响应超时在等待时间之外的余量
const BLOCKING_RESPONSE_MARGIN: Duration = Duration::from_secs(5);

/// Redis连接管理
///
/// 普通命令共用一个多路复用连接；阻塞认领命令使用独立连接，
/// 避免长时间等待阻塞其他命令。
#[derive(Clone)]
pub struct RedisConnectionManager {
    commands: ConnectionManager,
    blocking: ConnectionManager,
}

impl RedisConnectionManager {
    pub async fn new(config: &RedisConfig, max_block: Duration) -> ErasureResult<Self> {
        let client = Client::open(config.build_connection_url()).map_err(|e| {
            ErasureError::Configuration(format!("Failed to create Redis client: {e}"))
        })?;

        let commands = ConnectionManager::new(client.clone()).await?;
        let blocking_config = ConnectionManagerConfig::new()
            .set_response_timeout(max_block + BLOCKING_RESPONSE_MARGIN);
        let blocking = ConnectionManager::new_with_config(client, blocking_config).await?;

        let manager = Self { commands, blocking };
        manager.ping().await?;
        debug!(address = %config.address, "Successfully connected to Redis");

        Ok(manager)
    }

    pub fn connection(&self) -> ConnectionManager {
        self.commands.clone()
    }

    pub fn blocking_connection(&self) -> ConnectionManager {
        self.blocking.clone()
    }

    pub async fn ping(&self) -> ErasureResult<()> {
        let mut conn = self.connection();
        let response: String = redis::cmd("PING").query_async(&mut conn).await?;
        if response == "PONG" {
            Ok(())
        } else {
            let error_msg = format!("Unexpected PING response: {response}");
            error!("{}", error_msg);
            Err(ErasureError::StoreUnavailable(error_msg))
        }
    }
}
