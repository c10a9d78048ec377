use std::time::Duration;

use async_trait::async_trait;
use erasure_core::{traits::QueueStore, ErasureResult};
use redis::Script;
use tracing::{debug, instrument};

use super::connection_manager::RedisConnectionManager;

/// 在列表中原地替换一个元素
const REPLACE_SCRIPT: &str = r#"
local idx = redis.call('LPOS', KEYS[1], ARGV[1])
if not idx then
    return 0
end
redis.call('LSET', KEYS[1], idx, ARGV[2])
return 1
"#;

/// 从源列表删除并写入目标列表尾部，两步在同一个脚本中执行
const TRANSFER_SCRIPT: &str = r#"
local removed = redis.call('LREM', KEYS[1], 1, ARGV[1])
if removed == 0 then
    return 0
end
redis.call('LPUSH', KEYS[2], ARGV[2])
return 1
"#;

/// 基于Redis列表的队列存储
///
/// 列表尾部对应Redis的左端（LPUSH），头部对应右端，
/// 因此认领使用 `BLMOVE source destination RIGHT LEFT`。
pub struct RedisQueueStore {
    connections: RedisConnectionManager,
    replace_script: Script,
    transfer_script: Script,
}

impl RedisQueueStore {
    pub fn new(connections: RedisConnectionManager) -> Self {
        Self {
            connections,
            replace_script: Script::new(REPLACE_SCRIPT),
            transfer_script: Script::new(TRANSFER_SCRIPT),
        }
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    #[instrument(skip(self, value))]
    async fn push_tail(&self, list: &str, value: &str) -> ErasureResult<()> {
        let mut conn = self.connections.connection();
        let _: i64 = redis::cmd("LPUSH")
            .arg(list)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn move_head_to_tail(
        &self,
        source: &str,
        destination: &str,
        wait: Duration,
    ) -> ErasureResult<Option<String>> {
        let mut conn = self.connections.blocking_connection();
        let moved: Option<String> = redis::cmd("BLMOVE")
            .arg(source)
            .arg(destination)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(wait.as_secs_f64())
            .query_async(&mut conn)
            .await?;
        if moved.is_some() {
            debug!(source = source, destination = destination, "Moved item between lists");
        }
        Ok(moved)
    }

    async fn list(&self, list: &str) -> ErasureResult<Vec<String>> {
        let mut conn = self.connections.connection();
        let mut values: Vec<String> = redis::cmd("LRANGE")
            .arg(list)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;
        values.reverse();
        Ok(values)
    }

    async fn remove(&self, list: &str, value: &str) -> ErasureResult<bool> {
        let mut conn = self.connections.connection();
        let removed: i64 = redis::cmd("LREM")
            .arg(list)
            .arg(1)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn replace(&self, list: &str, current: &str, updated: &str) -> ErasureResult<bool> {
        let mut conn = self.connections.connection();
        let replaced: i64 = self
            .replace_script
            .key(list)
            .arg(current)
            .arg(updated)
            .invoke_async(&mut conn)
            .await?;
        Ok(replaced == 1)
    }

    #[instrument(skip(self, current, updated))]
    async fn transfer(
        &self,
        source: &str,
        destination: &str,
        current: &str,
        updated: &str,
    ) -> ErasureResult<bool> {
        let mut conn = self.connections.connection();
        let moved: i64 = self
            .transfer_script
            .key(source)
            .key(destination)
            .arg(current)
            .arg(updated)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved == 1)
    }

    async fn len(&self, list: &str) -> ErasureResult<usize> {
        let mut conn = self.connections.connection();
        let len: usize = redis::cmd("LLEN").arg(list).query_async(&mut conn).await?;
        Ok(len)
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> ErasureResult<()> {
        let mut conn = self.connections.connection();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> ErasureResult<Option<String>> {
        let mut conn = self.connections.connection();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> ErasureResult<()> {
        let mut conn = self.connections.connection();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }
}
