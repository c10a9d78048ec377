use std::time::Duration;

use async_trait::async_trait;

use crate::ErasureResult;

/// 持久化列表存储抽象
///
/// 列表按“头部最旧、尾部最新”的顺序描述，具体实现负责映射到底层命令。
/// `move_head_to_tail` 与 `transfer` 必须是单个原子操作。
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// 追加到列表尾部
    async fn push_tail(&self, list: &str, value: &str) -> ErasureResult<()>;

    /// 原子地把 `source` 的头部元素移动到 `destination` 尾部
    ///
    /// 列表为空时最多等待 `wait`，超时返回 `None`。
    async fn move_head_to_tail(
        &self,
        source: &str,
        destination: &str,
        wait: Duration,
    ) -> ErasureResult<Option<String>>;

    /// 按从头到尾的顺序列出全部元素
    async fn list(&self, list: &str) -> ErasureResult<Vec<String>>;

    /// 删除一个与 `value` 完全相同的元素，返回是否删除
    async fn remove(&self, list: &str, value: &str) -> ErasureResult<bool>;

    /// 原地替换一个元素，位置保持不变
    async fn replace(&self, list: &str, current: &str, updated: &str) -> ErasureResult<bool>;

    /// 原子地从 `source` 删除 `current` 并把 `updated` 追加到 `destination` 尾部
    ///
    /// `current` 不存在时不写入任何内容并返回 `false`。
    async fn transfer(
        &self,
        source: &str,
        destination: &str,
        current: &str,
        updated: &str,
    ) -> ErasureResult<bool>;

    async fn len(&self, list: &str) -> ErasureResult<usize>;

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> ErasureResult<()>;

    async fn get(&self, key: &str) -> ErasureResult<Option<String>>;

    async fn delete(&self, key: &str) -> ErasureResult<()>;
}
