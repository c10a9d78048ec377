use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use erasure_core::{ErasureError, ErasureResult};
use metrics::gauge;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Default)]
struct SlotStats {
    in_use: AtomicUsize,
    peak: AtomicUsize,
}

/// 有界并发槽位
///
/// 持有 [`SlotPermit`] 期间占用一个槽位，permit 被释放（包括任务panic展开）时归还。
#[derive(Debug, Clone)]
pub struct SlotPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    stats: Arc<SlotStats>,
}

/// 占用中的槽位
#[derive(Debug)]
pub struct SlotPermit {
    stats: Arc<SlotStats>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        let in_use = self.stats.in_use.fetch_sub(1, Ordering::SeqCst) - 1;
        gauge!("erasure_slots_in_use").set(in_use as f64);
    }
}

impl SlotPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            stats: Arc::new(SlotStats::default()),
        }
    }

    /// 等待并占用一个槽位
    pub async fn acquire(&self) -> ErasureResult<SlotPermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| ErasureError::Internal(format!("slot pool closed: {e}")))?;

        let in_use = self.stats.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak.fetch_max(in_use, Ordering::SeqCst);
        gauge!("erasure_slots_in_use").set(in_use as f64);

        Ok(SlotPermit {
            stats: Arc::clone(&self.stats),
            _permit: permit,
        })
    }

    /// 等待所有槽位归还
    pub async fn wait_idle(&self) -> ErasureResult<()> {
        let all = u32::try_from(self.capacity)
            .map_err(|_| ErasureError::Internal("slot pool capacity too large".to_string()))?;
        let _permits = self
            .semaphore
            .acquire_many(all)
            .await
            .map_err(|e| ErasureError::Internal(format!("slot pool closed: {e}")))?;
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.stats.in_use.load(Ordering::SeqCst)
    }

    /// 启动以来同时占用的最大槽位数
    pub fn peak(&self) -> usize {
        self.stats.peak.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let pool = SlotPool::new(2);
        let first = pool.acquire().await.unwrap();
        let second = pool.acquire().await.unwrap();
        assert_eq!(pool.in_use(), 2);

        drop(first);
        assert_eq!(pool.in_use(), 1);
        drop(second);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.peak(), 2);
    }

    #[tokio::test]
    async fn test_acquire_blocks_when_full() {
        let pool = SlotPool::new(1);
        let held = pool.acquire().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
        assert!(blocked.is_err());

        drop(held);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_zero_capacity_is_raised_to_one() {
        let pool = SlotPool::new(0);
        assert_eq!(pool.capacity(), 1);
    }

    #[tokio::test]
    async fn test_permit_released_on_panic() {
        let pool = SlotPool::new(1);
        let permit = pool.acquire().await.unwrap();

        let handle = tokio::spawn(async move {
            let _permit = permit;
            panic!("task failure");
        });
        assert!(handle.await.is_err());

        assert_eq!(pool.in_use(), 0);
        pool.wait_idle().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_idle_waits_for_permits() {
        let pool = SlotPool::new(2);
        let permit = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.wait_idle().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(permit);
        waiter.await.unwrap().unwrap();
    }
}
