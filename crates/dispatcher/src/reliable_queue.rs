use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use erasure_config::QueueConfig;
use erasure_core::{
    models::{Disposition, ErasureRequest, QueuedItem, RequestId},
    traits::QueueStore,
    ErasureError, ErasureResult,
};
use metrics::counter;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, error, info, warn};

/// 队列使用的三个列表键
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    pub pending: String,
    pub in_flight: String,
    pub dead_letter: String,
}

impl QueueKeys {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            pending: config.pending_key(),
            in_flight: config.in_flight_key(),
            dead_letter: config.dead_letter_key(),
        }
    }
}

/// 三个列表的当前内容，按从旧到新排列
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    pub pending: Vec<QueuedItem>,
    pub in_flight: Vec<QueuedItem>,
    pub dead_letter: Vec<QueuedItem>,
    /// 无法解析的原始条目
    pub unreadable: Vec<String>,
}

/// 可靠队列
///
/// 条目在 pending、in-flight、dead-letter 三个列表之间移动，每次移动都是
/// 存储层的单个原子操作。确认和拒绝按 `request_id` 定位条目，不比较负载内容。
pub struct ReliableQueue {
    store: Arc<dyn QueueStore>,
    keys: QueueKeys,
    max_attempts: u32,
    claim_poll: Duration,
    store_backoff: Duration,
}

impl ReliableQueue {
    pub fn new(store: Arc<dyn QueueStore>, config: &QueueConfig, max_attempts: u32) -> Self {
        Self {
            store,
            keys: QueueKeys::from_config(config),
            max_attempts: max_attempts.max(1),
            claim_poll: config.claim_poll(),
            store_backoff: config.store_backoff(),
        }
    }

    pub fn with_claim_poll(mut self, claim_poll: Duration) -> Self {
        self.claim_poll = claim_poll;
        self
    }

    pub fn with_store_backoff(mut self, store_backoff: Duration) -> Self {
        self.store_backoff = store_backoff;
        self
    }

    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 包装请求并追加到 pending 尾部
    pub async fn enqueue(&self, request: ErasureRequest) -> ErasureResult<RequestId> {
        let item = QueuedItem::new(request);
        let encoded = item.encode()?;
        self.store.push_tail(&self.keys.pending, &encoded).await?;
        debug!(request_id = %item.request_id, "Request enqueued");
        Ok(item.request_id)
    }

    /// 认领下一个条目
    ///
    /// 一直阻塞到有条目可用或收到停机信号。存储错误在固定退避后重试，
    /// 不会向调用方传播。停机信号只在两次轮询之间检查，进行中的认领不会被中断。
    pub async fn claim_next(
        &self,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Option<QueuedItem> {
        loop {
            if shutdown_requested(shutdown) {
                debug!("Shutdown requested, stop claiming");
                return None;
            }

            match self
                .store
                .move_head_to_tail(&self.keys.pending, &self.keys.in_flight, self.claim_poll)
                .await
            {
                Ok(Some(raw)) => {
                    if let Some(item) = self.take_claimed(raw).await {
                        counter!("erasure_items_claimed_total").increment(1);
                        return Some(item);
                    }
                }
                Ok(None) => continue,
                Err(e) => {
                    error!(
                        "Failed to claim from queue, retrying in {:?}: {}",
                        self.store_backoff, e
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.store_backoff) => {}
                        _ = shutdown.recv() => return None,
                    }
                }
            }
        }
    }

    /// 处理刚移入 in-flight 的原始条目，无法解析时转入 dead-letter
    ///
    /// 旧条目没有 `request_id`，认领时分配的ID必须先写回 in-flight，
    /// 否则之后的确认和拒绝无法定位条目，写回失败时按固定退避重试。
    /// 已有ID的条目只是记录认领时间，写回失败不影响后续处理。
    async fn take_claimed(&self, raw: String) -> Option<QueuedItem> {
        let mut item = match QueuedItem::decode(&raw) {
            Ok(item) => item,
            Err(e) => {
                self.quarantine(&raw, &e).await;
                return None;
            }
        };

        let assigns_id = item.request_id.is_empty();
        item.mark_claimed(Utc::now());
        let updated = match item.encode() {
            Ok(updated) => updated,
            Err(e) if assigns_id => {
                self.quarantine(&raw, &e).await;
                return None;
            }
            Err(e) => {
                warn!(request_id = %item.request_id, "Failed to encode claimed item: {}", e);
                return Some(item);
            }
        };

        loop {
            match self
                .store
                .replace(&self.keys.in_flight, &raw, &updated)
                .await
            {
                Ok(true) => return Some(item),
                Ok(false) => {
                    warn!(
                        request_id = %item.request_id,
                        "Claimed item vanished from in-flight before update"
                    );
                    return None;
                }
                Err(e) if assigns_id => {
                    error!(
                        request_id = %item.request_id,
                        "Failed to store assigned request id, retrying in {:?}: {}",
                        self.store_backoff,
                        e
                    );
                    tokio::time::sleep(self.store_backoff).await;
                }
                Err(e) => {
                    warn!(
                        request_id = %item.request_id,
                        "Failed to record claim time: {}", e
                    );
                    return Some(item);
                }
            }
        }
    }

    async fn quarantine(&self, raw: &str, reason: &ErasureError) {
        error!(
            "Moving malformed queue item to dead-letter: {} (item: {})",
            reason, raw
        );
        match self
            .store
            .transfer(&self.keys.in_flight, &self.keys.dead_letter, raw, raw)
            .await
        {
            Ok(true) => {
                counter!("erasure_items_poisoned_total").increment(1);
            }
            Ok(false) => warn!("Malformed item already left in-flight list"),
            Err(e) => error!("Failed to move malformed item to dead-letter: {}", e),
        }
    }

    /// 从 in-flight 删除已完成的条目
    pub async fn acknowledge(&self, request_id: &RequestId) -> ErasureResult<()> {
        let Some((raw, _)) = self.find_in_flight(request_id).await? else {
            warn!(request_id = %request_id, "Acknowledged item not found in-flight");
            return Err(ErasureError::not_found(request_id.as_str()));
        };

        if !self.store.remove(&self.keys.in_flight, &raw).await? {
            warn!(request_id = %request_id, "Acknowledged item vanished before removal");
            return Err(ErasureError::not_found(request_id.as_str()));
        }

        counter!("erasure_items_acknowledged_total").increment(1);
        debug!(request_id = %request_id, "Item acknowledged");
        Ok(())
    }

    /// 拒绝条目：次数未用尽时回到 pending 尾部，否则进入 dead-letter
    pub async fn reject(&self, request_id: &RequestId) -> ErasureResult<Disposition> {
        let Some((raw, mut item)) = self.find_in_flight(request_id).await? else {
            warn!(request_id = %request_id, "Rejected item not found in-flight");
            return Err(ErasureError::not_found(request_id.as_str()));
        };

        item.attempt += 1;
        let (destination, disposition) = if item.attempt < self.max_attempts {
            (
                &self.keys.pending,
                Disposition::Requeued {
                    attempt: item.attempt,
                },
            )
        } else {
            (
                &self.keys.dead_letter,
                Disposition::DeadLettered {
                    attempt: item.attempt,
                },
            )
        };

        let updated = item.encode()?;
        if !self
            .store
            .transfer(&self.keys.in_flight, destination, &raw, &updated)
            .await?
        {
            warn!(request_id = %request_id, "Rejected item vanished before transfer");
            return Err(ErasureError::not_found(request_id.as_str()));
        }

        counter!("erasure_items_rejected_total").increment(1);
        match disposition {
            Disposition::DeadLettered { attempt } => {
                counter!("erasure_items_dead_lettered_total").increment(1);
                error!(
                    request_id = %request_id,
                    attempt = attempt,
                    "Retry limit reached, item moved to dead-letter"
                );
            }
            _ => info!(
                request_id = %request_id,
                attempt = item.attempt,
                max_attempts = self.max_attempts,
                "Item requeued for retry"
            ),
        }

        Ok(disposition)
    }

    /// 把 in-flight 中的全部条目按从旧到新的顺序放回 pending 尾部
    ///
    /// 启动时、第一次认领之前调用。返回放回 pending 的条目数，
    /// 无法解析的条目转入 dead-letter，不计入返回值。
    pub async fn recover_stalled(&self) -> ErasureResult<usize> {
        let stalled = self.store.list(&self.keys.in_flight).await?;
        if stalled.is_empty() {
            debug!("No stalled items to recover");
            return Ok(0);
        }

        let mut recovered = 0;
        for raw in stalled {
            match QueuedItem::decode(&raw) {
                Ok(item) => {
                    if self
                        .store
                        .transfer(&self.keys.in_flight, &self.keys.pending, &raw, &raw)
                        .await?
                    {
                        recovered += 1;
                        debug!(request_id = %item.request_id, "Recovered stalled item");
                    }
                }
                Err(e) => self.quarantine(&raw, &e).await,
            }
        }

        info!("Recovered {} stalled items", recovered);
        Ok(recovered)
    }

    /// 读取三个列表的内容
    pub async fn snapshot(&self) -> ErasureResult<QueueSnapshot> {
        let mut snapshot = QueueSnapshot::default();
        for (key, items) in [
            (&self.keys.pending, &mut snapshot.pending),
            (&self.keys.in_flight, &mut snapshot.in_flight),
            (&self.keys.dead_letter, &mut snapshot.dead_letter),
        ] {
            for raw in self.store.list(key).await? {
                match QueuedItem::decode(&raw) {
                    Ok(item) => items.push(item),
                    Err(_) => snapshot.unreadable.push(raw),
                }
            }
        }
        Ok(snapshot)
    }

    async fn find_in_flight(
        &self,
        request_id: &RequestId,
    ) -> ErasureResult<Option<(String, QueuedItem)>> {
        let entries = self.store.list(&self.keys.in_flight).await?;
        Ok(entries.into_iter().find_map(|raw| {
            let item = QueuedItem::decode(&raw).ok()?;
            (item.request_id == *request_id).then_some((raw, item))
        }))
    }
}

/// 非阻塞地检查停机信号，发送端关闭或消息滞后同样视为停机
fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use erasure_core::models::RequestKind;
    use erasure_infrastructure::InMemoryQueueStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn queue(store: Arc<InMemoryQueueStore>, max_attempts: u32) -> ReliableQueue {
        ReliableQueue::new(store, &QueueConfig::default(), max_attempts)
            .with_claim_poll(Duration::from_millis(10))
            .with_store_backoff(Duration::from_millis(10))
    }

    fn request(user: u64) -> ErasureRequest {
        ErasureRequest::new(RequestKind::AllContentForUser, user)
    }

    #[tokio::test]
    async fn test_enqueue_appends_to_pending() {
        let store = Arc::new(InMemoryQueueStore::new());
        let queue = queue(store.clone(), 3);

        let first = queue.enqueue(request(1)).await.unwrap();
        let second = queue.enqueue(request(1)).await.unwrap();
        assert_ne!(first, second);

        let snapshot = queue.snapshot().await.unwrap();
        assert_eq!(snapshot.pending.len(), 2);
        assert_eq!(snapshot.pending[0].request_id, first);
        assert_eq!(snapshot.pending[0].attempt, 0);
    }

    #[tokio::test]
    async fn test_enqueue_fails_when_store_unavailable() {
        let store = Arc::new(InMemoryQueueStore::new());
        store.set_available(false);
        let err = queue(store, 3).enqueue(request(1)).await.unwrap_err();
        assert!(err.is_store_unavailable());
    }

    #[tokio::test]
    async fn test_claim_marks_item_in_flight() {
        let store = Arc::new(InMemoryQueueStore::new());
        let queue = queue(store.clone(), 3);
        let (_tx, mut rx) = broadcast::channel(1);

        let id = queue.enqueue(request(1)).await.unwrap();
        let item = queue.claim_next(&mut rx).await.unwrap();
        assert_eq!(item.request_id, id);
        assert!(item.last_claimed_at.is_some());

        let snapshot = queue.snapshot().await.unwrap();
        assert!(snapshot.pending.is_empty());
        assert_eq!(snapshot.in_flight.len(), 1);
        assert!(snapshot.in_flight[0].last_claimed_at.is_some());
    }

    #[tokio::test]
    async fn test_claim_returns_none_on_shutdown() {
        let store = Arc::new(InMemoryQueueStore::new());
        let queue = queue(store, 3);
        let (tx, mut rx) = broadcast::channel(1);
        tx.send(()).unwrap();

        assert!(queue.claim_next(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn test_claim_assigns_missing_request_id() {
        let store = Arc::new(InMemoryQueueStore::new());
        let queue = queue(store.clone(), 3);
        let (_tx, mut rx) = broadcast::channel(1);

        let legacy = r#"{"request":{"type":2,"user_id":5},"queued_at":"2024-01-01T00:00:00Z","retry_count":0,"origin":"bot"}"#;
        store.push_tail(&queue.keys().pending, legacy).await.unwrap();

        let item = queue.claim_next(&mut rx).await.unwrap();
        assert!(!item.request_id.is_empty());
        assert_eq!(item.extra.get("origin").and_then(|v| v.as_str()), Some("bot"));

        queue.acknowledge(&item.request_id).await.unwrap();
        assert_eq!(store.len(&queue.keys().in_flight).await.unwrap(), 0);
    }

    /// 前几次 `replace` 失败的存储
    struct FlakyReplaceStore {
        inner: InMemoryQueueStore,
        failures_left: AtomicUsize,
        replace_calls: AtomicUsize,
    }

    impl FlakyReplaceStore {
        fn new(failures: usize) -> Self {
            Self {
                inner: InMemoryQueueStore::new(),
                failures_left: AtomicUsize::new(failures),
                replace_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl QueueStore for FlakyReplaceStore {
        async fn push_tail(&self, list: &str, value: &str) -> ErasureResult<()> {
            self.inner.push_tail(list, value).await
        }

        async fn move_head_to_tail(
            &self,
            source: &str,
            destination: &str,
            wait: Duration,
        ) -> ErasureResult<Option<String>> {
            self.inner.move_head_to_tail(source, destination, wait).await
        }

        async fn list(&self, list: &str) -> ErasureResult<Vec<String>> {
            self.inner.list(list).await
        }

        async fn remove(&self, list: &str, value: &str) -> ErasureResult<bool> {
            self.inner.remove(list, value).await
        }

        async fn replace(&self, list: &str, current: &str, updated: &str) -> ErasureResult<bool> {
            self.replace_calls.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(ErasureError::StoreUnavailable("connection reset".to_string()));
            }
            self.inner.replace(list, current, updated).await
        }

        async fn transfer(
            &self,
            source: &str,
            destination: &str,
            current: &str,
            updated: &str,
        ) -> ErasureResult<bool> {
            self.inner.transfer(source, destination, current, updated).await
        }

        async fn len(&self, list: &str) -> ErasureResult<usize> {
            self.inner.len(list).await
        }

        async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> ErasureResult<()> {
            self.inner.set_with_expiry(key, value, ttl).await
        }

        async fn get(&self, key: &str) -> ErasureResult<Option<String>> {
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> ErasureResult<()> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_assigned_request_id_is_stored_before_claim_returns() {
        let store = Arc::new(FlakyReplaceStore::new(2));
        let queue = ReliableQueue::new(store.clone(), &QueueConfig::default(), 3)
            .with_claim_poll(Duration::from_millis(10))
            .with_store_backoff(Duration::from_millis(10));
        let (_tx, mut rx) = broadcast::channel(1);

        let legacy = r#"{"request":{"type":2,"user_id":5},"queued_at":"2024-01-01T00:00:00Z","retry_count":0}"#;
        store.push_tail(&queue.keys().pending, legacy).await.unwrap();

        let item = queue.claim_next(&mut rx).await.unwrap();
        assert_eq!(store.replace_calls.load(Ordering::SeqCst), 3);

        let snapshot = queue.snapshot().await.unwrap();
        assert_eq!(snapshot.in_flight.len(), 1);
        assert_eq!(snapshot.in_flight[0].request_id, item.request_id);

        queue.acknowledge(&item.request_id).await.unwrap();
        assert_eq!(store.len(&queue.keys().in_flight).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_claim_time_failure_does_not_block_identified_items() {
        let store = Arc::new(FlakyReplaceStore::new(1));
        let queue = ReliableQueue::new(store.clone(), &QueueConfig::default(), 3)
            .with_claim_poll(Duration::from_millis(10))
            .with_store_backoff(Duration::from_millis(10));
        let (_tx, mut rx) = broadcast::channel(1);

        let id = queue.enqueue(request(1)).await.unwrap();
        let item = queue.claim_next(&mut rx).await.unwrap();
        assert_eq!(item.request_id, id);
        assert_eq!(store.replace_calls.load(Ordering::SeqCst), 1);

        queue.acknowledge(&id).await.unwrap();
        assert_eq!(store.len(&queue.keys().in_flight).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_item_goes_to_dead_letter() {
        let store = Arc::new(InMemoryQueueStore::new());
        let queue = queue(store.clone(), 3);
        let (_tx, mut rx) = broadcast::channel(1);

        store.push_tail(&queue.keys().pending, "not json").await.unwrap();
        let id = queue.enqueue(request(1)).await.unwrap();

        let item = queue.claim_next(&mut rx).await.unwrap();
        assert_eq!(item.request_id, id);
        assert_eq!(
            store.list(&queue.keys().dead_letter).await.unwrap(),
            vec!["not json".to_string()]
        );
    }

    #[tokio::test]
    async fn test_acknowledge_unknown_id_is_not_found() {
        let store = Arc::new(InMemoryQueueStore::new());
        let queue = queue(store, 3);
        let err = queue.acknowledge(&RequestId::from("missing")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_reject_requeues_to_tail() {
        let store = Arc::new(InMemoryQueueStore::new());
        let queue = queue(store.clone(), 3);
        let (_tx, mut rx) = broadcast::channel(1);

        let first = queue.enqueue(request(1)).await.unwrap();
        let second = queue.enqueue(request(2)).await.unwrap();

        let item = queue.claim_next(&mut rx).await.unwrap();
        assert_eq!(item.request_id, first);
        let disposition = queue.reject(&first).await.unwrap();
        assert_eq!(disposition, Disposition::Requeued { attempt: 1 });

        let snapshot = queue.snapshot().await.unwrap();
        assert!(snapshot.in_flight.is_empty());
        assert_eq!(snapshot.pending[0].request_id, second);
        assert_eq!(snapshot.pending[1].request_id, first);
        assert_eq!(snapshot.pending[1].attempt, 1);
    }

    #[tokio::test]
    async fn test_recover_stalled_on_empty_in_flight() {
        let store = Arc::new(InMemoryQueueStore::new());
        assert_eq!(queue(store, 3).recover_stalled().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_recover_stalled_quarantines_malformed() {
        let store = Arc::new(InMemoryQueueStore::new());
        let queue = queue(store.clone(), 3);
        let item = QueuedItem::new(request(1));
        let raw = item.encode().unwrap();

        store.push_tail(&queue.keys().in_flight, "{broken").await.unwrap();
        store.push_tail(&queue.keys().in_flight, &raw).await.unwrap();

        assert_eq!(queue.recover_stalled().await.unwrap(), 1);
        assert_eq!(store.list(&queue.keys().pending).await.unwrap(), vec![raw]);
        assert_eq!(
            store.list(&queue.keys().dead_letter).await.unwrap(),
            vec!["{broken".to_string()]
        );
    }

    #[tokio::test]
    async fn test_shutdown_signal_states() {
        let (tx, mut rx) = broadcast::channel::<()>(1);
        assert!(!shutdown_requested(&mut rx));
        drop(tx);
        assert!(shutdown_requested(&mut rx));
    }
}
