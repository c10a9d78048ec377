use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use erasure_core::{traits::QueueStore, ErasureError, ErasureResult};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

#[derive(Debug, Default)]
struct StoreState {
    lists: HashMap<String, VecDeque<String>>,
    values: HashMap<String, (String, Instant)>,
}

/// 内存队列存储
///
/// 语义与Redis实现一致，供测试和单进程部署使用。可以通过
/// [`InMemoryQueueStore::set_available`] 模拟存储不可用。
#[derive(Debug)]
pub struct InMemoryQueueStore {
    state: Mutex<StoreState>,
    pushed: Notify,
    available: AtomicBool,
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            pushed: Notify::new(),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> ErasureResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ErasureError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ))
        }
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn push_tail(&self, list: &str, value: &str) -> ErasureResult<()> {
        self.check_available()?;
        {
            let mut state = self.state.lock().await;
            state
                .lists
                .entry(list.to_string())
                .or_default()
                .push_back(value.to_string());
        }
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn move_head_to_tail(
        &self,
        source: &str,
        destination: &str,
        wait: Duration,
    ) -> ErasureResult<Option<String>> {
        let deadline = Instant::now() + wait;
        loop {
            self.check_available()?;

            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                let head = state.lists.get_mut(source).and_then(|l| l.pop_front());
                if let Some(value) = head {
                    state
                        .lists
                        .entry(destination.to_string())
                        .or_default()
                        .push_back(value.clone());
                    return Ok(Some(value));
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn list(&self, list: &str) -> ErasureResult<Vec<String>> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .lists
            .get(list)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn remove(&self, list: &str, value: &str) -> ErasureResult<bool> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let Some(entries) = state.lists.get_mut(list) else {
            return Ok(false);
        };
        match entries.iter().position(|v| v == value) {
            Some(idx) => {
                entries.remove(idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn replace(&self, list: &str, current: &str, updated: &str) -> ErasureResult<bool> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let slot = state
            .lists
            .get_mut(list)
            .and_then(|entries| entries.iter_mut().find(|v| v.as_str() == current));
        match slot {
            Some(entry) => {
                *entry = updated.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn transfer(
        &self,
        source: &str,
        destination: &str,
        current: &str,
        updated: &str,
    ) -> ErasureResult<bool> {
        self.check_available()?;
        {
            let mut state = self.state.lock().await;
            let position = state
                .lists
                .get(source)
                .and_then(|entries| entries.iter().position(|v| v == current));
            let Some(idx) = position else {
                return Ok(false);
            };
            if let Some(entries) = state.lists.get_mut(source) {
                entries.remove(idx);
            }
            state
                .lists
                .entry(destination.to_string())
                .or_default()
                .push_back(updated.to_string());
        }
        self.pushed.notify_waiters();
        Ok(true)
    }

    async fn len(&self, list: &str) -> ErasureResult<usize> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.lists.get(list).map_or(0, |l| l.len()))
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> ErasureResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state
            .values
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> ErasureResult<Option<String>> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        match state.values.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                state.values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> ErasureResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.values.remove(key);
        Ok(())
    }
}
