use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use erasure_config::QueueConfig;
use erasure_core::{
    models::{
        CompletionReport, Disposition, ErasureRequest, HandlerOutcome, RequestId,
        RequestKind, RequestStatus,
    },
    traits::{CompletionNotifier, RequestHandler, StatusLog},
    ErasureError, ErasureResult,
};
use erasure_dispatcher::{Dispatcher, ExecutionSettings, ReliableQueue, TaskExecutor};
use erasure_infrastructure::InMemoryQueueStore;
use mockall::mock;
use tokio::sync::broadcast;

mock! {
    pub Notifier {}

    #[async_trait]
    impl CompletionNotifier for Notifier {
        async fn send_completion(
            &self,
            request: &ErasureRequest,
            report: &CompletionReport,
        ) -> ErasureResult<()>;
    }
}

type Behaviour = Box<dyn Fn(&ErasureRequest) -> HandlerOutcome + Send + Sync>;

/// 按用户ID决定结果的处理器，记录调用和并发数
struct ScriptedHandler {
    behaviour: Behaviour,
    delay: Duration,
    calls: Mutex<Vec<u64>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl ScriptedHandler {
    fn new(behaviour: impl Fn(&ErasureRequest) -> HandlerOutcome + Send + Sync + 'static) -> Self {
        Self {
            behaviour: Box::new(behaviour),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl RequestHandler for ScriptedHandler {
    async fn process(&self, request: &ErasureRequest) -> HandlerOutcome {
        self.calls.lock().unwrap().push(request.subject_user_id);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
        (self.behaviour)(request)
    }
}

#[derive(Default)]
struct RecordingStatusLog {
    updates: Mutex<Vec<(RequestId, RequestStatus)>>,
}

#[async_trait]
impl StatusLog for RecordingStatusLog {
    async fn update_status(
        &self,
        request_id: &RequestId,
        status: RequestStatus,
    ) -> ErasureResult<()> {
        self.updates
            .lock()
            .unwrap()
            .push((request_id.clone(), status));
        Ok(())
    }
}

fn fast_settings() -> ExecutionSettings {
    ExecutionSettings {
        notification_timeout: Duration::from_millis(200),
        outcome_backoff: Duration::from_millis(10),
    }
}

fn new_queue(store: &Arc<InMemoryQueueStore>, max_attempts: u32) -> Arc<ReliableQueue> {
    Arc::new(
        ReliableQueue::new(store.clone(), &QueueConfig::default(), max_attempts)
            .with_claim_poll(Duration::from_millis(10))
            .with_store_backoff(Duration::from_millis(10)),
    )
}

fn request(user: u64) -> ErasureRequest {
    ErasureRequest::new(RequestKind::AllContentForUser, user)
}

macro_rules! wait_for {
    ($condition:expr) => {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !$condition {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not met in time")
    };
}

async fn queue_drained(queue: &ReliableQueue) -> bool {
    let snapshot = queue.snapshot().await.unwrap();
    snapshot.pending.is_empty() && snapshot.in_flight.is_empty()
}

struct Running {
    dispatcher: Arc<Dispatcher>,
    shutdown: broadcast::Sender<()>,
    handle: tokio::task::JoinHandle<ErasureResult<()>>,
}

impl Running {
    fn start(dispatcher: Dispatcher) -> Self {
        let dispatcher = Arc::new(dispatcher);
        let (shutdown, rx) = broadcast::channel(1);
        let handle = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.run(rx).await })
        };
        Self {
            dispatcher,
            shutdown,
            handle,
        }
    }

    async fn stop(self) -> Arc<Dispatcher> {
        self.shutdown.send(()).unwrap();
        self.handle.await.unwrap().unwrap();
        self.dispatcher
    }
}

#[tokio::test]
async fn test_successful_items_are_acknowledged_and_notified() {
    let store = Arc::new(InMemoryQueueStore::new());
    let queue = new_queue(&store, 3);
    let handler = Arc::new(ScriptedHandler::new(|_| HandlerOutcome::redacted(4)));
    let status_log = Arc::new(RecordingStatusLog::default());

    let mut notifier = MockNotifier::new();
    notifier
        .expect_send_completion()
        .times(3)
        .withf(|_, report| {
            report.disposition == Disposition::Acknowledged && report.messages_redacted == 4
        })
        .returning(|_, _| Ok(()));

    let executor = TaskExecutor::new(queue.clone(), handler.clone(), fast_settings())
        .with_notifier(Arc::new(notifier))
        .with_status_log(status_log.clone());
    let running = Running::start(Dispatcher::new(queue.clone(), Arc::new(executor), 2));

    for user in 1..=3 {
        queue.enqueue(request(user)).await.unwrap();
    }

    wait_for!(status_log.updates.lock().unwrap().len() == 3);
    assert!(queue_drained(&queue).await);
    running.stop().await;

    assert_eq!(handler.call_count(), 3);
    assert!(status_log
        .updates
        .lock()
        .unwrap()
        .iter()
        .all(|(_, status)| *status == RequestStatus::Completed));
}

#[tokio::test]
async fn test_concurrency_never_exceeds_limit() {
    let store = Arc::new(InMemoryQueueStore::new());
    let queue = new_queue(&store, 3);
    let handler = Arc::new(
        ScriptedHandler::new(|_| HandlerOutcome::deleted(1)).with_delay(Duration::from_millis(30)),
    );

    for user in 0..12 {
        queue.enqueue(request(user)).await.unwrap();
    }

    let executor = TaskExecutor::new(queue.clone(), handler.clone(), fast_settings());
    let running = Running::start(Dispatcher::new(queue.clone(), Arc::new(executor), 3));

    wait_for!(handler.call_count() == 12 && queue_drained(&queue).await);
    let dispatcher = running.stop().await;

    let peak = dispatcher.slots().peak();
    assert!((1..=3).contains(&peak), "peak was {peak}");
    assert!(handler.max_running.load(Ordering::SeqCst) <= 3);
    assert_eq!(dispatcher.slots().in_use(), 0);
}

#[tokio::test]
async fn test_failing_item_is_dead_lettered_without_notification() {
    let store = Arc::new(InMemoryQueueStore::new());
    let queue = new_queue(&store, 3);
    let handler = Arc::new(ScriptedHandler::new(|_| {
        HandlerOutcome::failed("archive unavailable")
    }));
    let status_log = Arc::new(RecordingStatusLog::default());

    let mut notifier = MockNotifier::new();
    notifier
        .expect_send_completion()
        .times(2)
        .withf(|_, report| matches!(report.disposition, Disposition::Requeued { .. }))
        .returning(|_, _| Ok(()));

    let executor = TaskExecutor::new(queue.clone(), handler.clone(), fast_settings())
        .with_notifier(Arc::new(notifier))
        .with_status_log(status_log.clone());
    let running = Running::start(Dispatcher::new(queue.clone(), Arc::new(executor), 1));

    let id = queue.enqueue(request(9)).await.unwrap();

    wait_for!(status_log.updates.lock().unwrap().len() == 3);
    running.stop().await;

    let snapshot = queue.snapshot().await.unwrap();
    assert!(snapshot.pending.is_empty());
    assert!(snapshot.in_flight.is_empty());
    assert_eq!(snapshot.dead_letter.len(), 1);
    assert_eq!(snapshot.dead_letter[0].request_id, id);
    assert_eq!(snapshot.dead_letter[0].attempt, 3);
    assert_eq!(handler.call_count(), 3);
}

#[tokio::test]
async fn test_handler_panic_becomes_rejection() {
    let store = Arc::new(InMemoryQueueStore::new());
    let queue = new_queue(&store, 1);
    let handler = Arc::new(ScriptedHandler::new(|request| {
        if request.subject_user_id == 13 {
            panic!("corrupt transcript");
        }
        HandlerOutcome::deleted(1)
    }));

    let executor = TaskExecutor::new(queue.clone(), handler.clone(), fast_settings());
    let running = Running::start(Dispatcher::new(queue.clone(), Arc::new(executor), 1));

    let poisoned = queue.enqueue(request(13)).await.unwrap();
    queue.enqueue(request(14)).await.unwrap();

    wait_for!(handler.call_count() == 2 && queue_drained(&queue).await);
    let dispatcher = running.stop().await;

    let snapshot = queue.snapshot().await.unwrap();
    assert_eq!(snapshot.dead_letter.len(), 1);
    assert_eq!(snapshot.dead_letter[0].request_id, poisoned);
    assert_eq!(dispatcher.slots().in_use(), 0);
}

#[tokio::test]
async fn test_notification_failure_does_not_change_outcome() {
    let store = Arc::new(InMemoryQueueStore::new());
    let queue = new_queue(&store, 3);
    let handler = Arc::new(ScriptedHandler::new(|_| HandlerOutcome::deleted(2)));

    let mut notifier = MockNotifier::new();
    notifier
        .expect_send_completion()
        .times(1)
        .returning(|_, _| Err(ErasureError::NotificationFailure("unknown webhook".into())));

    let executor = TaskExecutor::new(queue.clone(), handler, fast_settings())
        .with_notifier(Arc::new(notifier));

    let (_tx, mut shutdown) = broadcast::channel(1);
    queue.enqueue(request(3)).await.unwrap();
    let item = queue.claim_next(&mut shutdown).await.unwrap();

    let report = executor.execute(item).await;
    assert_eq!(report.disposition, Disposition::Acknowledged);
    assert_eq!(report.records_deleted, 2);
    assert!(queue_drained(&queue).await);
}

/// 确认时存储短暂不可用，重试后成功
struct FlakyStoreHandler {
    store: Arc<InMemoryQueueStore>,
}

#[async_trait]
impl RequestHandler for FlakyStoreHandler {
    async fn process(&self, _request: &ErasureRequest) -> HandlerOutcome {
        self.store.set_available(false);
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            store.set_available(true);
        });
        HandlerOutcome::deleted(1)
    }
}

#[tokio::test]
async fn test_outcome_retried_while_store_unavailable() {
    let store = Arc::new(InMemoryQueueStore::new());
    let queue = new_queue(&store, 3);
    let handler = Arc::new(FlakyStoreHandler {
        store: store.clone(),
    });
    let executor = TaskExecutor::new(queue.clone(), handler, fast_settings());

    let (_tx, mut shutdown) = broadcast::channel(1);
    queue.enqueue(request(4)).await.unwrap();
    let item = queue.claim_next(&mut shutdown).await.unwrap();

    let report = executor.execute(item).await;
    assert_eq!(report.disposition, Disposition::Acknowledged);
    assert!(queue_drained(&queue).await);
}

#[tokio::test]
async fn test_outcome_waits_out_long_store_outage() {
    let store = Arc::new(InMemoryQueueStore::new());
    let queue = new_queue(&store, 3);
    let handler = Arc::new(ScriptedHandler::new({
        let store = store.clone();
        move |_| {
            store.set_available(false);
            HandlerOutcome::deleted(1)
        }
    }));
    let status_log = Arc::new(RecordingStatusLog::default());

    let mut notifier = MockNotifier::new();
    notifier
        .expect_send_completion()
        .times(1)
        .withf(|_, report| report.disposition == Disposition::Acknowledged)
        .returning(|_, _| Ok(()));

    let executor = TaskExecutor::new(queue.clone(), handler.clone(), fast_settings())
        .with_notifier(Arc::new(notifier))
        .with_status_log(status_log.clone());
    let running = Running::start(Dispatcher::new(queue.clone(), Arc::new(executor), 1));

    let id = queue.enqueue(request(5)).await.unwrap();
    wait_for!(handler.call_count() == 1);

    // 存储恢复之前槽位一直占用，结果尚未写入
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(running.dispatcher.slots().in_use(), 1);
    assert!(status_log.updates.lock().unwrap().is_empty());

    store.set_available(true);
    wait_for!(status_log.updates.lock().unwrap().len() == 1);

    assert!(queue_drained(&queue).await);
    assert_eq!(
        status_log.updates.lock().unwrap()[0],
        (id, RequestStatus::Completed)
    );
    let dispatcher = running.stop().await;
    assert_eq!(dispatcher.slots().in_use(), 0);
    assert_eq!(handler.call_count(), 1);
}

#[tokio::test]
async fn test_shutdown_waits_for_running_tasks() {
    let store = Arc::new(InMemoryQueueStore::new());
    let queue = new_queue(&store, 3);
    let handler = Arc::new(
        ScriptedHandler::new(|_| HandlerOutcome::deleted(1)).with_delay(Duration::from_millis(100)),
    );

    let executor = TaskExecutor::new(queue.clone(), handler.clone(), fast_settings());
    let running = Running::start(Dispatcher::new(queue.clone(), Arc::new(executor), 2));

    queue.enqueue(request(1)).await.unwrap();
    wait_for!(handler.call_count() == 1);

    let dispatcher = running.stop().await;

    assert_eq!(dispatcher.slots().in_use(), 0);
    assert!(queue_drained(&queue).await);
}

#[tokio::test]
async fn test_shutdown_leaves_unclaimed_items_pending() {
    let store = Arc::new(InMemoryQueueStore::new());
    let queue = new_queue(&store, 3);
    let handler = Arc::new(
        ScriptedHandler::new(|_| HandlerOutcome::deleted(1)).with_delay(Duration::from_millis(50)),
    );

    let executor = TaskExecutor::new(queue.clone(), handler.clone(), fast_settings());
    let running = Running::start(Dispatcher::new(queue.clone(), Arc::new(executor), 1));

    for user in 0..5 {
        queue.enqueue(request(user)).await.unwrap();
    }
    wait_for!(handler.call_count() >= 1);
    running.stop().await;

    let snapshot = queue.snapshot().await.unwrap();
    assert!(snapshot.in_flight.is_empty());
    assert_eq!(snapshot.pending.len() + handler.call_count(), 5);
}
