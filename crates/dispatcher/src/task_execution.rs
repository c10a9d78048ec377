use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use erasure_config::{NotificationConfig, QueueConfig};
use erasure_core::{
    models::{CompletionReport, Disposition, HandlerOutcome, QueuedItem, RequestId},
    traits::{CompletionNotifier, RequestHandler, StatusLog},
};
use futures::FutureExt;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::reliable_queue::ReliableQueue;

/// 单个条目执行的时间参数
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    pub notification_timeout: Duration,
    pub outcome_backoff: Duration,
}

impl ExecutionSettings {
    pub fn from_config(queue: &QueueConfig, notification: &NotificationConfig) -> Self {
        Self {
            notification_timeout: notification.timeout(),
            outcome_backoff: queue.store_backoff(),
        }
    }
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default(), &NotificationConfig::default())
    }
}

/// 执行一个已认领的条目
///
/// 调用处理器，把结果写回队列（确认或拒绝），之后尽力更新状态日志并通知请求方。
/// 结果写入成功之前不会返回，调用方持有的槽位也一直占用。
/// 这里的任何失败都不会传回调度循环。
pub struct TaskExecutor {
    queue: Arc<ReliableQueue>,
    handler: Arc<dyn RequestHandler>,
    notifier: Option<Arc<dyn CompletionNotifier>>,
    status_log: Option<Arc<dyn StatusLog>>,
    settings: ExecutionSettings,
}

impl TaskExecutor {
    pub fn new(
        queue: Arc<ReliableQueue>,
        handler: Arc<dyn RequestHandler>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            queue,
            handler,
            notifier: None,
            status_log: None,
            settings,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CompletionNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_status_log(mut self, status_log: Arc<dyn StatusLog>) -> Self {
        self.status_log = Some(status_log);
        self
    }

    pub async fn execute(&self, item: QueuedItem) -> CompletionReport {
        let span = info_span!(
            "erasure_request",
            request_id = %item.request_id,
            kind = %item.payload.kind,
            attempt = item.attempt
        );
        self.run(item).instrument(span).await
    }

    async fn run(&self, item: QueuedItem) -> CompletionReport {
        info!(
            subject = %item.payload.scrambled_subject(),
            "Processing erasure request"
        );

        let outcome = AssertUnwindSafe(self.handler.process(&item.payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                error!("Request handler panicked: {}", message);
                HandlerOutcome::failed(format!("handler panicked: {message}"))
            });

        match &outcome.error {
            None => info!(
                deleted = outcome.deleted_count,
                redacted = outcome.messages_redacted,
                "Erasure request processed"
            ),
            Some(e) => warn!(
                deleted = outcome.deleted_count,
                redacted = outcome.messages_redacted,
                "Erasure request failed: {}", e
            ),
        }

        let disposition = self
            .record_outcome(&item.request_id, outcome.is_success())
            .await;
        let report = CompletionReport::new(
            item.request_id.clone(),
            item.payload.kind,
            &outcome,
            disposition,
        );

        if disposition == Disposition::Unrecorded {
            warn!("Rejected item already left in-flight, outcome not recorded");
            return report;
        }

        self.update_status(&report).await;
        if matches!(
            disposition,
            Disposition::Acknowledged | Disposition::Requeued { .. }
        ) {
            self.notify(&item, &report).await;
        }

        report
    }

    /// 确认或拒绝，存储错误按固定间隔一直重试到成功
    async fn record_outcome(&self, request_id: &RequestId, success: bool) -> Disposition {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result = if success {
                self.queue
                    .acknowledge(request_id)
                    .await
                    .map(|_| Disposition::Acknowledged)
            } else {
                self.queue.reject(request_id).await
            };

            match result {
                Ok(disposition) => return disposition,
                Err(e) if e.is_not_found() => {
                    // 条目已不在处理中列表，重试也找不到
                    return if success {
                        Disposition::Acknowledged
                    } else {
                        Disposition::Unrecorded
                    };
                }
                Err(e) => {
                    error!(
                        attempt = attempt,
                        "Failed to record outcome, retrying in {:?}: {}",
                        self.settings.outcome_backoff,
                        e
                    );
                    tokio::time::sleep(self.settings.outcome_backoff).await;
                }
            }
        }
    }

    async fn update_status(&self, report: &CompletionReport) {
        let Some(status_log) = &self.status_log else {
            return;
        };
        if let Err(e) = status_log
            .update_status(&report.request_id, report.status())
            .await
        {
            error!("Failed to update request status: {}", e);
        }
    }

    async fn notify(&self, item: &QueuedItem, report: &CompletionReport) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        match tokio::time::timeout(
            self.settings.notification_timeout,
            notifier.send_completion(&item.payload, report),
        )
        .await
        {
            Ok(Ok(())) => debug!("Completion notification sent"),
            Ok(Err(e)) => error!("Failed to send completion notification: {}", e),
            Err(_) => error!(
                "Completion notification timed out after {:?}",
                self.settings.notification_timeout
            ),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");

        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[test]
    fn test_settings_from_defaults() {
        let settings = ExecutionSettings::default();
        assert_eq!(settings.notification_timeout, Duration::from_secs(30));
        assert_eq!(settings.outcome_backoff, Duration::from_secs(5));
    }
}
