use std::fmt;

use serde::{Deserialize, Serialize};

use super::{RequestId, RequestKind};

/// 请求处理器返回的结果
///
/// 部分成功时计数与错误可以同时存在；调度器只根据 `error` 决定确认或拒绝。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerOutcome {
    /// 删除的归档记录数量
    pub deleted_count: u64,
    /// 被抹除的消息数量
    pub messages_redacted: u64,
    pub error: Option<String>,
}

impl HandlerOutcome {
    pub fn deleted(count: u64) -> Self {
        Self {
            deleted_count: count,
            ..Default::default()
        }
    }

    pub fn redacted(count: u64) -> Self {
        Self {
            messages_redacted: count,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.deleted_count == 0 && self.messages_redacted == 0
    }
}

/// 队列层面的最终处置结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    Acknowledged,
    Requeued { attempt: u32 },
    DeadLettered { attempt: u32 },
    /// 拒绝时条目已不在处理中列表，结果无处写入
    Unrecorded,
}

/// 处理状态，写入请求日志表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Completed => "Completed",
            RequestStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 发送给请求方的完成报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub request_id: RequestId,
    pub kind: RequestKind,
    pub records_deleted: u64,
    pub messages_redacted: u64,
    pub error: Option<String>,
    pub disposition: Disposition,
}

impl CompletionReport {
    pub fn new(
        request_id: RequestId,
        kind: RequestKind,
        outcome: &HandlerOutcome,
        disposition: Disposition,
    ) -> Self {
        Self {
            request_id,
            kind,
            records_deleted: outcome.deleted_count,
            messages_redacted: outcome.messages_redacted,
            error: outcome.error.clone(),
            disposition,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn status(&self) -> RequestStatus {
        if self.is_success() {
            RequestStatus::Completed
        } else {
            RequestStatus::Failed
        }
    }
}
