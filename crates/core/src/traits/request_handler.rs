use async_trait::async_trait;

use crate::models::{CompletionReport, ErasureRequest, HandlerOutcome, RequestId, RequestStatus};
use crate::ErasureResult;

/// 擦除业务逻辑
///
/// 返回的 `HandlerOutcome` 中 `error` 非空即视为失败，调度器据此拒绝条目。
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn process(&self, request: &ErasureRequest) -> HandlerOutcome;
}

/// 向请求方发送完成通知
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn send_completion(
        &self,
        request: &ErasureRequest,
        report: &CompletionReport,
    ) -> ErasureResult<()>;
}

/// 请求日志状态记录
#[async_trait]
pub trait StatusLog: Send + Sync {
    async fn update_status(&self, request_id: &RequestId, status: RequestStatus)
        -> ErasureResult<()>;
}
