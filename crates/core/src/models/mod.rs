//! # 数据模型
//!
//! 擦除请求、队列信封以及处理结果。
//!
//! - [`ErasureRequest`]：请求方提交的擦除请求，入队后不可变
//! - [`QueuedItem`]：队列中持久化的信封，携带唯一ID和重试计数
//! - [`HandlerOutcome`] / [`CompletionReport`]：处理结果与完成报告
//!
//! 所有时间字段使用 `DateTime<Utc>`，线上格式为JSON。

mod outcome;
mod queued_item;
mod request;

pub use outcome::{CompletionReport, Disposition, HandlerOutcome, RequestStatus};
pub use queued_item::{QueuedItem, RequestId, ENVELOPE_VERSION};
pub use request::{scramble_user_id, CallbackContext, ErasureRequest, RequestKind};
