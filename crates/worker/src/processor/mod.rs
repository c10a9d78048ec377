//! 擦除请求的业务处理
//!
//! 删除工单归档记录，或抹除用户在归档中的消息内容。

pub mod erasure_processor;
pub mod redaction;

pub use erasure_processor::{ErasureProcessor, ProcessingError};
pub use redaction::{redact_user, REDACTED_CONTENT, REDACTED_USERNAME};
