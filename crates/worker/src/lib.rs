//! 擦除工作进程
//!
//! - [`processor`]：擦除请求的业务处理
//! - [`notification`]：向请求方发送完成通知
//! - [`components`]：存活标记与进程生命周期

pub mod components;
pub mod notification;
pub mod processor;

pub use components::{LivenessReporter, WorkerLifecycle};
pub use notification::{DiscordNotifier, LocaleCatalog};
pub use processor::ErasureProcessor;
