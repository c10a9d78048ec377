//! 可靠队列消费与有界并发调度
//!
//! - [`ReliableQueue`]：pending / in-flight / dead-letter 三个列表之间的状态迁移
//! - [`SlotPool`]：有界并发槽位
//! - [`Dispatcher`]：单消费者循环，占用槽位、认领条目、派生任务
//! - [`TaskExecutor`]：执行单个条目并记录结果

pub mod dispatcher;
pub mod reliable_queue;
pub mod slot_pool;
pub mod task_execution;

pub use dispatcher::Dispatcher;
pub use reliable_queue::{QueueKeys, QueueSnapshot, ReliableQueue};
pub use slot_pool::{SlotPermit, SlotPool};
pub use task_execution::{ExecutionSettings, TaskExecutor};
