//! Redis列表实现的队列存储

mod connection_manager;
mod list_store;

pub use connection_manager::RedisConnectionManager;
pub use list_store::RedisQueueStore;
