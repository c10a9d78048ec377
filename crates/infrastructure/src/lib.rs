pub mod archiver;
pub mod database;
pub mod discord;
pub mod in_memory_queue;
pub mod redis_store;

pub use archiver::{HttpTranscriptArchive, TranscriptCodec};
pub use database::{postgres::PostgresTicketRepository, DatabaseManager};
pub use discord::DiscordRestClient;
pub use in_memory_queue::InMemoryQueueStore;
pub use redis_store::{RedisConnectionManager, RedisQueueStore};
