//! Storage gateway and key-value backends.

mod backend;
mod gateway;
mod memory;
mod record;
mod redis_store;

pub use backend::RecordStore;
pub use gateway::{StorageGateway, DEFAULT_TIMEOUT};
pub use memory::MemoryStore;
pub use record::{Bins, Record, RecordKey};
pub use redis_store::RedisStore;
