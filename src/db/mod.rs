pub mod cache;
pub mod key;
pub mod lock;
pub mod macros;
pub mod memory;
pub mod redis;

pub use cache::{Cache, CacheBackend};
pub use key::CacheKey;
pub use memory::MemoryBackend;
pub use redis::RedisBackend;
