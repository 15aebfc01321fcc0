//! In-memory response cache.

mod memory;

pub use memory::{CacheLifetime, CachingGroup, MemoryCache};
