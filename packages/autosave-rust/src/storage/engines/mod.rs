//! [`FastCache`](super::FastCache) implementations.

mod file;
mod memory;

pub use file::{FileFastCache, FileFastCacheConfig};
pub use memory::{MemoryFastCache, DEFAULT_FAST_CACHE_CAPACITY};
