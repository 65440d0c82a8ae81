pub mod distributed;
pub mod hybrid;
pub mod key;
pub mod local;

pub use distributed::{DistributedCache, EtcdDistributedCache, MemoryDistributedCache};
pub use hybrid::{CacheEntryOptions, HybridCache};
pub use key::build_cache_key;
pub use local::LocalCache;
