//! Cache layer
//!
//! An in-process moka cache in front of the read-heavy listings (home page,
//! sidebar, category counts). Keys are grouped by prefix so that a write can
//! drop every listing it affects with one pattern.
//!
//! ```rust,ignore
//! use mutadi::cache::create_cache;
//! use mutadi::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default());
//! cache.set("posts:home", &vec![1, 2, 3]).await?;
//! ```

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Create the shared cache from configuration
///
/// A TTL of zero disables caching: the cache is built with no capacity.
pub fn create_cache(config: &CacheConfig) -> Arc<MemoryCache> {
    let capacity = if config.ttl_seconds == 0 {
        0
    } else {
        config.max_capacity
    };
    let ttl = Duration::from_secs(config.ttl_seconds.max(1));
    Arc::new(MemoryCache::with_capacity_and_ttl(capacity, ttl))
}
