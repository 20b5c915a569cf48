//! Layered Cache
//!
//! A read-through, write-through multi-tier cache facade for Rust:
//! - **Moka**: in-process tier with per-entry deadlines and key prefixes
//! - **Redis**: distributed key-value tier (feature `redis`)
//! - **Memcached**: distributed object tier with optional LZ4 compression (feature `memcached`)
//! - **Automatic Promotion**: a hit in a slow tier back-fills every faster tier
//! - **Cacheable Entities**: application types round-trip through text-only tiers
//! - **Dry-Run Mode**: bypass caching without touching calling code
//!
//! # Quick Start
//!
//! ```rust
//! use layered_cache::{BackendKind, CacheConfig, CacheManager, CacheValue, TierConfiguration};
//! use std::time::Duration;
//!
//! fn main() -> layered_cache::Result<()> {
//!     let mut tiers = TierConfiguration::default();
//!     tiers.append_tier(
//!         BackendKind::Moka,
//!         Duration::from_secs(60),
//!         &CacheConfig::new().with("prefix", "app:"),
//!     )?;
//!
//!     let cache = CacheManager::new(tiers);
//!     cache.set("user:1:name", &CacheValue::from("alice"), None)?;
//!     assert_eq!(cache.get("user:1:name")?, Some(CacheValue::from("alice")));
//!
//!     let counters = cache.increment("visits", None)?;
//!     assert_eq!(counters[&BackendKind::Moka], Some(1));
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! get:  tier 0 → tier 1 → … → tier n      (stop at first hit)
//!         ↑ promote ↑                      (faster tiers refilled with their own TTL)
//! set:  tier 0 + tier 1 + … + tier n      (write-through)
//! ```
//!
//! Everything is synchronous: each call blocks for the round trips of the tiers
//! it touches, in priority order.

pub mod backends;
pub mod cache_manager;
pub mod codecs;
pub mod config;
pub mod error;
pub mod settings;
pub mod tier_config;
pub mod traits;
pub mod value;

pub use backends::{BackendKind, MemoryStore, MokaCache};

#[cfg(feature = "redis")]
pub use backends::RedisCache;

#[cfg(feature = "memcached")]
pub use backends::MemcachedCache;

pub use cache_manager::{CacheManager, CacheManagerStats, ClearOutcome, TierStats};
pub use codecs::{EntityRegistry, ValueCodec};
pub use config::{CacheConfig, ConfigValue};
pub use error::{CacheError, Result};
pub use settings::{CacheSettings, TierSettings};
pub use tier_config::TierConfiguration;
pub use traits::{Cache, Cacheable, DynCacheable};
pub use value::{ArrayKey, CacheArray, CacheValue};
