//! Cache Backend Implementations
//!
//! This module contains every tier the cache manager can stack.
//!
//! # Available Backends
//!
//! - **Moka** - In-process store with per-entry deadlines (always available)
//! - **Redis** - Distributed key-value store (feature: `redis`, on by default)
//! - **Memcached** - Distributed object cache (feature: `memcached`, on by default)
//!
//! # Usage
//!
//! ```rust
//! use layered_cache::backends::{self, BackendKind};
//! use layered_cache::{CacheConfig, ValueCodec};
//! use std::time::Duration;
//!
//! # fn example() -> layered_cache::Result<()> {
//! let tier = backends::create(
//!     BackendKind::Moka,
//!     Duration::from_secs(60),
//!     &CacheConfig::new().with("prefix", "sessions:"),
//!     ValueCodec::default(),
//! )?;
//! assert_eq!(tier.kind(), BackendKind::Moka);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codecs::ValueCodec;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::traits::Cache;

pub mod moka_cache;

#[cfg(feature = "redis")]
pub mod redis_cache;

#[cfg(feature = "memcached")]
pub mod memcached_cache;

pub use moka_cache::{MemoryStore, MokaCache};

#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;

#[cfg(feature = "memcached")]
pub use memcached_cache::MemcachedCache;

/// Option keys understood by the backends
pub mod keys {
    pub const HOST: &str = "host";
    pub const PORT: &str = "port";
    pub const PASSWORD: &str = "password";
    pub const DATABASE: &str = "database";
    pub const PERSISTENT: &str = "persistent";
    pub const COMPRESS: &str = "compress";
    pub const CLIENT: &str = "client";
    pub const PREFIX: &str = "prefix";
    pub const MAX_CAPACITY: &str = "max_capacity";
    pub const STORE: &str = "store";
}

/// Storage technology behind a tier
///
/// A tier configuration holds at most one tier per kind, and per-tier results
/// of aggregate operations are keyed by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process store
    Moka,
    /// Distributed key-value store
    Redis,
    /// Distributed object cache
    Memcached,
}

impl BackendKind {
    pub const ALL: [Self; 3] = [Self::Moka, Self::Redis, Self::Memcached];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Moka => "moka",
            Self::Redis => "redis",
            Self::Memcached => "memcached",
        }
    }

    /// Keys that must be present in `config` before a tier of this kind is opened
    ///
    /// A pre-built client under `client` replaces the address keys.
    #[must_use]
    pub fn mandatory_keys(self, config: &CacheConfig) -> &'static [&'static str] {
        match self {
            Self::Moka => &[],
            Self::Redis | Self::Memcached if config.contains(keys::CLIENT) => &[],
            Self::Redis | Self::Memcached => &[keys::HOST, keys::PORT],
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation every backend runs before touching its store
///
/// Checks the TTL first, then the mandatory keys, and returns the TTL to use as
/// the tier default.
pub(crate) fn prepare(kind: BackendKind, ttl: Duration, config: &CacheConfig) -> Result<Duration> {
    let ttl = validate_ttl(ttl)?;
    config.require(kind, kind.mandatory_keys(config))?;
    Ok(ttl)
}

/// Longest TTL any tier accepts (ten years)
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Tier TTLs are whole seconds, between one second and [`MAX_TTL`]
///
/// # Errors
///
/// `InvalidConfiguration` for TTLs shorter than a second or longer than `MAX_TTL`.
pub fn validate_ttl(ttl: Duration) -> Result<Duration> {
    if ttl.as_secs() == 0 {
        return Err(CacheError::InvalidConfiguration(format!(
            "ttl must be at least one second, got {ttl:?}"
        )));
    }
    check_upper_bound(ttl)?;
    Ok(Duration::from_secs(ttl.as_secs()))
}

/// TTL of one operation: the caller's if given, else the tier default
pub(crate) fn call_ttl(ttl: Option<Duration>, default: Duration) -> Result<Duration> {
    match ttl {
        Some(ttl) => check_upper_bound(ttl).map(|()| ttl),
        None => Ok(default),
    }
}

fn check_upper_bound(ttl: Duration) -> Result<()> {
    if ttl > MAX_TTL {
        return Err(CacheError::InvalidConfiguration(format!(
            "ttl must not exceed {} seconds, got {}",
            MAX_TTL.as_secs(),
            ttl.as_secs()
        )));
    }
    Ok(())
}

/// Build a tier of `kind`
///
/// # Errors
///
/// - `InvalidConfiguration` for a bad TTL or option, or a kind compiled out
/// - `MissingConfiguration` before any connection attempt
/// - `Connection` if the handle cannot be opened
pub fn create(
    kind: BackendKind,
    ttl: Duration,
    config: &CacheConfig,
    codec: ValueCodec,
) -> Result<Arc<dyn Cache>> {
    match kind {
        BackendKind::Moka => Ok(Arc::new(MokaCache::from_config(ttl, config, codec)?)),
        #[cfg(feature = "redis")]
        BackendKind::Redis => Ok(Arc::new(RedisCache::from_config(ttl, config, codec)?)),
        #[cfg(feature = "memcached")]
        BackendKind::Memcached => Ok(Arc::new(MemcachedCache::from_config(ttl, config, codec)?)),
        #[allow(unreachable_patterns)]
        other => Err(CacheError::InvalidConfiguration(format!(
            "{other} backend is not compiled in (enable the '{other}' feature)"
        ))),
    }
}

/// Seconds as `u64`, rounded up so a live key never reports zero
pub(crate) fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
