//! Cache Tier Traits
//!
//! This module defines the two contracts the rest of the crate is built on:
//!
//! - `Cacheable`: implemented by application entities that must round-trip through
//!   tiers which only store text
//! - `Cache`: implemented by every tier (Moka, Redis, Memcached, or your own)
//!
//! # Example: Cacheable entity
//!
//! ```rust
//! use layered_cache::Cacheable;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! impl Cacheable for User {
//!     const TYPE_NAME: &'static str = "User";
//!
//!     fn encode(&self) -> anyhow::Result<String> {
//!         Ok(serde_json::to_string(self)?)
//!     }
//!
//!     fn decode(encoded: &str) -> anyhow::Result<Self> {
//!         Ok(serde_json::from_str(encoded)?)
//!     }
//! }
//! ```

use std::any::Any;
use std::fmt::Debug;
use std::time::Duration;

use crate::backends::BackendKind;
use crate::error::Result;
use crate::value::CacheValue;

/// Capability of an application entity to be stored in any tier
///
/// `encode` must produce every persisted field and `decode` must read back the
/// same set of fields. If the two drift apart, entities come back from the cache
/// with missing data; the codec cannot detect this.
pub trait Cacheable: Any + Send + Sync + Debug {
    /// Name written next to the payload and used to find `decode` on read.
    /// Must be unique among the types registered in one [`EntityRegistry`](crate::EntityRegistry).
    const TYPE_NAME: &'static str;

    /// Canonical text form of the entity's persisted state
    ///
    /// # Errors
    ///
    /// Whatever the entity's own serialization reports.
    fn encode(&self) -> anyhow::Result<String>;

    /// Rebuild an entity from text produced by [`Cacheable::encode`]
    ///
    /// # Errors
    ///
    /// Whatever the entity's own deserialization reports.
    fn decode(encoded: &str) -> anyhow::Result<Self>
    where
        Self: Sized;
}

/// Object-safe view of a [`Cacheable`], used inside [`CacheValue::Entity`]
pub trait DynCacheable: Send + Sync + Debug {
    fn type_name(&self) -> &'static str;

    /// Same as [`Cacheable::encode`]
    ///
    /// # Errors
    ///
    /// Whatever the entity's own serialization reports.
    fn encode_entity(&self) -> anyhow::Result<String>;

    fn as_any(&self) -> &dyn Any;
}

impl<T: Cacheable> DynCacheable for T {
    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn encode_entity(&self) -> anyhow::Result<String> {
        Cacheable::encode(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Contract every cache tier must honor
///
/// All methods are blocking. `ttl = None` always means "use the tier's default
/// TTL given at construction".
///
/// # Failure modes
///
/// - a miss is `Ok(None)`, never an error
/// - a non-numeric counter is `Ok(None)` from `increment`/`decrement`
/// - `clear_all_cache` returns [`CacheError::ClearAllDenied`](crate::CacheError::ClearAllDenied)
///   when the server forbids a global flush
/// - transport problems surface as [`CacheError::Connection`](crate::CacheError::Connection)
pub trait Cache: Send + Sync {
    /// Storage technology behind this tier
    fn kind(&self) -> BackendKind;

    /// TTL applied when an operation does not supply one
    fn default_ttl(&self) -> Duration;

    /// Store `value` under `key`
    ///
    /// Returns `true` iff the backend acknowledged the write.
    ///
    /// # Errors
    ///
    /// Codec or connection failure.
    fn set(&self, key: &str, value: &CacheValue, ttl: Option<Duration>) -> Result<bool>;

    /// Decoded value under `key`, or `None` if absent or expired
    ///
    /// # Errors
    ///
    /// Codec or connection failure.
    fn get(&self, key: &str) -> Result<Option<CacheValue>>;

    /// Delete one key; `true` iff something was deleted
    ///
    /// # Errors
    ///
    /// Connection failure.
    fn clear(&self, key: &str) -> Result<bool>;

    /// Delete every key of this tier
    ///
    /// # Errors
    ///
    /// `ClearAllDenied` when the backend forbids a global flush, or a connection failure.
    fn clear_all_cache(&self) -> Result<bool>;

    /// Atomically add one to the counter under `key`
    ///
    /// An absent key is established with value `1` and TTL `ttl` (or the default);
    /// later increments keep the original TTL. Returns `None` when the stored
    /// value is not an integer.
    ///
    /// # Errors
    ///
    /// Connection failure.
    fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<Option<i64>>;

    /// Symmetric to [`Cache::increment`]; an absent key becomes `-1`
    ///
    /// # Errors
    ///
    /// Connection failure.
    fn decrement(&self, key: &str, ttl: Option<Duration>) -> Result<Option<i64>>;

    /// Time left before `key` expires, `None` if the key is absent
    ///
    /// # Errors
    ///
    /// Connection failure.
    fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Liveness probe against the underlying handle
    fn is_connected(&self) -> bool;

    /// Name used in logs
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }
}
