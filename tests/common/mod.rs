//! Common utilities for integration tests
//!
//! This module provides shared test infrastructure including:
//! - A nested `Foo` entity and its registry
//! - Moka-backed stand-in tiers for multi-tier scenarios
//! - Redis and Memcached settings read from the environment
//! - The tier contract every backend must pass
#![allow(dead_code)]

use layered_cache::{
    BackendKind, Cache, CacheArray, CacheConfig, CacheError, CacheValue, Cacheable,
    EntityRegistry, MemoryStore, MokaCache, Result, ValueCodec,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Create a test key with unique suffix
pub fn test_key(name: &str) -> String {
    format!("test_{}_{}", name, rand::random::<u32>())
}

/// Entity with a nested entity and a mixed list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Foo {
    pub x: i64,
    pub y: String,
    pub z: Vec<serde_json::Value>,
    pub foo: Option<Box<Foo>>,
}

impl Cacheable for Foo {
    const TYPE_NAME: &'static str = "Foo";

    fn encode(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn decode(encoded: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(encoded)?)
    }
}

pub fn sample_foo() -> Foo {
    Foo {
        x: 1,
        y: "bar".to_string(),
        z: vec![1.into(), 2.into(), 3.into(), "pino".into()],
        foo: Some(Box::new(Foo {
            x: 3,
            y: "bar3".to_string(),
            z: vec![3.into(), serde_json::Value::Null],
            foo: None,
        })),
    }
}

pub fn codec() -> ValueCodec {
    ValueCodec::new(Arc::new(EntityRegistry::new().with::<Foo>()))
}

pub fn moka_tier(ttl_secs: u64) -> MokaCache {
    MokaCache::new(
        Duration::from_secs(ttl_secs),
        MemoryStore::default(),
        "",
        codec(),
    )
    .unwrap()
}

/// In-process tier reporting another kind, so several can share one chain
///
/// A stand-in for `Redis` refuses a global flush like the real backend.
pub struct StandIn {
    inner: MokaCache,
    kind: BackendKind,
}

impl StandIn {
    pub fn new(kind: BackendKind, ttl_secs: u64) -> Arc<Self> {
        Arc::new(Self {
            inner: moka_tier(ttl_secs),
            kind,
        })
    }
}

impl Cache for StandIn {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn default_ttl(&self) -> Duration {
        self.inner.default_ttl()
    }

    fn set(&self, key: &str, value: &CacheValue, ttl: Option<Duration>) -> Result<bool> {
        self.inner.set(key, value, ttl)
    }

    fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.inner.get(key)
    }

    fn clear(&self, key: &str) -> Result<bool> {
        self.inner.clear(key)
    }

    fn clear_all_cache(&self) -> Result<bool> {
        if self.kind == BackendKind::Redis {
            return Err(CacheError::ClearAllDenied { kind: self.kind });
        }
        self.inner.clear_all_cache()
    }

    fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<Option<i64>> {
        self.inner.increment(key, ttl)
    }

    fn decrement(&self, key: &str, ttl: Option<Duration>) -> Result<Option<i64>> {
        self.inner.decrement(key, ttl)
    }

    fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.inner.remaining_ttl(key)
    }

    fn is_connected(&self) -> bool {
        true
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Redis options from `REDIS_HOST` / `REDIS_PORT`
pub fn redis_config() -> CacheConfig {
    CacheConfig::new()
        .with("host", env_or("REDIS_HOST", "127.0.0.1"))
        .with("port", env_or("REDIS_PORT", "6379"))
}

/// Memcached options from `MEMCACHED_HOST` / `MEMCACHED_PORT`
pub fn memcached_config() -> CacheConfig {
    CacheConfig::new()
        .with("host", env_or("MEMCACHED_HOST", "127.0.0.1"))
        .with("port", env_or("MEMCACHED_PORT", "11211"))
}

/// Behaviour every tier must show, whatever its backend
pub fn assert_tier_contract(cache: &dyn Cache) {
    let scalars = [
        ("integer", CacheValue::Int(8)),
        ("float", CacheValue::Float(8.3)),
        ("string", CacheValue::from("foobar")),
        ("array", CacheValue::Array(CacheArray::list(vec![1_i64, 2, 3]))),
    ];
    for (name, value) in scalars {
        let key = test_key(name);
        assert!(cache.set(&key, &value, None).unwrap(), "{name} not stored");
        assert_eq!(cache.get(&key).unwrap(), Some(value), "{name} changed in storage");
        cache.clear(&key).unwrap();
    }

    let key = test_key("class");
    let foo = sample_foo();
    assert!(cache.set(&key, &CacheValue::entity(foo.clone()), None).unwrap());
    let stored = cache.get(&key).unwrap().unwrap();
    assert_eq!(stored.as_entity::<Foo>(), Some(&foo));

    let key = test_key("clear");
    cache.set(&key, &CacheValue::Int(1), None).unwrap();
    assert!(cache.clear(&key).unwrap());
    assert_eq!(cache.get(&key).unwrap(), None);

    let key = test_key("incr");
    let steps: Vec<Option<i64>> = vec![
        cache.increment(&key, None).unwrap(),
        cache.increment(&key, None).unwrap(),
        cache.increment(&key, None).unwrap(),
        cache.decrement(&key, None).unwrap(),
        cache.decrement(&key, None).unwrap(),
    ];
    assert_eq!(steps, vec![Some(1), Some(2), Some(3), Some(2), Some(1)]);

    assert_eq!(cache.increment(&test_key("empty_increment"), None).unwrap(), Some(1));
    assert_eq!(cache.decrement(&test_key("empty_decrement"), None).unwrap(), Some(-1));

    let key = test_key("not_numeric");
    cache.set(&key, &CacheValue::from("abc"), None).unwrap();
    assert_eq!(cache.increment(&key, None).unwrap(), None);

    let key = test_key("ttl");
    assert_eq!(cache.remaining_ttl(&key).unwrap(), None);
    cache.set(&key, &CacheValue::Int(1), Some(Duration::from_secs(20))).unwrap();
    let left = cache.remaining_ttl(&key).unwrap().unwrap();
    assert!(left <= Duration::from_secs(20) && left >= Duration::from_secs(18));

    assert!(cache.is_connected());
}

/// A 2s entry is gone after 5s
pub fn assert_tier_expiry(cache: &dyn Cache) {
    let key = test_key("expire");
    assert!(cache.set(&key, &CacheValue::Int(8), Some(Duration::from_secs(2))).unwrap());
    std::thread::sleep(Duration::from_secs(5));
    assert_eq!(cache.get(&key).unwrap(), None);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let key1 = test_key("user");
        let key2 = test_key("user");
        assert_ne!(key1, key2, "Keys should be unique");
        assert!(key1.starts_with("test_user_"));
    }
}
