//! Tier Configuration Map
//!
//! The per-tier option map handed to the backend factory, with typed accessors
//! and mandatory-key validation.

use std::collections::BTreeMap;
use std::fmt;
#[cfg(feature = "memcached")]
use std::sync::Arc;

use crate::backends::{BackendKind, MemoryStore};
use crate::error::{CacheError, Result};

/// One configuration option
///
/// Besides scalars, a tier can be handed an already-built handle, in which case
/// its address options become optional.
#[derive(Clone)]
pub enum ConfigValue {
    Str(String),
    Int(i64),
    Bool(bool),
    /// Shared in-process store for Moka tiers
    Store(MemoryStore),
    #[cfg(feature = "redis")]
    RedisClient(redis::Client),
    #[cfg(feature = "memcached")]
    MemcachedClient(Arc<memcache::Client>),
}

impl ConfigValue {
    const fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Int(_) => "integer",
            Self::Bool(_) => "bool",
            Self::Store(_) => "memory store",
            #[cfg(feature = "redis")]
            Self::RedisClient(_) => "redis client",
            #[cfg(feature = "memcached")]
            Self::MemcachedClient(_) => "memcached client",
        }
    }
}

impl fmt::Debug for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(v) => write!(f, "{v:?}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            other => write!(f, "<{}>", other.type_name()),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u16> for ConfigValue {
    fn from(v: u16) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<MemoryStore> for ConfigValue {
    fn from(v: MemoryStore) -> Self {
        Self::Store(v)
    }
}

#[cfg(feature = "redis")]
impl From<redis::Client> for ConfigValue {
    fn from(v: redis::Client) -> Self {
        Self::RedisClient(v)
    }
}

#[cfg(feature = "memcached")]
impl From<Arc<memcache::Client>> for ConfigValue {
    fn from(v: Arc<memcache::Client>) -> Self {
        Self::MemcachedClient(v)
    }
}

/// String-keyed option map for one tier
///
/// ```rust
/// use layered_cache::CacheConfig;
///
/// let config = CacheConfig::new()
///     .with("host", "127.0.0.1")
///     .with("port", 6379_i64)
///     .with("persistent", true);
/// assert_eq!(config.int("port").unwrap(), Some(6379));
/// ```
#[derive(Clone, Debug, Default)]
pub struct CacheConfig {
    values: BTreeMap<String, ConfigValue>,
}

impl CacheConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.values.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    /// Fail with `MissingConfiguration` naming every absent key
    ///
    /// # Errors
    ///
    /// `MissingConfiguration` if any key in `keys` is absent.
    pub fn require(&self, kind: BackendKind, keys: &[&str]) -> Result<()> {
        let missing: Vec<String> = keys
            .iter()
            .filter(|k| !self.contains(k))
            .map(|k| (*k).to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CacheError::MissingConfiguration {
                kind,
                keys: missing,
            })
        }
    }

    /// # Errors
    ///
    /// `InvalidConfiguration` if the key holds something other than a string.
    pub fn str(&self, key: &str) -> Result<Option<&str>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(ConfigValue::Str(v)) => Ok(Some(v)),
            Some(other) => Err(wrong_type(key, "string", other)),
        }
    }

    /// Integers, or strings holding an integer (ports often arrive as text)
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if the key holds something else.
    pub fn int(&self, key: &str) -> Result<Option<i64>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(ConfigValue::Int(v)) => Ok(Some(*v)),
            Some(ConfigValue::Str(s)) => s.trim().parse().map(Some).map_err(|_| {
                CacheError::InvalidConfiguration(format!("option '{key}' is not an integer: {s:?}"))
            }),
            Some(other) => Err(wrong_type(key, "integer", other)),
        }
    }

    /// # Errors
    ///
    /// `InvalidConfiguration` if the key holds something other than a bool.
    pub fn bool(&self, key: &str) -> Result<Option<bool>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(ConfigValue::Bool(v)) => Ok(Some(*v)),
            Some(other) => Err(wrong_type(key, "bool", other)),
        }
    }

    /// Port-sized integer
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if the value is not an integer or does not fit a TCP port.
    pub fn port(&self, key: &str) -> Result<Option<u16>> {
        self.int(key)?
            .map(|p| {
                u16::try_from(p).map_err(|_| {
                    CacheError::InvalidConfiguration(format!("option '{key}' is not a valid port: {p}"))
                })
            })
            .transpose()
    }
}

fn wrong_type(key: &str, expected: &str, found: &ConfigValue) -> CacheError {
    CacheError::InvalidConfiguration(format!(
        "option '{key}' must be a {expected}, found {}",
        found.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_lists_all_missing_keys() {
        let config = CacheConfig::new().with("port", 11211_i64);
        let err = config
            .require(BackendKind::Memcached, &["host", "port", "weight"])
            .unwrap_err();
        match err {
            CacheError::MissingConfiguration { kind, keys } => {
                assert_eq!(kind, BackendKind::Memcached);
                assert_eq!(keys, vec!["host".to_string(), "weight".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_typed_accessors() {
        let config = CacheConfig::new()
            .with("host", "localhost")
            .with("port", "6380")
            .with("persistent", false);
        assert_eq!(config.str("host").unwrap(), Some("localhost"));
        assert_eq!(config.port("port").unwrap(), Some(6380));
        assert_eq!(config.bool("persistent").unwrap(), Some(false));
        assert_eq!(config.bool("compress").unwrap(), None);
        assert!(matches!(
            config.bool("host"),
            Err(CacheError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_port_out_of_range() {
        let config = CacheConfig::new().with("port", 70_000_i64);
        assert!(config.port("port").is_err());
    }
}
