//! Moka Cache - In-Process Tier
//!
//! Entries are kept in a `moka::sync::Cache` and carry their own deadline, so
//! every key can have a different TTL. Several tiers may share one
//! [`MemoryStore`] and keep apart through a key prefix: the store is keyed by
//! `(prefix, key)`, so no prefix can reach into another one's entries.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::ops::compute::{CompResult, Op};
use moka::sync::Cache as MokaStore;
use tracing::{debug, info};

use super::{BackendKind, call_ttl, ceil_secs, keys, prepare};
use crate::codecs::ValueCodec;
use crate::config::{CacheConfig, ConfigValue};
use crate::error::{CacheError, Result};
use crate::traits::Cache;
use crate::value::CacheValue;

/// Entry bound used when a tier builds its own store
pub const DEFAULT_MAX_CAPACITY: u64 = 10_000;

/// Tier prefix and caller key
type StoreKey = (Arc<str>, String);

/// Encoded value with its deadline
#[derive(Debug, Clone)]
struct StoredEntry {
    payload: String,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Lets moka evict an entry at its own deadline
struct EntryDeadline;

impl Expiry<StoreKey, StoredEntry> for EntryDeadline {
    fn expire_after_create(
        &self,
        _key: &StoreKey,
        value: &StoredEntry,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &StoreKey,
        value: &StoredEntry,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(updated_at))
    }
}

/// Process-wide in-memory store
///
/// Cloning is cheap and yields a handle to the same entries.
#[derive(Clone)]
pub struct MemoryStore {
    entries: MokaStore<StoreKey, StoredEntry>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        let entries = MokaStore::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryDeadline)
            .build();
        Self { entries }
    }

    /// Live entries after pending evictions have run
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CAPACITY)
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

/// In-process tier backed by Moka
///
/// Usually the first (fastest) tier of a chain.
#[derive(Debug)]
pub struct MokaCache {
    store: MemoryStore,
    prefix: Arc<str>,
    ttl: Duration,
    codec: ValueCodec,
}

impl MokaCache {
    /// Create a tier over `store`
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for a TTL below one second.
    pub fn new(
        ttl: Duration,
        store: MemoryStore,
        prefix: impl Into<String>,
        codec: ValueCodec,
    ) -> Result<Self> {
        Self::from_config(
            ttl,
            &CacheConfig::new()
                .with(keys::STORE, store)
                .with(keys::PREFIX, prefix.into()),
            codec,
        )
    }

    /// Create a tier from its option map
    ///
    /// Recognized options: `prefix`, `max_capacity`, `store`.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for a bad TTL or a wrongly typed option.
    pub fn from_config(ttl: Duration, config: &CacheConfig, codec: ValueCodec) -> Result<Self> {
        let ttl = prepare(BackendKind::Moka, ttl, config)?;
        let prefix: Arc<str> = Arc::from(config.str(keys::PREFIX)?.unwrap_or_default());

        let store = match config.get(keys::STORE) {
            Some(ConfigValue::Store(store)) => store.clone(),
            Some(other) => {
                return Err(CacheError::InvalidConfiguration(format!(
                    "option 'store' must be a memory store, found {other:?}"
                )));
            }
            None => {
                let capacity = match config.int(keys::MAX_CAPACITY)? {
                    Some(n) => u64::try_from(n).map_err(|_| {
                        CacheError::InvalidConfiguration(format!(
                            "option 'max_capacity' must not be negative, got {n}"
                        ))
                    })?,
                    None => DEFAULT_MAX_CAPACITY,
                };
                MemoryStore::new(capacity)
            }
        };

        info!(
            prefix = %prefix,
            ttl_secs = ttl.as_secs(),
            "Moka tier initialized"
        );

        Ok(Self {
            store,
            prefix,
            ttl,
            codec,
        })
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    fn store_key(&self, key: &str) -> StoreKey {
        (Arc::clone(&self.prefix), key.to_string())
    }

    /// Live entry under `key`; an expired one is dropped on the way
    fn live_entry(&self, key: &str, now: Instant) -> Option<StoredEntry> {
        let store_key = self.store_key(key);
        let entry = self.store.entries.get(&store_key)?;
        if entry.is_expired(now) {
            self.store.entries.invalidate(&store_key);
            return None;
        }
        Some(entry)
    }

    fn add(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<Option<i64>> {
        let ttl = call_ttl(ttl, self.ttl)?;
        let now = Instant::now();

        let result = self
            .store
            .entries
            .entry(self.store_key(key))
            .and_compute_with(|current| {
                match current
                    .map(moka::Entry::into_value)
                    .filter(|entry| !entry.is_expired(now))
                {
                    None => Op::Put(StoredEntry {
                        payload: delta.to_string(),
                        expires_at: now + ttl,
                    }),
                    Some(entry) => match entry
                        .payload
                        .parse::<i64>()
                        .ok()
                        .and_then(|n| n.checked_add(delta))
                    {
                        Some(n) => Op::Put(StoredEntry {
                            payload: n.to_string(),
                            expires_at: entry.expires_at,
                        }),
                        None => Op::Nop,
                    },
                }
            });

        Ok(match result {
            CompResult::Inserted(entry) | CompResult::ReplacedWith(entry) => {
                entry.into_value().payload.parse().ok()
            }
            _ => {
                debug!(key = %key, prefix = %self.prefix, "[Moka] Counter holds a non-numeric value");
                None
            }
        })
    }
}

impl Cache for MokaCache {
    fn kind(&self) -> BackendKind {
        BackendKind::Moka
    }

    fn default_ttl(&self) -> Duration {
        self.ttl
    }

    fn set(&self, key: &str, value: &CacheValue, ttl: Option<Duration>) -> Result<bool> {
        let ttl = call_ttl(ttl, self.ttl)?;
        let entry = StoredEntry {
            payload: self.codec.encode(value)?,
            expires_at: Instant::now() + ttl,
        };
        self.store.entries.insert(self.store_key(key), entry);
        debug!(key = %key, ttl_secs = ttl.as_secs(), "[Moka] Cached key with TTL");
        Ok(true)
    }

    fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.live_entry(key, Instant::now())
            .map(|entry| self.codec.decode(&entry.payload))
            .transpose()
    }

    fn clear(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .store
            .entries
            .remove(&self.store_key(key))
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    fn clear_all_cache(&self) -> Result<bool> {
        if self.prefix.is_empty() {
            self.store.entries.invalidate_all();
        } else {
            for (key, _) in &self.store.entries {
                if key.0 == self.prefix {
                    self.store.entries.invalidate(&*key);
                }
            }
        }
        debug!(prefix = %self.prefix, "[Moka] Cleared tier");
        Ok(true)
    }

    fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<Option<i64>> {
        self.add(key, 1, ttl)
    }

    fn decrement(&self, key: &str, ttl: Option<Duration>) -> Result<Option<i64>> {
        self.add(key, -1, ttl)
    }

    fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        Ok(self
            .live_entry(key, now)
            .map(|entry| Duration::from_secs(ceil_secs(entry.expires_at - now))))
    }

    fn is_connected(&self) -> bool {
        true
    }
}
