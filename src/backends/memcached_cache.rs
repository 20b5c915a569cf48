//! Memcached Cache - Distributed Object Cache Tier
//!
//! Memcached cannot report a key's remaining lifetime, so every item is stored
//! as an envelope carrying its own deadline:
//!
//! ```text
//! [format byte] {"data": "<encoded value>", "expires_at": <unix seconds>}
//! ```
//!
//! The format byte says whether the JSON envelope that follows is LZ4
//! block-compressed. Readers accept both forms whatever their own `compress`
//! setting is.
//!
//! A counter created through `add` also carries a `claim`: the writer reads the
//! key back and only counts the increment as its own when the claim matches,
//! since the client reports a refused `add` as success.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use memcache::{Client, MemcacheError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::{BackendKind, call_ttl, keys, prepare};
use crate::codecs::ValueCodec;
use crate::config::{CacheConfig, ConfigValue};
use crate::error::{CacheError, Result};
use crate::traits::Cache;
use crate::value::CacheValue;

const KIND: BackendKind = BackendKind::Memcached;

const FORMAT_PLAIN: u8 = 0;
const FORMAT_LZ4: u8 = 1;
const LZ4_LEVEL: i32 = 6;

/// Attempts a counter update makes before giving up on a contended key
const MAX_CAS_ATTEMPTS: usize = 16;

/// Largest exptime memcached reads as relative; above it means a Unix timestamp
const MAX_RELATIVE_EXPIRATION: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    data: String,
    expires_at: u64,
    /// Set by the `add` that established a counter, kept by later updates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    claim: Option<String>,
}

impl Envelope {
    fn remaining(&self, now: u64) -> Option<u64> {
        self.expires_at.checked_sub(now).filter(|secs| *secs > 0)
    }
}

enum Handle {
    Shared(Arc<Client>),
    PerCommand(String),
}

/// Memcached tier
pub struct MemcachedCache {
    handle: Handle,
    compress: bool,
    ttl: Duration,
    codec: ValueCodec,
}

impl MemcachedCache {
    /// Connect a tier from its option map
    ///
    /// Recognized options: `host`, `port`, `persistent` (default `true`),
    /// `compress` (default `false`) and `client` (a pre-built
    /// `Arc<memcache::Client>`, replacing the address options).
    ///
    /// # Errors
    ///
    /// - `InvalidConfiguration` / `MissingConfiguration` for bad options
    /// - `Connection` if no server answers `version`
    pub fn from_config(ttl: Duration, config: &CacheConfig, codec: ValueCodec) -> Result<Self> {
        let ttl = prepare(KIND, ttl, config)?;
        let persistent = config.bool(keys::PERSISTENT)?.unwrap_or(true);
        let compress = config.bool(keys::COMPRESS)?.unwrap_or(false);

        let handle = match config.get(keys::CLIENT) {
            Some(ConfigValue::MemcachedClient(client)) => Handle::Shared(Arc::clone(client)),
            Some(other) => {
                return Err(CacheError::InvalidConfiguration(format!(
                    "option 'client' must be a memcached client, found {other:?}"
                )));
            }
            None => {
                let url = connection_url(config)?;
                if persistent {
                    Handle::Shared(Arc::new(connect(&url)?))
                } else {
                    Handle::PerCommand(url)
                }
            }
        };

        info!(persistent, compress, ttl_secs = ttl.as_secs(), "Initializing Memcached tier");

        let cache = Self {
            handle,
            compress,
            ttl,
            codec,
        };
        let versions = cache.run(Client::version)?;
        info!(server_count = versions.len(), "Memcached tier connected");
        Ok(cache)
    }

    fn run<T>(
        &self,
        command: impl FnOnce(&Client) -> std::result::Result<T, MemcacheError>,
    ) -> Result<T> {
        let result = match &self.handle {
            Handle::Shared(client) => command(client.as_ref()),
            Handle::PerCommand(url) => command(&connect(url)?),
        };
        result.map_err(|e| CacheError::connection(KIND, e))
    }

    fn pack(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(envelope)?;
        let mut packed = Vec::with_capacity(json.len() + 1);
        if self.compress {
            packed.push(FORMAT_LZ4);
            packed.extend(
                lz4::block::compress(
                    &json,
                    Some(lz4::block::CompressionMode::HIGHCOMPRESSION(LZ4_LEVEL)),
                    true,
                )
                .map_err(|e| CacheError::Codec(format!("LZ4 compression failed: {e}")))?,
            );
        } else {
            packed.push(FORMAT_PLAIN);
            packed.extend(json);
        }
        Ok(packed)
    }

    fn store(&self, key: &str, envelope: &Envelope, ttl_secs: u64) -> Result<()> {
        let bytes = self.pack(envelope)?;
        let exp = expiration(ttl_secs, envelope.expires_at);
        self.run(|client| client.set(key, bytes.as_slice(), exp))
    }

    /// Try to create the counter; `true` only if this call's `add` won
    fn establish(&self, key: &str, envelope: &Envelope, ttl_secs: u64) -> Result<bool> {
        let bytes = self.pack(envelope)?;
        let exp = expiration(ttl_secs, envelope.expires_at);
        let refused = self.run(|client| {
            match client.add(key, bytes.as_slice(), exp) {
                // Binary protocol reports NOT_STORED as an error
                Err(MemcacheError::CommandError(_)) => Ok(true),
                other => other.map(|()| false),
            }
        })?;
        if refused {
            return Ok(false);
        }
        let stored: Option<Vec<u8>> = self.run(|client| client.get(key))?;
        Ok(stored
            .and_then(|bytes| unpack(&bytes).ok())
            .is_some_and(|current| current.claim.is_some() && current.claim == envelope.claim))
    }

    fn fetch(&self, key: &str) -> Result<Option<Envelope>> {
        let bytes: Option<Vec<u8>> = self.run(|client| client.get(key))?;
        let now = unix_now();
        Ok(bytes
            .map(|b| unpack(&b))
            .transpose()?
            .filter(|envelope| envelope.remaining(now).is_some()))
    }

    /// Read-modify-write through `gets`/`cas`, or `add` when the key is absent
    fn add(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<Option<i64>> {
        let ttl_secs = call_ttl(ttl, self.ttl)?.as_secs().max(1);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let now = unix_now();
            let current: Option<(Vec<u8>, u32, Option<u64>)> = self
                .run(|client| client.gets(&[key]))?
                .into_values()
                .next();

            let Some((bytes, _flags, cas)) = current else {
                let fresh = Envelope {
                    data: delta.to_string(),
                    expires_at: now + ttl_secs,
                    claim: Some(Uuid::new_v4().to_string()),
                };
                if self.establish(key, &fresh, ttl_secs)? {
                    return Ok(Some(delta));
                }
                debug!(key = %key, "[Memcached] Counter established concurrently, retrying");
                continue;
            };

            let envelope = unpack(&bytes)?;
            let updated = if envelope.remaining(now).is_some() {
                let Some(next) = envelope
                    .data
                    .parse::<i64>()
                    .ok()
                    .and_then(|n| n.checked_add(delta))
                else {
                    debug!(key = %key, "[Memcached] Counter holds a non-numeric value");
                    return Ok(None);
                };
                Envelope {
                    data: next.to_string(),
                    expires_at: envelope.expires_at,
                    claim: envelope.claim,
                }
            } else {
                // Past its deadline but not yet evicted: start over
                Envelope {
                    data: delta.to_string(),
                    expires_at: now + ttl_secs,
                    claim: None,
                }
            };

            let exp = expiration(
                updated.expires_at.saturating_sub(now).max(1),
                updated.expires_at,
            );
            let bytes = self.pack(&updated)?;
            let stored = match cas {
                Some(cas_id) => self.run(|client| client.cas(key, bytes.as_slice(), exp, cas_id))?,
                None => {
                    self.run(|client| client.set(key, bytes.as_slice(), exp))?;
                    true
                }
            };
            if stored {
                return Ok(updated.data.parse().ok());
            }
        }

        Err(CacheError::connection(
            KIND,
            format!("counter '{key}' stayed contended after {MAX_CAS_ATTEMPTS} attempts"),
        ))
    }
}

fn connection_url(config: &CacheConfig) -> Result<String> {
    let host = config
        .str(keys::HOST)?
        .ok_or_else(|| CacheError::InvalidConfiguration("option 'host' is required".into()))?;
    let port = config
        .port(keys::PORT)?
        .ok_or_else(|| CacheError::InvalidConfiguration("option 'port' is required".into()))?;
    Ok(format!("memcache://{host}:{port}"))
}

fn connect(url: &str) -> Result<Client> {
    Client::connect(url).map_err(|e| CacheError::connection(KIND, e))
}

fn unpack(bytes: &[u8]) -> Result<Envelope> {
    let envelope = match bytes.split_first() {
        Some((&FORMAT_PLAIN, json)) => serde_json::from_slice(json)?,
        Some((&FORMAT_LZ4, compressed)) => {
            let json = lz4::block::decompress(compressed, None)
                .map_err(|e| CacheError::Codec(format!("LZ4 decompression failed: {e}")))?;
            serde_json::from_slice(&json)?
        }
        _ => {
            return Err(CacheError::Codec(
                "stored item is not a cache envelope".to_string(),
            ));
        }
    };
    Ok(envelope)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Memcached exptime for an item living `ttl_secs` until `expires_at`
///
/// Up to 30 days the server takes a relative number of seconds; past that it
/// only understands an absolute Unix time.
fn expiration(ttl_secs: u64, expires_at: u64) -> u32 {
    let exptime = if ttl_secs > MAX_RELATIVE_EXPIRATION {
        expires_at
    } else {
        ttl_secs
    };
    u32::try_from(exptime).unwrap_or(u32::MAX)
}

impl Cache for MemcachedCache {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn default_ttl(&self) -> Duration {
        self.ttl
    }

    fn set(&self, key: &str, value: &CacheValue, ttl: Option<Duration>) -> Result<bool> {
        let ttl_secs = call_ttl(ttl, self.ttl)?.as_secs().max(1);
        let envelope = Envelope {
            data: self.codec.encode(value)?,
            expires_at: unix_now() + ttl_secs,
            claim: None,
        };
        self.store(key, &envelope, ttl_secs)?;
        debug!(key = %key, ttl_secs, compress = self.compress, "[Memcached] Cached key with TTL");
        Ok(true)
    }

    fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.fetch(key)?
            .map(|envelope| self.codec.decode(&envelope.data))
            .transpose()
    }

    fn clear(&self, key: &str) -> Result<bool> {
        let stored: Option<Vec<u8>> = self.run(|client| client.get(key))?;
        let now = unix_now();
        // Items this tier cannot read still count as present
        let live = stored.is_some_and(|bytes| {
            unpack(&bytes)
                .ok()
                .is_none_or(|envelope| envelope.remaining(now).is_some())
        });
        let deleted = self.run(|client| client.delete(key))?;
        Ok(deleted && live)
    }

    fn clear_all_cache(&self) -> Result<bool> {
        self.run(Client::flush)?;
        debug!("[Memcached] Flushed all servers");
        Ok(true)
    }

    fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<Option<i64>> {
        self.add(key, 1, ttl)
    }

    fn decrement(&self, key: &str, ttl: Option<Duration>) -> Result<Option<i64>> {
        self.add(key, -1, ttl)
    }

    fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = unix_now();
        Ok(self
            .fetch(key)?
            .and_then(|envelope| envelope.remaining(now))
            .map(Duration::from_secs))
    }

    fn is_connected(&self) -> bool {
        self.run(Client::version).is_ok()
    }
}
