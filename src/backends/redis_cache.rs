//! Redis Cache - Distributed Key-Value Tier
//!
//! Uses the blocking `redis` client. One connection is held for the tier's
//! lifetime unless `persistent` is off, in which case every command opens its own.
//!
//! A global flush is never issued against Redis: the store is assumed to be
//! shared, so [`Cache::clear_all_cache`] always fails with `ClearAllDenied`.

use std::time::Duration;

use parking_lot::Mutex;
use redis::{Client, Connection, RedisError, RedisResult};
use tracing::{debug, info, warn};

use super::{BackendKind, call_ttl, keys, prepare};
use crate::codecs::ValueCodec;
use crate::config::{CacheConfig, ConfigValue};
use crate::error::{CacheError, Result};
use crate::traits::Cache;
use crate::value::CacheValue;

const KIND: BackendKind = BackendKind::Redis;

enum Link {
    /// Shared connection, re-opened once if the server dropped it
    Persistent(Mutex<Connection>),
    /// Fresh connection per command
    PerCommand,
}

/// Redis tier
pub struct RedisCache {
    client: Client,
    link: Link,
    ttl: Duration,
    codec: ValueCodec,
}

impl RedisCache {
    /// Connect a tier from its option map
    ///
    /// Recognized options: `host`, `port`, `password`, `database`, `persistent`
    /// (default `true`) and `client` (a pre-built `redis::Client`, replacing the
    /// address options).
    ///
    /// # Errors
    ///
    /// - `InvalidConfiguration` / `MissingConfiguration` for bad options
    /// - `Connection` if the server cannot be reached
    pub fn from_config(ttl: Duration, config: &CacheConfig, codec: ValueCodec) -> Result<Self> {
        let ttl = prepare(KIND, ttl, config)?;
        let persistent = config.bool(keys::PERSISTENT)?.unwrap_or(true);

        let client = match config.get(keys::CLIENT) {
            Some(ConfigValue::RedisClient(client)) => client.clone(),
            Some(other) => {
                return Err(CacheError::InvalidConfiguration(format!(
                    "option 'client' must be a redis client, found {other:?}"
                )));
            }
            None => {
                let url = connection_url(config)?;
                Client::open(url.as_str()).map_err(|e| CacheError::connection(KIND, e))?
            }
        };

        info!(
            persistent,
            ttl_secs = ttl.as_secs(),
            "Initializing Redis tier"
        );

        let mut conn = client
            .get_connection()
            .map_err(|e| CacheError::connection(KIND, e))?;
        let _: String = redis::cmd("PING")
            .query(&mut conn)
            .map_err(|e| CacheError::connection(KIND, format!("PING failed: {e}")))?;

        let link = if persistent {
            Link::Persistent(Mutex::new(conn))
        } else {
            Link::PerCommand
        };

        info!("Redis tier connected");

        Ok(Self {
            client,
            link,
            ttl,
            codec,
        })
    }

    fn run<T>(&self, command: impl Fn(&mut Connection) -> RedisResult<T>) -> Result<T> {
        let result = match &self.link {
            Link::Persistent(conn) => {
                let mut conn = conn.lock();
                match command(&mut *conn) {
                    Err(e) if is_transport_error(&e) => {
                        warn!(error = %e, "[Redis] Connection lost, reconnecting");
                        *conn = self
                            .client
                            .get_connection()
                            .map_err(|e| CacheError::connection(KIND, e))?;
                        command(&mut *conn)
                    }
                    other => other,
                }
            }
            Link::PerCommand => {
                let mut conn = self
                    .client
                    .get_connection()
                    .map_err(|e| CacheError::connection(KIND, e))?;
                command(&mut conn)
            }
        };
        result.map_err(|e| CacheError::connection(KIND, e))
    }

    /// `SET key 0 EX ttl NX` then `INCRBY key delta` in one MULTI
    ///
    /// Only the call that creates the counter sets its TTL.
    fn add(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<Option<i64>> {
        let ttl_secs = call_ttl(ttl, self.ttl)?.as_secs().max(1);
        let outcome = self.run(|conn| {
            let result: RedisResult<(i64,)> = redis::pipe()
                .atomic()
                .cmd("SET")
                .arg(key)
                .arg(0)
                .arg("EX")
                .arg(ttl_secs)
                .arg("NX")
                .ignore()
                .cmd("INCRBY")
                .arg(key)
                .arg(delta)
                .query(conn);
            match result {
                Ok((value,)) => Ok(Some(value)),
                Err(e) if is_not_numeric(&e) => Ok(None),
                Err(e) => Err(e),
            }
        })?;
        if outcome.is_none() {
            debug!(key = %key, "[Redis] Counter holds a non-numeric value");
        }
        Ok(outcome)
    }
}

fn is_transport_error(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_timeout()
}

fn is_not_numeric(e: &RedisError) -> bool {
    counter_type_mismatch(&e.to_string())
}

/// Server replies meaning the stored value cannot be counted
fn counter_type_mismatch(message: &str) -> bool {
    message.contains("WRONGTYPE")
        || message.contains("not an integer or out of range")
        || message.contains("would overflow")
}

/// `redis://[:password@]host:port[/database]`
fn connection_url(config: &CacheConfig) -> Result<String> {
    let host = config
        .str(keys::HOST)?
        .ok_or_else(|| CacheError::InvalidConfiguration("option 'host' is required".into()))?;
    let port = config
        .port(keys::PORT)?
        .ok_or_else(|| CacheError::InvalidConfiguration("option 'port' is required".into()))?;

    let auth = match config.str(keys::PASSWORD)? {
        Some(password) => format!(":{}@", urlencoding::encode(password)),
        None => String::new(),
    };
    let database = match config.int(keys::DATABASE)? {
        Some(db) if db >= 0 => format!("/{db}"),
        Some(db) => {
            return Err(CacheError::InvalidConfiguration(format!(
                "option 'database' must not be negative, got {db}"
            )));
        }
        None => String::new(),
    };
    Ok(format!("redis://{auth}{host}:{port}{database}"))
}

impl Cache for RedisCache {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn default_ttl(&self) -> Duration {
        self.ttl
    }

    fn set(&self, key: &str, value: &CacheValue, ttl: Option<Duration>) -> Result<bool> {
        let payload = self.codec.encode(value)?;
        let ttl_secs = call_ttl(ttl, self.ttl)?.as_secs().max(1);
        self.run(|conn| {
            redis::cmd("SET")
                .arg(key)
                .arg(&payload)
                .arg("EX")
                .arg(ttl_secs)
                .query::<()>(conn)
        })?;
        debug!(key = %key, ttl_secs, "[Redis] Cached key with TTL");
        Ok(true)
    }

    fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        let payload: Option<String> = self.run(|conn| redis::cmd("GET").arg(key).query(conn))?;
        payload.map(|p| self.codec.decode(&p)).transpose()
    }

    fn clear(&self, key: &str) -> Result<bool> {
        let removed: i64 = self.run(|conn| redis::cmd("DEL").arg(key).query(conn))?;
        Ok(removed > 0)
    }

    fn clear_all_cache(&self) -> Result<bool> {
        Err(CacheError::ClearAllDenied { kind: KIND })
    }

    fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<Option<i64>> {
        self.add(key, 1, ttl)
    }

    fn decrement(&self, key: &str, ttl: Option<Duration>) -> Result<Option<i64>> {
        self.add(key, -1, ttl)
    }

    fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>> {
        let secs: i64 = self.run(|conn| redis::cmd("TTL").arg(key).query(conn))?;
        // -2: absent, -1: no expiry
        Ok(u64::try_from(secs).ok().map(Duration::from_secs))
    }

    fn is_connected(&self) -> bool {
        self.run(|conn| redis::cmd("PING").query::<String>(conn))
            .is_ok_and(|pong| pong == "PONG")
    }
}
