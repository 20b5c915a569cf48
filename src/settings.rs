//! Declarative Settings
//!
//! Loads a whole cache chain from JSON so applications can keep tier layout in
//! their configuration files:
//!
//! ```json
//! {
//!   "dry_run": false,
//!   "tiers": [
//!     { "kind": "moka", "ttl_secs": 30, "options": { "prefix": "app:" } },
//!     { "kind": "redis", "ttl_secs": 600, "options": { "host": "127.0.0.1", "port": 6379 } }
//!   ]
//! }
//! ```
//!
//! `LAYERED_CACHE_DRY_RUN` overrides `dry_run` at load time.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::backends::BackendKind;
use crate::cache_manager::CacheManager;
use crate::codecs::ValueCodec;
use crate::config::{CacheConfig, ConfigValue};
use crate::error::{CacheError, Result};
use crate::tier_config::TierConfiguration;

/// Environment variable forcing dry-run mode on (`1`, `true`, `yes`) or off (`0`, `false`, `no`)
pub const DRY_RUN_ENV: &str = "LAYERED_CACHE_DRY_RUN";

/// Whole cache chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    #[serde(default)]
    pub dry_run: bool,
    /// Highest priority first
    #[serde(default)]
    pub tiers: Vec<TierSettings>,
}

/// One tier of the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierSettings {
    pub kind: BackendKind,
    pub ttl_secs: i64,
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
}

impl TierSettings {
    /// # Errors
    ///
    /// `InvalidConfiguration` unless `ttl_secs` is positive.
    pub fn ttl(&self) -> Result<Duration> {
        u64::try_from(self.ttl_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                CacheError::InvalidConfiguration(format!(
                    "{} tier ttl must be positive, got {}",
                    self.kind, self.ttl_secs
                ))
            })
    }

    /// Options as a tier configuration map
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for options that are not a string, integer or bool.
    pub fn config(&self) -> Result<CacheConfig> {
        let mut config = CacheConfig::new();
        for (key, value) in &self.options {
            let value = match value {
                Value::String(s) => ConfigValue::Str(s.clone()),
                Value::Bool(b) => ConfigValue::Bool(*b),
                Value::Number(n) if n.is_i64() => ConfigValue::Int(n.as_i64().unwrap_or_default()),
                other => {
                    return Err(CacheError::InvalidConfiguration(format!(
                        "{} option '{key}' must be a string, integer or bool, got {other}",
                        self.kind
                    )));
                }
            };
            config.insert(key.clone(), value);
        }
        Ok(config)
    }
}

impl CacheSettings {
    /// Parse settings and apply the environment override
    ///
    /// # Errors
    ///
    /// `Serialization` for malformed JSON or unknown fields.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut settings: Self = serde_json::from_str(text)?;
        settings.apply_env();
        Ok(settings)
    }

    /// Apply `LAYERED_CACHE_DRY_RUN` if set to a recognized value
    pub fn apply_env(&mut self) {
        if let Ok(raw) = std::env::var(DRY_RUN_ENV) {
            match parse_flag(&raw) {
                Some(dry_run) => self.dry_run = dry_run,
                None => warn!(value = %raw, "Ignoring unrecognized {DRY_RUN_ENV}"),
            }
        }
    }

    /// Build every tier in order
    ///
    /// A repeated kind is skipped, as [`TierConfiguration::append_tier`] does.
    ///
    /// # Errors
    ///
    /// The first tier that fails to build.
    pub fn tier_configuration(&self, codec: ValueCodec) -> Result<TierConfiguration> {
        let mut configuration = TierConfiguration::new(codec);
        for tier in &self.tiers {
            if !configuration.append_tier(tier.kind, tier.ttl()?, &tier.config()?)? {
                warn!(kind = %tier.kind, "Duplicate tier kind in settings, skipped");
            }
        }
        Ok(configuration)
    }

    /// Build the tiers, then the manager
    ///
    /// # Errors
    ///
    /// The first tier that fails to build.
    pub fn into_manager(self, codec: ValueCodec) -> Result<CacheManager> {
        let configuration = self.tier_configuration(codec)?;
        info!(tiers = configuration.len(), dry_run = self.dry_run, "Cache settings loaded");
        Ok(CacheManager::factory(Some(configuration), self.dry_run))
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
