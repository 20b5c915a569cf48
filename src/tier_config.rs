//! Tier Configuration
//!
//! Ordered list of tiers, highest priority first, holding at most one tier per
//! backend kind. Built once at startup and handed to [`crate::CacheManager`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::backends::{self, BackendKind};
use crate::codecs::ValueCodec;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::traits::Cache;

/// Ordered tiers plus the kinds already present
///
/// ```rust
/// use layered_cache::{BackendKind, CacheConfig, TierConfiguration};
/// use std::time::Duration;
///
/// # fn example() -> layered_cache::Result<()> {
/// let mut tiers = TierConfiguration::default();
/// assert!(tiers.append_tier(BackendKind::Moka, Duration::from_secs(30), &CacheConfig::new())?);
/// // One tier per kind: a second Moka tier is refused
/// assert!(!tiers.append_tier(BackendKind::Moka, Duration::from_secs(60), &CacheConfig::new())?);
/// assert_eq!(tiers.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct TierConfiguration {
    codec: ValueCodec,
    tiers: Vec<Arc<dyn Cache>>,
    kinds: BTreeSet<BackendKind>,
}

impl TierConfiguration {
    /// Empty configuration whose tiers will share `codec`
    #[must_use]
    pub fn new(codec: ValueCodec) -> Self {
        Self {
            codec,
            tiers: Vec::new(),
            kinds: BTreeSet::new(),
        }
    }

    /// Build a tier and append it at the next priority slot
    ///
    /// Returns `false` without building anything when a tier of `kind` is
    /// already present.
    ///
    /// # Errors
    ///
    /// Whatever [`backends::create`] fails with.
    pub fn append_tier(
        &mut self,
        kind: BackendKind,
        ttl: Duration,
        config: &CacheConfig,
    ) -> Result<bool> {
        if self.kinds.contains(&kind) {
            debug!(kind = %kind, "Tier kind already configured, skipping");
            return Ok(false);
        }
        let tier = backends::create(kind, ttl, config, self.codec.clone())?;
        Ok(self.append(tier))
    }

    /// Append an already-built tier; `false` on a duplicate kind
    pub fn append(&mut self, tier: Arc<dyn Cache>) -> bool {
        let kind = tier.kind();
        if !self.kinds.insert(kind) {
            return false;
        }
        info!(
            kind = %kind,
            priority = self.tiers.len(),
            ttl_secs = tier.default_ttl().as_secs(),
            "Tier appended"
        );
        self.tiers.push(tier);
        true
    }

    /// Tiers from highest priority (index 0) to lowest
    #[must_use]
    pub fn tiers(&self) -> &[Arc<dyn Cache>] {
        &self.tiers
    }

    #[must_use]
    pub fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub(crate) fn into_tiers(self) -> Vec<Arc<dyn Cache>> {
        self.tiers
    }
}
