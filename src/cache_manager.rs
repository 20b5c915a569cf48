//! Cache Manager - Unified Cache Operations
//!
//! Runs every operation across the ordered tiers: writes fan out to all tiers,
//! reads stop at the first hit and promote the value into the faster tiers that
//! missed, and counters report one result per tier.
//!
//! A dry-run manager keeps the same interface but touches no tier, which lets
//! calling code bypass caching without changing.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backends::BackendKind;
use crate::error::Result;
use crate::tier_config::TierConfiguration;
use crate::traits::Cache;
use crate::value::CacheValue;

/// What a tier did when asked to drop every key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared,
    /// The tier ran the flush but reported failure
    NotCleared,
    /// The tier forbids a global flush
    Denied,
}

/// Read statistics, per priority slot
#[derive(Debug, Default)]
struct TierCounters {
    hits: AtomicU64,
    promotions: AtomicU64,
}

/// Cache Manager - ordered tiers behind one API
pub struct CacheManager {
    tiers: Vec<Arc<dyn Cache>>,
    dry_run: bool,
    /// Statistics
    total_requests: AtomicU64,
    misses: AtomicU64,
    per_tier: Vec<TierCounters>,
}

impl CacheManager {
    /// Active manager over `configuration`'s tiers
    #[must_use]
    pub fn new(configuration: TierConfiguration) -> Self {
        Self::factory(Some(configuration), false)
    }

    /// Manager that accepts every call and touches no tier
    #[must_use]
    pub fn dry_run(configuration: TierConfiguration) -> Self {
        Self::factory(Some(configuration), true)
    }

    /// Build either variant; `None` means no tiers yet
    #[must_use]
    pub fn factory(configuration: Option<TierConfiguration>, dry_run: bool) -> Self {
        let tiers = configuration
            .map(TierConfiguration::into_tiers)
            .unwrap_or_default();
        let per_tier = tiers.iter().map(|_| TierCounters::default()).collect();

        info!(
            tiers = tiers.len(),
            dry_run,
            order = %describe(&tiers),
            "Cache Manager initialized"
        );

        Self {
            tiers,
            dry_run,
            total_requests: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            per_tier,
        }
    }

    /// Write `value` to every tier
    ///
    /// Returns `false` only when no tier is configured. A dry-run manager
    /// returns `true` without writing.
    ///
    /// # Errors
    ///
    /// The first tier error; tiers after it are not written.
    pub fn set(&self, key: &str, value: &CacheValue, ttl: Option<Duration>) -> Result<bool> {
        if self.dry_run {
            return Ok(true);
        }
        if self.tiers.is_empty() {
            return Ok(false);
        }
        self.set_per_tier(key, value, ttl)?;
        Ok(true)
    }

    /// [`CacheManager::set`] with each tier's own acknowledgement
    ///
    /// # Errors
    ///
    /// The first tier error.
    pub fn set_per_tier(
        &self,
        key: &str,
        value: &CacheValue,
        ttl: Option<Duration>,
    ) -> Result<BTreeMap<BackendKind, bool>> {
        if self.dry_run {
            return Ok(BTreeMap::new());
        }
        let mut acks = BTreeMap::new();
        for tier in &self.tiers {
            let ack = tier.set(key, value, ttl)?;
            if !ack {
                debug!(key = %key, tier = tier.name(), "Tier did not acknowledge write");
            }
            acks.insert(tier.kind(), ack);
        }
        debug!(key = %key, tiers = acks.len(), "Value written through");
        Ok(acks)
    }

    /// Read through the tiers, promoting a hit into every faster tier
    ///
    /// Promoted copies use the receiving tier's default TTL. Tiers after the
    /// one that hit are never queried.
    ///
    /// # Errors
    ///
    /// A tier error while reading or promoting.
    pub fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        if self.dry_run {
            return Ok(None);
        }
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        for (priority, tier) in self.tiers.iter().enumerate() {
            let Some(value) = tier.get(key)? else {
                continue;
            };

            if let Some(counters) = self.per_tier.get(priority) {
                counters.hits.fetch_add(1, Ordering::Relaxed);
            }
            for (faster, counters) in self.tiers.iter().zip(&self.per_tier).take(priority) {
                faster.set(key, &value, None)?;
                counters.promotions.fetch_add(1, Ordering::Relaxed);
            }
            debug!(
                key = %key,
                tier = tier.name(),
                priority,
                promoted = priority,
                "Cache hit"
            );
            return Ok(Some(value));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Cache miss on every tier");
        Ok(None)
    }

    /// Delete `key` from every tier; `true` iff every tier deleted something
    ///
    /// # Errors
    ///
    /// The first tier error.
    pub fn clear(&self, key: &str) -> Result<bool> {
        if self.dry_run {
            return Ok(true);
        }
        let mut cleared = 0;
        for tier in &self.tiers {
            cleared += usize::from(tier.clear(key)?);
        }
        debug!(key = %key, cleared, tiers = self.tiers.len(), "Key cleared");
        Ok(cleared == self.tiers.len())
    }

    /// Flush every tier; `true` iff every tier was cleared
    ///
    /// Tiers that forbid a global flush are skipped and count as not cleared.
    ///
    /// # Errors
    ///
    /// Any tier error other than a denied flush.
    pub fn clear_all_cache(&self) -> Result<bool> {
        if self.dry_run {
            return Ok(true);
        }
        let report = self.clear_all_cache_report()?;
        Ok(report
            .values()
            .all(|outcome| *outcome == ClearOutcome::Cleared))
    }

    /// [`CacheManager::clear_all_cache`] with each tier's outcome
    ///
    /// # Errors
    ///
    /// Any tier error other than a denied flush.
    pub fn clear_all_cache_report(&self) -> Result<BTreeMap<BackendKind, ClearOutcome>> {
        if self.dry_run {
            return Ok(BTreeMap::new());
        }
        let mut report = BTreeMap::new();
        for tier in &self.tiers {
            let outcome = match tier.clear_all_cache() {
                Ok(true) => ClearOutcome::Cleared,
                Ok(false) => ClearOutcome::NotCleared,
                Err(e) if e.is_clear_all_denied() => {
                    warn!(tier = tier.name(), "Tier forbids a global flush, skipping");
                    ClearOutcome::Denied
                }
                Err(e) => return Err(e),
            };
            report.insert(tier.kind(), outcome);
        }
        Ok(report)
    }

    /// Increment the counter in every tier
    ///
    /// Tiers are independent counters, so each reports its own value (`None`
    /// where the stored value is not numeric). Empty for a dry-run manager.
    ///
    /// # Errors
    ///
    /// The first tier error.
    pub fn increment(
        &self,
        key: &str,
        ttl: Option<Duration>,
    ) -> Result<BTreeMap<BackendKind, Option<i64>>> {
        self.per_tier_map(|tier| tier.increment(key, ttl))
    }

    /// Decrement the counter in every tier, see [`CacheManager::increment`]
    ///
    /// # Errors
    ///
    /// The first tier error.
    pub fn decrement(
        &self,
        key: &str,
        ttl: Option<Duration>,
    ) -> Result<BTreeMap<BackendKind, Option<i64>>> {
        self.per_tier_map(|tier| tier.decrement(key, ttl))
    }

    /// Time left for `key` in every tier
    ///
    /// # Errors
    ///
    /// The first tier error.
    pub fn remaining_ttl(&self, key: &str) -> Result<BTreeMap<BackendKind, Option<Duration>>> {
        self.per_tier_map(|tier| tier.remaining_ttl(key))
    }

    fn per_tier_map<T>(
        &self,
        op: impl Fn(&dyn Cache) -> Result<T>,
    ) -> Result<BTreeMap<BackendKind, T>> {
        if self.dry_run {
            return Ok(BTreeMap::new());
        }
        self.tiers
            .iter()
            .map(|tier| op(tier.as_ref()).map(|value| (tier.kind(), value)))
            .collect()
    }

    /// Add a tier at the lowest priority; `false` if its kind is already present
    ///
    /// Bookkeeping is the same for a dry-run manager.
    pub fn append_cache(&mut self, tier: Arc<dyn Cache>) -> bool {
        if self.tiers.iter().any(|t| t.kind() == tier.kind()) {
            debug!(kind = %tier.kind(), "Tier kind already present, not appended");
            return false;
        }
        info!(kind = %tier.kind(), priority = self.tiers.len(), "Tier appended to manager");
        self.tiers.push(tier);
        self.per_tier.push(TierCounters::default());
        true
    }

    /// Liveness of every tier; empty for a dry-run manager
    #[must_use]
    pub fn health_check(&self) -> BTreeMap<BackendKind, bool> {
        if self.dry_run {
            return BTreeMap::new();
        }
        self.tiers
            .iter()
            .map(|tier| (tier.kind(), tier.is_connected()))
            .collect()
    }

    /// Tier kinds in priority order
    #[must_use]
    pub fn tier_kinds(&self) -> Vec<BackendKind> {
        self.tiers.iter().map(|tier| tier.kind()).collect()
    }

    #[must_use]
    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    #[must_use]
    pub fn tiers(&self) -> &[Arc<dyn Cache>] {
        &self.tiers
    }

    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Get comprehensive cache statistics
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheManagerStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let tiers: Vec<TierStats> = self
            .tiers
            .iter()
            .zip(&self.per_tier)
            .map(|(tier, counters)| TierStats {
                kind: tier.kind(),
                hits: counters.hits.load(Ordering::Relaxed),
                promotions: counters.promotions.load(Ordering::Relaxed),
            })
            .collect();
        let total_hits = tiers.iter().map(|t| t.hits).sum();

        CacheManagerStats {
            total_requests,
            total_hits,
            misses: self.misses.load(Ordering::Relaxed),
            hit_rate: if total_requests > 0 {
                (total_hits as f64 / total_requests as f64) * 100.0
            } else {
                0.0
            },
            promotions: tiers.iter().map(|t| t.promotions).sum(),
            tiers,
        }
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::factory(None, false)
    }
}

fn describe(tiers: &[Arc<dyn Cache>]) -> String {
    tiers
        .iter()
        .map(|tier| tier.name())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Read statistics of one tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierStats {
    pub kind: BackendKind,
    /// Reads this tier answered
    pub hits: u64,
    /// Values copied into this tier from a slower one
    pub promotions: u64,
}

/// Cache Manager statistics
#[derive(Debug, Clone)]
pub struct CacheManagerStats {
    pub total_requests: u64,
    pub total_hits: u64,
    pub misses: u64,
    /// Percentage of reads answered by some tier
    pub hit_rate: f64,
    pub promotions: u64,
    /// Per tier, in priority order
    pub tiers: Vec<TierStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MemoryStore, MokaCache};
    use crate::codecs::ValueCodec;
    use crate::error::CacheError;

    /// Moka tier answering as another kind, optionally refusing a global flush
    struct Stand {
        inner: MokaCache,
        kind: BackendKind,
        deny_flush: bool,
    }

    impl Stand {
        fn new(kind: BackendKind, ttl_secs: u64) -> Arc<Self> {
            Arc::new(Self {
                inner: MokaCache::new(
                    Duration::from_secs(ttl_secs),
                    MemoryStore::default(),
                    "",
                    ValueCodec::default(),
                )
                .unwrap(),
                kind,
                deny_flush: kind == BackendKind::Redis,
            })
        }
    }

    impl Cache for Stand {
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
            if self.deny_flush {
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

    fn manager(tiers: &[Arc<Stand>]) -> CacheManager {
        let mut manager = CacheManager::default();
        for tier in tiers {
            assert!(manager.append_cache(tier.clone()));
        }
        manager
    }

    #[test]
    fn test_set_without_tiers_is_false() {
        let manager = CacheManager::default();
        assert!(!manager.set("k", &CacheValue::Int(1), None).unwrap());
        assert_eq!(manager.get("k").unwrap(), None);
        assert!(manager.increment("k", None).unwrap().is_empty());
    }

    #[test]
    fn test_set_writes_every_tier() {
        let fast = Stand::new(BackendKind::Moka, 60);
        let slow = Stand::new(BackendKind::Memcached, 60);
        let manager = manager(&[fast.clone(), slow.clone()]);

        assert!(manager.set("k", &CacheValue::from("v"), None).unwrap());
        assert_eq!(fast.get("k").unwrap(), Some(CacheValue::from("v")));
        assert_eq!(slow.get("k").unwrap(), Some(CacheValue::from("v")));

        let acks = manager.set_per_tier("k", &CacheValue::Int(2), None).unwrap();
        assert_eq!(acks.len(), 2);
        assert!(acks.values().all(|ack| *ack));
    }

    #[test]
    fn test_get_promotes_with_receiving_tier_ttl() {
        let fast = Stand::new(BackendKind::Moka, 5);
        let middle = Stand::new(BackendKind::Redis, 50);
        let slow = Stand::new(BackendKind::Memcached, 500);
        let manager = manager(&[fast.clone(), middle.clone(), slow.clone()]);

        slow.set("k", &CacheValue::Int(10), None).unwrap();
        assert_eq!(manager.get("k").unwrap(), Some(CacheValue::Int(10)));

        assert_eq!(fast.get("k").unwrap(), Some(CacheValue::Int(10)));
        assert_eq!(middle.get("k").unwrap(), Some(CacheValue::Int(10)));
        assert_eq!(fast.remaining_ttl("k").unwrap(), Some(Duration::from_secs(5)));
        assert_eq!(middle.remaining_ttl("k").unwrap(), Some(Duration::from_secs(50)));

        let stats = manager.stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.total_hits, 1);
        assert_eq!(stats.promotions, 2);
        assert_eq!(stats.tiers[2].hits, 1);
    }

    #[test]
    fn test_get_does_not_query_past_first_hit() {
        let fast = Stand::new(BackendKind::Moka, 60);
        let slow = Stand::new(BackendKind::Memcached, 60);
        let manager = manager(&[fast.clone(), slow.clone()]);

        fast.set("k", &CacheValue::Int(1), None).unwrap();
        slow.set("k", &CacheValue::Int(2), None).unwrap();
        assert_eq!(manager.get("k").unwrap(), Some(CacheValue::Int(1)));
        assert_eq!(manager.stats().promotions, 0);
    }

    #[test]
    fn test_miss_on_every_tier() {
        let manager = manager(&[Stand::new(BackendKind::Moka, 60)]);
        assert_eq!(manager.get("absent").unwrap(), None);
        let stats = manager.stats();
        assert_eq!(stats.misses, 1);
        assert!(stats.hit_rate.abs() < f64::EPSILON);
    }

    #[test]
    fn test_clear_requires_every_tier() {
        let fast = Stand::new(BackendKind::Moka, 60);
        let slow = Stand::new(BackendKind::Memcached, 60);
        let manager = manager(&[fast.clone(), slow]);

        manager.set("k", &CacheValue::Int(1), None).unwrap();
        assert!(manager.clear("k").unwrap());

        fast.set("only-fast", &CacheValue::Int(1), None).unwrap();
        assert!(!manager.clear("only-fast").unwrap());
        assert_eq!(fast.get("only-fast").unwrap(), None);
    }

    #[test]
    fn test_clear_all_skips_denying_tier() {
        let fast = Stand::new(BackendKind::Moka, 60);
        let denying = Stand::new(BackendKind::Redis, 60);
        let manager = manager(&[fast.clone(), denying.clone()]);
        manager.set("k", &CacheValue::Int(1), None).unwrap();

        assert!(denying.clear_all_cache().unwrap_err().is_clear_all_denied());
        assert!(!manager.clear_all_cache().unwrap());
        assert_eq!(fast.get("k").unwrap(), None);
        assert_eq!(denying.get("k").unwrap(), Some(CacheValue::Int(1)));

        let report = manager.clear_all_cache_report().unwrap();
        assert_eq!(report[&BackendKind::Moka], ClearOutcome::Cleared);
        assert_eq!(report[&BackendKind::Redis], ClearOutcome::Denied);
    }

    #[test]
    fn test_counters_per_tier() {
        let manager = manager(&[
            Stand::new(BackendKind::Moka, 60),
            Stand::new(BackendKind::Memcached, 60),
        ]);
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(manager.increment("c", None).unwrap());
        }
        for _ in 0..2 {
            seen.push(manager.decrement("c", None).unwrap());
        }
        for (step, expected) in seen.iter().zip([1, 2, 3, 2, 1]) {
            assert_eq!(step.len(), 2);
            assert!(step.values().all(|v| *v == Some(expected)));
        }
        let ttl = manager.remaining_ttl("c").unwrap();
        assert_eq!(ttl.keys().copied().collect::<Vec<_>>(), manager.tier_kinds());
    }

    #[test]
    fn test_append_rejects_duplicate_kind() {
        let mut manager = manager(&[Stand::new(BackendKind::Moka, 60)]);
        assert!(!manager.append_cache(Stand::new(BackendKind::Moka, 30)));
        assert_eq!(manager.tier_count(), 1);
        assert!(manager.append_cache(Stand::new(BackendKind::Redis, 30)));
        assert_eq!(manager.tier_kinds(), vec![BackendKind::Moka, BackendKind::Redis]);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let tier = Stand::new(BackendKind::Moka, 60);
        let mut manager = CacheManager::dry_run(TierConfiguration::default());
        assert!(manager.append_cache(tier.clone()));
        assert!(!manager.append_cache(Stand::new(BackendKind::Moka, 60)));

        assert!(manager.set("k", &CacheValue::Int(1), None).unwrap());
        assert_eq!(tier.get("k").unwrap(), None);
        tier.set("k", &CacheValue::Int(1), None).unwrap();
        assert_eq!(manager.get("k").unwrap(), None);
        assert!(manager.clear("k").unwrap());
        assert!(manager.clear_all_cache().unwrap());
        assert!(manager.increment("k", None).unwrap().is_empty());
        assert!(manager.decrement("k", None).unwrap().is_empty());
        assert!(manager.remaining_ttl("k").unwrap().is_empty());
        assert_eq!(tier.get("k").unwrap(), Some(CacheValue::Int(1)));
        assert_eq!(manager.stats().total_requests, 0);
    }
}
