//! Integration tests for the multi-tier manager
//!
//! In-process chains use `StandIn` tiers (Moka answering as another kind). The
//! Moka + Redis chain at the end needs a live server.

mod common;

use common::*;
use layered_cache::{
    BackendKind, Cache, CacheArray, CacheConfig, CacheManager, CacheSettings, CacheValue,
    ClearOutcome, TierConfiguration,
};
use std::sync::Arc;
use std::time::Duration;

fn two_tier(fast: &Arc<StandIn>, slow: &Arc<StandIn>) -> CacheManager {
    let mut manager = CacheManager::factory(None, false);
    assert!(manager.append_cache(fast.clone()));
    assert!(manager.append_cache(slow.clone()));
    manager
}

#[test]
fn test_values_round_trip_through_manager() {
    init_tracing();
    let fast = StandIn::new(BackendKind::Moka, 10);
    let slow = StandIn::new(BackendKind::Memcached, 65);
    let manager = two_tier(&fast, &slow);

    let values = [
        CacheValue::Int(8),
        CacheValue::Float(8.3),
        CacheValue::from("foobar"),
        CacheValue::Array(CacheArray::list(vec![1_i64, 2, 3])),
        CacheValue::Array(
            CacheArray::new()
                .with("owner", CacheValue::entity(sample_foo()))
                .with("tags", CacheArray::list(vec!["a", "b"])),
        ),
    ];
    for value in values {
        let key = test_key("round_trip");
        assert!(manager.set(&key, &value, None).unwrap());
        assert_eq!(manager.get(&key).unwrap(), Some(value));
    }

    let key = test_key("class");
    manager
        .set(&key, &CacheValue::entity(sample_foo()), None)
        .unwrap();
    let stored = manager.get(&key).unwrap().unwrap();
    assert_eq!(stored.as_entity::<Foo>(), Some(&sample_foo()));
}

#[test]
fn test_promotion_refills_expired_fast_tier() {
    let fast = StandIn::new(BackendKind::Moka, 3);
    let slow = StandIn::new(BackendKind::Memcached, 65);
    let manager = two_tier(&fast, &slow);
    let key = test_key("update_highest");

    assert!(manager.set(&key, &CacheValue::Int(10), None).unwrap());
    std::thread::sleep(Duration::from_secs(7));
    assert_eq!(fast.get(&key).unwrap(), None);

    assert_eq!(manager.get(&key).unwrap(), Some(CacheValue::Int(10)));
    assert_eq!(fast.get(&key).unwrap(), Some(CacheValue::Int(10)));
    // Promoted with the fast tier's own TTL
    assert_eq!(fast.remaining_ttl(&key).unwrap(), Some(Duration::from_secs(3)));

    let stats = manager.stats();
    assert_eq!(stats.promotions, 1);
    assert_eq!(stats.tiers[1].hits, 1);
}

#[test]
fn test_counters_diverge_per_tier() {
    let fast = StandIn::new(BackendKind::Moka, 60);
    let slow = StandIn::new(BackendKind::Memcached, 60);
    let manager = two_tier(&fast, &slow);
    let key = test_key("incr");

    let mut per_step = Vec::new();
    for _ in 0..3 {
        per_step.push(manager.increment(&key, None).unwrap());
    }
    for _ in 0..2 {
        per_step.push(manager.decrement(&key, None).unwrap());
    }
    for (results, expected) in per_step.iter().zip([1, 2, 3, 2, 1]) {
        assert_eq!(results[&BackendKind::Moka], Some(expected));
        assert_eq!(results[&BackendKind::Memcached], Some(expected));
    }

    // A tier written behind the manager's back keeps its own count
    fast.increment(&key, None).unwrap();
    let results = manager.increment(&key, None).unwrap();
    assert_eq!(results[&BackendKind::Moka], Some(3));
    assert_eq!(results[&BackendKind::Memcached], Some(2));
}

#[test]
fn test_empty_key_counters() {
    let manager = two_tier(
        &StandIn::new(BackendKind::Moka, 60),
        &StandIn::new(BackendKind::Memcached, 60),
    );
    let up = manager.increment(&test_key("empty_increment"), None).unwrap();
    assert!(up.values().all(|v| *v == Some(1)));
    let down = manager.decrement(&test_key("empty_decrement"), None).unwrap();
    assert!(down.values().all(|v| *v == Some(-1)));
}

#[test]
fn test_remaining_ttl_per_tier() {
    let manager = two_tier(
        &StandIn::new(BackendKind::Moka, 10),
        &StandIn::new(BackendKind::Memcached, 65),
    );
    let key = test_key("ttl");
    manager.set(&key, &CacheValue::Int(1), None).unwrap();

    let ttl = manager.remaining_ttl(&key).unwrap();
    assert_eq!(ttl[&BackendKind::Moka], Some(Duration::from_secs(10)));
    assert_eq!(ttl[&BackendKind::Memcached], Some(Duration::from_secs(65)));

    let absent = manager.remaining_ttl(&test_key("absent")).unwrap();
    assert!(absent.values().all(Option::is_none));
}

#[test]
fn test_clear_all_with_flush_denying_tier() {
    let fast = StandIn::new(BackendKind::Moka, 60);
    let denying = StandIn::new(BackendKind::Redis, 60);
    let manager = two_tier(&fast, &denying);
    let key = test_key("clear_all");
    manager.set(&key, &CacheValue::Int(1), None).unwrap();

    assert!(denying.clear_all_cache().unwrap_err().is_clear_all_denied());

    let report = manager.clear_all_cache_report().unwrap();
    assert_eq!(report[&BackendKind::Moka], ClearOutcome::Cleared);
    assert_eq!(report[&BackendKind::Redis], ClearOutcome::Denied);
    assert!(!manager.clear_all_cache().unwrap());
    assert_eq!(fast.get(&key).unwrap(), None);
}

#[test]
fn test_clear_all_when_every_tier_allows_it() {
    let manager = two_tier(
        &StandIn::new(BackendKind::Moka, 60),
        &StandIn::new(BackendKind::Memcached, 60),
    );
    let key = test_key("clear");
    manager.set(&key, &CacheValue::Int(1), None).unwrap();
    assert!(manager.clear_all_cache().unwrap());
    assert_eq!(manager.get(&key).unwrap(), None);
}

#[test]
fn test_duplicate_kind_is_refused() {
    let mut tiers = TierConfiguration::new(codec());
    assert!(
        tiers
            .append_tier(BackendKind::Moka, Duration::from_secs(10), &CacheConfig::new())
            .unwrap()
    );
    assert!(
        !tiers
            .append_tier(BackendKind::Moka, Duration::from_secs(20), &CacheConfig::new())
            .unwrap()
    );
    assert_eq!(tiers.len(), 1);

    let mut manager = CacheManager::new(tiers);
    assert!(!manager.append_cache(StandIn::new(BackendKind::Moka, 30)));
    assert_eq!(manager.tier_count(), 1);
    assert!(manager.append_cache(StandIn::new(BackendKind::Memcached, 30)));
    assert_eq!(
        manager.tier_kinds(),
        vec![BackendKind::Moka, BackendKind::Memcached]
    );
}

#[test]
fn test_manager_from_settings() {
    let settings = CacheSettings::from_json(
        r#"{"tiers": [{"kind": "moka", "ttl_secs": 30, "options": {"prefix": "settings:"}}]}"#,
    )
    .unwrap();
    let manager = settings.into_manager(codec()).unwrap();
    assert_eq!(manager.tier_kinds(), vec![BackendKind::Moka]);
    assert_eq!(
        manager.health_check().get(&BackendKind::Moka).copied(),
        Some(true)
    );

    let key = test_key("settings");
    manager.set(&key, &CacheValue::Bool(true), None).unwrap();
    assert_eq!(manager.get(&key).unwrap(), Some(CacheValue::Bool(true)));
}

#[test]
#[cfg(feature = "redis")]
#[ignore = "requires a Redis server (REDIS_HOST/REDIS_PORT)"]
fn test_moka_then_redis_promotion() {
    init_tracing();
    let mut tiers = TierConfiguration::new(codec());
    tiers
        .append_tier(BackendKind::Moka, Duration::from_secs(3), &CacheConfig::new())
        .unwrap();
    tiers
        .append_tier(BackendKind::Redis, Duration::from_secs(65), &redis_config())
        .unwrap();
    let fast = tiers.tiers()[0].clone();
    let manager = CacheManager::new(tiers);
    let key = test_key("update_highest");

    manager.set(&key, &CacheValue::Int(10), None).unwrap();
    std::thread::sleep(Duration::from_secs(7));
    assert_eq!(fast.get(&key).unwrap(), None);
    assert_eq!(manager.get(&key).unwrap(), Some(CacheValue::Int(10)));
    assert_eq!(fast.get(&key).unwrap(), Some(CacheValue::Int(10)));

    let report = manager.clear_all_cache_report().unwrap();
    assert_eq!(report[&BackendKind::Redis], ClearOutcome::Denied);
    manager.clear(&key).unwrap();
}
