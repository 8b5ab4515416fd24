use super::*;
use serde_json::json;
use std::time::Duration;

fn coordinator() -> CacheCoordinator {
    CacheCoordinator::new(true, Duration::from_secs(60), &HashMap::new())
}

#[test]
fn test_get_miss_then_hit() {
    let c = coordinator();
    let key = "fp-1";

    assert!(c.get(CacheKind::Queries, key).is_none());
    assert!(c.set(CacheKind::Queries, key, json!({"answer": 42}), None));

    let value = c.get(CacheKind::Queries, key).expect("must hit after set");
    assert_eq!(value["answer"], 42);
}

#[test]
fn test_ttl_expiry_is_a_miss() {
    let c = coordinator();
    c.set(
        CacheKind::LlmResponse,
        "fp",
        json!("response"),
        Some(Duration::ZERO),
    );

    assert!(c.get(CacheKind::LlmResponse, "fp").is_none());
    // The expired entry must also have been pruned.
    assert_eq!(c.stats(CacheKind::LlmResponse).item_count, 0);
}

#[test]
fn test_caches_are_independent() {
    let c = coordinator();
    c.set(CacheKind::Vector, "shared-key", json!([0.1, 0.2]), None);

    assert!(c.get(CacheKind::Vector, "shared-key").is_some());
    assert!(c.get(CacheKind::Queries, "shared-key").is_none());
    assert!(c.get(CacheKind::Documents, "shared-key").is_none());
}

#[test]
fn test_clear_type_unknown_name_rejected() {
    let c = coordinator();
    let err = c.clear_type("sessions").unwrap_err();
    assert!(matches!(err, CacheError::UnknownType(name) if name == "sessions"));
}

#[test]
fn test_clear_type_accepts_llm_alias() {
    let c = coordinator();
    c.set(CacheKind::LlmResponse, "fp", json!("cached"), None);

    let result = c.clear_type("llm").unwrap();
    assert_eq!(result.entries_removed, 1);
    assert!(result.bytes_freed > 0);
    assert!(c.get(CacheKind::LlmResponse, "fp").is_none());
}

#[test]
fn test_clear_all_accumulates() {
    let c = coordinator();
    for kind in CacheKind::CLEAR_ORDER {
        c.set(kind, "k", json!({"payload": "x".repeat(64)}), None);
    }

    let result = c.clear_all();
    assert_eq!(result.entries_removed, 5);
    assert!(result.bytes_freed > 0);

    for kind in CacheKind::CLEAR_ORDER {
        assert_eq!(c.stats(kind).item_count, 0);
    }
}

#[test]
fn test_hit_rate_accounting() {
    let c = coordinator();
    c.set(CacheKind::Queries, "present", json!(1), None);

    c.get(CacheKind::Queries, "present");
    c.get(CacheKind::Queries, "present");
    c.get(CacheKind::Queries, "absent");
    c.get(CacheKind::Queries, "absent");

    let stats = c.stats(CacheKind::Queries);
    assert!((stats.hit_rate - 0.5).abs() < 1e-9);
}

#[test]
fn test_byte_budget_evicts_lru() {
    let limits: HashMap<String, u64> = [("queries".to_string(), 1u64)].into_iter().collect();
    let c = CacheCoordinator::new(true, Duration::from_secs(60), &limits);

    // ~600 KB each; the third insert must evict the least recently used.
    let blob = "x".repeat(600 * 1024);
    c.set(CacheKind::Queries, "a", json!(blob.clone()), None);
    c.set(CacheKind::Queries, "b", json!(blob.clone()), None);
    c.set(CacheKind::Queries, "c", json!(blob), None);

    let stats = c.stats(CacheKind::Queries);
    assert!(stats.item_count < 3);
    assert!(c.get(CacheKind::Queries, "c").is_some());
}

#[test]
fn test_oversize_value_refused() {
    let limits: HashMap<String, u64> = [("documents".to_string(), 1u64)].into_iter().collect();
    let c = CacheCoordinator::new(true, Duration::from_secs(60), &limits);

    let oversize = "x".repeat(2 * 1024 * 1024);
    assert!(!c.set(CacheKind::Documents, "big", json!(oversize), None));
    assert_eq!(c.stats(CacheKind::Documents).item_count, 0);
}

#[test]
fn test_disabled_coordinator_is_inert() {
    let c = CacheCoordinator::new(false, Duration::from_secs(60), &HashMap::new());

    assert!(!c.set(CacheKind::Queries, "k", json!(1), None));
    assert!(c.get(CacheKind::Queries, "k").is_none());
    assert!(!c.stats_all().enabled);
}

#[test]
fn test_stats_all_reports_memory() {
    let c = coordinator();
    let stats = c.stats_all();

    assert_eq!(stats.caches.len(), 5);
    assert!(stats.host_total_memory_mb >= stats.host_used_memory_mb);
}

#[test]
fn test_set_overwrite_updates_bytes() {
    let c = coordinator();
    c.set(CacheKind::Queries, "k", json!("small"), None);
    c.set(CacheKind::Queries, "k", json!("much larger value here"), None);

    let stats = c.stats(CacheKind::Queries);
    assert_eq!(stats.item_count, 1);
}
