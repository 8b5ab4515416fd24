use super::*;
use axum::http::{HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

fn test_config(trusted: &[&str]) -> IdentityConfig {
    IdentityConfig {
        enable_proxy_headers: true,
        trusted_proxy_ips: trusted.iter().map(|s| s.parse().unwrap()).collect(),
        user_id_header: "X-User-Id".to_string(),
        client_id_header: "X-Client-Id".to_string(),
        user_tier_header: "X-User-Tier".to_string(),
        known_tiers: vec![
            "default".to_string(),
            "free".to_string(),
            "pro".to_string(),
        ],
    }
}

fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.insert(
            axum::http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    map
}

fn peer(addr: &str) -> IpAddr {
    addr.parse().unwrap()
}

#[test]
fn test_user_header_honored_from_trusted_peer() {
    let resolver = IdentityResolver::new(test_config(&["10.0.0.0/8"]));
    let identity = resolver.resolve(&headers(&[("x-user-id", "alice")]), peer("10.1.2.3"));

    assert_eq!(identity.user_id, "alice");
    assert_eq!(identity.origin, IdentityOrigin::UserHeader);
}

#[test]
fn test_user_header_ignored_from_untrusted_peer() {
    let resolver = IdentityResolver::new(test_config(&["10.0.0.0/8"]));
    let identity = resolver.resolve(
        &headers(&[("x-user-id", "alice"), ("x-forwarded-for", "1.2.3.4")]),
        peer("203.0.113.9"),
    );

    // Identity falls to the raw peer IP, forwarded headers and all.
    assert_eq!(identity.user_id, "ip-203.0.113.9");
    assert_eq!(identity.origin, IdentityOrigin::Ip);
    assert_eq!(identity.source_ip, peer("203.0.113.9"));
}

#[test]
fn test_client_id_fallback() {
    let resolver = IdentityResolver::new(test_config(&["10.0.0.0/8"]));
    let identity = resolver.resolve(&headers(&[("x-client-id", "svc-7")]), peer("203.0.113.9"));

    assert_eq!(identity.user_id, "client-svc-7");
    assert_eq!(identity.origin, IdentityOrigin::ClientHeader);
}

#[test]
fn test_api_key_fallback_is_hashed() {
    let resolver = IdentityResolver::new(test_config(&[]));
    let identity = resolver.resolve(
        &headers(&[("authorization", "Bearer sk-secret-token")]),
        peer("203.0.113.9"),
    );

    assert_eq!(identity.origin, IdentityOrigin::ApiKey);
    assert!(identity.user_id.starts_with("key-"));
    assert!(!identity.user_id.contains("secret"));
}

#[test]
fn test_forwarded_for_first_hop_when_trusted() {
    let resolver = IdentityResolver::new(test_config(&["10.0.0.1/32"]));
    let identity = resolver.resolve(
        &headers(&[("x-forwarded-for", "198.51.100.7, 10.0.0.1")]),
        peer("10.0.0.1"),
    );

    assert_eq!(identity.source_ip, peer("198.51.100.7"));
    assert_eq!(identity.user_id, "ip-198.51.100.7");
}

#[test]
fn test_unparseable_forwarded_falls_back_to_peer() {
    let resolver = IdentityResolver::new(test_config(&["10.0.0.1/32"]));
    let identity = resolver.resolve(
        &headers(&[("x-forwarded-for", "not-an-ip")]),
        peer("10.0.0.1"),
    );

    assert_eq!(identity.source_ip, peer("10.0.0.1"));
}

#[test]
fn test_tier_from_header_known_and_unknown() {
    let resolver = IdentityResolver::new(test_config(&["10.0.0.0/8"]));

    let known = resolver.resolve(
        &headers(&[("x-user-id", "u"), ("x-user-tier", "pro")]),
        peer("10.0.0.1"),
    );
    assert_eq!(known.tier, "pro");

    let unknown = resolver.resolve(
        &headers(&[("x-user-id", "u"), ("x-user-tier", "platinum")]),
        peer("10.0.0.1"),
    );
    assert_eq!(unknown.tier, "default");
}

#[test]
fn test_proxy_headers_disabled_never_trusts() {
    let mut config = test_config(&["0.0.0.0/0"]);
    config.enable_proxy_headers = false;
    let resolver = IdentityResolver::new(config);

    let identity = resolver.resolve(&headers(&[("x-user-id", "alice")]), peer("10.0.0.1"));
    assert_eq!(identity.origin, IdentityOrigin::Ip);
}

// -- Rate gate --

fn identity(id: &str, tier: &str) -> UserIdentity {
    UserIdentity {
        user_id: id.to_string(),
        tier: tier.to_string(),
        source_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        origin: IdentityOrigin::UserHeader,
    }
}

fn tiers(pairs: &[(&str, u32)]) -> HashMap<String, u32> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[test]
fn test_rate_isolation_between_identities() {
    let gate = RateGate::new(
        Duration::from_secs(60),
        Duration::ZERO,
        tiers(&[("default", 10)]),
        10,
    );

    for i in 0..10 {
        assert!(
            gate.check(&identity("u1", "default")).is_accept(),
            "u1 request {i} should pass"
        );
        assert!(
            gate.check(&identity("u2", "default")).is_accept(),
            "u2 request {i} should pass"
        );
    }

    assert!(matches!(
        gate.check(&identity("u1", "default")),
        Decision::RejectRate { .. }
    ));
    assert!(matches!(
        gate.check(&identity("u2", "default")),
        Decision::RejectRate { .. }
    ));
}

#[test]
fn test_window_rollover_resets_quota() {
    let gate = RateGate::new(
        Duration::from_secs(60),
        Duration::ZERO,
        tiers(&[("default", 2)]),
        2,
    );
    let start = Instant::now();
    let user = identity("u", "default");

    assert!(gate.check_at(&user, start).is_accept());
    assert!(gate.check_at(&user, start).is_accept());
    assert!(matches!(
        gate.check_at(&user, start),
        Decision::RejectRate { .. }
    ));

    let next_window = start + Duration::from_secs(61);
    assert!(gate.check_at(&user, next_window).is_accept());
}

#[test]
fn test_min_interval_rejects_rapid_pair() {
    let gate = RateGate::new(
        Duration::from_secs(60),
        Duration::from_millis(500),
        tiers(&[("default", 1000)]),
        1000,
    );
    let start = Instant::now();
    let user = identity("u", "default");

    assert!(gate.check_at(&user, start).is_accept());
    match gate.check_at(&user, start + Duration::from_millis(200)) {
        Decision::RejectInterval { retry_after } => {
            assert!(retry_after <= Duration::from_millis(300));
        }
        other => panic!("expected interval rejection, got {other:?}"),
    }

    assert!(gate
        .check_at(&user, start + Duration::from_millis(600))
        .is_accept());
}

#[test]
fn test_interval_rejection_does_not_consume_quota() {
    let gate = RateGate::new(
        Duration::from_secs(60),
        Duration::from_millis(500),
        tiers(&[("default", 2)]),
        2,
    );
    let start = Instant::now();
    let user = identity("u", "default");

    assert!(gate.check_at(&user, start).is_accept());
    // Burst of interval-rejected requests must not eat the window quota.
    for ms in [10u64, 20, 30, 40] {
        assert!(matches!(
            gate.check_at(&user, start + Duration::from_millis(ms)),
            Decision::RejectInterval { .. }
        ));
    }
    assert!(gate
        .check_at(&user, start + Duration::from_millis(600))
        .is_accept());
}

#[test]
fn test_tier_capacities() {
    let gate = RateGate::new(
        Duration::from_secs(60),
        Duration::ZERO,
        tiers(&[("default", 60), ("free", 2)]),
        60,
    );
    let user = identity("u", "free");

    assert!(gate.check(&user).is_accept());
    assert!(gate.check(&user).is_accept());
    assert!(matches!(gate.check(&user), Decision::RejectRate { .. }));
}

#[test]
fn test_bucket_table_is_bounded() {
    let gate = RateGate::with_max_buckets(
        Duration::from_secs(60),
        Duration::ZERO,
        tiers(&[("default", 10)]),
        10,
        8,
    );

    for i in 0..100 {
        gate.check(&identity(&format!("u{i}"), "default"));
    }
    assert!(gate.bucket_count() <= 8);
}

#[test]
fn test_sweep_drops_stale_buckets() {
    let gate = RateGate::new(
        Duration::from_millis(1),
        Duration::ZERO,
        tiers(&[("default", 10)]),
        10,
    );
    gate.check(&identity("old", "default"));
    std::thread::sleep(Duration::from_millis(5));

    assert_eq!(gate.sweep(), 1);
    assert_eq!(gate.bucket_count(), 0);
}
