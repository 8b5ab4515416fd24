use super::*;

#[test]
fn test_metrics_record_and_snapshot() {
    let metrics = Metrics::new();
    metrics.record("POST", "/api/v1/query", 200, Duration::from_millis(30), 100, 500);
    metrics.record("POST", "/api/v1/query", 200, Duration::from_millis(70), 100, 500);
    metrics.record("POST", "/api/v1/query", 500, Duration::from_millis(9), 50, 80);
    metrics.record("GET", "/api/v1/health", 200, Duration::from_millis(1), 0, 40);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.total_requests, 4);
    assert_eq!(snapshot.total_errors, 1);
    assert_eq!(snapshot.bytes_in, 250);
    assert_eq!(snapshot.bytes_out, 1120);

    let query = &snapshot.routes["POST /api/v1/query"];
    assert_eq!(query.total, 3);
    assert_eq!(query.by_status[&200], 2);
    assert_eq!(query.by_status[&500], 1);
    assert!(query.mean_ms > 0.0);
    assert!(query.p50_ms <= query.p95_ms);
    assert!(query.p95_ms <= query.p99_ms);
}

#[test]
fn test_percentiles_land_in_reasonable_buckets() {
    let metrics = Metrics::new();
    for _ in 0..99 {
        metrics.record("GET", "/r", 200, Duration::from_millis(4), 0, 0);
    }
    metrics.record("GET", "/r", 200, Duration::from_millis(900), 0, 0);

    let snapshot = metrics.snapshot();
    let route = &snapshot.routes["GET /r"];
    assert_eq!(route.p50_ms, 5);
    assert_eq!(route.p99_ms, 1_000);
}

#[test]
fn test_health_report_status() {
    let healthy = HealthReport::from_dependencies(vec![DependencyHealth {
        name: "kb_manager",
        healthy: true,
        detail: None,
    }]);
    assert_eq!(healthy.status, "healthy");

    let degraded = HealthReport::from_dependencies(vec![
        DependencyHealth {
            name: "kb_manager",
            healthy: true,
            detail: None,
        },
        DependencyHealth {
            name: "embedding",
            healthy: false,
            detail: Some("tcp connect failed".into()),
        },
    ]);
    assert_eq!(degraded.status, "degraded");
    assert_eq!(degraded.dependencies[1].name, "embedding");
}

#[tokio::test]
async fn test_tcp_prober_reports_reachable_listener() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let prober = TcpProber::for_api_base(&format!("http://{addr}/v1"));
    let result = prober.probe().await;
    assert!(result.healthy);

    // Second probe within the cache window never re-dials.
    drop(listener);
    let cached = prober.probe().await;
    assert!(cached.healthy);
}

#[tokio::test]
async fn test_tcp_prober_reports_unreachable() {
    // Port 9 on localhost is essentially never listening.
    let prober = TcpProber::for_api_base("http://127.0.0.1:9/v1");
    let result = prober.probe().await;
    assert!(!result.healthy);
    assert!(result.detail.is_some());
}

#[test]
fn test_tail_log() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    use std::io::Write;
    for i in 0..10 {
        writeln!(file, "line {i}").unwrap();
    }

    let lines = tail_log(file.path(), 3).unwrap();
    assert_eq!(lines, vec!["line 7", "line 8", "line 9"]);

    let all = tail_log(file.path(), 100).unwrap();
    assert_eq!(all.len(), 10);
}
