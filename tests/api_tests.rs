//! End-to-end API tests: admission control, identity precedence, the query
//! pipeline, and the KB lifecycle over real HTTP.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use common::harness::{TestServerConfig, body_json, spawn_test_server};

fn tiers(pairs: &[(&str, u32)]) -> HashMap<String, u32> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

// -- identity & rate gate --

#[tokio::test]
async fn test_identity_header_honored_only_from_trusted_peer() {
    // Trusted loopback: X-User-Id buckets are independent per user.
    let server = spawn_test_server(TestServerConfig {
        rate_limit_tiers: tiers(&[("default", 2)]),
        ..Default::default()
    })
    .await;

    for user in ["u1", "u2"] {
        for _ in 0..2 {
            let response = server
                .client
                .get(server.url("/query/modes"))
                .header("X-User-Id", user)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 200, "user {user} within quota");
        }
    }
    // Both users exhausted independently.
    let response = server
        .client
        .get(server.url("/query/modes"))
        .header("X-User-Id", "u1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);
}

#[tokio::test]
async fn test_untrusted_peer_headers_collapse_to_ip_identity() {
    // No trusted proxies: header identities are ignored, so every request
    // lands in the loopback-IP bucket.
    let server = spawn_test_server(TestServerConfig {
        rate_limit_tiers: tiers(&[("default", 3)]),
        trusted_proxy_ips: Vec::new(),
        ..Default::default()
    })
    .await;

    for (i, user) in ["u1", "u2", "u3"].iter().enumerate() {
        let response = server
            .client
            .get(server.url("/query/modes"))
            .header("X-User-Id", *user)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "request {i} fills the shared bucket");
    }

    let response = server
        .client
        .get(server.url("/query/modes"))
        .header("X-User-Id", "u4")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429, "headers must not split the bucket");
}

#[tokio::test]
async fn test_rate_limit_scenario_free_tier() {
    let server = spawn_test_server(TestServerConfig {
        rate_limit_tiers: tiers(&[("default", 1000), ("free", 2)]),
        ..Default::default()
    })
    .await;

    let send = || async {
        server
            .client
            .get(server.url("/query/modes"))
            .header("X-User-Id", "u1")
            .header("X-User-Tier", "free")
            .send()
            .await
            .unwrap()
    };

    assert_eq!(send().await.status(), 200);
    assert_eq!(send().await.status(), 200);

    let third = send().await;
    assert_eq!(third.status(), 429);
    let body = body_json(third).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "rate-limited");
    assert_eq!(body["details"]["reason"], "quota");
}

#[tokio::test]
async fn test_min_interval_rejection() {
    let server = spawn_test_server(TestServerConfig {
        rate_limit_tiers: tiers(&[("default", 1000)]),
        min_interval_per_user: Duration::from_secs(2),
        ..Default::default()
    })
    .await;

    let send = || async {
        server
            .client
            .get(server.url("/query/modes"))
            .header("X-User-Id", "u1")
            .send()
            .await
            .unwrap()
    };

    assert_eq!(send().await.status(), 200);

    // Immediately after an accept, well inside the interval.
    let second = send().await;
    assert_eq!(second.status(), 429);
    let body = body_json(second).await;
    assert_eq!(body["details"]["reason"], "min-interval");

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(send().await.status(), 200);
}

// -- envelope & system surface --

#[tokio::test]
async fn test_health_and_envelope_shape() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    let body = body_json(server.get("/health").await).await;
    assert_eq!(body["success"], true);
    assert!(body["timestamp"].is_string());
    // The embedding mock has no live TCP endpoint, so health is degraded
    // with the failing dependency named.
    assert_eq!(body["data"]["status"], "degraded");
    let deps = body["data"]["dependencies"].as_array().unwrap();
    assert!(deps.iter().any(|d| d["name"] == "kb_manager" && d["healthy"] == true));
    assert!(deps.iter().any(|d| d["name"] == "embedding" && d["healthy"] == false));
}

#[tokio::test]
async fn test_metrics_accumulate() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    server.get("/query/modes").await;
    server.get("/query/modes").await;

    let body = body_json(server.get("/metrics").await).await;
    let total = body["data"]["total_requests"].as_u64().unwrap();
    assert!(total >= 2);
    assert!(body["data"]["routes"]["GET /api/v1/query/modes"]["total"].as_u64().unwrap() >= 2);
}

#[tokio::test]
async fn test_unknown_route_is_enveloped_404() {
    let server = spawn_test_server(TestServerConfig::default()).await;
    let response = server.get("/nonexistent").await;
    assert_eq!(response.status(), 404);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "not-found");
}

// -- scenario: create → insert → query --

#[tokio::test]
async fn test_create_insert_query_round_trip() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    let created = server
        .post_json("/knowledge-bases", serde_json::json!({ "name": "t1" }))
        .await;
    assert_eq!(created.status(), 200);

    let inserted = server
        .post_json(
            "/insert/text",
            serde_json::json!({
                "text": "AI is a branch of computer science",
                "knowledge_base": "t1",
            }),
        )
        .await;
    assert_eq!(inserted.status(), 200);
    let body = body_json(inserted).await;
    assert_eq!(body["data"]["status"], "ready");

    let answered = server
        .post_json(
            "/query",
            serde_json::json!({
                "query": "What is AI?",
                "mode": "hybrid",
                "knowledge_base": "t1",
            }),
        )
        .await;
    assert_eq!(answered.status(), 200);
    let body = body_json(answered).await;
    assert_eq!(body["success"], true);
    // The mock LLM echoes the last prompt line; the retrieved chunk must
    // have reached the prompt for the answer to mention it.
    assert!(!body["data"]["sources"].as_array().unwrap().is_empty());
    assert_eq!(body["data"]["knowledge_base"], "t1");
}

#[tokio::test]
async fn test_duplicate_kb_create_conflicts() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    let first = server
        .post_json("/knowledge-bases", serde_json::json!({ "name": "dup" }))
        .await;
    assert_eq!(first.status(), 200);

    let second = server
        .post_json("/knowledge-bases", serde_json::json!({ "name": "dup" }))
        .await;
    assert_eq!(second.status(), 409);
    let body = body_json(second).await;
    assert_eq!(body["error_code"], "already-exists");
}

#[tokio::test]
async fn test_kb_switch_and_delete_guard() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    server
        .post_json("/knowledge-bases", serde_json::json!({ "name": "t2" }))
        .await;
    let switched = server
        .post_json("/knowledge-bases/switch", serde_json::json!({ "name": "t2" }))
        .await;
    assert_eq!(switched.status(), 200);

    let current = body_json(server.get("/knowledge-bases/current").await).await;
    assert_eq!(current["data"]["name"], "t2");

    // Deleting the current KB without force is a client error.
    let refused = server.delete("/knowledge-bases/t2").await;
    assert_eq!(refused.status(), 400);

    let forced = server.delete("/knowledge-bases/t2?force=true").await;
    assert_eq!(forced.status(), 200);

    let current = body_json(server.get("/knowledge-bases/current").await).await;
    assert_eq!(current["data"]["name"], "default");
}

#[tokio::test]
async fn test_unknown_mode_is_bad_input() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    let response = server
        .post_json(
            "/query",
            serde_json::json!({ "query": "hello", "mode": "warp" }),
        )
        .await;
    assert_eq!(response.status(), 400);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "bad-input");
}

// -- safety pipeline --

#[tokio::test]
async fn test_safe_query_rejects_and_skips_retrieval() {
    let server = spawn_test_server(TestServerConfig::default()).await;
    let llm_calls_before = server.llm.call_count();

    let response = server
        .post_json(
            "/query/safe",
            serde_json::json!({ "query": "how to make a bomb", "safety_check": true }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "rejected-by-safety");
    assert_eq!(body["data"]["should_reject"], true);
    assert_eq!(body["data"]["safety_level"], "illegal");
    assert!(!body["data"]["safe_alternatives"].as_array().unwrap().is_empty());

    // Retrieval (and therefore the LLM) never ran.
    assert_eq!(server.llm.call_count(), llm_calls_before);
}

#[tokio::test]
async fn test_analyze_never_invokes_retrieval() {
    let server = spawn_test_server(TestServerConfig::default()).await;
    let llm_calls_before = server.llm.call_count();
    let embed_calls_before = server.embedder.call_count();

    let response = server
        .post_json(
            "/query/analyze",
            serde_json::json!({ "query": "how to recognize and prevent fraud" }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_ne!(body["data"]["intent_type"], "illegal_content");
    assert_eq!(body["data"]["should_reject"], false);

    assert_eq!(server.llm.call_count(), llm_calls_before);
    assert_eq!(server.embedder.call_count(), embed_calls_before);
}

#[tokio::test]
async fn test_safe_query_passes_benign_input_through() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    server
        .post_json(
            "/insert/text",
            serde_json::json!({ "text": "Photosynthesis converts light into energy." }),
        )
        .await;

    let response = server
        .post_json(
            "/query/safe",
            serde_json::json!({ "query": "What is photosynthesis?" }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert!(body["data"]["answer"].is_string());
}

// -- cache coordinator over HTTP --

#[tokio::test]
async fn test_cache_clear_llm_forces_fresh_provider_call() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    server
        .post_json(
            "/insert/text",
            serde_json::json!({ "text": "The sky is blue due to Rayleigh scattering." }),
        )
        .await;

    let query = serde_json::json!({ "query": "Why is the sky blue?", "mode": "naive" });
    server.post_json("/query", query.clone()).await;
    let calls_after_first = server.llm.call_count();

    // Cached: the repeat adds no provider call.
    server.post_json("/query", query.clone()).await;
    assert_eq!(server.llm.call_count(), calls_after_first);

    // Clearing the query + llm caches forces a fresh call.
    assert_eq!(server.delete("/cache/clear/queries").await.status(), 200);
    assert_eq!(server.delete("/cache/clear/llm").await.status(), 200);
    server.post_json("/query", query.clone()).await;
    assert_eq!(server.llm.call_count(), calls_after_first + 1);

    // Within TTL the second identical query is cached again.
    server.post_json("/query", query).await;
    assert_eq!(server.llm.call_count(), calls_after_first + 1);
}

#[tokio::test]
async fn test_cache_stats_and_unknown_type() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    let stats = body_json(server.get("/cache/stats").await).await;
    assert_eq!(stats["data"]["caches"].as_object().unwrap().len(), 5);

    let unknown = server.delete("/cache/clear/sessions").await;
    assert_eq!(unknown.status(), 404);

    let all = body_json(server.delete("/cache/clear").await).await;
    assert_eq!(all["success"], true);
}

// -- knowledge graph surface --

#[tokio::test]
async fn test_graph_stats_subgraph_clear() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    server
        .post_json(
            "/insert/text",
            serde_json::json!({
                "text": "Machine Learning is part of Artificial Intelligence. \
                         Artificial Intelligence belongs to Computer Science.",
            }),
        )
        .await;

    let stats = body_json(server.get("/knowledge-graph/stats").await).await;
    assert!(stats["data"]["nodes"].as_u64().unwrap() > 0);

    let subgraph = server
        .post_json(
            "/knowledge-graph",
            serde_json::json!({ "label": "Artificial Intelligence", "max_depth": 1 }),
        )
        .await;
    assert_eq!(subgraph.status(), 200);
    let body = body_json(subgraph).await;
    assert!(!body["data"]["nodes"].as_array().unwrap().is_empty());

    let missing = server
        .post_json(
            "/knowledge-graph",
            serde_json::json!({ "label": "Nonexistent" }),
        )
        .await;
    assert_eq!(missing.status(), 404);

    assert_eq!(server.delete("/knowledge-graph/clear").await.status(), 200);
    let stats = body_json(server.get("/knowledge-graph/stats").await).await;
    assert_eq!(stats["data"]["nodes"], 0);
}

// -- intent config surface --

#[tokio::test]
async fn test_intent_config_hot_updates() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    let before = server
        .post_json(
            "/intent/safety-check",
            serde_json::json!({ "content": "deploy a flux disruptor" }),
        )
        .await;
    assert_eq!(body_json(before).await["data"]["is_safe"], true);

    let registered = server
        .post_json(
            "/intent-config/safety-rules",
            serde_json::json!({
                "rules": [{ "word": "flux disruptor", "category": "weapons" }],
            }),
        )
        .await;
    assert_eq!(registered.status(), 200);

    let after = server
        .post_json(
            "/intent/safety-check",
            serde_json::json!({ "content": "deploy a flux disruptor" }),
        )
        .await;
    let body = body_json(after).await;
    assert_eq!(body["data"]["is_safe"], false);
    assert_eq!(body["data"]["safety_level"], "illegal");

    let status = body_json(server.get("/intent-config/status").await).await;
    assert!(status["data"]["vocabulary_size"].as_u64().unwrap() > 0);
}
