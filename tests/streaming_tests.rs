//! SSE streaming contract: event sequence, wire format, disconnect behavior.

mod common;

use common::harness::{TestServerConfig, spawn_test_server};

/// Parses a raw SSE body into `(type, data)` pairs.
fn parse_events(raw: &str) -> Vec<(String, serde_json::Value)> {
    raw.split("\n\n")
        .filter_map(|block| {
            let data_line = block.lines().find(|l| l.starts_with("data: "))?;
            let json: serde_json::Value =
                serde_json::from_str(data_line.strip_prefix("data: ")?).ok()?;
            Some((
                json["type"].as_str()?.to_string(),
                json["data"].clone(),
            ))
        })
        .collect()
}

#[tokio::test]
async fn test_stream_event_sequence() {
    let server = spawn_test_server(TestServerConfig {
        canned_answer: Some("one two three four".to_string()),
        ..Default::default()
    })
    .await;

    server
        .post_json(
            "/insert/text",
            serde_json::json!({ "text": "Document text for streaming." }),
        )
        .await;

    let response = server
        .post_json(
            "/query",
            serde_json::json!({ "query": "stream me", "mode": "naive", "stream": true }),
        )
        .await;
    assert_eq!(response.status(), 200);
    assert!(
        response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let raw = response.text().await.unwrap();
    let events = parse_events(&raw);

    // Exactly one metadata event, first.
    assert_eq!(events[0].0, "metadata");
    assert_eq!(events[0].1["mode"], "naive");
    assert_eq!(events[0].1["streaming"], true);
    assert_eq!(events.iter().filter(|(t, _)| t == "metadata").count(), 1);

    // At least one content fragment; concatenation restores the answer.
    let content: String = events
        .iter()
        .filter(|(t, _)| t == "content")
        .map(|(_, d)| d.as_str().unwrap())
        .collect();
    assert_eq!(content, "one two three four");

    // Exactly one terminal event, last, carrying the response time.
    let (last_type, last_data) = events.last().unwrap();
    assert_eq!(last_type, "done");
    assert!(last_data["response_time"].as_f64().unwrap() >= 0.0);
    assert_eq!(
        events
            .iter()
            .filter(|(t, _)| t == "done" || t == "error")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_stream_bypass_mode() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    let response = server
        .post_json(
            "/query",
            serde_json::json!({ "query": "raw payload", "mode": "bypass", "stream": true }),
        )
        .await;
    let raw = response.text().await.unwrap();
    let events = parse_events(&raw);

    assert_eq!(events[0].0, "metadata");
    let content: String = events
        .iter()
        .filter(|(t, _)| t == "content")
        .map(|(_, d)| d.as_str().unwrap())
        .collect();
    assert_eq!(content, "raw payload");
    assert_eq!(events.last().unwrap().0, "done");
}

#[tokio::test]
async fn test_stream_disconnect_leaves_server_healthy() {
    let server = spawn_test_server(TestServerConfig {
        canned_answer: Some("word ".repeat(200)),
        ..Default::default()
    })
    .await;

    server
        .post_json(
            "/insert/text",
            serde_json::json!({ "text": "Document text for streaming." }),
        )
        .await;

    // Open the stream, read only the first chunk, then drop the connection.
    let mut response = server
        .post_json(
            "/query",
            serde_json::json!({ "query": "stream me", "mode": "naive", "stream": true }),
        )
        .await;
    let first = response.chunk().await.unwrap().expect("first chunk arrives");
    let head = String::from_utf8_lossy(&first);
    assert!(head.contains("metadata"));
    drop(response);

    // The server keeps serving; no wedged stream state.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let health = server.get("/health").await;
    assert_eq!(health.status(), 200);

    let follow_up = server
        .post_json(
            "/query",
            serde_json::json!({ "query": "stream me", "mode": "naive" }),
        )
        .await;
    assert_eq!(follow_up.status(), 200);
}

#[tokio::test]
async fn test_non_streaming_has_no_sse_shape() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    server
        .post_json(
            "/insert/text",
            serde_json::json!({ "text": "Plain document." }),
        )
        .await;

    let response = server
        .post_json(
            "/query",
            serde_json::json!({ "query": "plain", "mode": "naive", "stream": false }),
        )
        .await;
    assert!(
        response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("application/json")
    );
}
