//! Fixed-QA subsystem over real HTTP: CRUD, import, concurrency races.

mod common;

use common::harness::{TestServerConfig, body_json, spawn_test_server};

#[tokio::test]
async fn test_qa_pair_crud() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    let created = server
        .post_json(
            "/qa/pairs",
            serde_json::json!({
                "question": "What is Rust?",
                "answer": "A systems programming language.",
                "category": "tech",
                "confidence": 0.95,
            }),
        )
        .await;
    assert_eq!(created.status(), 200);
    let id = body_json(created).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let fetched = body_json(server.get(&format!("/qa/pairs/{id}")).await).await;
    assert_eq!(fetched["data"]["question"], "What is Rust?");

    let updated = server
        .client
        .put(server.url(&format!("/qa/pairs/{id}")))
        .json(&serde_json::json!({ "answer": "A fast, memory-safe language." }))
        .send()
        .await
        .unwrap();
    assert_eq!(updated.status(), 200);

    let listed = body_json(server.get("/qa/pairs?category=tech").await).await;
    assert_eq!(listed["data"]["total"], 1);

    let deleted = server.delete(&format!("/qa/pairs/{id}")).await;
    assert_eq!(deleted.status(), 200);

    let gone = server.get(&format!("/qa/pairs/{id}")).await;
    assert_eq!(gone.status(), 404);
}

#[tokio::test]
async fn test_qa_validation_errors() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    let empty_question = server
        .post_json(
            "/qa/pairs",
            serde_json::json!({ "question": " ", "answer": "a", "category": "c" }),
        )
        .await;
    assert_eq!(empty_question.status(), 400);

    let bad_confidence = server
        .post_json(
            "/qa/pairs",
            serde_json::json!({
                "question": "q",
                "answer": "a",
                "category": "c",
                "confidence": 1.5,
            }),
        )
        .await;
    assert_eq!(bad_confidence.status(), 400);
    let body = body_json(bad_confidence).await;
    assert_eq!(body["error_code"], "bad-input");
}

#[tokio::test]
async fn test_qa_query_scenario() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    // Scenario: CSV import, then a loosened-similarity query.
    let csv = "question,answer,category,confidence,keywords,source\n\
               \"What is AI?\",\"Artificial intelligence.\",tech,0.95,\"AI\",doc\n";
    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(csv.as_bytes().to_vec()).file_name("qa.csv"),
    );
    let imported = server
        .client
        .post(server.url("/qa/import"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(imported.status(), 200);
    let report = body_json(imported).await;
    assert_eq!(report["data"]["processed"], 1);
    assert_eq!(report["data"]["succeeded"], 1);

    let queried = server
        .post_json(
            "/qa/query",
            serde_json::json!({ "question": "AI?", "top_k": 1, "min_similarity": 0.7 }),
        )
        .await;
    assert_eq!(queried.status(), 200);
    let body = body_json(queried).await;
    assert_eq!(body["data"]["found"], true);
    assert!(body["data"]["similarity"].as_f64().unwrap() >= 0.7);
    assert!(
        body["data"]["answer"]
            .as_str()
            .unwrap()
            .starts_with("Artificial intelligence")
    );
}

#[tokio::test]
async fn test_qa_import_duplicate_handling() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    let csv = "question,answer,category\n\"What is AI?\",\"First answer.\",tech\n";
    let import = |overwrite: bool| {
        let csv = csv.to_string();
        let client = server.client.clone();
        let url = server.url("/qa/import");
        async move {
            let mut form = reqwest::multipart::Form::new().part(
                "file",
                reqwest::multipart::Part::bytes(csv.into_bytes()).file_name("qa.csv"),
            );
            form = form.text("overwrite_existing", if overwrite { "true" } else { "false" });
            client.post(url).multipart(form).send().await.unwrap()
        }
    };

    let first = body_json(import(false).await).await;
    assert_eq!(first["data"]["succeeded"], 1);

    let second = body_json(import(false).await).await;
    assert_eq!(second["data"]["duplicate_skipped"], 1);
    assert_eq!(second["data"]["succeeded"], 0);

    let third = body_json(import(true).await).await;
    assert_eq!(third["data"]["succeeded"], 1);

    let stats = body_json(server.get("/qa/statistics").await).await;
    assert_eq!(stats["data"]["total_pairs"], 1);
}

#[tokio::test]
async fn test_qa_batch_add_and_batch_query() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    let added = server
        .post_json(
            "/qa/pairs/batch",
            serde_json::json!({
                "pairs": [
                    { "question": "What is AI?", "answer": "a1", "category": "tech" },
                    { "question": "bad", "answer": "a2", "category": "tech", "confidence": 7.0 },
                    { "question": "How do plants grow?", "answer": "a3", "category": "nature" },
                ],
            }),
        )
        .await;
    let body = body_json(added).await;
    assert_eq!(body["data"]["succeeded"], 2);
    assert_eq!(body["data"]["failed"], 1);

    let queried = server
        .post_json(
            "/qa/query/batch",
            serde_json::json!({
                "questions": [
                    { "question": "What is AI?", "top_k": 1, "min_similarity": 0.7 },
                    { "question": "plants growing", "top_k": 1, "min_similarity": 0.3 },
                ],
            }),
        )
        .await;
    let body = body_json(queried).await;
    let results = body["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["result"]["found"], true);
}

#[tokio::test]
async fn test_qa_category_isolation_under_concurrency() {
    let server = std::sync::Arc::new(spawn_test_server(TestServerConfig::default()).await);

    let mut tasks = Vec::new();
    for (category, count) in [("cat-a", 100), ("cat-b", 100)] {
        for i in 0..count {
            let server = server.clone();
            tasks.push(tokio::spawn(async move {
                let response = server
                    .post_json(
                        "/qa/pairs",
                        serde_json::json!({
                            "question": format!("{category} question number {i}"),
                            "answer": "a",
                            "category": category,
                        }),
                    )
                    .await;
                assert_eq!(response.status(), 200);
            }));
        }
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stats = body_json(server.get("/qa/statistics").await).await;
    assert_eq!(stats["data"]["total_pairs"], 200);
    assert_eq!(stats["data"]["categories"]["cat-a"], 100);
    assert_eq!(stats["data"]["categories"]["cat-b"], 100);
}

#[tokio::test]
async fn test_qa_category_delete_races_add() {
    let server = std::sync::Arc::new(spawn_test_server(TestServerConfig::default()).await);

    let mut tasks = Vec::new();
    for i in 0..4 {
        let server = server.clone();
        tasks.push(tokio::spawn(async move {
            let response = server
                .post_json(
                    "/qa/pairs",
                    serde_json::json!({
                        "question": format!("race question {i}"),
                        "answer": "a",
                        "category": "X",
                    }),
                )
                .await;
            (true, response.status().as_u16())
        }));
    }
    for _ in 0..4 {
        let server = server.clone();
        tasks.push(tokio::spawn(async move {
            let response = server.delete("/qa/categories/X").await;
            (false, response.status().as_u16())
        }));
    }

    let mut successful_adds = 0;
    for task in tasks {
        let (was_add, status) = task.await.unwrap();
        if was_add && status == 200 {
            successful_adds += 1;
        }
    }

    // Post-condition: statistics agree with the surviving set — either the
    // category is gone, or it holds a subset of the successful adds.
    let stats = body_json(server.get("/qa/statistics").await).await;
    match stats["data"]["categories"].get("X") {
        Some(count) => {
            let count = count.as_u64().unwrap();
            assert!(count <= successful_adds, "{count} pairs but {successful_adds} adds");
            assert!(count > 0);
        }
        None => {
            // Deleted state: no pairs observable anywhere.
            assert_eq!(
                stats["data"]["categories"]
                    .as_object()
                    .unwrap()
                    .contains_key("X"),
                false
            );
        }
    }
}

#[tokio::test]
async fn test_qa_delete_category_round_trip() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    let created = server
        .post_json(
            "/qa/pairs",
            serde_json::json!({ "question": "q1", "answer": "a1", "category": "doomed" }),
        )
        .await;
    let id = body_json(created).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let deleted = body_json(server.delete("/qa/categories/doomed").await).await;
    assert_eq!(deleted["data"]["deleted_count"], 1);
    assert_eq!(deleted["data"]["folder_deleted"], true);

    assert_eq!(server.get(&format!("/qa/pairs/{id}")).await.status(), 404);

    // Second delete: nothing left on disk.
    let again = body_json(server.delete("/qa/categories/doomed").await).await;
    assert_eq!(again["data"]["deleted_count"], 0);
    assert_eq!(again["data"]["folder_deleted"], false);
}

#[tokio::test]
async fn test_qa_export_json_and_csv() {
    let server = spawn_test_server(TestServerConfig::default()).await;

    server
        .post_json(
            "/qa/pairs",
            serde_json::json!({ "question": "q", "answer": "a", "category": "c" }),
        )
        .await;

    let json_export = body_json(server.get("/qa/export").await).await;
    assert_eq!(json_export["data"]["pairs"].as_array().unwrap().len(), 1);

    let csv_export = server.get("/qa/export?format=csv").await;
    assert_eq!(csv_export.status(), 200);
    let text = csv_export.text().await.unwrap();
    assert!(text.starts_with("question,answer,category"));

    let categories = body_json(server.get("/qa/categories").await).await;
    assert_eq!(categories["data"]["categories"]["c"], 1);
}
