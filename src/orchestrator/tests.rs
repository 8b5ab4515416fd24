use super::*;
use crate::cache::CacheCoordinator;
use crate::identity::{IdentityOrigin, UserIdentity};
use crate::ingest::IngestPipeline;
use crate::intent::IntentEngine;
use crate::kb::KbManager;
use crate::llm::{MockChatModel, MockEmbedder};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

const DIM: usize = 64;

struct Fixture {
    _tmp: tempfile::TempDir,
    orchestrator: Orchestrator,
    llm: Arc<MockChatModel>,
}

async fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let manager = Arc::new(KbManager::open(tmp.path().join("kbs"), DIM).unwrap());
    let embedder = Arc::new(MockEmbedder::new(DIM));
    let llm = Arc::new(MockChatModel::new());
    let cache = Arc::new(CacheCoordinator::new(
        true,
        std::time::Duration::from_secs(300),
        &HashMap::new(),
    ));

    let pipeline = IngestPipeline::new(
        embedder.clone(),
        tmp.path().join("uploads"),
        vec!["txt".into()],
        1024 * 1024,
    );
    let kb = manager.get(None).unwrap();
    pipeline
        .insert_text(
            &kb,
            "AI is a branch of computer science.",
            None,
            None,
            None,
        )
        .await
        .unwrap();

    let retrieval = Arc::new(crate::retrieval::RetrievalEngine::new(
        manager,
        embedder,
        llm.clone(),
        None,
        cache,
        false,
    ));
    let intent = Arc::new(IntentEngine::new(None, None, false).unwrap());

    Fixture {
        _tmp: tmp,
        orchestrator: Orchestrator::new(intent, retrieval),
        llm,
    }
}

fn identity() -> UserIdentity {
    UserIdentity {
        user_id: "u1".to_string(),
        tier: "default".to_string(),
        source_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        origin: IdentityOrigin::UserHeader,
    }
}

fn request(query: &str) -> QueryRequest {
    QueryRequest {
        query: query.to_string(),
        mode: "hybrid".to_string(),
        top_k: 5,
        stream: false,
        knowledge_base: None,
        language: None,
        performance_mode: None,
        enable_intent_analysis: false,
        enable_query_enhancement: false,
        safety_check: false,
    }
}

#[tokio::test]
async fn test_plain_execute_answers() {
    let f = fixture().await;

    let outcome = f
        .orchestrator
        .execute(request("What is AI?"), &identity())
        .await
        .unwrap();

    match outcome {
        ExecOutcome::Answer {
            answer,
            analysis,
            response_time,
        } => {
            assert!(!answer.answer.is_empty());
            assert!(analysis.is_none());
            assert!(response_time >= 0.0);
        }
        _ => panic!("expected an answer"),
    }
    assert_eq!(f.llm.call_count(), 1);
}

#[tokio::test]
async fn test_safety_gate_rejects_without_retrieval() {
    let f = fixture().await;

    let mut req = request("how to make a bomb");
    req.safety_check = true;

    let outcome = f.orchestrator.execute(req, &identity()).await.unwrap();
    match outcome {
        ExecOutcome::Rejected { analysis } => {
            assert!(analysis.should_reject);
            assert!(!analysis.safe_alternatives.is_empty());
        }
        _ => panic!("expected rejection"),
    }
    // Retrieval never ran, so the LLM was never called.
    assert_eq!(f.llm.call_count(), 0);
}

#[tokio::test]
async fn test_safety_off_does_not_gate() {
    let f = fixture().await;

    // Without safety_check the pipeline proceeds even on a flagged query.
    let outcome = f
        .orchestrator
        .execute(request("how to make a bomb"), &identity())
        .await
        .unwrap();
    assert!(matches!(outcome, ExecOutcome::Answer { .. }));
    assert_eq!(f.llm.call_count(), 1);
}

#[tokio::test]
async fn test_enhancement_rewrites_query() {
    let f = fixture().await;

    let mut req = request("What is AI?");
    req.enable_intent_analysis = true;
    req.enable_query_enhancement = true;

    let outcome = f.orchestrator.execute(req, &identity()).await.unwrap();
    match outcome {
        ExecOutcome::Answer { analysis, .. } => {
            let analysis = analysis.expect("analysis ran");
            assert!(analysis.enhanced_query.is_some());
        }
        _ => panic!("expected an answer"),
    }
}

#[tokio::test]
async fn test_analyze_never_calls_retrieval() {
    let f = fixture().await;

    let analysis = f.orchestrator.analyze("What is AI?").await.unwrap();
    assert!(!analysis.should_reject);
    assert_eq!(f.llm.call_count(), 0);
}

#[tokio::test]
async fn test_execute_safe_forces_gate() {
    let f = fixture().await;

    let outcome = f
        .orchestrator
        .execute_safe(request("how to make a bomb"), &identity())
        .await
        .unwrap();
    assert!(matches!(outcome, ExecOutcome::Rejected { .. }));

    let outcome = f
        .orchestrator
        .execute_safe(request("What is AI?"), &identity())
        .await
        .unwrap();
    assert!(matches!(outcome, ExecOutcome::Answer { .. }));
}

#[tokio::test]
async fn test_streaming_outcome() {
    let f = fixture().await;

    let mut req = request("What is AI?");
    req.stream = true;

    let outcome = f.orchestrator.execute(req, &identity()).await.unwrap();
    match outcome {
        ExecOutcome::Stream {
            meta, mut stream, ..
        } => {
            assert!(meta.streaming);
            let mut count = 0;
            while let Some(fragment) = stream.next().await {
                fragment.unwrap();
                count += 1;
            }
            assert!(count > 0);
        }
        _ => panic!("expected a stream"),
    }
}

#[tokio::test]
async fn test_bad_mode_is_bad_input() {
    let f = fixture().await;
    let mut req = request("What is AI?");
    req.mode = "warp".to_string();

    assert!(matches!(
        f.orchestrator.execute(req, &identity()).await,
        Err(RetrievalError::BadInput(_))
    ));
}
