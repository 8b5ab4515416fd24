use super::*;
use crate::kb::{KbConfig, KbManager};
use crate::llm::MockEmbedder;

const DIM: usize = 64;

struct Fixture {
    _tmp: tempfile::TempDir,
    manager: KbManager,
    pipeline: IngestPipeline,
    embedder: Arc<MockEmbedder>,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let manager = KbManager::open(tmp.path().join("kbs"), DIM).unwrap();
    let embedder = Arc::new(MockEmbedder::new(DIM));
    let pipeline = IngestPipeline::new(
        embedder.clone(),
        tmp.path().join("uploads"),
        vec!["txt".into(), "md".into()],
        1024 * 1024,
    );
    Fixture {
        _tmp: tmp,
        manager,
        pipeline,
        embedder,
    }
}

#[tokio::test]
async fn test_insert_text_full_lifecycle() {
    let f = fixture();
    let kb = f.manager.get(None).unwrap();

    let outcome = f
        .pipeline
        .insert_text(
            &kb,
            "AI is a branch of computer science. Computer Science studies computation.",
            None,
            Some("track-1".into()),
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, DocStatus::Ready);
    assert_eq!(outcome.track_id, "track-1");
    assert!(outcome.chunk_count >= 1);

    let record = f.pipeline.doc_status(&kb, &outcome.doc_id).unwrap();
    assert_eq!(record.status, DocStatus::Ready);
    assert_eq!(record.chunk_count, outcome.chunk_count);

    // Vector, chunk KV, and full-doc KV all populated consistently.
    assert_eq!(kb.with_vector(|v| v.len()).unwrap(), outcome.chunk_count);
    assert_eq!(kb.with_chunks(|c| c.len()).unwrap(), outcome.chunk_count);
    assert_eq!(kb.with_docs(|d| d.len()).unwrap(), 1);

    // The co-occurrence pass found the capitalized entity.
    let stats = kb.with_graph(|g| g.stats()).unwrap();
    assert!(stats.nodes > 0);
}

#[tokio::test]
async fn test_insert_text_rejects_empty() {
    let f = fixture();
    let kb = f.manager.get(None).unwrap();

    let err = f
        .pipeline
        .insert_text(&kb, "   ", None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::BadInput(_)));
}

#[tokio::test]
async fn test_failed_embed_marks_failed_and_leaves_no_chunks() {
    let f = fixture();
    let kb = f.manager.get(None).unwrap();

    f.embedder.set_failing(true);
    let err = f
        .pipeline
        .insert_text(&kb, "some document text", Some("doc-x".into()), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Embedding(_)));

    let record = f.pipeline.doc_status(&kb, "doc-x").unwrap();
    assert_eq!(record.status, DocStatus::Failed);
    assert!(record.error.is_some());

    // No half-ingested state.
    assert_eq!(kb.with_vector(|v| v.len()).unwrap(), 0);
    assert_eq!(kb.with_chunks(|c| c.len()).unwrap(), 0);
    assert_eq!(kb.with_docs(|d| d.len()).unwrap(), 0);

    // The same document ingests cleanly once the service recovers.
    f.embedder.set_failing(false);
    let outcome = f
        .pipeline
        .insert_text(&kb, "some document text", Some("doc-x".into()), None, None)
        .await
        .unwrap();
    assert_eq!(outcome.status, DocStatus::Ready);
}

#[tokio::test]
async fn test_insert_texts_independent_outcomes() {
    let f = fixture();
    let kb = f.manager.get(None).unwrap();

    let outcomes = f
        .pipeline
        .insert_texts(
            &kb,
            &["first document".into(), "".into(), "third document".into()],
            None,
        )
        .await;

    assert!(outcomes[0].is_ok());
    assert!(outcomes[1].is_err());
    assert!(outcomes[2].is_ok());
    assert_eq!(kb.with_docs(|d| d.len()).unwrap(), 2);
}

#[tokio::test]
async fn test_insert_file_allowed_types_and_upload_persistence() {
    let f = fixture();
    let kb = f.manager.get(None).unwrap();

    let outcome = f
        .pipeline
        .insert_file(&kb, "notes.txt", b"file body text", None)
        .await
        .unwrap();
    assert_eq!(outcome.status, DocStatus::Ready);

    let err = f
        .pipeline
        .insert_file(&kb, "binary.exe", b"MZ", None)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::DisallowedType(ext) if ext == "exe"));

    let uploads: Vec<_> = std::fs::read_dir(f._tmp.path().join("uploads"))
        .unwrap()
        .flatten()
        .collect();
    assert_eq!(uploads.len(), 1);
}

#[tokio::test]
async fn test_insert_file_size_limit() {
    let f = fixture();
    let kb = f.manager.get(None).unwrap();

    let oversized = vec![b'x'; 2 * 1024 * 1024];
    let err = f
        .pipeline
        .insert_file(&kb, "big.txt", &oversized, None)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::BadInput(_)));
}

#[tokio::test]
async fn test_insert_directory_filters_and_walks() {
    let f = fixture();
    let kb = f.manager.get(None).unwrap();

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "alpha document").unwrap();
    std::fs::write(dir.path().join("b.md"), "beta document").unwrap();
    std::fs::write(dir.path().join("c.bin"), [0u8, 1, 2]).unwrap();
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    std::fs::write(dir.path().join("nested/d.txt"), "delta document").unwrap();

    let outcomes = f
        .pipeline
        .insert_directory(&kb, dir.path(), None)
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert_eq!(kb.with_docs(|d| d.len()).unwrap(), 3);
}

#[tokio::test]
async fn test_graph_skipped_when_auto_update_off() {
    let f = fixture();
    f.manager
        .create("manual", String::new(), "en".into(), KbConfig {
            auto_update: false,
            ..Default::default()
        })
        .await
        .unwrap();
    let kb = f.manager.get(Some("manual")).unwrap();

    f.pipeline
        .insert_text(&kb, "Machine Learning is part of Computer Science.", None, None, None)
        .await
        .unwrap();

    assert_eq!(kb.with_graph(|g| g.stats()).unwrap().nodes, 0);
    assert!(kb.with_vector(|v| v.len()).unwrap() > 0);
}
