use super::*;

fn unit(dim: usize, hot: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[hot] = 1.0;
    v
}

fn meta(id: &str, doc: &str) -> ChunkMeta {
    ChunkMeta {
        id: id.to_string(),
        doc_id: doc.to_string(),
        start: 0,
        end: 10,
    }
}

#[test]
fn test_insert_and_top_k() {
    let tmp = tempfile::tempdir().unwrap();
    let mut index = VectorIndex::open(tmp.path(), 4).unwrap();

    index
        .insert(
            vec![meta("d1-0", "d1"), meta("d1-1", "d1"), meta("d2-0", "d2")],
            &[unit(4, 0), unit(4, 1), unit(4, 2)],
        )
        .unwrap();

    let hits = index.top_k(&unit(4, 1), 2).unwrap();
    assert_eq!(hits[0].chunk.id, "d1-1");
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert_eq!(hits.len(), 2);
}

#[test]
fn test_dimension_mismatch_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let mut index = VectorIndex::open(tmp.path(), 4).unwrap();

    let err = index
        .insert(vec![meta("c", "d")], &[vec![1.0, 0.0]])
        .unwrap_err();
    assert!(matches!(err, VectorError::Dimension(_)));

    let err = index.top_k(&[1.0, 0.0], 1).unwrap_err();
    assert!(matches!(err, VectorError::Dimension(_)));
}

#[test]
fn test_remove_doc_compacts_matrix() {
    let tmp = tempfile::tempdir().unwrap();
    let mut index = VectorIndex::open(tmp.path(), 4).unwrap();
    index
        .insert(
            vec![meta("d1-0", "d1"), meta("d2-0", "d2"), meta("d1-1", "d1")],
            &[unit(4, 0), unit(4, 1), unit(4, 2)],
        )
        .unwrap();

    assert_eq!(index.remove_doc("d1").unwrap(), 2);
    assert_eq!(index.len(), 1);

    let hits = index.top_k(&unit(4, 1), 3).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.id, "d2-0");
    assert_eq!(index.remove_doc("d1").unwrap(), 0);
}

#[test]
fn test_reopen_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let mut index = VectorIndex::open(tmp.path(), 4).unwrap();
        index
            .insert(vec![meta("d1-0", "d1")], &[unit(4, 3)])
            .unwrap();
    }

    let index = VectorIndex::open(tmp.path(), 4).unwrap();
    assert_eq!(index.len(), 1);
    let hits = index.top_k(&unit(4, 3), 1).unwrap();
    assert_eq!(hits[0].chunk.doc_id, "d1");
}

#[test]
fn test_corrupt_vector_file_detected() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let mut index = VectorIndex::open(tmp.path(), 4).unwrap();
        index
            .insert(vec![meta("d1-0", "d1")], &[unit(4, 0)])
            .unwrap();
    }
    std::fs::write(tmp.path().join("vectors.bin"), b"short").unwrap();

    let err = VectorIndex::open(tmp.path(), 4).unwrap_err();
    assert!(matches!(err, VectorError::Corrupt { .. }));
}

#[test]
fn test_clear() {
    let tmp = tempfile::tempdir().unwrap();
    let mut index = VectorIndex::open(tmp.path(), 4).unwrap();
    index
        .insert(vec![meta("d1-0", "d1")], &[unit(4, 0)])
        .unwrap();

    assert_eq!(index.clear().unwrap(), 1);
    assert!(index.is_empty());
    assert_eq!(index.doc_counts().len(), 0);
}
