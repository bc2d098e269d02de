//! File-backed trees: build, close, reopen, query.

use metric_index::{
    EuclideanDistance, IndexError, MTree, MkAppConfig, MkAppTree, ObjectId, TreeConfig,
    VectorDistanceQuery, VectorRelation,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

type PointQuery = VectorDistanceQuery<EuclideanDistance>;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn points(n: usize, seed: u64) -> PointQuery {
    let mut rng = StdRng::seed_from_u64(seed);
    let vectors = (0..n)
        .map(|_| vec![rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)])
        .collect();
    VectorDistanceQuery::new(
        VectorRelation::from_vectors(0, vectors).unwrap(),
        EuclideanDistance,
    )
}

fn config() -> TreeConfig {
    TreeConfig::builder()
        .page_size(512)
        .cache_pages(16)
        .build()
        .unwrap()
}

#[test]
fn test_reopen_answers_same_queries() {
    init();
    let dir = tempdir().unwrap();
    let path = dir.path().join("points.mtree");
    let ids: Vec<ObjectId> = (0..800).collect();

    let expected: Vec<Vec<ObjectId>> = {
        let mut tree = MTree::create_file(&path, points(800, 5), config()).unwrap();
        tree.insert_all(&ids).unwrap();
        for id in (0..800).step_by(4) {
            assert!(tree.delete(id).unwrap());
        }
        tree.flush().unwrap();
        (0..800)
            .step_by(50)
            .map(|q| tree.knn_by_id(q, 5).unwrap().ids())
            .collect()
    };

    let tree = MTree::open_file(&path, points(800, 5), config()).unwrap();
    assert_eq!(tree.size().unwrap(), 600);
    tree.integrity_check().unwrap();
    for (q, expected) in (0..800).step_by(50).zip(&expected) {
        assert_eq!(&tree.knn_by_id(q, 5).unwrap().ids(), expected);
    }
    assert!(tree.statistics().unwrap().store.page_reads > 0);
}

#[test]
fn test_reopen_keeps_approximations() {
    init();
    let dir = tempdir().unwrap();
    let path = dir.path().join("points.mkapp");
    let mkapp = || MkAppConfig::builder(4).build().unwrap();
    let ids: Vec<ObjectId> = (0..300).collect();

    let expected = {
        let mut tree = MkAppTree::create_file(&path, points(300, 9), config(), mkapp()).unwrap();
        tree.insert_all(&ids).unwrap();
        tree.flush().unwrap();
        tree.reverse_knn(17, 3).unwrap()
    };

    let tree = MkAppTree::open_file(&path, points(300, 9), config(), mkapp()).unwrap();
    assert_eq!(tree.reverse_knn(17, 3).unwrap(), expected);
    tree.integrity_check().unwrap();
}

#[test]
fn test_reopen_with_different_geometry_fails() {
    init();
    let dir = tempdir().unwrap();
    let path = dir.path().join("points.mtree");
    {
        let mut tree = MTree::create_file(&path, points(50, 1), config()).unwrap();
        tree.insert_all(&(0..50).collect::<Vec<ObjectId>>()).unwrap();
        tree.flush().unwrap();
    }

    // Entries carrying approximations need more room, so capacities differ.
    let result = MkAppTree::open_file(
        &path,
        points(50, 1),
        config(),
        MkAppConfig::builder(4).build().unwrap(),
    );
    assert!(matches!(result, Err(IndexError::HeaderMismatch { .. })));

    let looser = TreeConfig::builder()
        .page_size(512)
        .min_fill_ratio(0.2)
        .build()
        .unwrap();
    let result = MTree::open_file(&path, points(50, 1), looser);
    assert!(matches!(result, Err(IndexError::HeaderMismatch { .. })));
}
