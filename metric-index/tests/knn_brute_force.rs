//! KNN and range results checked against exhaustive scans.

use metric_index::{
    DistanceFunction, EuclideanDistance, MTree, ManhattanDistance, ObjectId, SplitStrategy, TreeConfig,
    VectorDistanceQuery, VectorRelation,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn random_vectors(rng: &mut StdRng, n: usize, dim: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen_range(0.0..100.0)).collect())
        .collect()
}

/// `(distance, id)` pairs of the `k` nearest vectors plus ties at the k-th distance.
fn brute_force_knn<D: DistanceFunction>(
    vectors: &[Vec<f64>],
    function: &D,
    query: &[f64],
    k: usize,
) -> Vec<(f64, ObjectId)> {
    let mut all: Vec<(f64, ObjectId)> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| (function.distance(query, v), i as ObjectId))
        .collect();
    all.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    let Some(&(kth, _)) = all.get(k.min(all.len()).saturating_sub(1)) else {
        return Vec::new();
    };
    all.into_iter().take_while(|(d, _)| *d <= kth).collect()
}

#[test]
fn test_knn_matches_brute_force() {
    init();
    let mut rng = StdRng::seed_from_u64(42);
    let vectors = random_vectors(&mut rng, 10_000, 4);
    let relation = VectorRelation::from_vectors(0, vectors.clone()).unwrap();
    let mut tree =
        MTree::in_memory(VectorDistanceQuery::new(relation, EuclideanDistance), TreeConfig::default())
            .unwrap();
    let ids: Vec<ObjectId> = (0..vectors.len() as ObjectId).collect();
    tree.insert_all(&ids).unwrap();
    tree.integrity_check().unwrap();

    for _ in 0..100 {
        let query: Vec<f64> = (0..4).map(|_| rng.gen_range(0.0..100.0)).collect();
        let expected = brute_force_knn(&vectors, &EuclideanDistance, &query, 10);
        let result = tree.knn(&query, 10).unwrap();
        let found: Vec<(f64, ObjectId)> = result.iter().map(|p| (p.distance, p.id)).collect();
        assert_eq!(found, expected);
    }
    tree.log_statistics().unwrap();
}

#[test]
fn test_every_k_on_small_set() {
    init();
    let mut rng = StdRng::seed_from_u64(7);
    let vectors = random_vectors(&mut rng, 60, 2);
    let relation = VectorRelation::from_vectors(0, vectors.clone()).unwrap();
    let config = TreeConfig::builder()
        .page_size(256)
        .split_strategy(SplitStrategy::BalancedCut)
        .build()
        .unwrap();
    let mut tree = MTree::in_memory(VectorDistanceQuery::new(relation, EuclideanDistance), config).unwrap();
    tree.insert_all(&(0..60).collect::<Vec<ObjectId>>()).unwrap();

    let query = [50.0, 50.0];
    for k in 1..=60 {
        let expected = brute_force_knn(&vectors, &EuclideanDistance, &query, k);
        let found: Vec<(f64, ObjectId)> = tree
            .knn(&query, k)
            .unwrap()
            .iter()
            .map(|p| (p.distance, p.id))
            .collect();
        assert_eq!(found, expected, "k = {}", k);
    }
    // More neighbours than objects returns everything.
    assert_eq!(tree.knn(&query, 100).unwrap().len(), 60);
}

#[test]
fn test_ties_at_kth_distance_are_kept() {
    init();
    // A centre and a ring of eight points at Manhattan distance 1.
    let mut vectors = vec![vec![0.0, 0.0]];
    for (x, y) in [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, -1.0)] {
        vectors.push(vec![x, y]);
    }
    for (x, y) in [(0.5, 0.5), (-0.5, 0.5), (0.5, -0.5), (-0.5, -0.5)] {
        vectors.push(vec![x, y]);
    }
    let relation = VectorRelation::from_vectors(0, vectors).unwrap();
    let mut tree =
        MTree::in_memory(VectorDistanceQuery::new(relation, ManhattanDistance), TreeConfig::default())
            .unwrap();
    tree.insert_all(&(0..9).collect::<Vec<ObjectId>>()).unwrap();

    let result = tree.knn_by_id(0, 3).unwrap();
    assert_eq!(result.len(), 9);
    assert_eq!(result.kth_distance(), 1.0);
    assert_eq!(result.truncate_to_k().len(), 3);
}

#[test]
fn test_range_matches_brute_force() {
    init();
    let mut rng = StdRng::seed_from_u64(3);
    let vectors = random_vectors(&mut rng, 2_000, 3);
    let relation = VectorRelation::from_vectors(0, vectors.clone()).unwrap();
    let config = TreeConfig::builder().page_size(1024).build().unwrap();
    let mut tree = MTree::in_memory(VectorDistanceQuery::new(relation, EuclideanDistance), config).unwrap();
    tree.insert_all(&(0..2_000).collect::<Vec<ObjectId>>()).unwrap();

    for radius in [0.0, 5.0, 12.5, 30.0] {
        for q in [0, 500, 1999] {
            let query = &vectors[q];
            let mut expected: Vec<ObjectId> = vectors
                .iter()
                .enumerate()
                .filter(|(_, v)| EuclideanDistance.distance(query, v) <= radius)
                .map(|(i, _)| i as ObjectId)
                .collect();
            expected.sort_unstable();
            let mut found: Vec<ObjectId> = tree
                .range_by_id(q as ObjectId, radius)
                .unwrap()
                .iter()
                .map(|p| p.id)
                .collect();
            found.sort_unstable();
            assert_eq!(found, expected);
        }
    }
}

#[test]
fn test_batch_knn_matches_single_queries() {
    init();
    let mut rng = StdRng::seed_from_u64(11);
    let vectors = random_vectors(&mut rng, 1_500, 5);
    let relation = VectorRelation::from_vectors(0, vectors).unwrap();
    let config = TreeConfig::builder().page_size(512).build().unwrap();
    let mut tree = MTree::in_memory(VectorDistanceQuery::new(relation, EuclideanDistance), config).unwrap();
    tree.insert_all(&(0..1_500).collect::<Vec<ObjectId>>()).unwrap();

    let queries: Vec<ObjectId> = (0..1_500).step_by(13).collect();
    let batch = tree.batch_knn(&queries, 6).unwrap();
    assert_eq!(batch.len(), queries.len());
    for (&q, result) in queries.iter().zip(&batch) {
        assert_eq!(result, &tree.knn_by_id(q, 6).unwrap());
        assert_eq!(result.iter().next().map(|p| p.id), Some(q));
    }
}
