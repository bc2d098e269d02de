//! Reverse-kNN results checked against exhaustive k-distance computation.

use metric_index::{
    ApproximationAggregation, DistanceQuery, EuclideanDistance, IndexError, ManhattanDistance,
    MkAppConfig, MkAppTree, ObjectId, TreeConfig, VectorDistanceQuery, VectorRelation,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// k-distances `1..=k_max` of every object, the object itself excluded.
fn k_distances<Q: DistanceQuery>(query: &Q, n: usize, k_max: usize) -> Vec<Vec<f64>> {
    (0..n as ObjectId)
        .map(|p| {
            let mut distances: Vec<f64> = (0..n as ObjectId)
                .filter(|&o| o != p)
                .map(|o| query.distance_by_id(p, o).unwrap())
                .collect();
            distances.sort_by(f64::total_cmp);
            distances.truncate(k_max);
            distances
        })
        .collect()
}

/// Objects `p` with `d(p, q) <= kdist_k(p)`; `q` itself always qualifies.
fn brute_force_reverse_knn<Q: DistanceQuery>(
    query: &Q,
    kdists: &[Vec<f64>],
    q: ObjectId,
    k: usize,
) -> Vec<ObjectId> {
    (0..kdists.len() as ObjectId)
        .filter(|&p| p == q || query.distance_by_id(p, q).unwrap() <= kdists[p as usize][k - 1])
        .collect()
}

#[test]
fn test_reverse_knn_is_superset_of_exact_result() {
    init();
    let n = 500;
    let k_max = 5;
    let mut rng = StdRng::seed_from_u64(1234);
    let vectors: Vec<Vec<f64>> = (0..n)
        .map(|_| (0..3).map(|_| rng.gen_range(-10.0..10.0)).collect())
        .collect();
    let query = VectorDistanceQuery::new(
        VectorRelation::from_vectors(0, vectors).unwrap(),
        EuclideanDistance,
    );
    let config = MkAppConfig::builder(k_max).build().unwrap();
    let tree_config = TreeConfig::builder().page_size(1024).build().unwrap();
    let mut tree = MkAppTree::in_memory(query, tree_config, config).unwrap();
    tree.insert_all(&(0..n as ObjectId).collect::<Vec<ObjectId>>())
        .unwrap();
    tree.integrity_check().unwrap();

    let kdists = k_distances(tree.mtree().query(), n, k_max);
    for q in 0..n as ObjectId {
        let found: Vec<ObjectId> = tree.reverse_knn(q, k_max).unwrap().iter().map(|p| p.id).collect();
        for p in brute_force_reverse_knn(tree.mtree().query(), &kdists, q, k_max) {
            assert!(found.contains(&p), "q {}: {} missing", q, p);
        }
    }
    for q in (0..n as ObjectId).step_by(17) {
        for k in 1..k_max {
            let found: Vec<ObjectId> = tree.reverse_knn(q, k).unwrap().iter().map(|p| p.id).collect();
            for p in brute_force_reverse_knn(tree.mtree().query(), &kdists, q, k) {
                assert!(found.contains(&p), "q {} k {}: {} missing", q, k, p);
            }
        }
    }
    tree.log_statistics().unwrap();
}

#[test]
fn test_constant_k_distances_give_exact_result() {
    init();
    // 20 clusters of 6 points; within a cluster every Manhattan distance is
    // exactly 1, across clusters at least 98. Every k-distance curve is the
    // constant 1, which both the fit and the mean reproduce exactly.
    let clusters = 20;
    let mut vectors = Vec::new();
    for c in 0..clusters {
        for i in 1..=6 {
            let mut v = vec![0.0; 7];
            v[0] = 100.0 * c as f64;
            v[i] = 0.5;
            vectors.push(v);
        }
    }
    let n = vectors.len();
    let query = VectorDistanceQuery::new(
        VectorRelation::from_vectors(0, vectors).unwrap(),
        ManhattanDistance,
    );
    let config = MkAppConfig::builder(5)
        .aggregation(ApproximationAggregation::Mean)
        .conservative_fit(false)
        .build()
        .unwrap();
    let tree_config = TreeConfig::builder().page_size(512).build().unwrap();
    let mut tree = MkAppTree::in_memory(query, tree_config, config).unwrap();
    tree.insert_all(&(0..n as ObjectId).collect::<Vec<ObjectId>>())
        .unwrap();
    assert!(tree.mtree().height().unwrap() >= 2);

    let kdists = k_distances(tree.mtree().query(), n, 5);
    for q in 0..n as ObjectId {
        for k in 1..=5 {
            let found: Vec<ObjectId> = {
                let mut ids: Vec<ObjectId> =
                    tree.reverse_knn(q, k).unwrap().iter().map(|p| p.id).collect();
                ids.sort_unstable();
                ids
            };
            assert_eq!(found, brute_force_reverse_knn(tree.mtree().query(), &kdists, q, k));
            assert_eq!(found.len(), 6);
        }
    }
}

#[test]
fn test_reverse_knn_results_sorted_and_include_query() {
    init();
    let vectors: Vec<Vec<f64>> = (0..40).map(|i| vec![(i * i % 37) as f64]).collect();
    let query = VectorDistanceQuery::new(
        VectorRelation::from_vectors(0, vectors).unwrap(),
        EuclideanDistance,
    );
    let mut tree = MkAppTree::in_memory(
        query,
        TreeConfig::default(),
        MkAppConfig::builder(3).build().unwrap(),
    )
    .unwrap();
    tree.insert_all(&(0..40).collect::<Vec<ObjectId>>()).unwrap();

    let result = tree.reverse_knn(5, 2).unwrap();
    assert_eq!(result.first().map(|p| (p.distance, p.id)), Some((0.0, 5)));
    assert!(result.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_k_above_k_max_is_rejected() {
    init();
    let vectors = (0..10).map(|i| vec![i as f64]).collect();
    let query = VectorDistanceQuery::new(
        VectorRelation::from_vectors(0, vectors).unwrap(),
        EuclideanDistance,
    );
    let mut tree = MkAppTree::in_memory(
        query,
        TreeConfig::default(),
        MkAppConfig::builder(2).build().unwrap(),
    )
    .unwrap();
    tree.insert_all(&(0..10).collect::<Vec<ObjectId>>()).unwrap();

    assert!(matches!(
        tree.reverse_knn(0, 3),
        Err(IndexError::KTooLarge { k: 3, k_max: 2 })
    ));
    assert!(matches!(tree.insert(3), Err(IndexError::Unsupported(_))));
    // Plain KNN still works through the underlying tree.
    assert_eq!(tree.mtree().knn_by_id(0, 1).unwrap().ids(), vec![0]);
}
