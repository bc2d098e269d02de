//! # Metric Index - Page-Backed Metric Trees
//!
//! This crate provides metric index trees over arbitrary distance functions,
//! stored in fixed-size pages that are loaded on demand.
//!
//! ## Features
//!
//! - **Page-Backed Nodes**: In-memory or file-backed stores behind an LRU write-back cache
//! - **M-tree**: Insertion with covering-radius maintenance, node splitting, deletion
//! - **Best-First Search**: KNN (ties at the k-th distance kept) and range queries
//! - **Batched KNN**: Many queries answered in one depth-first traversal
//! - **Reverse KNN**: MkApp tree with polynomial k-distance approximations
//! - **Persistent**: A header records the node geometry; reopening validates it
//!
//! ## Quick Start
//!
//! ```rust
//! use metric_index::{
//!     EuclideanDistance, MTree, MetricIndex, TreeConfig, VectorDistanceQuery, VectorRelation,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let relation = VectorRelation::from_vectors(0, vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![5.0, 5.0]])?;
//! let query = VectorDistanceQuery::new(relation, EuclideanDistance);
//!
//! let mut tree = MTree::in_memory(query, TreeConfig::default())?;
//! tree.insert_all(&[0, 1, 2])?;
//!
//! let nearest = tree.knn(&[0.2, 0.1], 2)?;
//! assert_eq!(nearest.ids(), vec![0, 1]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Reverse KNN
//!
//! ```rust
//! use metric_index::{
//!     EuclideanDistance, MkAppConfig, MkAppTree, TreeConfig, VectorDistanceQuery, VectorRelation,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let vectors = (0..50).map(|i| vec![i as f64, (i % 7) as f64]).collect();
//! let query = VectorDistanceQuery::new(VectorRelation::from_vectors(0, vectors)?, EuclideanDistance);
//!
//! let mut tree = MkAppTree::in_memory(query, TreeConfig::default(), MkAppConfig::builder(4).build()?)?;
//! tree.insert_all(&(0..50u64).collect::<Vec<_>>())?;
//!
//! // Objects having object 10 among their 3 nearest neighbours.
//! let reverse = tree.reverse_knn(10, 3)?;
//! assert!(reverse.iter().any(|pair| pair.id == 10));
//! # Ok(())
//! # }
//! ```

pub mod distance;
pub mod mkapp;
pub mod mtree;
pub mod query;
pub mod tree;

pub use distance::{
    BoundingBox, DistanceFunction, DistanceQuery, EuclideanDistance, HashIdMapping, IdMapping,
    ManhattanDistance, MaximumDistance, RangeIdMapping, SpatialDistanceFunction,
    VectorDistanceQuery, VectorRelation,
};
pub use mkapp::{
    approximate_k_distances, ApproximationAggregation, MkAppConfig, MkAppConfigBuilder, MkAppTree,
    PolynomialApproximation,
};
pub use mtree::{MTree, MetricIndex, SplitStrategy, TreeConfig, TreeConfigBuilder};
pub use query::{BoxBound, DistanceResultPair, KnnHeap, KnnList, SubtreeBound, SubtreeBoxes};
pub use tree::{
    CachedPageStore, FilePageStore, IndexError, IndexResult, MemoryPageStore, ObjectId, PageId,
    PageStore, TreeStatistics,
};
