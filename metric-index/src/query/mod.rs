//! Similarity search over index trees: the bounded KNN heap, best-first
//! single-query search, the batched variant and box bounds for vector data.

pub mod batch;
pub mod knn_heap;
pub mod search;
pub mod spatial;

pub use batch::batch_knn;
pub use knn_heap::{DistanceResultPair, KnnHeap, KnnList};
pub use search::{
    best_first, best_first_bounded, knn_search, knn_search_bounded, range_search,
    range_search_bounded, CoveringRadiusBound, RangeCollector, SearchCollector, SubtreeBound,
};
pub use spatial::{BoxBound, SubtreeBoxes};
