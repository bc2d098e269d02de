//! MetricIndex trait definition for similarity search.

use crate::query::{DistanceResultPair, KnnList};
use crate::tree::{IndexResult, ObjectId};

/// Read-side operations shared by every metric index.
pub trait MetricIndex: Send + Sync {
    /// The objects the index measures distances between.
    type Object: ?Sized;

    /// The `k` nearest objects to `object`, including ties at the k-th distance.
    fn knn(&self, object: &Self::Object, k: usize) -> IndexResult<KnnList>;

    /// Like [`knn`](Self::knn), for a stored object. The object itself is
    /// part of the result.
    fn knn_by_id(&self, object_id: ObjectId, k: usize) -> IndexResult<KnnList>;

    /// Every object within `radius` of `object`, ascending by distance.
    fn range(&self, object: &Self::Object, radius: f64) -> IndexResult<Vec<DistanceResultPair>>;

    fn range_by_id(&self, object_id: ObjectId, radius: f64) -> IndexResult<Vec<DistanceResultPair>>;

    /// Number of stored objects.
    fn size(&self) -> IndexResult<u64>;

    /// Logs tree shape and query counters at info level.
    fn log_statistics(&self) -> IndexResult<()>;
}
