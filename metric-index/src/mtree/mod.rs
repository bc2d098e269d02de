//! Metric tree: insertion, splitting, deletion and search over any
//! [`DistanceQuery`](crate::distance::DistanceQuery).

pub mod config;
pub mod metric_index;
#[allow(clippy::module_inception)]
pub mod mtree;
pub(crate) mod split;

pub use config::{SplitStrategy, TreeConfig, TreeConfigBuilder};
pub use metric_index::MetricIndex;
pub use mtree::MTree;

use crate::distance::DistanceQuery;
use crate::query::{DistanceResultPair, KnnList};
use crate::tree::{IndexResult, ObjectId, PageStore, TreeHooks};

impl<Q, S, H> MetricIndex for MTree<Q, S, H>
where
    Q: DistanceQuery,
    S: PageStore,
    H: TreeHooks,
{
    type Object = Q::Object;

    fn knn(&self, object: &Q::Object, k: usize) -> IndexResult<KnnList> {
        MTree::knn(self, object, k)
    }

    fn knn_by_id(&self, object_id: ObjectId, k: usize) -> IndexResult<KnnList> {
        MTree::knn_by_id(self, object_id, k)
    }

    fn range(&self, object: &Q::Object, radius: f64) -> IndexResult<Vec<DistanceResultPair>> {
        MTree::range(self, object, radius)
    }

    fn range_by_id(&self, object_id: ObjectId, radius: f64) -> IndexResult<Vec<DistanceResultPair>> {
        MTree::range_by_id(self, object_id, radius)
    }

    fn size(&self) -> IndexResult<u64> {
        MTree::size(self)
    }

    fn log_statistics(&self) -> IndexResult<()> {
        MTree::log_statistics(self)
    }
}
