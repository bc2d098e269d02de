//! Best-first branch-and-bound traversal.
//!
//! Candidates sit in a min-priority queue keyed by a lower bound on the
//! distance between the query and anything below them. The traversal pops
//! the smallest bound, stops once that bound exceeds the collector's
//! threshold, and otherwise expands the node: leaf objects are measured
//! exactly and handed to the collector, subtrees whose bound still passes
//! are queued.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use super::knn_heap::{DistanceResultPair, KnnHeap, KnnList};
use crate::tree::{
    DirectoryEntry, Entry, IndexResult, IndexTree, LeafEntry, ObjectId, PageId, PageStore,
    ROOT_PAGE_ID,
};

/// Receives leaf objects and decides how far the search may reach.
pub trait SearchCollector {
    /// Bound past which no queued candidate can contribute. Popping a
    /// candidate above it ends the search.
    fn global_threshold(&self) -> f64;

    /// Bound an individual entry must pass to be descended into or collected.
    fn entry_threshold(&self, _entry: &Entry) -> IndexResult<f64> {
        Ok(self.global_threshold())
    }

    /// Accepts a leaf object whose exact distance passed its threshold.
    fn collect(&mut self, distance: f64, entry: &LeafEntry);
}

impl SearchCollector for KnnHeap {
    fn global_threshold(&self) -> f64 {
        self.kth_distance()
    }

    fn collect(&mut self, distance: f64, entry: &LeafEntry) {
        self.insert(distance, entry.object_id);
    }
}

/// Collects every object within a fixed radius.
#[derive(Debug, Clone)]
pub struct RangeCollector {
    radius: f64,
    results: Vec<DistanceResultPair>,
}

impl RangeCollector {
    pub fn new(radius: f64) -> Self {
        Self {
            radius,
            results: Vec::new(),
        }
    }

    /// Results in ascending `(distance, id)` order.
    pub fn finalize(mut self) -> Vec<DistanceResultPair> {
        self.results.sort_unstable();
        self.results
    }
}

impl SearchCollector for RangeCollector {
    fn global_threshold(&self) -> f64 {
        self.radius
    }

    fn collect(&mut self, distance: f64, entry: &LeafEntry) {
        self.results
            .push(DistanceResultPair::new(distance, entry.object_id));
    }
}

/// Lower bound on the query distance to anything below a directory entry.
pub trait SubtreeBound {
    /// `distance` is the query distance to the entry's routing object.
    fn lower_bound(&self, entry: &DirectoryEntry, distance: f64) -> f64;
}

/// The metric ball bound `max(0, d - covering_radius)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoveringRadiusBound;

impl SubtreeBound for CoveringRadiusBound {
    fn lower_bound(&self, entry: &DirectoryEntry, distance: f64) -> f64 {
        (distance - entry.covering_radius).max(0.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    bound: f64,
    page_id: PageId,
    /// Query distance to the routing object of the node behind `page_id`;
    /// `None` for the root.
    routing_distance: Option<f64>,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bound
            .total_cmp(&other.bound)
            .then_with(|| self.page_id.cmp(&other.page_id))
    }
}

/// Lower bound on the query distance to anything below `entry`, derived
/// from the parent's routing distance alone (no new distance computation).
pub(crate) fn parent_distance_bound(routing_distance: Option<f64>, entry: &Entry) -> f64 {
    match routing_distance {
        Some(d) => (d - entry.parent_distance()).abs() - entry.covering_radius(),
        None => 0.0,
    }
}

/// Runs a best-first search over `tree`. `distance_to(id)` measures the
/// query against a stored object.
pub fn best_first<S, F, C>(tree: &IndexTree<S>, distance_to: &F, collector: &mut C) -> IndexResult<()>
where
    S: PageStore,
    F: Fn(ObjectId) -> IndexResult<f64>,
    C: SearchCollector,
{
    best_first_bounded(tree, distance_to, &CoveringRadiusBound, collector)
}

/// [`best_first`] with subtree bounds supplied by `bound`.
pub fn best_first_bounded<S, F, B, C>(
    tree: &IndexTree<S>,
    distance_to: &F,
    bound: &B,
    collector: &mut C,
) -> IndexResult<()>
where
    S: PageStore,
    F: Fn(ObjectId) -> IndexResult<f64>,
    B: SubtreeBound,
    C: SearchCollector,
{
    let mut queue = BinaryHeap::new();
    queue.push(Reverse(Candidate {
        bound: 0.0,
        page_id: ROOT_PAGE_ID,
        routing_distance: None,
    }));

    while let Some(Reverse(candidate)) = queue.pop() {
        if candidate.bound > collector.global_threshold() {
            break;
        }
        let node = tree.get_node(candidate.page_id)?;
        for entry in node.entries() {
            let threshold = collector.entry_threshold(entry)?;
            if parent_distance_bound(candidate.routing_distance, entry) > threshold {
                continue;
            }
            let distance = distance_to(entry.object_id()?)?;
            match entry {
                Entry::Leaf(leaf) => {
                    if distance <= threshold {
                        collector.collect(distance, leaf);
                    }
                }
                Entry::Directory(directory) => {
                    let lower = bound.lower_bound(directory, distance);
                    if lower <= threshold {
                        queue.push(Reverse(Candidate {
                            bound: lower,
                            page_id: directory.child_page_id,
                            routing_distance: Some(distance),
                        }));
                    }
                }
            }
        }
    }
    Ok(())
}

/// The `k` nearest objects, plus any ties at the k-th distance.
pub fn knn_search<S, F>(tree: &IndexTree<S>, k: usize, distance_to: F) -> IndexResult<KnnList>
where
    S: PageStore,
    F: Fn(ObjectId) -> IndexResult<f64>,
{
    knn_search_bounded(tree, k, distance_to, &CoveringRadiusBound)
}

pub fn knn_search_bounded<S, F, B>(
    tree: &IndexTree<S>,
    k: usize,
    distance_to: F,
    bound: &B,
) -> IndexResult<KnnList>
where
    S: PageStore,
    F: Fn(ObjectId) -> IndexResult<f64>,
    B: SubtreeBound,
{
    let mut heap = KnnHeap::new(k);
    best_first_bounded(tree, &distance_to, bound, &mut heap)?;
    Ok(heap.finalize())
}

/// Every object within `radius`, ascending by distance.
pub fn range_search<S, F>(
    tree: &IndexTree<S>,
    radius: f64,
    distance_to: F,
) -> IndexResult<Vec<DistanceResultPair>>
where
    S: PageStore,
    F: Fn(ObjectId) -> IndexResult<f64>,
{
    range_search_bounded(tree, radius, distance_to, &CoveringRadiusBound)
}

pub fn range_search_bounded<S, F, B>(
    tree: &IndexTree<S>,
    radius: f64,
    distance_to: F,
    bound: &B,
) -> IndexResult<Vec<DistanceResultPair>>
where
    S: PageStore,
    F: Fn(ObjectId) -> IndexResult<f64>,
    B: SubtreeBound,
{
    let mut collector = RangeCollector::new(radius);
    best_first_bounded(tree, &distance_to, bound, &mut collector)?;
    Ok(collector.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{DirectoryEntry, EntryLayout, MemoryPageStore};

    // Objects live on a line; an object's id is its coordinate.
    fn line_tree() -> IndexTree<MemoryPageStore> {
        let layout = EntryLayout {
            leaf: LeafEntry::new(0, 0.0),
            directory: DirectoryEntry::new(0, 0, 0.0, 0.0),
        };
        let tree = IndexTree::open(MemoryPageStore::new(4096), &layout, 0.4).unwrap();

        let mut near = tree.create_leaf_node();
        for id in [0u64, 1, 2, 3] {
            near.add_leaf_entry(LeafEntry::new(id, (id as f64 - 1.0).abs()))
                .unwrap();
        }
        let mut far = tree.create_leaf_node();
        for id in [100u64, 101, 102] {
            far.add_leaf_entry(LeafEntry::new(id, (id as f64 - 101.0).abs()))
                .unwrap();
        }
        let near_id = tree.write_node(&mut near).unwrap();
        let far_id = tree.write_node(&mut far).unwrap();

        let mut root = tree.create_directory_node();
        root.set_page_id(Some(ROOT_PAGE_ID));
        root.add_directory_entry(DirectoryEntry::new(near_id, 1, 2.0, 0.0))
            .unwrap();
        root.add_directory_entry(DirectoryEntry::new(far_id, 101, 1.0, 0.0))
            .unwrap();
        tree.write_node(&mut root).unwrap();
        tree
    }

    fn from(query: f64) -> impl Fn(ObjectId) -> IndexResult<f64> {
        move |id| Ok((id as f64 - query).abs())
    }

    #[test]
    fn test_knn_on_empty_tree() {
        let layout = EntryLayout {
            leaf: LeafEntry::new(0, 0.0),
            directory: DirectoryEntry::new(0, 0, 0.0, 0.0),
        };
        let tree = IndexTree::open(MemoryPageStore::new(4096), &layout, 0.4).unwrap();
        assert!(knn_search(&tree, 3, from(0.0)).unwrap().is_empty());
    }

    #[test]
    fn test_knn_prunes_far_subtree() {
        let tree = line_tree();
        let reads_before = tree.store().stats().page_reads;
        let result = knn_search(&tree, 2, from(0.2)).unwrap();
        assert_eq!(result.ids(), vec![0, 1]);
        // Only the near leaf is read; the root is cached.
        assert_eq!(tree.store().stats().page_reads - reads_before, 1);
    }

    #[test]
    fn test_knn_keeps_ties() {
        let tree = line_tree();
        let result = knn_search(&tree, 1, from(1.5)).unwrap();
        assert_eq!(result.ids(), vec![1, 2]);
        assert_eq!(result.kth_distance(), 0.5);
    }

    #[test]
    fn test_knn_crosses_subtrees() {
        let tree = line_tree();
        let result = knn_search(&tree, 6, from(50.0)).unwrap();
        assert_eq!(result.ids(), vec![3, 2, 1, 0, 100, 101]);
    }

    #[test]
    fn test_range_search() {
        let tree = line_tree();
        let result = range_search(&tree, 1.0, from(101.5)).unwrap();
        let ids: Vec<_> = result.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![101, 102]);

        let inclusive = range_search(&tree, 1.0, from(4.0)).unwrap();
        assert_eq!(inclusive.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3]);
        assert!(range_search(&tree, 0.1, from(50.0)).unwrap().is_empty());
    }

    struct SkipPage(PageId);

    impl SubtreeBound for SkipPage {
        fn lower_bound(&self, entry: &DirectoryEntry, distance: f64) -> f64 {
            if entry.child_page_id == self.0 {
                f64::INFINITY
            } else {
                CoveringRadiusBound.lower_bound(entry, distance)
            }
        }
    }

    #[test]
    fn test_custom_bound_controls_pruning() {
        let tree = line_tree();
        let root = tree.get_node(ROOT_PAGE_ID).unwrap();
        let far_page = root.entries()[1].child_page_id().unwrap();

        let result = knn_search_bounded(&tree, 6, from(50.0), &SkipPage(far_page)).unwrap();
        assert_eq!(result.ids(), vec![3, 2, 1, 0]);
        let in_range =
            range_search_bounded(&tree, 100.0, from(50.0), &SkipPage(far_page)).unwrap();
        assert_eq!(in_range.len(), 4);
    }
}
