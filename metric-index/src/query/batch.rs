//! Batched KNN: one traversal serving many queries.
//!
//! Each visited node is read once for the whole batch. A subtree is only
//! descended for the queries whose current k-th distance still admits it,
//! and children are visited in order of their smallest bound over those
//! queries so every heap tightens early.

use super::knn_heap::{KnnHeap, KnnList};
use super::search::parent_distance_bound;
use crate::tree::{Entry, IndexResult, IndexTree, ObjectId, PageId, PageStore, ROOT_PAGE_ID};

/// A query still interested in a subtree, with its distance to the
/// subtree's routing object (`None` at the root).
#[derive(Debug, Clone, Copy)]
struct ActiveQuery {
    query: usize,
    routing_distance: Option<f64>,
}

struct BatchSearch<'a, S: PageStore, F> {
    tree: &'a IndexTree<S>,
    queries: &'a [ObjectId],
    distance: &'a F,
    heaps: Vec<KnnHeap>,
}

impl<'a, S, F> BatchSearch<'a, S, F>
where
    S: PageStore,
    F: Fn(ObjectId, ObjectId) -> IndexResult<f64>,
{
    fn visit(&mut self, page_id: PageId, active: &[ActiveQuery]) -> IndexResult<()> {
        let node = self.tree.get_node(page_id)?;
        if node.is_leaf() {
            for entry in node.entries() {
                let object_id = entry.object_id()?;
                for aq in active {
                    let threshold = self.heaps[aq.query].kth_distance();
                    if parent_distance_bound(aq.routing_distance, entry) > threshold {
                        continue;
                    }
                    let d = (self.distance)(self.queries[aq.query], object_id)?;
                    if d <= threshold {
                        self.heaps[aq.query].insert(d, object_id);
                    }
                }
            }
            return Ok(());
        }

        // (smallest bound, child page, per-query (bound, routing distance))
        let mut children: Vec<(f64, PageId, Vec<(f64, ActiveQuery)>)> =
            Vec::with_capacity(node.num_entries());
        for entry in node.entries() {
            let Entry::Directory(directory) = entry else {
                continue;
            };
            let routing = directory.routing_object()?;
            let mut reached = Vec::with_capacity(active.len());
            let mut smallest = f64::INFINITY;
            for aq in active {
                let threshold = self.heaps[aq.query].kth_distance();
                if parent_distance_bound(aq.routing_distance, entry) > threshold {
                    continue;
                }
                let d = (self.distance)(self.queries[aq.query], routing)?;
                let bound = (d - directory.covering_radius).max(0.0);
                if bound <= threshold {
                    smallest = smallest.min(bound);
                    reached.push((
                        bound,
                        ActiveQuery {
                            query: aq.query,
                            routing_distance: Some(d),
                        },
                    ));
                }
            }
            if !reached.is_empty() {
                children.push((smallest, directory.child_page_id, reached));
            }
        }
        children.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        for (_, child_page_id, reached) in children {
            // Heaps may have tightened while earlier siblings were searched.
            let still_active: Vec<ActiveQuery> = reached
                .into_iter()
                .filter(|(bound, aq)| *bound <= self.heaps[aq.query].kth_distance())
                .map(|(_, aq)| aq)
                .collect();
            if !still_active.is_empty() {
                self.visit(child_page_id, &still_active)?;
            }
        }
        Ok(())
    }
}

/// Runs one KNN search per entry of `queries` in a single traversal.
/// `distance(query, object)` measures a query object against a stored one.
/// Results come back in the order of `queries`.
pub fn batch_knn<S, F>(
    tree: &IndexTree<S>,
    queries: &[ObjectId],
    k: usize,
    distance: &F,
) -> IndexResult<Vec<KnnList>>
where
    S: PageStore,
    F: Fn(ObjectId, ObjectId) -> IndexResult<f64>,
{
    let mut search = BatchSearch {
        tree,
        queries,
        distance,
        heaps: (0..queries.len()).map(|_| KnnHeap::new(k)).collect(),
    };
    let active: Vec<ActiveQuery> = (0..queries.len())
        .map(|query| ActiveQuery {
            query,
            routing_distance: None,
        })
        .collect();
    if !active.is_empty() {
        search.visit(ROOT_PAGE_ID, &active)?;
    }
    Ok(search.heaps.into_iter().map(KnnHeap::finalize).collect())
}
