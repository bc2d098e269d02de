//! Bounding boxes of subtrees over vector data.
//!
//! A metric tree only knows balls around routing objects. For vectors the
//! actual extent of a subtree can be much smaller; [`BoxBound`] combines the
//! ball bound with the box distance of a [`SpatialDistanceFunction`].

use std::collections::HashMap;

use super::search::{CoveringRadiusBound, SubtreeBound};
use crate::distance::{BoundingBox, IdMapping, SpatialDistanceFunction, VectorRelation};
use crate::tree::{DirectoryEntry, Entry, IndexResult, IndexTree, PageId, PageStore, ROOT_PAGE_ID};

/// Box enclosing the objects below each non-root node, keyed by page id.
///
/// A snapshot: it describes the tree as it was when built.
#[derive(Debug, Clone, Default)]
pub struct SubtreeBoxes {
    boxes: HashMap<PageId, BoundingBox>,
    generation: u64,
}

impl SubtreeBoxes {
    pub fn build<S: PageStore, M: IdMapping>(
        tree: &IndexTree<S>,
        relation: &VectorRelation<M>,
    ) -> IndexResult<Self> {
        let mut boxes = HashMap::new();
        collect_boxes(tree, relation, ROOT_PAGE_ID, &mut boxes)?;
        Ok(Self {
            boxes,
            generation: 0,
        })
    }

    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Mutation count of the tree when the boxes were built.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, page_id: PageId) -> Option<&BoundingBox> {
        self.boxes.get(&page_id)
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

fn collect_boxes<S: PageStore, M: IdMapping>(
    tree: &IndexTree<S>,
    relation: &VectorRelation<M>,
    page_id: PageId,
    boxes: &mut HashMap<PageId, BoundingBox>,
) -> IndexResult<Option<BoundingBox>> {
    let node = tree.get_node(page_id)?;
    let mut region: Option<BoundingBox> = None;
    for entry in node.entries() {
        match entry {
            Entry::Leaf(leaf) => {
                let point = relation.get(leaf.object_id)?;
                match region.as_mut() {
                    Some(region) => region.extend(point),
                    None => region = Some(BoundingBox::from_point(point)),
                }
            }
            Entry::Directory(directory) => {
                let Some(child) = collect_boxes(tree, relation, directory.child_page_id, boxes)?
                else {
                    continue;
                };
                match region.as_mut() {
                    Some(region) => {
                        region.extend(&child.min);
                        region.extend(&child.max);
                    }
                    None => region = Some(child.clone()),
                }
                boxes.insert(directory.child_page_id, child);
            }
        }
    }
    Ok(region)
}

/// The larger of the ball bound and the box distance to the query.
pub struct BoxBound<'a, D: SpatialDistanceFunction> {
    boxes: &'a SubtreeBoxes,
    function: &'a D,
    query: &'a [f64],
}

impl<'a, D: SpatialDistanceFunction> BoxBound<'a, D> {
    pub fn new(boxes: &'a SubtreeBoxes, function: &'a D, query: &'a [f64]) -> Self {
        Self {
            boxes,
            function,
            query,
        }
    }
}

impl<D: SpatialDistanceFunction> SubtreeBound for BoxBound<'_, D> {
    fn lower_bound(&self, entry: &DirectoryEntry, distance: f64) -> f64 {
        let ball = CoveringRadiusBound.lower_bound(entry, distance);
        match self.boxes.get(entry.child_page_id) {
            Some(region) => ball.max(self.function.min_distance(region, self.query)),
            None => ball,
        }
    }
}
