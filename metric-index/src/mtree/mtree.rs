//! The metric tree.
//!
//! Every node is reached through the page store; insertion, deletion and
//! queries only ever hold the nodes on one root-to-leaf path in memory.
//!
//! Insertion descends to the child whose ball already covers the object
//! (nearest routing object first), or failing that the one needing the least
//! radius enlargement. Overflowing nodes are split on the way back up. The
//! root keeps its page id: when it splits, its content moves to a fresh page
//! and page 0 becomes a directory over the two halves.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use super::config::TreeConfig;
use super::split::{split_node, Promoted, Split};
use crate::distance::{DistanceQuery, IdMapping, SpatialDistanceFunction, VectorDistanceQuery};
use crate::mkapp::PolynomialApproximation;
use crate::query::search::parent_distance_bound;
use crate::query::{
    batch_knn, knn_search, knn_search_bounded, range_search, range_search_bounded, BoxBound,
    DistanceResultPair, KnnList, SubtreeBoxes,
};
use crate::tree::tree_constants::INTEGRITY_EPSILON;
use crate::tree::{
    CachedPageStore, DirectoryEntry, Entry, EntryLayout, FilePageStore, IndexError, IndexResult,
    IndexTree, LeafEntry, MemoryPageStore, Node, NoHooks, ObjectId, PageId, PageStore, TreeHooks,
    TreeStatistics, ROOT_PAGE_ID,
};

/// One directory level on the way from the root to a leaf.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PathStep {
    /// The directory node.
    pub page_id: PageId,
    /// Index of the chosen entry within it.
    pub index: usize,
    pub child_page_id: PageId,
    pub routing_object_id: ObjectId,
    /// Distance from the object being placed or located to `routing_object_id`.
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct TreeShape {
    height: usize,
    directory_nodes: u64,
    leaf_nodes: u64,
    objects: u64,
}

pub struct MTree<Q, S = MemoryPageStore, H = NoHooks>
where
    Q: DistanceQuery,
    S: PageStore,
    H: TreeHooks,
{
    tree: IndexTree<S>,
    query: Q,
    hooks: H,
    config: TreeConfig,
    knn_queries: AtomicU64,
    range_queries: AtomicU64,
    /// Completed insertions and deletions.
    modifications: AtomicU64,
}

impl<Q: DistanceQuery> MTree<Q, MemoryPageStore> {
    /// A tree whose pages live in memory.
    pub fn in_memory(query: Q, config: TreeConfig) -> IndexResult<Self> {
        let store = MemoryPageStore::new(config.page_size());
        Self::new(store, query, config)
    }
}

impl<Q: DistanceQuery> MTree<Q, CachedPageStore<FilePageStore>> {
    /// Creates a file-backed tree behind a write-back page cache.
    pub fn create_file(path: impl AsRef<Path>, query: Q, config: TreeConfig) -> IndexResult<Self> {
        let store = FilePageStore::create(path, config.page_size())?;
        Self::new(CachedPageStore::new(store, config.cache_pages()), query, config)
    }

    /// Reopens a file-backed tree. The page size comes from the file.
    pub fn open_file(path: impl AsRef<Path>, query: Q, config: TreeConfig) -> IndexResult<Self> {
        let store = FilePageStore::open(path)?;
        Self::new(CachedPageStore::new(store, config.cache_pages()), query, config)
    }
}

impl<Q: DistanceQuery, S: PageStore> MTree<Q, S> {
    pub fn new(store: S, query: Q, config: TreeConfig) -> IndexResult<Self> {
        Self::with_hooks(store, query, config, NoHooks)
    }
}

impl<Q, S, H> MTree<Q, S, H>
where
    Q: DistanceQuery,
    S: PageStore,
    H: TreeHooks,
{
    pub fn with_hooks(store: S, query: Q, config: TreeConfig, hooks: H) -> IndexResult<Self> {
        Self::open(store, query, config, hooks, None)
    }

    /// Opens the tree, sizing pages for entries that carry an approximation
    /// of `approximation_len` coefficients when given.
    pub(crate) fn open(
        store: S,
        query: Q,
        config: TreeConfig,
        hooks: H,
        approximation_len: Option<usize>,
    ) -> IndexResult<Self> {
        let approximation = approximation_len.map(PolynomialApproximation::zeros);
        let layout = EntryLayout {
            leaf: LeafEntry {
                approximation: approximation.clone(),
                ..LeafEntry::new(0, 0.0)
            },
            directory: DirectoryEntry {
                approximation,
                ..DirectoryEntry::new(0, 0, 0.0, 0.0)
            },
        };
        let tree = IndexTree::open(store, &layout, config.min_fill_ratio())?;
        Ok(Self {
            tree,
            query,
            hooks,
            config,
            knn_queries: AtomicU64::new(0),
            range_queries: AtomicU64::new(0),
            modifications: AtomicU64::new(0),
        })
    }

    pub fn tree(&self) -> &IndexTree<S> {
        &self.tree
    }

    pub fn query(&self) -> &Q {
        &self.query
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn flush(&self) -> IndexResult<()> {
        self.tree.flush()
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    pub fn insert(&mut self, object_id: ObjectId) -> IndexResult<()> {
        self.hooks.pre_insert(&LeafEntry::new(object_id, 0.0))?;
        self.insert_entry(object_id)?;
        if self.config.extra_integrity_checks() {
            self.integrity_check()?;
        }
        Ok(())
    }

    pub fn insert_all(&mut self, object_ids: &[ObjectId]) -> IndexResult<()> {
        for &object_id in object_ids {
            self.insert(object_id)?;
        }
        Ok(())
    }

    /// Places one object without consulting the hooks.
    pub(crate) fn insert_entry(&self, object_id: ObjectId) -> IndexResult<()> {
        let object = self.query.object(object_id)?;
        let mut path = Vec::new();
        let mut leaf = self.choose_leaf(ROOT_PAGE_ID, object, &mut path)?;
        let parent_distance = path.last().map(|step| step.distance).unwrap_or(0.0);
        leaf.add_leaf_entry(LeafEntry::new(object_id, parent_distance))?;
        self.modifications.fetch_add(1, Ordering::Relaxed);
        self.adjust_tree(leaf, &path)
    }

    fn choose_leaf(
        &self,
        page_id: PageId,
        object: &Q::Object,
        path: &mut Vec<PathStep>,
    ) -> IndexResult<Node> {
        let node = self.tree.get_node(page_id)?;
        if node.is_leaf() {
            return Ok(node);
        }

        // (covered, key): covered children first, by distance; then by enlargement
        let mut best: Option<(PathStep, bool, f64)> = None;
        for (index, entry) in node.entries().iter().enumerate() {
            let Entry::Directory(directory) = entry else {
                return Err(IndexError::TypeMismatch(format!(
                    "leaf entry in directory node {}",
                    page_id
                )));
            };
            let routing_object_id = directory.routing_object()?;
            let distance = self.query.distance_to_object(routing_object_id, object)?;
            let covered = distance <= directory.covering_radius;
            let key = if covered {
                distance
            } else {
                distance - directory.covering_radius
            };
            let better = match &best {
                None => true,
                Some((_, best_covered, best_key)) => {
                    (covered && !best_covered) || (covered == *best_covered && key < *best_key)
                }
            };
            if better {
                let step = PathStep {
                    page_id,
                    index,
                    child_page_id: directory.child_page_id,
                    routing_object_id,
                    distance,
                };
                best = Some((step, covered, key));
            }
        }

        let (step, _, _) = best.ok_or_else(|| {
            IndexError::IntegrityViolation(format!("directory node {} is empty", page_id))
        })?;
        path.push(step);
        self.choose_leaf(step.child_page_id, object, path)
    }

    /// Writes `node` back and repairs the path above it: splits overflowing
    /// nodes and widens covering radii to include the new object.
    fn adjust_tree(&self, mut node: Node, path: &[PathStep]) -> IndexResult<()> {
        for (level, step) in path.iter().enumerate().rev() {
            let mut parent = self.tree.get_node(step.page_id)?;
            if node.has_overflow() {
                let Split {
                    mut sibling,
                    first,
                    second,
                } = self.split(&mut node)?;
                self.tree.write_node(&mut node)?;
                let sibling_page_id = self.tree.write_node(&mut sibling)?;

                let parent_routing = level.checked_sub(1).map(|l| path[l].routing_object_id);
                let first_entry = self.routing_entry(step.child_page_id, first, parent_routing)?;
                let second_entry = self.routing_entry(sibling_page_id, second, parent_routing)?;
                let slot = parent.entry_mut(step.index).ok_or_else(|| {
                    IndexError::IntegrityViolation(format!(
                        "entry {} missing from node {}",
                        step.index, step.page_id
                    ))
                })?;
                *slot = Entry::Directory(first_entry);
                parent.add_directory_entry(second_entry)?;
            } else {
                self.tree.write_node(&mut node)?;
                if let Some(Entry::Directory(entry)) = parent.entry_mut(step.index) {
                    entry.covering_radius = entry.covering_radius.max(step.distance);
                }
            }
            node = parent;
        }

        if node.has_overflow() {
            self.grow_root(node)
        } else {
            self.tree.write_node(&mut node).map(|_| ())
        }
    }

    fn split(&self, node: &mut Node) -> IndexResult<Split> {
        let minimum = if node.is_leaf() {
            self.tree.leaf_minimum()
        } else {
            self.tree.directory_minimum()
        };
        split_node(node, self.config.split_strategy(), minimum, &|a, b| {
            self.query.distance_by_id(a, b)
        })
    }

    fn routing_entry(
        &self,
        child_page_id: PageId,
        promoted: Promoted,
        parent_routing: Option<ObjectId>,
    ) -> IndexResult<DirectoryEntry> {
        let parent_distance = match parent_routing {
            Some(routing) => self.query.distance_by_id(promoted.object_id, routing)?,
            None => 0.0,
        };
        Ok(DirectoryEntry::new(
            child_page_id,
            promoted.object_id,
            promoted.covering_radius,
            parent_distance,
        ))
    }

    fn grow_root(&self, mut root: Node) -> IndexResult<()> {
        let Split {
            mut sibling,
            first,
            second,
        } = self.split(&mut root)?;
        root.set_page_id(None);
        let first_page_id = self.tree.write_node(&mut root)?;
        let second_page_id = self.tree.write_node(&mut sibling)?;

        let mut new_root = self.tree.create_directory_node();
        new_root.set_page_id(Some(ROOT_PAGE_ID));
        new_root.add_directory_entry(self.routing_entry(first_page_id, first, None)?)?;
        new_root.add_directory_entry(self.routing_entry(second_page_id, second, None)?)?;
        self.tree.write_node(&mut new_root)?;
        log::debug!(
            "Root split into pages {} and {}",
            first_page_id,
            second_page_id
        );
        Ok(())
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Removes an object. Returns `false` when it is not in the tree.
    ///
    /// Nodes left below the minimum fill are dissolved and their objects
    /// reinserted. Covering radii are not shrunk.
    pub fn delete(&mut self, object_id: ObjectId) -> IndexResult<bool> {
        let object = self.query.object(object_id)?;
        let mut path = Vec::new();
        let Some(index) = self.find_leaf(ROOT_PAGE_ID, object_id, object, None, &mut path)? else {
            return Ok(false);
        };
        let leaf_page_id = path
            .last()
            .map(|step| step.child_page_id)
            .unwrap_or(ROOT_PAGE_ID);
        let mut leaf = self.tree.get_node(leaf_page_id)?;
        let removed = match leaf.delete_entry(index)? {
            Entry::Leaf(entry) => entry,
            Entry::Directory(_) => {
                return Err(IndexError::TypeMismatch(format!(
                    "directory entry found in leaf node {}",
                    leaf_page_id
                )))
            }
        };

        self.modifications.fetch_add(1, Ordering::Relaxed);
        let orphans = self.condense_tree(leaf, &path)?;
        if !orphans.is_empty() {
            log::debug!("Reinserting {} objects from dissolved nodes", orphans.len());
        }
        for orphan in orphans {
            self.insert_entry(orphan)?;
        }
        self.hooks.post_delete(&removed)?;
        if self.config.extra_integrity_checks() {
            self.integrity_check()?;
        }
        Ok(true)
    }

    /// Locates the leaf entry of `object_id`, returning its index in the leaf
    /// at the end of `path`.
    fn find_leaf(
        &self,
        page_id: PageId,
        object_id: ObjectId,
        object: &Q::Object,
        routing_distance: Option<f64>,
        path: &mut Vec<PathStep>,
    ) -> IndexResult<Option<usize>> {
        let node = self.tree.get_node(page_id)?;
        for (index, entry) in node.entries().iter().enumerate() {
            if parent_distance_bound(routing_distance, entry) > INTEGRITY_EPSILON {
                continue;
            }
            match entry {
                Entry::Leaf(leaf) => {
                    if leaf.object_id == object_id {
                        return Ok(Some(index));
                    }
                }
                Entry::Directory(directory) => {
                    let routing_object_id = directory.routing_object()?;
                    let distance = self.query.distance_to_object(routing_object_id, object)?;
                    if distance > directory.covering_radius + INTEGRITY_EPSILON {
                        continue;
                    }
                    path.push(PathStep {
                        page_id,
                        index,
                        child_page_id: directory.child_page_id,
                        routing_object_id,
                        distance,
                    });
                    let found = self.find_leaf(
                        directory.child_page_id,
                        object_id,
                        object,
                        Some(distance),
                        path,
                    )?;
                    if found.is_some() {
                        return Ok(found);
                    }
                    path.pop();
                }
            }
        }
        Ok(None)
    }

    /// Writes back `node` after a removal, dissolving underfull non-root
    /// nodes on the way up. Returns the objects that need reinsertion.
    fn condense_tree(&self, mut node: Node, path: &[PathStep]) -> IndexResult<Vec<ObjectId>> {
        let mut orphans = Vec::new();
        for step in path.iter().rev() {
            let mut parent = self.tree.get_node(step.page_id)?;
            let minimum = if node.is_leaf() {
                self.tree.leaf_minimum()
            } else {
                self.tree.directory_minimum()
            };
            if node.num_entries() < minimum {
                self.dissolve(&node, &mut orphans)?;
                self.tree.delete_node(step.child_page_id)?;
                parent.delete_entry(step.index)?;
            } else {
                self.tree.write_node(&mut node)?;
            }
            node = parent;
        }
        self.shrink_root(node)?;
        Ok(orphans)
    }

    /// Collects the objects below `node` and releases its descendant pages.
    fn dissolve(&self, node: &Node, orphans: &mut Vec<ObjectId>) -> IndexResult<()> {
        for entry in node.entries() {
            match entry {
                Entry::Leaf(leaf) => orphans.push(leaf.object_id),
                Entry::Directory(directory) => {
                    let child = self.tree.get_node(directory.child_page_id)?;
                    self.dissolve(&child, orphans)?;
                    self.tree.delete_node(directory.child_page_id)?;
                }
            }
        }
        Ok(())
    }

    /// Pulls up the only child of a directory root until the root has at
    /// least two entries or is a leaf.
    fn shrink_root(&self, mut root: Node) -> IndexResult<()> {
        while !root.is_leaf() && root.num_entries() <= 1 {
            let Some(child_page_id) = root.entries().first().and_then(Entry::child_page_id) else {
                root = self.tree.create_leaf_node();
                break;
            };
            let mut child = self.tree.get_node(child_page_id)?;
            self.tree.delete_node(child_page_id)?;
            for entry in child.entries_mut() {
                entry.set_parent_distance(0.0);
            }
            root = child;
            log::debug!("Root shrank: page {} pulled up", child_page_id);
        }
        root.set_page_id(Some(ROOT_PAGE_ID));
        self.tree.write_node(&mut root).map(|_| ())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn knn(&self, object: &Q::Object, k: usize) -> IndexResult<KnnList> {
        if k == 0 {
            return Err(IndexError::InvalidArgument("k must be at least 1".into()));
        }
        self.query.check_object(object)?;
        self.knn_queries.fetch_add(1, Ordering::Relaxed);
        knn_search(&self.tree, k, |id| self.query.distance_to_object(id, object))
    }

    pub fn knn_by_id(&self, object_id: ObjectId, k: usize) -> IndexResult<KnnList> {
        self.knn(self.query.object(object_id)?, k)
    }

    pub fn range(&self, object: &Q::Object, radius: f64) -> IndexResult<Vec<DistanceResultPair>> {
        check_radius(radius)?;
        self.query.check_object(object)?;
        self.range_queries.fetch_add(1, Ordering::Relaxed);
        range_search(&self.tree, radius, |id| {
            self.query.distance_to_object(id, object)
        })
    }

    pub fn range_by_id(&self, object_id: ObjectId, radius: f64) -> IndexResult<Vec<DistanceResultPair>> {
        self.range(self.query.object(object_id)?, radius)
    }

    /// KNN for every id in `object_ids` in one traversal; results follow the
    /// input order.
    pub fn batch_knn(&self, object_ids: &[ObjectId], k: usize) -> IndexResult<Vec<KnnList>> {
        if k == 0 {
            return Err(IndexError::InvalidArgument("k must be at least 1".into()));
        }
        for &object_id in object_ids {
            self.query.object(object_id)?;
        }
        self.knn_queries
            .fetch_add(object_ids.len() as u64, Ordering::Relaxed);
        batch_knn(&self.tree, object_ids, k, &|q, o| self.query.distance_by_id(q, o))
    }

    // ========================================================================
    // Shape, integrity and statistics
    // ========================================================================

    /// Number of node levels, 1 for a tree that is a single leaf.
    pub fn height(&self) -> IndexResult<usize> {
        let mut height = 1;
        let mut node = self.tree.get_node(ROOT_PAGE_ID)?;
        while !node.is_leaf() {
            let child_page_id = node
                .entries()
                .first()
                .and_then(Entry::child_page_id)
                .ok_or_else(|| {
                    IndexError::IntegrityViolation(format!(
                        "directory node {:?} is empty",
                        node.page_id()
                    ))
                })?;
            node = self.tree.get_node(child_page_id)?;
            height += 1;
        }
        Ok(height)
    }

    fn shape(&self) -> IndexResult<TreeShape> {
        let mut shape = TreeShape {
            height: self.height()?,
            ..TreeShape::default()
        };
        for path in self.tree.breadth_first() {
            let path = path?;
            match path.entry() {
                Entry::Leaf(_) => shape.objects += 1,
                Entry::Directory(_) if path.depth() + 1 == shape.height => shape.leaf_nodes += 1,
                Entry::Directory(_) => shape.directory_nodes += 1,
            }
        }
        Ok(shape)
    }

    /// Number of stored objects.
    pub fn size(&self) -> IndexResult<u64> {
        Ok(self.shape()?.objects)
    }

    /// Number of leaf nodes.
    pub fn leaves(&self) -> IndexResult<u64> {
        Ok(self.shape()?.leaf_nodes)
    }

    /// Ids of all stored objects in level order.
    pub fn object_ids(&self) -> IndexResult<Vec<ObjectId>> {
        let mut ids = Vec::new();
        for path in self.tree.breadth_first() {
            if let Entry::Leaf(leaf) = path?.entry() {
                ids.push(leaf.object_id);
            }
        }
        Ok(ids)
    }

    /// Recomputes every parent distance and checks every covering radius
    /// against the objects below it, along with node fill and balance.
    pub fn integrity_check(&self) -> IndexResult<()> {
        let height = self.height()?;
        self.check_subtree(ROOT_PAGE_ID, None, 1, height)?;
        Ok(())
    }

    fn check_subtree(
        &self,
        page_id: PageId,
        routing_object_id: Option<ObjectId>,
        level: usize,
        height: usize,
    ) -> IndexResult<Vec<ObjectId>> {
        let node = self.tree.get_node(page_id)?;
        if node.is_leaf() != (level == height) {
            return Err(IndexError::IntegrityViolation(format!(
                "node {} at level {} of {} has the wrong kind",
                page_id, level, height
            )));
        }
        if node.has_overflow() {
            return Err(IndexError::IntegrityViolation(format!(
                "node {} holds {} entries with capacity {}",
                page_id,
                node.num_entries(),
                node.capacity()
            )));
        }
        if page_id != ROOT_PAGE_ID {
            let minimum = if node.is_leaf() {
                self.tree.leaf_minimum()
            } else {
                self.tree.directory_minimum()
            };
            if node.num_entries() < minimum {
                return Err(IndexError::IntegrityViolation(format!(
                    "node {} holds {} entries, minimum is {}",
                    page_id,
                    node.num_entries(),
                    minimum
                )));
            }
        }

        let mut objects = Vec::new();
        for entry in node.entries() {
            let object_id = entry.object_id()?;
            if let Some(routing) = routing_object_id {
                let distance = self.query.distance_by_id(routing, object_id)?;
                if (distance - entry.parent_distance()).abs() > INTEGRITY_EPSILON * (1.0 + distance) {
                    return Err(IndexError::IntegrityViolation(format!(
                        "object {} in node {}: stored parent distance {}, actual {}",
                        object_id,
                        page_id,
                        entry.parent_distance(),
                        distance
                    )));
                }
            }
            match entry {
                Entry::Leaf(_) => objects.push(object_id),
                Entry::Directory(directory) => {
                    let below = self.check_subtree(
                        directory.child_page_id,
                        Some(object_id),
                        level + 1,
                        height,
                    )?;
                    for &other in &below {
                        let distance = self.query.distance_by_id(object_id, other)?;
                        if distance > directory.covering_radius + INTEGRITY_EPSILON * (1.0 + distance) {
                            return Err(IndexError::IntegrityViolation(format!(
                                "object {} lies {} from routing object {}, covering radius is {}",
                                other, distance, object_id, directory.covering_radius
                            )));
                        }
                    }
                    objects.extend(below);
                }
            }
        }
        Ok(objects)
    }

    pub fn statistics(&self) -> IndexResult<TreeStatistics> {
        let shape = self.shape()?;
        Ok(TreeStatistics {
            height: shape.height,
            directory_nodes: shape.directory_nodes,
            leaf_nodes: shape.leaf_nodes,
            objects: shape.objects,
            distance_computations: self.query.computations(),
            knn_queries: self.knn_queries.load(Ordering::Relaxed),
            range_queries: self.range_queries.load(Ordering::Relaxed),
            reverse_knn_queries: 0,
            store: self.tree.store().stats(),
        })
    }

    pub fn log_statistics(&self) -> IndexResult<()> {
        log_tree_statistics("M-tree", &self.statistics()?);
        Ok(())
    }
}

impl<D, M, S, H> MTree<VectorDistanceQuery<D, M>, S, H>
where
    D: SpatialDistanceFunction,
    M: IdMapping,
    S: PageStore,
    H: TreeHooks,
{
    /// Bounding boxes of every subtree, for [`knn_with_boxes`](Self::knn_with_boxes)
    /// and [`range_with_boxes`](Self::range_with_boxes). Any later insertion
    /// or deletion invalidates them.
    pub fn subtree_boxes(&self) -> IndexResult<SubtreeBoxes> {
        let generation = self.modifications.load(Ordering::Relaxed);
        Ok(SubtreeBoxes::build(&self.tree, self.query.relation())?.with_generation(generation))
    }

    /// KNN pruning subtrees by box distance as well as by covering radius.
    pub fn knn_with_boxes(
        &self,
        object: &[f64],
        k: usize,
        boxes: &SubtreeBoxes,
    ) -> IndexResult<KnnList> {
        if k == 0 {
            return Err(IndexError::InvalidArgument("k must be at least 1".into()));
        }
        self.query.check_object(object)?;
        self.check_boxes(boxes)?;
        self.knn_queries.fetch_add(1, Ordering::Relaxed);
        let bound = BoxBound::new(boxes, self.query.function(), object);
        knn_search_bounded(
            &self.tree,
            k,
            |id| self.query.distance_to_object(id, object),
            &bound,
        )
    }

    pub fn range_with_boxes(
        &self,
        object: &[f64],
        radius: f64,
        boxes: &SubtreeBoxes,
    ) -> IndexResult<Vec<DistanceResultPair>> {
        check_radius(radius)?;
        self.query.check_object(object)?;
        self.check_boxes(boxes)?;
        self.range_queries.fetch_add(1, Ordering::Relaxed);
        let bound = BoxBound::new(boxes, self.query.function(), object);
        range_search_bounded(
            &self.tree,
            radius,
            |id| self.query.distance_to_object(id, object),
            &bound,
        )
    }

    fn check_boxes(&self, boxes: &SubtreeBoxes) -> IndexResult<()> {
        let current = self.modifications.load(Ordering::Relaxed);
        if boxes.generation() != current {
            return Err(IndexError::InvalidArgument(format!(
                "subtree boxes were built after {} modifications, the tree has seen {}",
                boxes.generation(),
                current
            )));
        }
        Ok(())
    }
}

fn check_radius(radius: f64) -> IndexResult<()> {
    if radius.is_nan() || radius < 0.0 {
        return Err(IndexError::InvalidArgument(format!(
            "range radius {} must be non-negative",
            radius
        )));
    }
    Ok(())
}

pub(crate) fn log_tree_statistics(name: &str, stats: &TreeStatistics) {
    log::info!(
        "{}: height {}, {} directory nodes, {} leaf nodes, {} objects",
        name,
        stats.height,
        stats.directory_nodes,
        stats.leaf_nodes,
        stats.objects
    );
    log::info!(
        "{}: {} distance computations, {} knn / {} range / {} reverse-knn queries",
        name,
        stats.distance_computations,
        stats.knn_queries,
        stats.range_queries,
        stats.reverse_knn_queries
    );
    log::info!(
        "{}: {} page reads, {} page writes, cache {} hits / {} misses",
        name,
        stats.store.page_reads,
        stats.store.page_writes,
        stats.store.cache_hits,
        stats.store.cache_misses
    );
}
