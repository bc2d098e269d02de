//! Metric tree with approximated k-distances for reverse-kNN queries.
//!
//! Every entry carries a polynomial approximation of the k-distance curve of
//! the objects below it. A reverse-kNN query for `k` descends into an entry
//! when the query may lie within that curve's value at `k`, and reports the
//! leaf objects whose own curve reaches the query.
//!
//! Approximations are only ever rebuilt as a whole after a batch mutation;
//! single-object insertion is rejected.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use super::approximation::{approximate_k_distances, PolynomialApproximation};
use super::config::{ApproximationAggregation, MkAppConfig};
use crate::distance::DistanceQuery;
use crate::mtree::mtree::log_tree_statistics;
use crate::mtree::{MTree, MetricIndex, TreeConfig};
use crate::query::{batch_knn, best_first, DistanceResultPair, KnnList, SearchCollector};
use crate::tree::{
    CachedPageStore, Entry, FilePageStore, IndexError, IndexResult, LeafEntry, MemoryPageStore,
    ObjectId, PageId, PageStore, TreeHooks, TreeStatistics, ROOT_PAGE_ID,
};

/// Rejects single-object insertion.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOnlyHooks;

impl TreeHooks for BatchOnlyHooks {
    fn pre_insert(&self, entry: &LeafEntry) -> IndexResult<()> {
        Err(IndexError::Unsupported(format!(
            "object {}: approximations cannot be fitted one object at a time; use insert_all",
            entry.object_id
        )))
    }
}

/// Leaf-level data gathered while rebuilding a subtree.
struct SubtreeSummary {
    approximation: PolynomialApproximation,
    kdist_sum: Vec<f64>,
    objects: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshMode {
    Write,
    Verify,
}

struct ReverseKnnCollector {
    k: usize,
    log_space: bool,
    results: Vec<DistanceResultPair>,
}

impl SearchCollector for ReverseKnnCollector {
    fn global_threshold(&self) -> f64 {
        f64::INFINITY
    }

    fn entry_threshold(&self, entry: &Entry) -> IndexResult<f64> {
        entry
            .approximation()
            .map(|approximation| approximation.value_at(self.k, self.log_space))
            .ok_or_else(|| {
                IndexError::IntegrityViolation(format!(
                    "entry for object {:?} has no k-distance approximation",
                    entry.object_id().ok()
                ))
            })
    }

    fn collect(&mut self, distance: f64, entry: &LeafEntry) {
        self.results
            .push(DistanceResultPair::new(distance, entry.object_id));
    }
}

pub struct MkAppTree<Q, S = MemoryPageStore>
where
    Q: DistanceQuery,
    S: PageStore,
{
    mtree: MTree<Q, S, BatchOnlyHooks>,
    config: MkAppConfig,
    reverse_knn_queries: AtomicU64,
}

impl<Q: DistanceQuery> MkAppTree<Q, MemoryPageStore> {
    pub fn in_memory(query: Q, tree_config: TreeConfig, config: MkAppConfig) -> IndexResult<Self> {
        let store = MemoryPageStore::new(tree_config.page_size());
        Self::new(store, query, tree_config, config)
    }
}

impl<Q: DistanceQuery> MkAppTree<Q, CachedPageStore<FilePageStore>> {
    pub fn create_file(
        path: impl AsRef<Path>,
        query: Q,
        tree_config: TreeConfig,
        config: MkAppConfig,
    ) -> IndexResult<Self> {
        let store = FilePageStore::create(path, tree_config.page_size())?;
        let cache_pages = tree_config.cache_pages();
        Self::new(CachedPageStore::new(store, cache_pages), query, tree_config, config)
    }

    /// Reopens a file-backed tree; stored approximations are used as they
    /// are. The configuration must match the one the file was built with.
    pub fn open_file(
        path: impl AsRef<Path>,
        query: Q,
        tree_config: TreeConfig,
        config: MkAppConfig,
    ) -> IndexResult<Self> {
        let store = FilePageStore::open(path)?;
        let cache_pages = tree_config.cache_pages();
        Self::new(CachedPageStore::new(store, cache_pages), query, tree_config, config)
    }
}

impl<Q, S> MkAppTree<Q, S>
where
    Q: DistanceQuery,
    S: PageStore,
{
    pub fn new(store: S, query: Q, tree_config: TreeConfig, config: MkAppConfig) -> IndexResult<Self> {
        let mtree = MTree::open(
            store,
            query,
            tree_config,
            BatchOnlyHooks,
            Some(config.degree() + 1),
        )?;
        Ok(Self {
            mtree,
            config,
            reverse_knn_queries: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &MkAppConfig {
        &self.config
    }

    /// The underlying metric tree, for plain KNN and range queries.
    pub fn mtree(&self) -> &MTree<Q, S, BatchOnlyHooks> {
        &self.mtree
    }

    pub fn flush(&self) -> IndexResult<()> {
        self.mtree.flush()
    }

    /// Always fails with [`IndexError::Unsupported`]; see [`insert_all`](Self::insert_all).
    pub fn insert(&mut self, object_id: ObjectId) -> IndexResult<()> {
        self.mtree.insert(object_id)
    }

    /// Inserts a batch, then recomputes k-distances and rebuilds every
    /// approximation bottom-up.
    ///
    /// On a tree that already held objects, k-distances are recomputed for
    /// all of them, since new neighbours can only shrink them.
    pub fn insert_all(&mut self, object_ids: &[ObjectId]) -> IndexResult<()> {
        if object_ids.is_empty() {
            return Ok(());
        }
        for &object_id in object_ids {
            self.mtree.query().object(object_id)?;
        }
        let was_empty = self.mtree.tree().get_node(ROOT_PAGE_ID)?.is_empty();
        for (inserted, &object_id) in object_ids.iter().enumerate() {
            if let Err(err) = self.mtree.insert_entry(object_id) {
                log::warn!(
                    "Batch insert failed after {} of {} objects: {}",
                    inserted,
                    object_ids.len(),
                    err
                );
                let present = self.mtree.object_ids()?;
                self.rebuild_approximations(&present)?;
                return Err(err);
            }
        }
        let affected = if was_empty {
            object_ids.to_vec()
        } else {
            self.mtree.object_ids()?
        };
        self.rebuild_approximations(&affected)?;
        if self.mtree.config().extra_integrity_checks() {
            self.integrity_check()?;
        }
        Ok(())
    }

    /// Removes an object and rebuilds all approximations.
    pub fn delete(&mut self, object_id: ObjectId) -> IndexResult<bool> {
        if !self.mtree.delete(object_id)? {
            return Ok(false);
        }
        let remaining = self.mtree.object_ids()?;
        self.rebuild_approximations(&remaining)?;
        Ok(true)
    }

    fn rebuild_approximations(&self, object_ids: &[ObjectId]) -> IndexResult<()> {
        let kdists = self.k_distances(object_ids)?;
        self.refresh_node(ROOT_PAGE_ID, &kdists, RefreshMode::Write)?;
        log::debug!(
            "Rebuilt k-distance approximations for {} objects (k_max {})",
            kdists.len(),
            self.config.k_max()
        );
        Ok(())
    }

    /// Exact k-distances `1..=k_max` of each object, the object itself
    /// excluded. Objects with fewer than `k_max` neighbours repeat their
    /// largest neighbour distance (0 with no neighbours).
    fn k_distances(&self, object_ids: &[ObjectId]) -> IndexResult<HashMap<ObjectId, Vec<f64>>> {
        let k_max = self.config.k_max();
        let query = self.mtree.query();
        let neighbours = batch_knn(self.mtree.tree(), object_ids, k_max + 1, &|q, o| {
            query.distance_by_id(q, o)
        })?;

        let mut kdists = HashMap::with_capacity(object_ids.len());
        for (&object_id, list) in object_ids.iter().zip(neighbours) {
            kdists.insert(object_id, k_distances_excluding(object_id, &list, k_max));
        }
        Ok(kdists)
    }

    fn fit(&self, kdist: &[f64]) -> IndexResult<PolynomialApproximation> {
        approximate_k_distances(
            kdist,
            self.config.degree(),
            self.config.log_space(),
            self.config.conservative_fit(),
        )
    }

    /// Rebuilds (or, in verify mode, recomputes and compares) the
    /// approximations of every entry below `page_id`. Children are written
    /// before their parent.
    fn refresh_node(
        &self,
        page_id: PageId,
        kdists: &HashMap<ObjectId, Vec<f64>>,
        mode: RefreshMode,
    ) -> IndexResult<SubtreeSummary> {
        let k_max = self.config.k_max();
        let mut node = self.mtree.tree().get_node(page_id)?;
        let mut kdist_sum = vec![0.0; k_max];
        let mut objects = 0;
        let mut child_approximations = Vec::with_capacity(node.num_entries());

        for entry in node.entries_mut() {
            let approximation = match entry {
                Entry::Leaf(leaf) => {
                    let kdist = kdists
                        .get(&leaf.object_id)
                        .ok_or(IndexError::UnknownObject(leaf.object_id))?;
                    for (sum, d) in kdist_sum.iter_mut().zip(kdist) {
                        *sum += d;
                    }
                    objects += 1;
                    self.fit(kdist)?
                }
                Entry::Directory(directory) => {
                    let child = self.refresh_node(directory.child_page_id, kdists, mode)?;
                    for (sum, d) in kdist_sum.iter_mut().zip(&child.kdist_sum) {
                        *sum += d;
                    }
                    objects += child.objects;
                    child.approximation
                }
            };
            match mode {
                RefreshMode::Write => entry.set_approximation(Some(approximation.clone())),
                RefreshMode::Verify => check_approximation(page_id, entry, &approximation)?,
            }
            child_approximations.push(approximation);
        }

        if mode == RefreshMode::Write {
            self.mtree.tree().write_node(&mut node)?;
        }

        let approximation = match self.config.aggregation() {
            ApproximationAggregation::Mean => {
                let mean: Vec<f64> = kdist_sum
                    .iter()
                    .map(|sum| if objects == 0 { 0.0 } else { sum / objects as f64 })
                    .collect();
                self.fit(&mean)?
            }
            ApproximationAggregation::CoefficientMax => {
                PolynomialApproximation::coefficient_max(&child_approximations)
                    .unwrap_or_else(|| PolynomialApproximation::zeros(self.config.degree() + 1))
            }
        };
        Ok(SubtreeSummary {
            approximation,
            kdist_sum,
            objects,
        })
    }

    /// Objects that count the stored object `object_id` among their `k`
    /// nearest neighbours, according to the stored approximations. The
    /// object itself is part of the result.
    ///
    /// With coefficient-max aggregation and conservative fitting no true
    /// reverse neighbour is missed; the result may contain false positives.
    pub fn reverse_knn(&self, object_id: ObjectId, k: usize) -> IndexResult<Vec<DistanceResultPair>> {
        if k == 0 {
            return Err(IndexError::InvalidArgument("k must be at least 1".into()));
        }
        if k > self.config.k_max() {
            return Err(IndexError::KTooLarge {
                k,
                k_max: self.config.k_max(),
            });
        }
        let query = self.mtree.query();
        let object = query.object(object_id)?;
        self.reverse_knn_queries.fetch_add(1, Ordering::Relaxed);

        let mut collector = ReverseKnnCollector {
            k,
            log_space: self.config.log_space(),
            results: Vec::new(),
        };
        best_first(
            self.mtree.tree(),
            &|id| query.distance_to_object(id, object),
            &mut collector,
        )?;
        collector.results.sort_unstable();
        Ok(collector.results)
    }

    /// Structural check of the tree plus a full recomputation of every
    /// stored approximation.
    pub fn integrity_check(&self) -> IndexResult<()> {
        self.mtree.integrity_check()?;
        let object_ids = self.mtree.object_ids()?;
        if object_ids.is_empty() {
            return Ok(());
        }
        let kdists = self.k_distances(&object_ids)?;
        self.refresh_node(ROOT_PAGE_ID, &kdists, RefreshMode::Verify)?;
        Ok(())
    }

    pub fn statistics(&self) -> IndexResult<TreeStatistics> {
        Ok(TreeStatistics {
            reverse_knn_queries: self.reverse_knn_queries.load(Ordering::Relaxed),
            ..self.mtree.statistics()?
        })
    }

    pub fn log_statistics(&self) -> IndexResult<()> {
        log_tree_statistics("MkApp-tree", &self.statistics()?);
        Ok(())
    }
}

/// Drops the first occurrence of `object_id` from `list` and returns the
/// next `k_max` distances, padded with the last one.
fn k_distances_excluding(object_id: ObjectId, list: &KnnList, k_max: usize) -> Vec<f64> {
    let mut skipped = false;
    let mut distances: Vec<f64> = list
        .iter()
        .filter(|pair| {
            if !skipped && pair.id == object_id {
                skipped = true;
                return false;
            }
            true
        })
        .take(k_max)
        .map(|pair| pair.distance)
        .collect();
    let last = distances.last().copied().unwrap_or(0.0);
    distances.resize(k_max, last);
    distances
}

fn check_approximation(
    page_id: PageId,
    entry: &Entry,
    expected: &PolynomialApproximation,
) -> IndexResult<()> {
    let stored = entry.approximation().ok_or_else(|| {
        IndexError::IntegrityViolation(format!(
            "entry in node {} has no approximation",
            page_id
        ))
    })?;
    let matches = stored.coefficients().len() == expected.coefficients().len()
        && stored
            .coefficients()
            .iter()
            .zip(expected.coefficients())
            .all(|(a, b)| a == b || (a - b).abs() <= 1e-9 * (1.0 + b.abs()));
    if !matches {
        return Err(IndexError::IntegrityViolation(format!(
            "entry in node {}: stored approximation {:?}, recomputed {:?}",
            page_id,
            stored.coefficients(),
            expected.coefficients()
        )));
    }
    Ok(())
}

impl<Q, S> MetricIndex for MkAppTree<Q, S>
where
    Q: DistanceQuery,
    S: PageStore,
{
    type Object = Q::Object;

    fn knn(&self, object: &Q::Object, k: usize) -> IndexResult<KnnList> {
        self.mtree.knn(object, k)
    }

    fn knn_by_id(&self, object_id: ObjectId, k: usize) -> IndexResult<KnnList> {
        self.mtree.knn_by_id(object_id, k)
    }

    fn range(&self, object: &Q::Object, radius: f64) -> IndexResult<Vec<DistanceResultPair>> {
        self.mtree.range(object, radius)
    }

    fn range_by_id(&self, object_id: ObjectId, radius: f64) -> IndexResult<Vec<DistanceResultPair>> {
        self.mtree.range_by_id(object_id, radius)
    }

    fn size(&self) -> IndexResult<u64> {
        self.mtree.size()
    }

    fn log_statistics(&self) -> IndexResult<()> {
        MkAppTree::log_statistics(self)
    }
}
