//! Bounded KNN heap with exact tie semantics, and the finished KNN list.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::tree::ObjectId;

/// One search result: an object and its distance to the query.
///
/// Ordered by distance, then by id, so equal distances sort deterministically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceResultPair {
    pub distance: f64,
    pub id: ObjectId,
}

impl DistanceResultPair {
    pub fn new(distance: f64, id: ObjectId) -> Self {
        Self { distance, id }
    }
}

impl Eq for DistanceResultPair {}

impl PartialOrd for DistanceResultPair {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DistanceResultPair {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Keeps the `k` closest candidates seen so far plus every candidate tied
/// with the current k-th distance.
///
/// The tie buffer only ever holds items whose distance equals the heap's
/// top distance. `size()` may therefore exceed `k`.
#[derive(Debug, Clone)]
pub struct KnnHeap {
    k: usize,
    heap: BinaryHeap<DistanceResultPair>,
    ties: Vec<DistanceResultPair>,
}

impl KnnHeap {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
            ties: Vec::new(),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Offers a candidate and returns the current k-th distance
    /// (`+inf` while fewer than `k` candidates are held).
    pub fn insert(&mut self, distance: f64, id: ObjectId) -> f64 {
        if self.k == 0 {
            return f64::INFINITY;
        }
        let candidate = DistanceResultPair::new(distance, id);
        if self.heap.len() < self.k {
            self.heap.push(candidate);
            return self.kth_distance();
        }

        let worst = self.kth_distance();
        if distance < worst {
            self.heap.push(candidate);
            if let Some(evicted) = self.heap.pop() {
                if self.kth_distance() == evicted.distance {
                    self.ties.push(evicted);
                } else {
                    self.ties.clear();
                }
            }
        } else if distance == worst {
            self.ties.push(candidate);
        }
        self.kth_distance()
    }

    pub fn kth_distance(&self) -> f64 {
        if self.heap.len() < self.k {
            return f64::INFINITY;
        }
        self.heap
            .peek()
            .map(|top| top.distance)
            .unwrap_or(f64::INFINITY)
    }

    /// Heap occupancy plus tie-buffer occupancy.
    pub fn size(&self) -> usize {
        self.heap.len() + self.ties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Consumes the heap into an ascending list.
    pub fn finalize(self) -> KnnList {
        let mut items = self.heap.into_vec();
        items.extend(self.ties);
        items.sort_unstable();
        KnnList { k: self.k, items }
    }
}

/// Ascending `(distance, id)` result of a KNN search. Ties at the k-th
/// distance are kept, so `len()` may exceed `k()`.
#[derive(Debug, Clone, PartialEq)]
pub struct KnnList {
    k: usize,
    items: Vec<DistanceResultPair>,
}

impl KnnList {
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DistanceResultPair> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[DistanceResultPair] {
        &self.items
    }

    /// Distance of the k-th result, `+inf` when fewer than `k` were found.
    pub fn kth_distance(&self) -> f64 {
        match self.k.checked_sub(1).and_then(|i| self.items.get(i)) {
            Some(pair) => pair.distance,
            None => f64::INFINITY,
        }
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.items.iter().map(|p| p.id).collect()
    }

    pub fn distances(&self) -> Vec<f64> {
        self.items.iter().map(|p| p.distance).collect()
    }

    /// Drops boundary ties beyond `k`; among equal distances the smaller
    /// ids are kept.
    pub fn truncate_to_k(mut self) -> Self {
        self.items.truncate(self.k);
        self
    }
}

impl IntoIterator for KnnList {
    type Item = DistanceResultPair;
    type IntoIter = std::vec::IntoIter<DistanceResultPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a KnnList {
    type Item = &'a DistanceResultPair;
    type IntoIter = std::slice::Iter<'a, DistanceResultPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
