//! Leaf and directory entries stored inside tree nodes.

use serde::{Deserialize, Serialize};

use super::tree_types::{IndexError, IndexResult, ObjectId, PageId};
use crate::mkapp::PolynomialApproximation;

/// An entry in a leaf node: one indexed object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafEntry {
    pub object_id: ObjectId,
    /// Distance to the routing object of the enclosing node (0 inside the root).
    pub parent_distance: f64,
    /// Approximated k-distance curve, set only by the reverse-kNN tree.
    pub approximation: Option<PolynomialApproximation>,
}

impl LeafEntry {
    pub fn new(object_id: ObjectId, parent_distance: f64) -> Self {
        Self {
            object_id,
            parent_distance,
            approximation: None,
        }
    }
}

/// An entry in a directory node: a reference to a subtree.
///
/// `covering_radius` bounds the distance from `routing_object_id` to every
/// object stored below `child_page_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub child_page_id: PageId,
    /// `None` only for the synthetic entry describing the root.
    pub routing_object_id: Option<ObjectId>,
    pub covering_radius: f64,
    pub parent_distance: f64,
    pub approximation: Option<PolynomialApproximation>,
}

impl DirectoryEntry {
    pub fn new(
        child_page_id: PageId,
        routing_object_id: ObjectId,
        covering_radius: f64,
        parent_distance: f64,
    ) -> Self {
        Self {
            child_page_id,
            routing_object_id: Some(routing_object_id),
            covering_radius,
            parent_distance,
            approximation: None,
        }
    }

    /// The entry that points at the root node. It has no routing object and an
    /// unbounded covering radius.
    pub fn root(root_page_id: PageId) -> Self {
        Self {
            child_page_id: root_page_id,
            routing_object_id: None,
            covering_radius: f64::INFINITY,
            parent_distance: 0.0,
            approximation: None,
        }
    }

    pub fn routing_object(&self) -> IndexResult<ObjectId> {
        self.routing_object_id.ok_or_else(|| {
            IndexError::IntegrityViolation(format!(
                "directory entry for page {} has no routing object",
                self.child_page_id
            ))
        })
    }
}

/// A tagged tree entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Entry {
    Leaf(LeafEntry),
    Directory(DirectoryEntry),
}

impl Entry {
    pub fn is_leaf_entry(&self) -> bool {
        matches!(self, Entry::Leaf(_))
    }

    pub fn parent_distance(&self) -> f64 {
        match self {
            Entry::Leaf(e) => e.parent_distance,
            Entry::Directory(e) => e.parent_distance,
        }
    }

    pub fn set_parent_distance(&mut self, distance: f64) {
        match self {
            Entry::Leaf(e) => e.parent_distance = distance,
            Entry::Directory(e) => e.parent_distance = distance,
        }
    }

    /// Radius around the entry's object that encloses its content (0 for leaves).
    pub fn covering_radius(&self) -> f64 {
        match self {
            Entry::Leaf(_) => 0.0,
            Entry::Directory(e) => e.covering_radius,
        }
    }

    /// The object that represents this entry: the object itself for a leaf
    /// entry, the routing object for a directory entry.
    pub fn object_id(&self) -> IndexResult<ObjectId> {
        match self {
            Entry::Leaf(e) => Ok(e.object_id),
            Entry::Directory(e) => e.routing_object(),
        }
    }

    pub fn approximation(&self) -> Option<&PolynomialApproximation> {
        match self {
            Entry::Leaf(e) => e.approximation.as_ref(),
            Entry::Directory(e) => e.approximation.as_ref(),
        }
    }

    pub fn set_approximation(&mut self, approximation: Option<PolynomialApproximation>) {
        match self {
            Entry::Leaf(e) => e.approximation = approximation,
            Entry::Directory(e) => e.approximation = approximation,
        }
    }

    pub fn child_page_id(&self) -> Option<PageId> {
        match self {
            Entry::Leaf(_) => None,
            Entry::Directory(e) => Some(e.child_page_id),
        }
    }
}

impl From<LeafEntry> for Entry {
    fn from(entry: LeafEntry) -> Self {
        Entry::Leaf(entry)
    }
}

impl From<DirectoryEntry> for Entry {
    fn from(entry: DirectoryEntry) -> Self {
        Entry::Directory(entry)
    }
}
