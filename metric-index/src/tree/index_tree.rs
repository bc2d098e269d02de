//! Generic page-backed index tree.
//!
//! `IndexTree` owns the page store and the tree geometry. It sizes nodes from
//! a representative entry, bootstraps an empty root on first use, and resolves
//! nodes by page id, keeping the root cached separately from the store.

use std::sync::Arc;

use parking_lot::RwLock;

use super::entry::{DirectoryEntry, Entry, LeafEntry};
use super::file_store::PageWithChecksum;
use super::header::TreeIndexHeader;
use super::node::Node;
use super::page_store::PageStore;
use super::path::{BreadthFirstEnumeration, IndexTreePath};
use super::tree_constants::{MIN_EFFICIENT_CAPACITY, ROOT_PAGE_ID};
use super::tree_types::{IndexError, IndexResult, PageId};

/// Extension points invoked by tree mutations. Both default to no-ops.
pub trait TreeHooks: Send + Sync {
    /// Runs before a leaf entry is added. An error aborts the insertion
    /// before the tree is touched.
    fn pre_insert(&self, _entry: &LeafEntry) -> IndexResult<()> {
        Ok(())
    }

    /// Runs after a leaf entry has been removed.
    fn post_delete(&self, _entry: &LeafEntry) -> IndexResult<()> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl TreeHooks for NoHooks {}

/// Representative entries used to size leaf and directory pages. Every entry
/// later stored must encode to at most the size of its representative.
#[derive(Debug, Clone)]
pub struct EntryLayout {
    pub leaf: LeafEntry,
    pub directory: DirectoryEntry,
}

fn encoded_len<T: serde::Serialize>(value: &T) -> IndexResult<usize> {
    bincode::serde::encode_to_vec(value, bincode::config::legacy())
        .map(|bytes| bytes.len())
        .map_err(|e| IndexError::Serialization(e.to_string()))
}

/// Computes how many entries of `representative`'s size fit in a page,
/// plus one overflow slot.
///
/// Fails with [`IndexError::PageSizeTooSmall`] when fewer than two entries fit.
pub fn compute_capacity(page_size: usize, empty: &Node, representative: &Entry) -> IndexResult<usize> {
    let mut empty = empty.clone();
    empty.set_page_id(Some(PageId::MAX));
    let overhead = PageWithChecksum::OVERHEAD + encoded_len(&empty)?;
    let entry_size = encoded_len(representative)?;

    let usable = page_size.saturating_sub(overhead) / entry_size;
    if usable < 2 {
        return Err(IndexError::PageSizeTooSmall {
            page_size,
            entry_size,
        });
    }
    if usable < MIN_EFFICIENT_CAPACITY {
        log::warn!(
            "Page size {} holds only {} entries of {} bytes; consider a larger page size",
            page_size,
            usable,
            entry_size
        );
    }
    Ok(usable + 1)
}

fn minimum_entries(capacity: usize, min_fill_ratio: f64) -> usize {
    let usable = capacity - 1;
    ((usable as f64 * min_fill_ratio).floor() as usize).clamp(1, usable / 2)
}

pub struct IndexTree<S: PageStore> {
    store: S,
    header: TreeIndexHeader,
    root: RwLock<Option<Node>>,
}

impl<S: PageStore> IndexTree<S> {
    /// Opens a tree over `store`, creating an empty root on first use.
    ///
    /// On a store that already holds a tree, the stored header must match
    /// the geometry computed from `layout`.
    pub fn open(store: S, layout: &EntryLayout, min_fill_ratio: f64) -> IndexResult<Self> {
        if !(min_fill_ratio > 0.0 && min_fill_ratio <= 0.5) {
            return Err(IndexError::InvalidArgument(format!(
                "minimum fill ratio {} outside (0, 0.5]",
                min_fill_ratio
            )));
        }
        let page_size = store.page_size();
        let leaf_capacity = compute_capacity(
            page_size,
            &Node::new_leaf(0),
            &Entry::Leaf(layout.leaf.clone()),
        )?;
        let directory_capacity = compute_capacity(
            page_size,
            &Node::new_directory(0),
            &Entry::Directory(layout.directory.clone()),
        )?;
        let header = TreeIndexHeader::new(
            page_size,
            directory_capacity,
            leaf_capacity,
            minimum_entries(directory_capacity, min_fill_ratio),
            minimum_entries(leaf_capacity, min_fill_ratio),
        )?;

        let tree = Self {
            store,
            header,
            root: RwLock::new(None),
        };

        if tree.store.initialize(&header)? {
            tree.create_empty_root()?;
            log::debug!(
                "Created index tree: page size {}, directory capacity {}, leaf capacity {}",
                page_size,
                directory_capacity,
                leaf_capacity
            );
        } else {
            tree.get_node(ROOT_PAGE_ID)?;
            log::debug!(
                "Reopened index tree with {} pages",
                tree.store
                    .header()
                    .map(|h| h.highest_used_page_id + 1)
                    .unwrap_or_default()
            );
        }
        Ok(tree)
    }

    fn create_empty_root(&self) -> IndexResult<()> {
        let mut root = self.create_leaf_node();
        let page_id = self.write_node(&mut root)?;
        if page_id != ROOT_PAGE_ID {
            return Err(IndexError::IntegrityViolation(format!(
                "empty root landed on page {} instead of {}",
                page_id, ROOT_PAGE_ID
            )));
        }
        Ok(())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn header(&self) -> &TreeIndexHeader {
        &self.header
    }

    pub fn leaf_capacity(&self) -> usize {
        self.header.leaf_capacity as usize
    }

    pub fn directory_capacity(&self) -> usize {
        self.header.directory_capacity as usize
    }

    pub fn leaf_minimum(&self) -> usize {
        self.header.leaf_minimum as usize
    }

    pub fn directory_minimum(&self) -> usize {
        self.header.directory_minimum as usize
    }

    pub fn create_leaf_node(&self) -> Node {
        Node::new_leaf(self.leaf_capacity())
    }

    pub fn create_directory_node(&self) -> Node {
        Node::new_directory(self.directory_capacity())
    }

    pub fn get_node(&self, page_id: PageId) -> IndexResult<Node> {
        if page_id == ROOT_PAGE_ID {
            if let Some(root) = self.root.read().as_ref() {
                return Ok(root.clone());
            }
            let root = self.store.read(ROOT_PAGE_ID)?;
            *self.root.write() = Some(root.clone());
            return Ok(root);
        }
        self.store.read(page_id)
    }

    /// Writes a node through the store, assigning a page id if it has none.
    pub fn write_node(&self, node: &mut Node) -> IndexResult<PageId> {
        let page_id = self.store.write(node)?;
        if page_id == ROOT_PAGE_ID {
            *self.root.write() = Some(node.clone());
        }
        Ok(page_id)
    }

    pub fn delete_node(&self, page_id: PageId) -> IndexResult<()> {
        if page_id == ROOT_PAGE_ID {
            return Err(IndexError::InvalidArgument(
                "the root page cannot be deleted".into(),
            ));
        }
        self.store.delete(page_id)
    }

    /// The synthetic entry pointing at the root node.
    pub fn root_entry(&self) -> DirectoryEntry {
        DirectoryEntry::root(ROOT_PAGE_ID)
    }

    pub fn root_path(&self) -> Arc<IndexTreePath> {
        IndexTreePath::root(Entry::Directory(self.root_entry()))
    }

    pub fn breadth_first(&self) -> BreadthFirstEnumeration<'_, S> {
        BreadthFirstEnumeration::new(self, self.root_path())
    }

    pub fn flush(&self) -> IndexResult<()> {
        self.store.flush()
    }
}
