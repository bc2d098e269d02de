//! Page store abstraction and the in-memory store.
//!
//! A page store owns serialized nodes addressed by page id. Trees never see
//! raw bytes: node encoding, id allocation and eviction are the store's
//! concern. Reading a page id is idempotent and `write` is the only mutation
//! entry point.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::header::TreeIndexHeader;
use super::node::Node;
use super::tree_types::{IndexError, IndexResult, PageId, PageStoreStats};

/// Storage backend for tree nodes.
pub trait PageStore: Send + Sync {
    /// Registers the geometry of the tree using this store.
    ///
    /// Returns `true` on first use. On an already initialized store the
    /// stored geometry must match `header`, otherwise the call fails with
    /// [`IndexError::HeaderMismatch`].
    fn initialize(&self, header: &TreeIndexHeader) -> IndexResult<bool>;

    /// Reads the node stored under `page_id`.
    fn read(&self, page_id: PageId) -> IndexResult<Node>;

    /// Writes `node`, assigning it a page id first if it has none.
    fn write(&self, node: &mut Node) -> IndexResult<PageId>;

    /// Releases a page; its id may be handed out again by a later write.
    fn delete(&self, page_id: PageId) -> IndexResult<()>;

    fn page_size(&self) -> usize;

    /// Current header, including free-list length and highest used page id.
    fn header(&self) -> Option<TreeIndexHeader>;

    /// Makes all written pages durable.
    fn flush(&self) -> IndexResult<()> {
        Ok(())
    }

    fn stats(&self) -> PageStoreStats;
}

// ============================================================================
// Page Allocation
// ============================================================================

/// Hands out page ids, reusing released ids before growing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageAllocator {
    next_page_id: PageId,
    /// Released ids, reused last in first out.
    free_pages: Vec<PageId>,
    free_set: HashSet<PageId>,
}

impl PageAllocator {
    pub fn new(next_page_id: PageId, free_pages: Vec<PageId>) -> Self {
        let free_set = free_pages.iter().copied().collect();
        Self {
            next_page_id,
            free_pages,
            free_set,
        }
    }

    pub fn allocate(&mut self) -> PageId {
        if let Some(page_id) = self.free_pages.pop() {
            self.free_set.remove(&page_id);
            return page_id;
        }
        let page_id = self.next_page_id;
        self.next_page_id += 1;
        page_id
    }

    pub fn release(&mut self, page_id: PageId) -> IndexResult<()> {
        if !self.is_live(page_id) {
            return Err(IndexError::PageNotFound(page_id));
        }
        self.free_pages.push(page_id);
        self.free_set.insert(page_id);
        Ok(())
    }

    pub fn is_live(&self, page_id: PageId) -> bool {
        page_id < self.next_page_id && !self.free_set.contains(&page_id)
    }

    pub fn next_page_id(&self) -> PageId {
        self.next_page_id
    }

    pub fn highest_used_page_id(&self) -> PageId {
        self.next_page_id.saturating_sub(1)
    }

    pub fn free_pages(&self) -> &[PageId] {
        &self.free_pages
    }
}

/// Size of the free-page list once encoded (length prefix plus ids), 0 if empty.
pub fn free_list_byte_length(free_pages: &[PageId]) -> u32 {
    if free_pages.is_empty() {
        0
    } else {
        (8 + 8 * free_pages.len()) as u32
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// Keeps every node in a hash map. Useful for tests and transient indexes.
pub struct MemoryPageStore {
    page_size: usize,
    inner: RwLock<MemoryStoreInner>,
    page_reads: AtomicU64,
    page_writes: AtomicU64,
}

#[derive(Default)]
struct MemoryStoreInner {
    header: Option<TreeIndexHeader>,
    pages: HashMap<PageId, Node>,
    allocator: PageAllocator,
}

impl MemoryPageStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            inner: RwLock::new(MemoryStoreInner::default()),
            page_reads: AtomicU64::new(0),
            page_writes: AtomicU64::new(0),
        }
    }

    /// Number of live pages.
    pub fn len(&self) -> usize {
        self.inner.read().pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().pages.is_empty()
    }
}

impl PageStore for MemoryPageStore {
    fn initialize(&self, header: &TreeIndexHeader) -> IndexResult<bool> {
        let mut inner = self.inner.write();
        match &inner.header {
            Some(stored) => {
                stored.validate_geometry(header)?;
                Ok(false)
            }
            None => {
                inner.header = Some(*header);
                Ok(true)
            }
        }
    }

    fn read(&self, page_id: PageId) -> IndexResult<Node> {
        self.page_reads.fetch_add(1, Ordering::Relaxed);
        self.inner
            .read()
            .pages
            .get(&page_id)
            .cloned()
            .ok_or(IndexError::PageNotFound(page_id))
    }

    fn write(&self, node: &mut Node) -> IndexResult<PageId> {
        let mut inner = self.inner.write();
        let page_id = match node.page_id() {
            Some(page_id) if inner.allocator.is_live(page_id) => page_id,
            Some(page_id) => return Err(IndexError::PageNotFound(page_id)),
            None => inner.allocator.allocate(),
        };
        node.set_page_id(Some(page_id));
        inner.pages.insert(page_id, node.clone());
        self.page_writes.fetch_add(1, Ordering::Relaxed);
        Ok(page_id)
    }

    fn delete(&self, page_id: PageId) -> IndexResult<()> {
        let mut inner = self.inner.write();
        inner.allocator.release(page_id)?;
        inner.pages.remove(&page_id);
        Ok(())
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn header(&self) -> Option<TreeIndexHeader> {
        let inner = self.inner.read();
        inner.header.map(|mut header| {
            header.highest_used_page_id = inner.allocator.highest_used_page_id();
            header.free_list_byte_length = free_list_byte_length(inner.allocator.free_pages());
            header
        })
    }

    fn stats(&self) -> PageStoreStats {
        PageStoreStats {
            page_reads: self.page_reads.load(Ordering::Relaxed),
            page_writes: self.page_writes.load(Ordering::Relaxed),
            ..PageStoreStats::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::entry::LeafEntry;

    fn header() -> TreeIndexHeader {
        TreeIndexHeader::new(4096, 10, 20, 4, 8).unwrap()
    }

    #[test]
    fn test_allocator_reuses_released_ids() {
        let mut allocator = PageAllocator::default();
        assert_eq!(allocator.allocate(), 0);
        assert_eq!(allocator.allocate(), 1);
        assert_eq!(allocator.allocate(), 2);

        allocator.release(1).unwrap();
        assert!(!allocator.is_live(1));
        assert_eq!(allocator.allocate(), 1);
        assert_eq!(allocator.allocate(), 3);
        assert_eq!(allocator.highest_used_page_id(), 3);
    }

    #[test]
    fn test_allocator_liveness_with_many_free_pages() {
        let mut allocator = PageAllocator::new(10_000, (0..10_000).step_by(2).collect());
        assert_eq!(allocator.free_pages().len(), 5_000);
        assert!(!allocator.is_live(4));
        assert!(allocator.is_live(5));
        assert!(!allocator.is_live(10_000));

        assert_eq!(allocator.allocate(), 9_998);
        assert!(allocator.is_live(9_998));
        allocator.release(9_999).unwrap();
        assert!(!allocator.is_live(9_999));
        assert!(allocator.release(9_999).is_err());
        assert_eq!(allocator.allocate(), 9_999);
        assert_eq!(allocator.allocate(), 9_996);
        assert_eq!(allocator.free_pages().len(), 4_998);
    }

    #[test]
    fn test_allocator_rejects_unknown_release() {
        let mut allocator = PageAllocator::default();
        allocator.allocate();
        assert!(matches!(
            allocator.release(5),
            Err(IndexError::PageNotFound(5))
        ));
        allocator.release(0).unwrap();
        assert!(allocator.release(0).is_err());
    }

    #[test]
    fn test_memory_store_initialize() {
        let store = MemoryPageStore::new(4096);
        assert!(store.initialize(&header()).unwrap());
        assert!(!store.initialize(&header()).unwrap());

        let mut other = header();
        other.leaf_capacity = 21;
        assert!(matches!(
            store.initialize(&other),
            Err(IndexError::HeaderMismatch { .. })
        ));
    }

    #[test]
    fn test_memory_store_write_assigns_ids() {
        let store = MemoryPageStore::new(4096);
        let mut node = Node::new_leaf(4);
        node.add_leaf_entry(LeafEntry::new(9, 0.0)).unwrap();

        let page_id = store.write(&mut node).unwrap();
        assert_eq!(page_id, 0);
        assert_eq!(node.page_id(), Some(0));

        let read = store.read(0).unwrap();
        assert_eq!(read, node);
        assert_eq!(store.stats().page_reads, 1);
        assert_eq!(store.stats().page_writes, 1);
    }

    #[test]
    fn test_memory_store_delete() {
        let store = MemoryPageStore::new(4096);
        store.initialize(&header()).unwrap();
        let mut a = Node::new_leaf(4);
        let mut b = Node::new_leaf(4);
        store.write(&mut a).unwrap();
        store.write(&mut b).unwrap();

        store.delete(0).unwrap();
        assert!(matches!(store.read(0), Err(IndexError::PageNotFound(0))));
        assert_eq!(store.len(), 1);

        // A stale node can no longer be written under its released id.
        assert!(store.write(&mut a).is_err());

        let mut c = Node::new_leaf(4);
        assert_eq!(store.write(&mut c).unwrap(), 0);

        let header = store.header().unwrap();
        assert_eq!(header.highest_used_page_id, 1);
        assert_eq!(header.free_list_byte_length, 0);
    }
}
