//! LRU page cache and the caching page store built on it.
//!
//! The cache is an explicit service with a `get`/`put` interface. Pages are
//! loaded lazily: nothing enters the cache until it is first read or written.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::header::TreeIndexHeader;
use super::node::Node;
use super::page_store::PageStore;
use super::tree_types::{IndexResult, PageId, PageStoreStats};

/// A cached page with its data and dirty flag
struct CachedPage {
    node: Node,
    dirty: bool,
    /// Position in `lru_order`.
    stamp: u64,
}

/// LRU cache for tree pages
pub struct PageCache {
    pages: HashMap<PageId, CachedPage>,
    /// LRU order keyed by access stamp (first = oldest)
    lru_order: BTreeMap<u64, PageId>,
    clock: u64,
    max_pages: usize,
}

impl PageCache {
    pub fn new(max_pages: usize) -> Self {
        Self {
            pages: HashMap::new(),
            lru_order: BTreeMap::new(),
            clock: 0,
            max_pages: max_pages.max(1),
        }
    }

    /// Returns a copy of a cached page and marks it most recently used.
    pub fn get(&mut self, page_id: PageId) -> Option<Node> {
        let node = self.pages.get(&page_id)?.node.clone();
        self.touch(page_id);
        Some(node)
    }

    /// Caches a page. Returns the pages evicted to make room, with their
    /// dirty flags; dirty ones must be written back by the caller.
    pub fn put(&mut self, page_id: PageId, node: Node, dirty: bool) -> Vec<(PageId, Node, bool)> {
        let mut evicted = Vec::new();
        if let Some(cached) = self.pages.get_mut(&page_id) {
            cached.node = node;
            cached.dirty |= dirty;
            self.touch(page_id);
            return evicted;
        }
        while self.pages.len() >= self.max_pages {
            match self.evict_oldest() {
                Some(page) => evicted.push(page),
                None => break,
            }
        }
        self.insert_newest(page_id, node, dirty);
        evicted
    }

    /// Puts back an evicted dirty page whose write-back failed.
    ///
    /// Never evicts, so the cache may briefly exceed its capacity. A newer
    /// cached copy of the page wins but stays dirty.
    pub fn restore(&mut self, page_id: PageId, node: Node) {
        match self.pages.get_mut(&page_id) {
            Some(cached) => cached.dirty = true,
            None => self.insert_newest(page_id, node, true),
        }
    }

    pub fn evict_oldest(&mut self) -> Option<(PageId, Node, bool)> {
        while let Some((_, page_id)) = self.lru_order.pop_first() {
            if let Some(cached) = self.pages.remove(&page_id) {
                return Some((page_id, cached.node, cached.dirty));
            }
        }
        None
    }

    pub fn dirty_pages(&self) -> Vec<PageId> {
        self.pages
            .iter()
            .filter(|(_, cached)| cached.dirty)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Returns a dirty page's content and marks it clean.
    pub fn take_dirty(&mut self, page_id: PageId) -> Option<Node> {
        let cached = self.pages.get_mut(&page_id)?;
        if !cached.dirty {
            return None;
        }
        cached.dirty = false;
        Some(cached.node.clone())
    }

    pub fn remove(&mut self, page_id: PageId) -> Option<(Node, bool)> {
        let cached = self.pages.remove(&page_id)?;
        self.lru_order.remove(&cached.stamp);
        Some((cached.node, cached.dirty))
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.contains_key(&page_id)
    }

    pub fn is_dirty(&self, page_id: PageId) -> bool {
        self.pages.get(&page_id).is_some_and(|cached| cached.dirty)
    }

    fn next_stamp(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn insert_newest(&mut self, page_id: PageId, node: Node, dirty: bool) {
        let stamp = self.next_stamp();
        self.lru_order.insert(stamp, page_id);
        self.pages.insert(page_id, CachedPage { node, dirty, stamp });
    }

    fn touch(&mut self, page_id: PageId) {
        let stamp = self.next_stamp();
        if let Some(cached) = self.pages.get_mut(&page_id) {
            self.lru_order.remove(&cached.stamp);
            cached.stamp = stamp;
            self.lru_order.insert(stamp, page_id);
        }
    }
}

// ============================================================================
// Caching Store
// ============================================================================

/// Write-back LRU cache in front of another page store.
///
/// Writes to existing pages stay in memory until the page is evicted or the
/// store is flushed. Writes that need a fresh page id go straight through so
/// the inner store assigns the id.
pub struct CachedPageStore<S: PageStore> {
    inner: S,
    cache: Mutex<PageCache>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl<S: PageStore> CachedPageStore<S> {
    pub fn new(inner: S, cache_pages: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(PageCache::new(cache_pages)),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn cached_pages(&self) -> usize {
        self.cache.lock().len()
    }

    fn cache_page(&self, page_id: PageId, node: Node, dirty: bool) -> IndexResult<()> {
        let evicted = self.cache.lock().put(page_id, node, dirty);
        let mut pending = evicted
            .into_iter()
            .filter(|(_, _, dirty)| *dirty)
            .map(|(page_id, node, _)| (page_id, node));
        while let Some((evicted_id, mut node)) = pending.next() {
            if let Err(e) = self.inner.write(&mut node) {
                log::error!("Failed to write back evicted page {}: {}", evicted_id, e);
                let mut cache = self.cache.lock();
                cache.restore(evicted_id, node);
                for (page_id, node) in pending {
                    cache.restore(page_id, node);
                }
                return Err(e);
            }
        }
        Ok(())
    }
}

impl<S: PageStore> PageStore for CachedPageStore<S> {
    fn initialize(&self, header: &TreeIndexHeader) -> IndexResult<bool> {
        self.inner.initialize(header)
    }

    fn read(&self, page_id: PageId) -> IndexResult<Node> {
        if let Some(node) = self.cache.lock().get(page_id) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(node);
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        let node = self.inner.read(page_id)?;
        self.cache_page(page_id, node.clone(), false)?;
        Ok(node)
    }

    fn write(&self, node: &mut Node) -> IndexResult<PageId> {
        match node.page_id() {
            Some(page_id) => {
                self.cache_page(page_id, node.clone(), true)?;
                Ok(page_id)
            }
            None => {
                let page_id = self.inner.write(node)?;
                self.cache_page(page_id, node.clone(), false)?;
                Ok(page_id)
            }
        }
    }

    fn delete(&self, page_id: PageId) -> IndexResult<()> {
        self.cache.lock().remove(page_id);
        self.inner.delete(page_id)
    }

    fn page_size(&self) -> usize {
        self.inner.page_size()
    }

    fn header(&self) -> Option<TreeIndexHeader> {
        self.inner.header()
    }

    fn flush(&self) -> IndexResult<()> {
        let dirty = self.cache.lock().dirty_pages();
        for page_id in dirty {
            let node = self.cache.lock().take_dirty(page_id);
            if let Some(mut node) = node {
                if let Err(e) = self.inner.write(&mut node) {
                    self.cache.lock().restore(page_id, node);
                    return Err(e);
                }
            }
        }
        self.inner.flush()
    }

    fn stats(&self) -> PageStoreStats {
        PageStoreStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cached_pages: self.cached_pages() as u64,
            ..self.inner.stats()
        }
    }
}

impl<S: PageStore> Drop for CachedPageStore<S> {
    fn drop(&mut self) {
        // Best effort write-back on drop
        if let Err(e) = self.flush() {
            log::error!("Failed to write back cached pages: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::entry::LeafEntry;
    use crate::tree::tree_types::IndexError;
    use std::sync::atomic::AtomicBool;
    use crate::tree::file_store::FilePageStore;
    use crate::tree::page_store::MemoryPageStore;
    use tempfile::tempdir;

    fn node(id: u64) -> Node {
        let mut node = Node::new_leaf(4);
        node.add_leaf_entry(LeafEntry::new(id, 0.0)).unwrap();
        node
    }

    #[test]
    fn test_page_cache_new() {
        let cache = PageCache::new(10);
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_page_cache_put_and_get() {
        let mut cache = PageCache::new(10);
        assert!(cache.put(1, node(1), false).is_empty());
        assert!(cache.contains(1));
        assert_eq!(cache.get(1), Some(node(1)));
        assert!(cache.get(999).is_none());
    }

    #[test]
    fn test_page_cache_lru_eviction() {
        let mut cache = PageCache::new(3);
        cache.put(1, node(1), false);
        cache.put(2, node(2), true);
        cache.put(3, node(3), false);

        // Access page 1 to make it most recent
        let _ = cache.get(1);

        let evicted = cache.put(4, node(4), false);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].0, 2);
        assert!(evicted[0].2, "evicted page keeps its dirty flag");

        assert!(!cache.contains(2));
        assert!(cache.contains(1));
        assert!(cache.contains(3));
        assert!(cache.contains(4));
    }

    #[test]
    fn test_page_cache_put_existing_keeps_dirty() {
        let mut cache = PageCache::new(2);
        cache.put(1, node(1), true);
        cache.put(1, node(5), false);
        assert_eq!(cache.dirty_pages(), vec![1]);
        assert_eq!(cache.get(1), Some(node(5)));
    }

    #[test]
    fn test_page_cache_take_dirty() {
        let mut cache = PageCache::new(10);
        cache.put(1, node(1), true);
        cache.put(2, node(2), false);

        assert_eq!(cache.take_dirty(1), Some(node(1)));
        assert!(cache.take_dirty(1).is_none());
        assert!(cache.take_dirty(2).is_none());
        assert!(cache.dirty_pages().is_empty());
    }

    #[test]
    fn test_page_cache_remove() {
        let mut cache = PageCache::new(10);
        cache.put(1, node(1), true);
        let removed = cache.remove(1);
        assert_eq!(removed, Some((node(1), true)));
        assert_eq!(cache.len(), 0);
        assert!(cache.evict_oldest().is_none());
    }

    #[test]
    fn test_page_cache_lru_order_after_many_touches() {
        let mut cache = PageCache::new(4);
        for id in 0..4 {
            cache.put(id, node(id), false);
        }
        for _ in 0..100 {
            for id in [2, 0, 3] {
                let _ = cache.get(id);
            }
        }
        assert_eq!(cache.evict_oldest().map(|page| page.0), Some(1));
        assert_eq!(cache.evict_oldest().map(|page| page.0), Some(2));
        cache.remove(0);
        assert_eq!(cache.evict_oldest().map(|page| page.0), Some(3));
        assert!(cache.evict_oldest().is_none());
    }

    #[test]
    fn test_page_cache_restore() {
        let mut cache = PageCache::new(1);
        cache.put(1, node(1), true);
        let evicted = cache.put(2, node(2), false);
        assert_eq!(evicted[0].0, 1);

        cache.restore(1, evicted[0].1.clone());
        assert_eq!(cache.len(), 2);
        assert!(cache.is_dirty(1));
        assert_eq!(cache.evict_oldest().map(|page| page.0), Some(2));

        cache.put(1, node(7), false);
        cache.restore(1, node(1));
        assert_eq!(cache.get(1), Some(node(7)));
        assert!(cache.is_dirty(1));
    }

    /// Memory store whose writes fail while `failing` is set.
    struct FailingStore {
        inner: MemoryPageStore,
        failing: AtomicBool,
    }

    impl PageStore for FailingStore {
        fn initialize(&self, header: &TreeIndexHeader) -> IndexResult<bool> {
            self.inner.initialize(header)
        }

        fn read(&self, page_id: PageId) -> IndexResult<Node> {
            self.inner.read(page_id)
        }

        fn write(&self, node: &mut Node) -> IndexResult<PageId> {
            if self.failing.load(Ordering::Relaxed) {
                return Err(IndexError::Io(std::io::Error::other("disk full")));
            }
            self.inner.write(node)
        }

        fn delete(&self, page_id: PageId) -> IndexResult<()> {
            self.inner.delete(page_id)
        }

        fn page_size(&self) -> usize {
            self.inner.page_size()
        }

        fn header(&self) -> Option<TreeIndexHeader> {
            self.inner.header()
        }

        fn stats(&self) -> PageStoreStats {
            self.inner.stats()
        }
    }

    #[test]
    fn test_cached_store_keeps_pages_when_write_back_fails() {
        let store = CachedPageStore::new(
            FailingStore {
                inner: MemoryPageStore::new(4096),
                failing: AtomicBool::new(false),
            },
            2,
        );
        let mut pages: Vec<Node> = (0..3).map(node).collect();
        for page in pages.iter_mut() {
            store.write(page).unwrap();
        }
        // Pages 1 and 2 are cached; make both dirty.
        let mut updated = pages[1].clone();
        updated.add_leaf_entry(LeafEntry::new(42, 1.0)).unwrap();
        store.write(&mut updated).unwrap();
        store.write(&mut pages[2]).unwrap();

        store.inner().failing.store(true, Ordering::Relaxed);
        assert!(matches!(store.read(0), Err(IndexError::Io(_))));
        assert_eq!(store.read(1).unwrap(), updated);
        assert!(store.cache.lock().is_dirty(1));
        assert!(store.flush().is_err());

        store.inner().failing.store(false, Ordering::Relaxed);
        store.flush().unwrap();
        assert_eq!(store.inner().read(1).unwrap(), updated);
    }

    #[test]
    fn test_cached_store_hits_and_misses() {
        let store = CachedPageStore::new(MemoryPageStore::new(4096), 4);
        let mut n = node(1);
        let page_id = store.write(&mut n).unwrap();

        store.read(page_id).unwrap();
        store.read(page_id).unwrap();
        let stats = store.stats();
        assert_eq!(stats.cache_hits, 2);
        assert_eq!(stats.cache_misses, 0);
        assert_eq!(stats.cached_pages, 1);
    }

    #[test]
    fn test_cached_store_write_back_on_eviction() {
        let store = CachedPageStore::new(MemoryPageStore::new(4096), 2);
        let mut pages: Vec<Node> = (0..3).map(node).collect();
        for page in pages.iter_mut() {
            store.write(page).unwrap();
        }

        // Rewrite page 0 so it is dirty, then push it out of the cache.
        let mut updated = pages[0].clone();
        updated.add_leaf_entry(LeafEntry::new(42, 1.0)).unwrap();
        store.write(&mut updated).unwrap();
        assert_ne!(store.inner().read(0).unwrap(), updated);

        store.read(1).unwrap();
        store.read(2).unwrap();
        assert!(store.cached_pages() <= 2);
        assert_eq!(store.inner().read(0).unwrap(), updated);
    }

    #[test]
    fn test_cached_store_flush_writes_dirty_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cached.mtree");
        let header = TreeIndexHeader::new(1024, 10, 20, 4, 8).unwrap();

        {
            let store = CachedPageStore::new(FilePageStore::create(&path, 1024).unwrap(), 8);
            store.initialize(&header).unwrap();
            let mut n = node(1);
            store.write(&mut n).unwrap();
            n.add_leaf_entry(LeafEntry::new(2, 0.5)).unwrap();
            store.write(&mut n).unwrap();
            store.flush().unwrap();
        }

        let store = FilePageStore::open(&path).unwrap();
        let read = store.read(0).unwrap();
        assert_eq!(read.num_entries(), 2);
    }

    #[test]
    fn test_cached_store_delete_drops_cached_page() {
        let store = CachedPageStore::new(MemoryPageStore::new(4096), 4);
        let mut n = node(1);
        let page_id = store.write(&mut n).unwrap();
        store.delete(page_id).unwrap();
        assert_eq!(store.cached_pages(), 0);
        assert!(store.read(page_id).is_err());
    }
}
