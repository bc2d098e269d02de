//! Page-backed index tree engine.
//!
//! This module provides the generic machinery shared by every tree variant:
//! - Leaf/directory entries held in fixed-capacity nodes
//! - Capacity sizing from a representative entry and the page size
//! - A persisted header describing the node geometry
//! - Page stores (in-memory, file-backed, LRU write-back cache)
//! - Level-order path enumeration
//!
//! Nodes are never loaded in bulk; every access goes through a page store.

pub mod entry;
pub mod file_store;
pub mod header;
pub mod index_tree;
pub mod node;
pub mod page_cache;
pub mod page_store;
pub mod path;
pub mod tree_constants;
pub mod tree_types;

pub use entry::{DirectoryEntry, Entry, LeafEntry};
pub use file_store::{FilePageStore, PageWithChecksum};
pub use header::{TreeIndexHeader, HEADER_ENCODED_SIZE};
pub use index_tree::{compute_capacity, EntryLayout, IndexTree, NoHooks, TreeHooks};
pub use node::Node;
pub use page_cache::{CachedPageStore, PageCache};
pub use page_store::{MemoryPageStore, PageAllocator, PageStore};
pub use path::{BreadthFirstEnumeration, IndexTreePath};
pub use tree_constants::{DEFAULT_CACHE_PAGES, DEFAULT_MIN_FILL_RATIO, DEFAULT_PAGE_SIZE, ROOT_PAGE_ID};
pub use tree_types::{IndexError, IndexResult, ObjectId, PageId, PageStoreStats, TreeStatistics};
