//! Constants for the page-backed index trees.

use super::tree_types::PageId;

/// Default page size (4KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default cache size in number of pages (4MB with 4KB pages)
pub const DEFAULT_CACHE_PAGES: usize = 1024;

/// Minimum fill before a node counts as underfull (40% of usable slots)
pub const DEFAULT_MIN_FILL_RATIO: f64 = 0.4;

/// Below this many usable slots a page size is legal but wasteful
pub const MIN_EFFICIENT_CAPACITY: usize = 10;

/// The root always lives on this page
pub const ROOT_PAGE_ID: PageId = 0;

/// Tolerance used when integrity checks compare recomputed distances
pub const INTEGRITY_EPSILON: f64 = 1e-9;
