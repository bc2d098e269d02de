//! Core types shared by every layer of the index engine.
//!
//! This module defines:
//! - The error type and result alias used throughout the crate
//! - Page and object identifier aliases
//! - Statistics snapshots reported by page stores and trees

use std::io;
use thiserror::Error;

/// Page ID - opaque, stable identifier of one serialized node
pub type PageId = u64;

/// Object ID - stable identifier of an indexed object
pub type ObjectId = u64;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur in index tree operations
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Page size {page_size} too small: entries of {entry_size} bytes leave fewer than 2 usable slots")]
    PageSizeTooSmall { page_size: usize, entry_size: usize },

    #[error("Node type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Node overflow: capacity {capacity} exhausted")]
    NodeOverflow { capacity: usize },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Header mismatch for {field}: stored {stored}, expected {expected}")]
    HeaderMismatch {
        field: &'static str,
        stored: u64,
        expected: u64,
    },

    #[error("k = {k} exceeds the configured k_max = {k_max}")]
    KTooLarge { k: usize, k_max: usize },

    #[error("Unknown object id {0}")]
    UnknownObject(ObjectId),

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

// ============================================================================
// Statistics
// ============================================================================

/// Counters reported by a page store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStoreStats {
    pub page_reads: u64,
    pub page_writes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cached_pages: u64,
}

/// Snapshot of a tree's shape and the work it has done
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeStatistics {
    pub height: usize,
    pub directory_nodes: u64,
    pub leaf_nodes: u64,
    pub objects: u64,
    pub distance_computations: u64,
    pub knn_queries: u64,
    pub range_queries: u64,
    pub reverse_knn_queries: u64,
    pub store: PageStoreStats,
}
