//! Configuration for metric trees.

use crate::tree::tree_constants::{DEFAULT_CACHE_PAGES, DEFAULT_MIN_FILL_RATIO, DEFAULT_PAGE_SIZE};
use crate::tree::{IndexError, IndexResult};

/// How an overflowing node distributes its entries once the two promoted
/// objects are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitStrategy {
    /// Each entry goes to the nearer promoted object; the smaller side is
    /// then topped up to the minimum fill.
    #[default]
    Hyperplane,
    /// Entries are sorted by how much nearer they are to the first promoted
    /// object than to the second and cut in half.
    BalancedCut,
    /// The promoted objects take turns claiming their nearest unassigned entry.
    Alternating,
}

/// Tree settings. Build with [`TreeConfig::builder`].
#[derive(Debug, Clone, PartialEq)]
pub struct TreeConfig {
    page_size: usize,
    cache_pages: usize,
    min_fill_ratio: f64,
    split_strategy: SplitStrategy,
    extra_integrity_checks: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cache_pages: DEFAULT_CACHE_PAGES,
            min_fill_ratio: DEFAULT_MIN_FILL_RATIO,
            split_strategy: SplitStrategy::default(),
            extra_integrity_checks: false,
        }
    }
}

impl TreeConfig {
    pub fn builder() -> TreeConfigBuilder {
        TreeConfigBuilder::default()
    }

    /// Page size used when the tree creates its own store.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Pages held by the write-back cache of a file-backed tree.
    pub fn cache_pages(&self) -> usize {
        self.cache_pages
    }

    pub fn min_fill_ratio(&self) -> f64 {
        self.min_fill_ratio
    }

    pub fn split_strategy(&self) -> SplitStrategy {
        self.split_strategy
    }

    /// Whether every mutation is followed by a full integrity check.
    pub fn extra_integrity_checks(&self) -> bool {
        self.extra_integrity_checks
    }
}

/// Fluent builder for [`TreeConfig`].
///
/// The first invalid setting is remembered and reported by [`build`](Self::build).
#[derive(Debug, Default)]
pub struct TreeConfigBuilder {
    error: Option<IndexError>,
    config: TreeConfig,
}

impl TreeConfigBuilder {
    pub fn page_size(mut self, page_size: usize) -> Self {
        if page_size == 0 {
            self.fail("page size must be positive");
        }
        self.config.page_size = page_size;
        self
    }

    pub fn cache_pages(mut self, cache_pages: usize) -> Self {
        if cache_pages == 0 {
            self.fail("cache must hold at least one page");
        }
        self.config.cache_pages = cache_pages;
        self
    }

    /// Fraction of a node's usable slots below which it is underfull; in `(0, 0.5]`.
    pub fn min_fill_ratio(mut self, ratio: f64) -> Self {
        if !(ratio > 0.0 && ratio <= 0.5) {
            self.fail(&format!("minimum fill ratio {} outside (0, 0.5]", ratio));
        }
        self.config.min_fill_ratio = ratio;
        self
    }

    pub fn split_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.config.split_strategy = strategy;
        self
    }

    pub fn extra_integrity_checks(mut self, enabled: bool) -> Self {
        self.config.extra_integrity_checks = enabled;
        self
    }

    pub fn build(self) -> IndexResult<TreeConfig> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.config),
        }
    }

    fn fail(&mut self, message: &str) {
        if self.error.is_none() {
            self.error = Some(IndexError::InvalidArgument(message.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TreeConfig::builder().build().unwrap();
        assert_eq!(config.page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(config.cache_pages(), DEFAULT_CACHE_PAGES);
        assert_eq!(config.min_fill_ratio(), DEFAULT_MIN_FILL_RATIO);
        assert_eq!(config.split_strategy(), SplitStrategy::Hyperplane);
        assert!(!config.extra_integrity_checks());
        assert_eq!(config, TreeConfig::default());
    }

    #[test]
    fn test_builder_overrides() {
        let config = TreeConfig::builder()
            .page_size(1024)
            .cache_pages(16)
            .min_fill_ratio(0.3)
            .split_strategy(SplitStrategy::BalancedCut)
            .extra_integrity_checks(true)
            .build()
            .unwrap();
        assert_eq!(config.page_size(), 1024);
        assert_eq!(config.cache_pages(), 16);
        assert_eq!(config.min_fill_ratio(), 0.3);
        assert_eq!(config.split_strategy(), SplitStrategy::BalancedCut);
        assert!(config.extra_integrity_checks());
    }

    #[test]
    fn test_first_error_wins() {
        let result = TreeConfig::builder()
            .min_fill_ratio(0.8)
            .page_size(0)
            .build();
        match result {
            Err(IndexError::InvalidArgument(message)) => assert!(message.contains("fill ratio")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
