//! Configuration of the reverse-kNN tree.

use crate::tree::{IndexError, IndexResult};

/// How a directory entry's approximation is derived from its subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApproximationAggregation {
    /// Fit on the mean k-distance curve of all leaf objects below the entry.
    /// Cheap and tight, but not an upper bound: objects whose curve lies
    /// above the mean can be pruned wrongly.
    Mean,
    /// Coefficient-wise maximum of the children's approximations. Bounds
    /// every child curve from above, so pruning never loses a result the
    /// leaf approximations would keep.
    #[default]
    CoefficientMax,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MkAppConfig {
    k_max: usize,
    degree: usize,
    log_space: bool,
    aggregation: ApproximationAggregation,
    conservative_fit: bool,
}

impl MkAppConfig {
    /// Defaults: degree 2, log space, coefficient-max aggregation,
    /// conservative fit.
    pub fn builder(k_max: usize) -> MkAppConfigBuilder {
        MkAppConfigBuilder {
            config: MkAppConfig {
                k_max,
                degree: 2,
                log_space: true,
                aggregation: ApproximationAggregation::default(),
                conservative_fit: true,
            },
        }
    }

    /// Largest `k` reverse-kNN queries may ask for.
    pub fn k_max(&self) -> usize {
        self.k_max
    }

    /// Polynomial degree `p`; approximations hold `p + 1` coefficients.
    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn log_space(&self) -> bool {
        self.log_space
    }

    pub fn aggregation(&self) -> ApproximationAggregation {
        self.aggregation
    }

    pub fn conservative_fit(&self) -> bool {
        self.conservative_fit
    }
}

/// Fluent builder for [`MkAppConfig`]; `k_max` is validated by [`build`](Self::build).
#[derive(Debug)]
pub struct MkAppConfigBuilder {
    config: MkAppConfig,
}

impl MkAppConfigBuilder {
    pub fn degree(mut self, degree: usize) -> Self {
        self.config.degree = degree;
        self
    }

    pub fn log_space(mut self, log_space: bool) -> Self {
        self.config.log_space = log_space;
        self
    }

    pub fn aggregation(mut self, aggregation: ApproximationAggregation) -> Self {
        self.config.aggregation = aggregation;
        self
    }

    pub fn conservative_fit(mut self, conservative: bool) -> Self {
        self.config.conservative_fit = conservative;
        self
    }

    pub fn build(self) -> IndexResult<MkAppConfig> {
        if self.config.k_max == 0 {
            return Err(IndexError::InvalidArgument("k_max must be at least 1".into()));
        }
        Ok(self.config)
    }
}
