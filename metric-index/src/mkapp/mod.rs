//! Reverse-kNN search with polynomial k-distance approximations.
//!
//! Each entry of an [`MkAppTree`] stores a [`PolynomialApproximation`] of the
//! k-distance curve `kdist(k), k = 1..k_max` of the objects below it. Reverse
//! queries prune subtrees whose approximated k-distance cannot reach the
//! query object.

pub mod approximation;
pub mod config;
pub mod mkapp_tree;

pub use approximation::{approximate_k_distances, PolynomialApproximation};
pub use config::{ApproximationAggregation, MkAppConfig, MkAppConfigBuilder};
pub use mkapp_tree::{BatchOnlyHooks, MkAppTree};
