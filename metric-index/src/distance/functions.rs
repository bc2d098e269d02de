//! Distance functions over real vectors, and spatial lower bounds.

use serde::{Deserialize, Serialize};

/// A metric over `f64` vectors. Results are non-negative.
pub trait DistanceFunction: Send + Sync {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64;

    fn name(&self) -> &'static str;
}

/// A distance function that can also bound the distance from a query point
/// to anything inside an axis-aligned box.
pub trait SpatialDistanceFunction: DistanceFunction {
    /// Lower bound on `distance(query, x)` for every `x` inside `region`.
    fn min_distance(&self, region: &BoundingBox, query: &[f64]) -> f64;
}

/// Per-dimension gap between a point and a box (0 inside the box).
fn gaps<'a>(region: &'a BoundingBox, query: &'a [f64]) -> impl Iterator<Item = f64> + 'a {
    region
        .min
        .iter()
        .zip(region.max.iter())
        .zip(query.iter())
        .map(|((&lo, &hi), &q)| {
            if q < lo {
                lo - q
            } else if q > hi {
                q - hi
            } else {
                0.0
            }
        })
}

/// L2 distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanDistance;

impl DistanceFunction for EuclideanDistance {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len());
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            .sqrt()
    }

    fn name(&self) -> &'static str {
        "euclidean"
    }
}

impl SpatialDistanceFunction for EuclideanDistance {
    fn min_distance(&self, region: &BoundingBox, query: &[f64]) -> f64 {
        gaps(region, query).map(|g| g * g).sum::<f64>().sqrt()
    }
}

/// L1 distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManhattanDistance;

impl DistanceFunction for ManhattanDistance {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len());
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
    }

    fn name(&self) -> &'static str {
        "manhattan"
    }
}

impl SpatialDistanceFunction for ManhattanDistance {
    fn min_distance(&self, region: &BoundingBox, query: &[f64]) -> f64 {
        gaps(region, query).sum()
    }
}

/// L-infinity distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaximumDistance;

impl DistanceFunction for MaximumDistance {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len());
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max)
    }

    fn name(&self) -> &'static str {
        "maximum"
    }
}

impl SpatialDistanceFunction for MaximumDistance {
    fn min_distance(&self, region: &BoundingBox, query: &[f64]) -> f64 {
        gaps(region, query).fold(0.0, f64::max)
    }
}

// ============================================================================
// Bounding Box
// ============================================================================

/// Axis-aligned box in `d` dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl BoundingBox {
    /// The degenerate box around a single point.
    pub fn from_point(point: &[f64]) -> Self {
        Self {
            min: point.to_vec(),
            max: point.to_vec(),
        }
    }

    /// Smallest box enclosing all `points`; `None` when there are none.
    pub fn enclosing<'a>(points: impl IntoIterator<Item = &'a [f64]>) -> Option<Self> {
        let mut points = points.into_iter();
        let mut region = Self::from_point(points.next()?);
        for point in points {
            region.extend(point);
        }
        Some(region)
    }

    pub fn extend(&mut self, point: &[f64]) {
        for ((lo, hi), &x) in self.min.iter_mut().zip(self.max.iter_mut()).zip(point) {
            *lo = lo.min(x);
            *hi = hi.max(x);
        }
    }

    pub fn dimensionality(&self) -> usize {
        self.min.len()
    }

    pub fn contains(&self, point: &[f64]) -> bool {
        self.min
            .iter()
            .zip(self.max.iter())
            .zip(point)
            .all(|((&lo, &hi), &x)| lo <= x && x <= hi)
    }
}
