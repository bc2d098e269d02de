//! Distance functions and the object relations they are evaluated on.

pub mod distance_query;
pub mod functions;
pub mod relation;

pub use distance_query::{DistanceQuery, VectorDistanceQuery};
pub use functions::{
    BoundingBox, DistanceFunction, EuclideanDistance, ManhattanDistance, MaximumDistance,
    SpatialDistanceFunction,
};
pub use relation::{HashIdMapping, IdMapping, RangeIdMapping, VectorRelation};
