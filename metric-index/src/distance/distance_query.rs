//! Distance queries: a distance function bound to an object store.

use std::sync::atomic::{AtomicU64, Ordering};

use super::functions::DistanceFunction;
use super::relation::{IdMapping, RangeIdMapping, VectorRelation};
use crate::tree::{IndexError, IndexResult, ObjectId};

/// Resolves object ids and measures distances between objects.
///
/// Trees only ever see object ids; this trait is how they reach the objects.
pub trait DistanceQuery: Send + Sync {
    type Object: ?Sized;

    fn object(&self, id: ObjectId) -> IndexResult<&Self::Object>;

    fn distance(&self, a: &Self::Object, b: &Self::Object) -> f64;

    /// Number of distance computations performed so far.
    fn computations(&self) -> u64;

    fn distance_by_id(&self, a: ObjectId, b: ObjectId) -> IndexResult<f64> {
        Ok(self.distance(self.object(a)?, self.object(b)?))
    }

    fn distance_to_object(&self, id: ObjectId, object: &Self::Object) -> IndexResult<f64> {
        Ok(self.distance(self.object(id)?, object))
    }

    /// Rejects query objects that cannot be compared with stored ones.
    fn check_object(&self, _object: &Self::Object) -> IndexResult<()> {
        Ok(())
    }
}

/// Distance query over a [`VectorRelation`].
pub struct VectorDistanceQuery<D: DistanceFunction, M: IdMapping = RangeIdMapping> {
    relation: VectorRelation<M>,
    function: D,
    computations: AtomicU64,
}

impl<D: DistanceFunction, M: IdMapping> VectorDistanceQuery<D, M> {
    pub fn new(relation: VectorRelation<M>, function: D) -> Self {
        Self {
            relation,
            function,
            computations: AtomicU64::new(0),
        }
    }

    pub fn relation(&self) -> &VectorRelation<M> {
        &self.relation
    }

    pub fn function(&self) -> &D {
        &self.function
    }
}

impl<D: DistanceFunction, M: IdMapping> DistanceQuery for VectorDistanceQuery<D, M> {
    type Object = [f64];

    fn object(&self, id: ObjectId) -> IndexResult<&[f64]> {
        self.relation.get(id)
    }

    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        self.computations.fetch_add(1, Ordering::Relaxed);
        self.function.distance(a, b)
    }

    fn computations(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }

    fn check_object(&self, object: &[f64]) -> IndexResult<()> {
        if !self.relation.is_empty() && object.len() != self.relation.dimensionality() {
            return Err(IndexError::InvalidArgument(format!(
                "query has {} dimensions, stored vectors have {}",
                object.len(),
                self.relation.dimensionality()
            )));
        }
        Ok(())
    }
}
