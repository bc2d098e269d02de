//! Object storage keyed by stable object ids.

use std::collections::HashMap;

use crate::tree::{IndexError, IndexResult, ObjectId};

/// Maps object ids to dense storage offsets.
pub trait IdMapping: Send + Sync {
    fn offset(&self, id: ObjectId) -> Option<usize>;

    fn id_at(&self, offset: usize) -> Option<ObjectId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Contiguous id range `start..start + len`; O(1) arithmetic lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeIdMapping {
    start: ObjectId,
    len: usize,
}

impl RangeIdMapping {
    pub fn new(start: ObjectId, len: usize) -> Self {
        Self { start, len }
    }
}

impl IdMapping for RangeIdMapping {
    fn offset(&self, id: ObjectId) -> Option<usize> {
        let offset = id.checked_sub(self.start)? as usize;
        (offset < self.len).then_some(offset)
    }

    fn id_at(&self, offset: usize) -> Option<ObjectId> {
        (offset < self.len).then(|| self.start + offset as ObjectId)
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Arbitrary id sets.
#[derive(Debug, Clone, Default)]
pub struct HashIdMapping {
    offsets: HashMap<ObjectId, usize>,
    ids: Vec<ObjectId>,
}

impl HashIdMapping {
    /// Builds a mapping in iteration order. Duplicate ids are rejected.
    pub fn new(ids: impl IntoIterator<Item = ObjectId>) -> IndexResult<Self> {
        let mut mapping = Self::default();
        for id in ids {
            if mapping.offsets.insert(id, mapping.ids.len()).is_some() {
                return Err(IndexError::InvalidArgument(format!(
                    "object id {} appears twice",
                    id
                )));
            }
            mapping.ids.push(id);
        }
        Ok(mapping)
    }
}

impl IdMapping for HashIdMapping {
    fn offset(&self, id: ObjectId) -> Option<usize> {
        self.offsets.get(&id).copied()
    }

    fn id_at(&self, offset: usize) -> Option<ObjectId> {
        self.ids.get(offset).copied()
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// A column of equal-length vectors addressed by object id.
#[derive(Debug, Clone)]
pub struct VectorRelation<M: IdMapping = RangeIdMapping> {
    mapping: M,
    vectors: Vec<Vec<f64>>,
    dimensionality: usize,
}

impl VectorRelation<RangeIdMapping> {
    /// Assigns ids `start, start + 1, ...` in order.
    pub fn from_vectors(start: ObjectId, vectors: Vec<Vec<f64>>) -> IndexResult<Self> {
        let mapping = RangeIdMapping::new(start, vectors.len());
        Self::with_mapping(mapping, vectors)
    }
}

impl VectorRelation<HashIdMapping> {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (ObjectId, Vec<f64>)>) -> IndexResult<Self> {
        let (ids, vectors): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Self::with_mapping(HashIdMapping::new(ids)?, vectors)
    }
}

impl<M: IdMapping> VectorRelation<M> {
    pub fn with_mapping(mapping: M, vectors: Vec<Vec<f64>>) -> IndexResult<Self> {
        if mapping.len() != vectors.len() {
            return Err(IndexError::InvalidArgument(format!(
                "{} ids for {} vectors",
                mapping.len(),
                vectors.len()
            )));
        }
        let dimensionality = vectors.first().map(|v| v.len()).unwrap_or_default();
        if let Some(bad) = vectors.iter().position(|v| v.len() != dimensionality) {
            return Err(IndexError::InvalidArgument(format!(
                "vector at offset {} has {} dimensions, expected {}",
                bad,
                vectors[bad].len(),
                dimensionality
            )));
        }
        Ok(Self {
            mapping,
            vectors,
            dimensionality,
        })
    }

    pub fn get(&self, id: ObjectId) -> IndexResult<&[f64]> {
        self.mapping
            .offset(id)
            .and_then(|offset| self.vectors.get(offset))
            .map(|v| v.as_slice())
            .ok_or(IndexError::UnknownObject(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        (0..self.mapping.len()).filter_map(move |offset| self.mapping.id_at(offset))
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimensionality(&self) -> usize {
        self.dimensionality
    }
}
