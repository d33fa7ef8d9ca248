//! Flat, append-only vector index.
//!
//! Vectors live in one contiguous `f32` buffer; position `i` occupies
//! `data[i * dimension..(i + 1) * dimension]`. The index never reorders or removes
//! vectors, so a position handed out once stays valid for the lifetime of the store.

use crate::error::{DocvecError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct VecIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VecIndex {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(DocvecError::ZeroDimension);
        }
        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    /// Builds an index from row vectors, rejecting any row of the wrong length.
    pub fn from_vectors(dimension: usize, vectors: &[Vec<f32>]) -> Result<Self> {
        let mut index = Self::new(dimension)?;
        index.data.reserve(vectors.len() * dimension);
        for vector in vectors {
            index.add(vector)?;
        }
        Ok(index)
    }

    pub(crate) fn from_raw(dimension: usize, data: Vec<f32>) -> Result<Self> {
        if dimension == 0 {
            return Err(DocvecError::ZeroDimension);
        }
        if data.len() % dimension != 0 {
            return Err(DocvecError::corrupt(format!(
                "payload of {} floats is not a multiple of dimension {dimension}",
                data.len()
            )));
        }
        Ok(Self { dimension, data })
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(DocvecError::VecDimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// Copies every vector of `other` onto the end of this index, unchanged.
    pub fn append(&mut self, other: &VecIndex) -> Result<()> {
        if other.dimension != self.dimension {
            return Err(DocvecError::VecDimensionMismatch {
                expected: self.dimension,
                actual: other.dimension,
            });
        }
        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    #[must_use]
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start.checked_add(self.dimension)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension)
    }

    /// True when the vector at `position` is an all-zero placeholder for a failed embedding.
    #[must_use]
    pub fn is_zero_vector(&self, position: usize) -> bool {
        self.vector(position)
            .is_some_and(|vector| vector.iter().all(|value| *value == 0.0))
    }

    #[must_use]
    pub fn zero_count(&self) -> usize {
        self.iter()
            .filter(|vector| vector.iter().all(|value| *value == 0.0))
            .count()
    }

    pub(crate) fn raw(&self) -> &[f32] {
        &self.data
    }

    /// BLAKE3 digest over the little-endian payload.
    #[must_use]
    pub fn checksum(&self) -> [u8; 32] {
        checksum_of(&self.data)
    }
}

pub(crate) fn checksum_of(data: &[f32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for value in data {
        hasher.update(&value.to_le_bytes());
    }
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_dimension() {
        assert!(matches!(VecIndex::new(0), Err(DocvecError::ZeroDimension)));
    }

    #[test]
    fn add_checks_dimension() {
        let mut index = VecIndex::new(3).expect("index");
        index.add(&[1.0, 2.0, 3.0]).expect("add");
        let err = index.add(&[1.0, 2.0]).expect_err("short vector");
        assert!(matches!(
            err,
            DocvecError::VecDimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn append_copies_vectors_through() {
        let mut left = VecIndex::from_vectors(2, &[vec![1.0, 1.0]]).expect("left");
        let right = VecIndex::from_vectors(2, &[vec![2.0, 2.0], vec![3.0, 3.0]]).expect("right");
        left.append(&right).expect("append");
        assert_eq!(left.len(), 3);
        assert_eq!(left.vector(2), Some(&[3.0, 3.0][..]));
        assert_eq!(left.vector(3), None);
    }

    #[test]
    fn zero_vectors_are_detectable() {
        let index =
            VecIndex::from_vectors(2, &[vec![0.0, 0.0], vec![0.5, 0.0], vec![0.0, 0.0]]).expect("index");
        assert!(index.is_zero_vector(0));
        assert!(!index.is_zero_vector(1));
        assert!(!index.is_zero_vector(9));
        assert_eq!(index.zero_count(), 2);
    }

    #[test]
    fn checksum_tracks_content() {
        let a = VecIndex::from_vectors(2, &[vec![1.0, 2.0]]).expect("a");
        let b = VecIndex::from_vectors(2, &[vec![1.0, 2.5]]).expect("b");
        assert_ne!(a.checksum(), b.checksum());
        assert_eq!(a.checksum(), a.clone().checksum());
    }
}
