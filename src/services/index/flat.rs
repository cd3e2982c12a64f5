use serde::{Deserialize, Serialize};
use tracing::warn;

use super::distance::{TopK, check_vector, check_vectors, squared_l2};
use super::{IndexKind, Neighbor, VectorIndex};
use crate::error::IndexError;

/// Exact search by scanning every stored vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    built: bool,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            built: false,
        }
    }

    pub fn empty_like(&self) -> Self {
        Self::new(self.dimension)
    }
}

impl VectorIndex for FlatIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Flat
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn is_built(&self) -> bool {
        self.built
    }

    fn build(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        check_vectors(vectors, self.dimension)?;
        if self.built {
            warn!(kind = "flat", "index already built; rebuilding from scratch");
        }
        self.vectors = vectors.to_vec();
        self.built = true;
        Ok(())
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        check_vectors(vectors, self.dimension)?;
        self.vectors.extend_from_slice(vectors);
        self.built = true;
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Neighbor>, IndexError> {
        check_vector(query, self.dimension)?;
        let mut top = TopK::new(top_k.min(self.vectors.len()));
        for (position, vector) in self.vectors.iter().enumerate() {
            top.push(position, squared_l2(vector, query));
        }
        Ok(top.into_sorted())
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({})
    }
}
