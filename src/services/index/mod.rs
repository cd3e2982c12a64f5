//! Vector index structures and their persistence.
//!
//! Every variant speaks the same contract: positions are assigned sequentially
//! from 0 in insertion order, and `search` returns up to `top_k` neighbors by
//! ascending squared L2 distance, ties broken by position.

mod distance;
mod flat;
mod hnsw;
mod ivf;
mod ivfpq;
mod kmeans;
mod lsh;
mod persist;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, IndexError};
use crate::models::IndexConfig;

pub use distance::{check_vector, squared_l2};
pub use flat::FlatIndex;
pub use hnsw::HnswIndex;
pub use ivf::IvfIndex;
pub use ivfpq::IvfPqIndex;
pub use kmeans::Centroids;
pub use lsh::LshIndex;
pub use persist::{INDEX_FILE, INFO_FILE, IndexInfo, POSITIONS_FILE, load_index, save_index};

/// Index structure selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Exhaustive exact search
    #[default]
    Flat,
    /// Random-hyperplane locality sensitive hashing
    Lsh,
    /// Inverted file over k-means clusters
    Ivf,
    /// Inverted file with product-quantized residuals
    #[serde(rename = "ivfpq")]
    IvfPq,
    /// Hierarchical navigable small world graph
    Hnsw,
}

impl IndexKind {
    pub const ALL: [IndexKind; 5] = [
        IndexKind::Flat,
        IndexKind::Lsh,
        IndexKind::Ivf,
        IndexKind::IvfPq,
        IndexKind::Hnsw,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Flat => "flat",
            IndexKind::Lsh => "lsh",
            IndexKind::Ivf => "ivf",
            IndexKind::IvfPq => "ivfpq",
            IndexKind::Hnsw => "hnsw",
        }
    }

    /// Variants whose structure is learned from the build set and cannot grow without it.
    pub fn requires_training(&self) -> bool {
        matches!(self, IndexKind::Ivf | IndexKind::IvfPq)
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "flat" => Ok(IndexKind::Flat),
            "lsh" => Ok(IndexKind::Lsh),
            "ivf" => Ok(IndexKind::Ivf),
            "ivfpq" | "ivf_pq" | "ivf-pq" => Ok(IndexKind::IvfPq),
            "hnsw" => Ok(IndexKind::Hnsw),
            other => Err(ConfigError::InvalidParameter(format!(
                "unknown index kind '{other}' (expected flat, lsh, ivf, ivfpq or hnsw)"
            ))),
        }
    }
}

/// One search result: an index position and its squared L2 distance to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// Common contract of every index structure.
pub trait VectorIndex: Send + Sync {
    fn kind(&self) -> IndexKind;

    fn dimension(&self) -> usize;

    /// Number of positions assigned so far.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_built(&self) -> bool;

    fn requires_training(&self) -> bool {
        self.kind().requires_training()
    }

    /// Replace the contents with `vectors`, training any learned structure on them.
    fn build(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError>;

    /// Append `vectors`, all or nothing. Positions continue from `len()`.
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError>;

    /// Up to `top_k` nearest positions. Empty when the index is empty or unbuilt.
    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Neighbor>, IndexError>;

    /// Effective construction parameters, for `index_info.json`.
    fn params(&self) -> serde_json::Value;
}

/// Closed set of index structures, dispatched by variant and serialized as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AnyIndex {
    Flat(FlatIndex),
    Lsh(LshIndex),
    Ivf(IvfIndex),
    IvfPq(IvfPqIndex),
    Hnsw(HnswIndex),
}

impl AnyIndex {
    pub fn new(kind: IndexKind, dimension: usize, config: &IndexConfig) -> Result<Self, ConfigError> {
        if dimension == 0 {
            return Err(ConfigError::InvalidParameter(
                "vector dimension must be positive".to_string(),
            ));
        }
        Ok(match kind {
            IndexKind::Flat => AnyIndex::Flat(FlatIndex::new(dimension)),
            IndexKind::Lsh => AnyIndex::Lsh(LshIndex::new(dimension, &config.lsh)?),
            IndexKind::Ivf => AnyIndex::Ivf(IvfIndex::new(dimension, &config.ivf)?),
            IndexKind::IvfPq => AnyIndex::IvfPq(IvfPqIndex::new(dimension, &config.ivfpq)?),
            IndexKind::Hnsw => AnyIndex::Hnsw(HnswIndex::new(dimension, &config.hnsw)?),
        })
    }

    /// Index of the kind selected in `config`.
    pub fn from_config(dimension: usize, config: &IndexConfig) -> Result<Self, ConfigError> {
        Self::new(config.kind, dimension, config)
    }

    /// Empty index of the same kind and parameters.
    pub fn empty_like(&self) -> Self {
        match self {
            AnyIndex::Flat(i) => AnyIndex::Flat(i.empty_like()),
            AnyIndex::Lsh(i) => AnyIndex::Lsh(i.empty_like()),
            AnyIndex::Ivf(i) => AnyIndex::Ivf(i.empty_like()),
            AnyIndex::IvfPq(i) => AnyIndex::IvfPq(i.empty_like()),
            AnyIndex::Hnsw(i) => AnyIndex::Hnsw(i.empty_like()),
        }
    }

    fn as_dyn(&self) -> &dyn VectorIndex {
        match self {
            AnyIndex::Flat(i) => i,
            AnyIndex::Lsh(i) => i,
            AnyIndex::Ivf(i) => i,
            AnyIndex::IvfPq(i) => i,
            AnyIndex::Hnsw(i) => i,
        }
    }

    fn as_dyn_mut(&mut self) -> &mut dyn VectorIndex {
        match self {
            AnyIndex::Flat(i) => i,
            AnyIndex::Lsh(i) => i,
            AnyIndex::Ivf(i) => i,
            AnyIndex::IvfPq(i) => i,
            AnyIndex::Hnsw(i) => i,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

impl VectorIndex for AnyIndex {
    fn kind(&self) -> IndexKind {
        self.as_dyn().kind()
    }

    fn dimension(&self) -> usize {
        self.as_dyn().dimension()
    }

    fn len(&self) -> usize {
        self.as_dyn().len()
    }

    fn is_built(&self) -> bool {
        self.as_dyn().is_built()
    }

    fn build(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        self.as_dyn_mut().build(vectors)
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        self.as_dyn_mut().add(vectors)
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Neighbor>, IndexError> {
        self.as_dyn().search(query, top_k)
    }

    fn params(&self) -> serde_json::Value {
        self.as_dyn().params()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::utils::random::{gaussian_vector, seeded_rng};

    /// Reproducible random vectors for index tests.
    pub fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut rng = seeded_rng(seed);
        (0..n).map(|_| gaussian_vector(&mut rng, dim)).collect()
    }

    /// Exact top-k positions by brute force.
    pub fn exact_top(vectors: &[Vec<f32>], query: &[f32], k: usize) -> Vec<usize> {
        let mut scored: Vec<(f32, usize)> = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (super::squared_l2(v, query), i))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.into_iter().take(k).map(|(_, i)| i).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::random_vectors;
    use super::*;

    #[test]
    fn test_index_kind_parse_and_display() {
        for kind in IndexKind::ALL {
            assert_eq!(kind.as_str().parse::<IndexKind>().unwrap(), kind);
        }
        assert_eq!("IVF_PQ".parse::<IndexKind>().unwrap(), IndexKind::IvfPq);
        assert!("annoy".parse::<IndexKind>().is_err());
        assert_eq!(IndexKind::IvfPq.to_string(), "ivfpq");
    }

    #[test]
    fn test_index_kind_serde() {
        let json = serde_json::to_string(&IndexKind::IvfPq).unwrap();
        assert_eq!(json, "\"ivfpq\"");
        let kind: IndexKind = serde_json::from_str("\"hnsw\"").unwrap();
        assert_eq!(kind, IndexKind::Hnsw);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let config = IndexConfig::default();
        for kind in IndexKind::ALL {
            assert!(AnyIndex::new(kind, 0, &config).is_err());
        }
    }

    #[test]
    fn test_every_kind_returns_min_k_n_sorted() {
        let config = IndexConfig::default();
        let vectors = random_vectors(60, 8, 11);
        for kind in IndexKind::ALL {
            let mut index = AnyIndex::new(kind, 8, &config).unwrap();
            index.build(&vectors).unwrap();
            assert_eq!(index.len(), 60);
            assert_eq!(index.kind(), kind);

            let results = index.search(&vectors[3], 10).unwrap();
            assert_eq!(results.len(), 10, "{kind}");
            assert!(
                results.windows(2).all(|w| w[0].distance <= w[1].distance),
                "{kind} results out of order"
            );

            let all = index.search(&vectors[3], 500).unwrap();
            assert_eq!(all.len(), 60, "{kind}");
        }
    }

    #[test]
    fn test_every_kind_empty_or_unbuilt_search() {
        let config = IndexConfig::default();
        for kind in IndexKind::ALL {
            let index = AnyIndex::new(kind, 4, &config).unwrap();
            assert!(!index.is_built());
            assert!(index.search(&[0.0; 4], 5).unwrap().is_empty());
        }
    }

    #[test]
    fn test_every_kind_rejects_wrong_query_dimension() {
        let config = IndexConfig::default();
        let vectors = random_vectors(50, 4, 2);
        for kind in IndexKind::ALL {
            let mut index = AnyIndex::new(kind, 4, &config).unwrap();
            index.build(&vectors).unwrap();
            assert!(matches!(
                index.search(&[0.0; 3], 5),
                Err(IndexError::DimensionMismatch { .. })
            ));
        }
    }

    #[test]
    fn test_bytes_roundtrip_preserves_results() {
        let config = IndexConfig::default();
        let vectors = random_vectors(80, 6, 4);
        for kind in IndexKind::ALL {
            let mut index = AnyIndex::new(kind, 6, &config).unwrap();
            index.build(&vectors).unwrap();
            let restored = AnyIndex::from_bytes(&index.to_bytes().unwrap()).unwrap();
            assert_eq!(
                index.search(&vectors[0], 5).unwrap(),
                restored.search(&vectors[0], 5).unwrap()
            );
        }
    }

    #[test]
    fn test_empty_like_keeps_kind() {
        let mut index = AnyIndex::new(IndexKind::Hnsw, 3, &IndexConfig::default()).unwrap();
        index.build(&random_vectors(5, 3, 1)).unwrap();
        let fresh = index.empty_like();
        assert_eq!(fresh.kind(), IndexKind::Hnsw);
        assert!(fresh.is_empty());
        assert!(!fresh.is_built());
    }
}
