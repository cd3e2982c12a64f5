use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::distance::{TopK, check_vector, check_vectors, dot, squared_l2};
use super::{IndexKind, Neighbor, VectorIndex};
use crate::error::{ConfigError, IndexError};
use crate::models::LshParams;
use crate::utils::random::{gaussian_vector, seeded_rng};

/// Random-hyperplane LSH with multi-probe lookup and exact re-ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LshIndex {
    dimension: usize,
    params: LshParams,
    /// `planes[table][bit]` is one hyperplane normal.
    planes: Vec<Vec<Vec<f32>>>,
    buckets: Vec<HashMap<u64, Vec<usize>>>,
    /// Per-position hash code in every table.
    codes: Vec<Vec<u64>>,
    vectors: Vec<Vec<f32>>,
    built: bool,
}

impl LshIndex {
    pub fn new(dimension: usize, params: &LshParams) -> Result<Self, ConfigError> {
        if params.n_bits == 0 || params.n_bits > 64 {
            return Err(ConfigError::InvalidParameter(format!(
                "lsh.n_bits must be in 1..=64, got {}",
                params.n_bits
            )));
        }
        if params.n_tables == 0 {
            return Err(ConfigError::InvalidParameter(
                "lsh.n_tables must be positive".to_string(),
            ));
        }

        let mut rng = seeded_rng(params.seed);
        let planes = (0..params.n_tables)
            .map(|_| {
                (0..params.n_bits)
                    .map(|_| gaussian_vector(&mut rng, dimension))
                    .collect()
            })
            .collect();

        Ok(Self {
            dimension,
            params: params.clone(),
            planes,
            buckets: vec![HashMap::new(); params.n_tables as usize],
            codes: Vec::new(),
            vectors: Vec::new(),
            built: false,
        })
    }

    pub fn empty_like(&self) -> Self {
        Self {
            dimension: self.dimension,
            params: self.params.clone(),
            planes: self.planes.clone(),
            buckets: vec![HashMap::new(); self.planes.len()],
            codes: Vec::new(),
            vectors: Vec::new(),
            built: false,
        }
    }

    fn hash(&self, table: usize, vector: &[f32]) -> u64 {
        self.planes[table]
            .iter()
            .enumerate()
            .fold(0u64, |code, (bit, plane)| {
                if dot(plane, vector) >= 0.0 {
                    code | (1u64 << bit)
                } else {
                    code
                }
            })
    }

    fn hash_all(&self, vector: &[f32]) -> Vec<u64> {
        (0..self.planes.len()).map(|t| self.hash(t, vector)).collect()
    }

    fn insert(&mut self, vector: Vec<f32>) {
        let position = self.vectors.len();
        let codes = self.hash_all(&vector);
        for (table, &code) in codes.iter().enumerate() {
            self.buckets[table].entry(code).or_default().push(position);
        }
        self.codes.push(codes);
        self.vectors.push(vector);
    }

    /// Positions to re-rank: exact buckets, then Hamming-1 probes, then nearest codes overall.
    fn candidates(&self, query_codes: &[u64], target: usize) -> Vec<usize> {
        fn take(positions: &[usize], seen: &mut [bool], found: &mut Vec<usize>) {
            for &p in positions {
                if !seen[p] {
                    seen[p] = true;
                    found.push(p);
                }
            }
        }

        let mut seen = vec![false; self.vectors.len()];
        let mut found = Vec::new();

        for (table, &code) in query_codes.iter().enumerate() {
            if let Some(bucket) = self.buckets[table].get(&code) {
                take(bucket, &mut seen, &mut found);
            }
        }

        if found.len() < target {
            let n_bits = self.params.n_bits as usize;
            for (table, &code) in query_codes.iter().enumerate() {
                for bit in 0..n_bits {
                    if let Some(bucket) = self.buckets[table].get(&(code ^ (1u64 << bit))) {
                        take(bucket, &mut seen, &mut found);
                    }
                }
            }
        }

        if found.len() < target {
            let mut rest: Vec<(u32, usize)> = (0..self.vectors.len())
                .filter(|&p| !seen[p])
                .map(|p| {
                    let hamming = self.codes[p]
                        .iter()
                        .zip(query_codes)
                        .map(|(a, b)| (a ^ b).count_ones())
                        .sum();
                    (hamming, p)
                })
                .collect();
            rest.sort_unstable();
            found.extend(rest.into_iter().take(target - found.len()).map(|(_, p)| p));
        }

        found
    }
}

impl VectorIndex for LshIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Lsh
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
            warn!(kind = "lsh", "index already built; rebuilding from scratch");
        }
        *self = self.empty_like();
        for vector in vectors {
            self.insert(vector.clone());
        }
        self.built = true;
        Ok(())
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        check_vectors(vectors, self.dimension)?;
        for vector in vectors {
            self.insert(vector.clone());
        }
        self.built = true;
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Neighbor>, IndexError> {
        check_vector(query, self.dimension)?;
        let target = top_k.min(self.vectors.len());
        if target == 0 {
            return Ok(Vec::new());
        }

        let query_codes = self.hash_all(query);
        let mut top = TopK::new(target);
        for position in self.candidates(&query_codes, target) {
            top.push(position, squared_l2(&self.vectors[position], query));
        }
        Ok(top.into_sorted())
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({
            "n_bits": self.params.n_bits,
            "n_tables": self.params.n_tables,
            "seed": self.params.seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{exact_top, random_vectors};
    use super::*;

    fn params(n_bits: u32, n_tables: u32) -> LshParams {
        LshParams {
            n_bits,
            n_tables,
            seed: 7,
        }
    }

    #[test]
    fn test_rejects_bad_params() {
        assert!(LshIndex::new(4, &params(0, 2)).is_err());
        assert!(LshIndex::new(4, &params(65, 2)).is_err());
        assert!(LshIndex::new(4, &params(8, 0)).is_err());
        assert!(LshIndex::new(4, &params(64, 1)).is_ok());
    }

    #[test]
    fn test_finds_exact_match_first() {
        let vectors = random_vectors(200, 16, 3);
        let mut index = LshIndex::new(16, &params(8, 10)).unwrap();
        index.build(&vectors).unwrap();
        let results = index.search(&vectors[17], 5).unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].position, 17);
        assert_eq!(results[0].distance, 0.0);
    }

    #[test]
    fn test_recall_against_exact() {
        let vectors = random_vectors(300, 8, 21);
        let mut index = LshIndex::new(8, &params(6, 12)).unwrap();
        index.build(&vectors).unwrap();

        let mut hits = 0;
        for q in 0..20 {
            let exact = exact_top(&vectors, &vectors[q], 10);
            let approx: Vec<usize> = index
                .search(&vectors[q], 10)
                .unwrap()
                .iter()
                .map(|n| n.position)
                .collect();
            hits += exact.iter().filter(|p| approx.contains(p)).count();
        }
        assert!(hits >= 80, "recall too low: {hits}/200");
    }

    #[test]
    fn test_fills_to_k_with_sparse_buckets() {
        // 64 bits per table makes exact bucket collisions rare
        let vectors = random_vectors(40, 32, 5);
        let mut index = LshIndex::new(32, &params(64, 1)).unwrap();
        index.build(&vectors).unwrap();
        assert_eq!(index.search(&random_vectors(1, 32, 99)[0], 25).unwrap().len(), 25);
    }

    #[test]
    fn test_add_before_build_is_incremental() {
        let mut index = LshIndex::new(2, &params(4, 2)).unwrap();
        index.add(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert!(index.is_built());
        assert_eq!(index.search(&[0.0, 1.0], 1).unwrap()[0].position, 1);
    }

    #[test]
    fn test_same_seed_same_planes() {
        let a = LshIndex::new(4, &params(8, 2)).unwrap();
        let b = LshIndex::new(4, &params(8, 2)).unwrap();
        assert_eq!(a.planes, b.planes);
    }
}
