use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::distance::{TopK, check_vector, check_vectors, squared_l2};
use super::ivf::{effective_clusters, probe_order};
use super::kmeans::Centroids;
use super::{IndexKind, Neighbor, VectorIndex};
use crate::error::{ConfigError, IndexError};
use crate::models::IvfPqParams;
use crate::utils::random::seeded_rng;

/// Largest subquantizer count not above `requested` that divides `dimension`.
fn subquantizer_count(requested: usize, dimension: usize) -> usize {
    let mut m = requested.min(dimension).max(1);
    while dimension % m != 0 {
        m -= 1;
    }
    m
}

/// Trained coarse quantizer plus one PQ codebook per sub-vector slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Quantizer {
    coarse: Centroids,
    codebooks: Vec<Centroids>,
}

/// Inverted file with product-quantized residuals and asymmetric distance search.
///
/// Raw vectors are not kept; distances are approximations of squared L2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvfPqIndex {
    dimension: usize,
    params: IvfPqParams,
    n_subquantizers: usize,
    quantizer: Option<Quantizer>,
    lists: Vec<Vec<usize>>,
    /// `codes[position]` holds one codebook entry per subquantizer.
    codes: Vec<Vec<u8>>,
}

impl IvfPqIndex {
    pub fn new(dimension: usize, params: &IvfPqParams) -> Result<Self, ConfigError> {
        if params.n_clusters == 0 || params.nprobe == 0 || params.n_subquantizers == 0 {
            return Err(ConfigError::InvalidParameter(
                "ivfpq.n_clusters, nprobe and n_subquantizers must be positive".to_string(),
            ));
        }
        if !(1..=8).contains(&params.subquantizer_bits) {
            return Err(ConfigError::InvalidParameter(format!(
                "ivfpq.subquantizer_bits must be in 1..=8, got {}",
                params.subquantizer_bits
            )));
        }

        let n_subquantizers = subquantizer_count(params.n_subquantizers as usize, dimension.max(1));
        if n_subquantizers != params.n_subquantizers as usize {
            debug!(
                requested = params.n_subquantizers,
                effective = n_subquantizers,
                dimension,
                "adjusting subquantizer count to divide dimension"
            );
        }

        Ok(Self {
            dimension,
            params: params.clone(),
            n_subquantizers,
            quantizer: None,
            lists: Vec::new(),
            codes: Vec::new(),
        })
    }

    pub fn empty_like(&self) -> Self {
        Self {
            dimension: self.dimension,
            params: self.params.clone(),
            n_subquantizers: self.n_subquantizers,
            quantizer: None,
            lists: Vec::new(),
            codes: Vec::new(),
        }
    }

    pub fn n_subquantizers(&self) -> usize {
        self.n_subquantizers
    }

    fn sub_dim(&self) -> usize {
        self.dimension / self.n_subquantizers
    }

    pub fn n_clusters(&self) -> usize {
        self.quantizer.as_ref().map_or(0, |q| q.coarse.len())
    }

    fn nprobe(&self) -> usize {
        (self.params.nprobe as usize).clamp(1, self.n_clusters().max(1))
    }

    fn residual(vector: &[f32], center: &[f32]) -> Vec<f32> {
        vector.iter().zip(center).map(|(v, c)| v - c).collect()
    }

    fn encode(&self, quantizer: &Quantizer, vector: &[f32]) -> (usize, Vec<u8>) {
        let cluster = quantizer.coarse.nearest(vector);
        let residual = Self::residual(vector, quantizer.coarse.get(cluster));
        let sub_dim = self.sub_dim();
        let code = quantizer
            .codebooks
            .iter()
            .enumerate()
            .map(|(j, book)| book.nearest(&residual[j * sub_dim..(j + 1) * sub_dim]) as u8)
            .collect();
        (cluster, code)
    }
}

impl VectorIndex for IvfPqIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::IvfPq
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.codes.len()
    }

    fn is_built(&self) -> bool {
        self.quantizer.is_some()
    }

    fn build(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        check_vectors(vectors, self.dimension)?;
        if vectors.is_empty() {
            return Err(IndexError::InsufficientData(
                "ivfpq index needs at least one vector to train".to_string(),
            ));
        }
        if self.is_built() {
            warn!(kind = "ivfpq", "index already built; rebuilding from scratch");
        }

        let n = vectors.len();
        let requested = self.params.n_clusters as usize;
        let k = effective_clusters(requested, n);
        if k < requested {
            debug!(requested, effective = k, n, "capping ivfpq cluster count");
        }

        let iterations = self.params.max_iterations as usize;
        let mut rng = seeded_rng(self.params.seed);
        let coarse = Centroids::train(vectors, k, iterations, &mut rng);

        let residuals: Vec<Vec<f32>> = vectors
            .iter()
            .map(|v| Self::residual(v, coarse.get(coarse.nearest(v))))
            .collect();

        let sub_dim = self.sub_dim();
        let book_size = (1usize << self.params.subquantizer_bits).min(n);
        let codebooks = (0..self.n_subquantizers)
            .map(|j| {
                let slices: Vec<Vec<f32>> = residuals
                    .iter()
                    .map(|r| r[j * sub_dim..(j + 1) * sub_dim].to_vec())
                    .collect();
                Centroids::train(&slices, book_size, iterations, &mut rng)
            })
            .collect();

        let quantizer = Quantizer { coarse, codebooks };
        let mut lists = vec![Vec::new(); quantizer.coarse.len()];
        let mut codes = Vec::with_capacity(n);
        for (position, vector) in vectors.iter().enumerate() {
            let (cluster, code) = self.encode(&quantizer, vector);
            lists[cluster].push(position);
            codes.push(code);
        }

        self.quantizer = Some(quantizer);
        self.lists = lists;
        self.codes = codes;
        Ok(())
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        let Some(quantizer) = self.quantizer.take() else {
            return Err(IndexError::NotTrained("ivfpq".to_string()));
        };
        if let Err(e) = check_vectors(vectors, self.dimension) {
            self.quantizer = Some(quantizer);
            return Err(e);
        }

        for vector in vectors {
            let (cluster, code) = self.encode(&quantizer, vector);
            self.lists[cluster].push(self.codes.len());
            self.codes.push(code);
        }
        self.quantizer = Some(quantizer);
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Neighbor>, IndexError> {
        check_vector(query, self.dimension)?;
        let Some(quantizer) = &self.quantizer else {
            return Ok(Vec::new());
        };
        let target = top_k.min(self.codes.len());
        if target == 0 {
            return Ok(Vec::new());
        }

        let sub_dim = self.sub_dim();
        let mut top = TopK::new(target);
        for cluster in probe_order(&quantizer.coarse, &self.lists, query, self.nprobe(), target) {
            let residual = Self::residual(query, quantizer.coarse.get(cluster));

            // Distance from each query sub-vector to every codebook entry
            let tables: Vec<Vec<f32>> = quantizer
                .codebooks
                .iter()
                .enumerate()
                .map(|(j, book)| {
                    let part = &residual[j * sub_dim..(j + 1) * sub_dim];
                    (0..book.len()).map(|c| squared_l2(part, book.get(c))).collect()
                })
                .collect();

            for &position in &self.lists[cluster] {
                let distance = self.codes[position]
                    .iter()
                    .zip(&tables)
                    .map(|(&code, table)| table[code as usize])
                    .sum();
                top.push(position, distance);
            }
        }
        Ok(top.into_sorted())
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({
            "n_clusters": self.params.n_clusters,
            "effective_clusters": self.n_clusters(),
            "nprobe": self.nprobe(),
            "n_subquantizers": self.n_subquantizers,
            "subquantizer_bits": self.params.subquantizer_bits,
            "max_iterations": self.params.max_iterations,
            "seed": self.params.seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{exact_top, random_vectors};
    use super::*;

    fn params(n_subquantizers: u32, bits: u32) -> IvfPqParams {
        IvfPqParams {
            n_clusters: 4,
            nprobe: 4,
            n_subquantizers,
            subquantizer_bits: bits,
            max_iterations: 15,
            seed: 3,
        }
    }

    #[test]
    fn test_subquantizer_count() {
        assert_eq!(subquantizer_count(8, 384), 8);
        assert_eq!(subquantizer_count(8, 10), 5);
        assert_eq!(subquantizer_count(8, 3), 3);
        assert_eq!(subquantizer_count(8, 7), 7);
        assert_eq!(subquantizer_count(4, 7), 1);
    }

    #[test]
    fn test_rejects_bad_bits() {
        assert!(IvfPqIndex::new(8, &params(4, 0)).is_err());
        assert!(IvfPqIndex::new(8, &params(4, 9)).is_err());
        assert!(IvfPqIndex::new(8, &params(4, 1)).is_ok());
    }

    #[test]
    fn test_add_before_build_fails() {
        let mut index = IvfPqIndex::new(4, &params(2, 4)).unwrap();
        assert!(matches!(index.add(&[vec![0.0; 4]]), Err(IndexError::NotTrained(_))));
    }

    #[test]
    fn test_failed_add_keeps_index_usable() {
        let vectors = random_vectors(50, 4, 1);
        let mut index = IvfPqIndex::new(4, &params(2, 4)).unwrap();
        index.build(&vectors).unwrap();
        assert!(index.add(&[vec![0.0; 3]]).is_err());
        assert!(index.is_built());
        assert_eq!(index.len(), 50);
    }

    #[test]
    fn test_approximate_recall() {
        let vectors = random_vectors(300, 8, 12);
        let mut index = IvfPqIndex::new(8, &params(4, 8)).unwrap();
        index.build(&vectors).unwrap();

        let mut hits = 0;
        for q in 0..10 {
            let exact = exact_top(&vectors, &vectors[q], 10);
            let approx: Vec<usize> = index
                .search(&vectors[q], 10)
                .unwrap()
                .iter()
                .map(|n| n.position)
                .collect();
            hits += exact.iter().filter(|p| approx.contains(p)).count();
        }
        assert!(hits >= 50, "recall too low: {hits}/100");
    }

    #[test]
    fn test_small_corpus_fills_k() {
        let vectors = random_vectors(12, 6, 4);
        let mut index = IvfPqIndex::new(6, &IvfPqParams::default()).unwrap();
        index.build(&vectors).unwrap();
        assert_eq!(index.n_subquantizers(), 6);
        assert_eq!(index.search(&vectors[2], 12).unwrap().len(), 12);
    }
}
