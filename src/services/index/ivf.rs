use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::distance::{TopK, check_vector, check_vectors, squared_l2};
use super::kmeans::Centroids;
use super::{IndexKind, Neighbor, VectorIndex};
use crate::error::{ConfigError, IndexError};
use crate::models::IvfParams;
use crate::utils::random::seeded_rng;

/// Minimum training points per cluster before the cluster count is capped.
pub(crate) const MIN_POINTS_PER_CLUSTER: usize = 39;

/// Cluster count actually trained for `n` vectors.
pub(crate) fn effective_clusters(requested: usize, n: usize) -> usize {
    requested.min((n / MIN_POINTS_PER_CLUSTER).max(1))
}

/// Order in which inverted lists are visited for a query.
///
/// Starts with the `nprobe` nearest clusters and keeps going in centroid order
/// until the visited lists hold at least `target` members.
pub(crate) fn probe_order(
    centroids: &Centroids,
    lists: &[Vec<usize>],
    query: &[f32],
    nprobe: usize,
    target: usize,
) -> Vec<usize> {
    let mut probed = Vec::new();
    let mut covered = 0;
    for scored in centroids.ranked(query) {
        if probed.len() >= nprobe && covered >= target {
            break;
        }
        covered += lists[scored.position].len();
        probed.push(scored.position);
    }
    probed
}

/// Inverted file index: k-means clusters with exact scoring inside probed lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvfIndex {
    dimension: usize,
    params: IvfParams,
    centroids: Option<Centroids>,
    lists: Vec<Vec<usize>>,
    vectors: Vec<Vec<f32>>,
}

impl IvfIndex {
    pub fn new(dimension: usize, params: &IvfParams) -> Result<Self, ConfigError> {
        if params.n_clusters == 0 {
            return Err(ConfigError::InvalidParameter(
                "ivf.n_clusters must be positive".to_string(),
            ));
        }
        if params.nprobe == 0 {
            return Err(ConfigError::InvalidParameter(
                "ivf.nprobe must be positive".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            params: params.clone(),
            centroids: None,
            lists: Vec::new(),
            vectors: Vec::new(),
        })
    }

    pub fn empty_like(&self) -> Self {
        Self {
            dimension: self.dimension,
            params: self.params.clone(),
            centroids: None,
            lists: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// Number of trained clusters, 0 before build.
    pub fn n_clusters(&self) -> usize {
        self.centroids.as_ref().map_or(0, Centroids::len)
    }

    fn nprobe(&self) -> usize {
        (self.params.nprobe as usize).clamp(1, self.n_clusters().max(1))
    }
}

impl VectorIndex for IvfIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Ivf
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn is_built(&self) -> bool {
        self.centroids.is_some()
    }

    fn build(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        check_vectors(vectors, self.dimension)?;
        if vectors.is_empty() {
            return Err(IndexError::InsufficientData(
                "ivf index needs at least one vector to train".to_string(),
            ));
        }
        if self.is_built() {
            warn!(kind = "ivf", "index already built; rebuilding from scratch");
        }

        let requested = self.params.n_clusters as usize;
        let k = effective_clusters(requested, vectors.len());
        if k < requested {
            debug!(requested, effective = k, n = vectors.len(), "capping ivf cluster count");
        }

        let mut rng = seeded_rng(self.params.seed);
        let centroids = Centroids::train(vectors, k, self.params.max_iterations as usize, &mut rng);

        let mut lists = vec![Vec::new(); centroids.len()];
        for (position, vector) in vectors.iter().enumerate() {
            lists[centroids.nearest(vector)].push(position);
        }

        self.centroids = Some(centroids);
        self.lists = lists;
        self.vectors = vectors.to_vec();
        Ok(())
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        let Some(centroids) = &self.centroids else {
            return Err(IndexError::NotTrained("ivf".to_string()));
        };
        check_vectors(vectors, self.dimension)?;

        for vector in vectors {
            let position = self.vectors.len();
            self.lists[centroids.nearest(vector)].push(position);
            self.vectors.push(vector.clone());
        }
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Neighbor>, IndexError> {
        check_vector(query, self.dimension)?;
        let Some(centroids) = &self.centroids else {
            return Ok(Vec::new());
        };
        let target = top_k.min(self.vectors.len());
        if target == 0 {
            return Ok(Vec::new());
        }

        let mut top = TopK::new(target);
        for cluster in probe_order(centroids, &self.lists, query, self.nprobe(), target) {
            for &position in &self.lists[cluster] {
                top.push(position, squared_l2(&self.vectors[position], query));
            }
        }
        Ok(top.into_sorted())
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({
            "n_clusters": self.params.n_clusters,
            "effective_clusters": self.n_clusters(),
            "nprobe": self.nprobe(),
            "max_iterations": self.params.max_iterations,
            "seed": self.params.seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{exact_top, random_vectors};
    use super::*;

    fn params(n_clusters: u32, nprobe: u32) -> IvfParams {
        IvfParams {
            n_clusters,
            nprobe,
            max_iterations: 20,
            seed: 5,
        }
    }

    #[test]
    fn test_effective_clusters() {
        assert_eq!(effective_clusters(100, 10), 1);
        assert_eq!(effective_clusters(100, 390), 10);
        assert_eq!(effective_clusters(4, 10_000), 4);
        assert_eq!(effective_clusters(100, 0), 1);
    }

    #[test]
    fn test_small_build_caps_clusters() {
        let vectors = random_vectors(10, 4, 1);
        let mut index = IvfIndex::new(4, &params(100, 10)).unwrap();
        index.build(&vectors).unwrap();
        assert_eq!(index.n_clusters(), 1);
        assert_eq!(index.nprobe(), 1);
        assert_eq!(index.search(&vectors[0], 10).unwrap().len(), 10);
    }

    #[test]
    fn test_build_requires_data() {
        let mut index = IvfIndex::new(4, &params(8, 2)).unwrap();
        assert!(matches!(index.build(&[]), Err(IndexError::InsufficientData(_))));
    }

    #[test]
    fn test_add_before_build_fails() {
        let mut index = IvfIndex::new(2, &params(8, 2)).unwrap();
        assert!(matches!(
            index.add(&[vec![1.0, 1.0]]),
            Err(IndexError::NotTrained(_))
        ));
    }

    #[test]
    fn test_full_probe_is_exact() {
        let vectors = random_vectors(400, 6, 8);
        let mut index = IvfIndex::new(6, &params(10, 10)).unwrap();
        index.build(&vectors).unwrap();
        assert_eq!(index.n_clusters(), 10);

        let query = &random_vectors(1, 6, 77)[0];
        let approx: Vec<usize> = index
            .search(query, 5)
            .unwrap()
            .iter()
            .map(|n| n.position)
            .collect();
        assert_eq!(approx, exact_top(&vectors, query, 5));
    }

    #[test]
    fn test_probes_more_lists_to_reach_k() {
        let vectors = random_vectors(400, 6, 8);
        let mut index = IvfIndex::new(6, &params(10, 1)).unwrap();
        index.build(&vectors).unwrap();
        assert_eq!(index.search(&vectors[0], 300).unwrap().len(), 300);
    }

    #[test]
    fn test_add_after_build() {
        let vectors = random_vectors(80, 3, 2);
        let mut index = IvfIndex::new(3, &params(2, 2)).unwrap();
        index.build(&vectors).unwrap();
        index.add(&[vec![50.0, 50.0, 50.0]]).unwrap();
        assert_eq!(index.len(), 81);
        let results = index.search(&[50.0, 50.0, 50.0], 1).unwrap();
        assert_eq!(results[0].position, 80);
    }
}
