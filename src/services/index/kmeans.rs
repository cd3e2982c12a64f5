//! Seeded k-means used for IVF coarse clustering and PQ codebooks.

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::distance::{Scored, squared_l2};

/// Trained cluster centers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Centroids {
    centers: Vec<Vec<f32>>,
}

impl Centroids {
    /// Lloyd's algorithm from `min(k, n)` distinct sampled points.
    ///
    /// A cluster that loses all its members is reseeded with a random point.
    /// Returns an empty set when `vectors` is empty.
    pub fn train(vectors: &[Vec<f32>], k: usize, max_iterations: usize, rng: &mut StdRng) -> Self {
        let n = vectors.len();
        let k = k.min(n);
        if k == 0 {
            return Self {
                centers: Vec::new(),
            };
        }
        let dim = vectors[0].len();

        let mut centers: Vec<Vec<f32>> = rand::seq::index::sample(rng, n, k)
            .into_iter()
            .map(|i| vectors[i].clone())
            .collect();
        let mut assignment = vec![usize::MAX; n];

        for _ in 0..max_iterations.max(1) {
            let mut changed = false;
            for (i, v) in vectors.iter().enumerate() {
                let nearest = nearest_of(&centers, v);
                if assignment[i] != nearest {
                    assignment[i] = nearest;
                    changed = true;
                }
            }
            if !changed {
                break;
            }

            let mut sums = vec![vec![0.0f32; dim]; k];
            let mut counts = vec![0usize; k];
            for (v, &c) in vectors.iter().zip(&assignment) {
                counts[c] += 1;
                for (s, x) in sums[c].iter_mut().zip(v) {
                    *s += x;
                }
            }

            for (c, (sum, count)) in sums.into_iter().zip(counts).enumerate() {
                if count == 0 {
                    centers[c] = vectors[rng.gen_range(0..n)].clone();
                } else {
                    let inv = 1.0 / count as f32;
                    centers[c] = sum.into_iter().map(|s| s * inv).collect();
                }
            }
        }

        Self { centers }
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    pub fn get(&self, index: usize) -> &[f32] {
        &self.centers[index]
    }

    pub fn nearest(&self, vector: &[f32]) -> usize {
        nearest_of(&self.centers, vector)
    }

    /// All centers ordered by distance to `vector`, closest first.
    pub fn ranked(&self, vector: &[f32]) -> Vec<Scored> {
        let mut scored: Vec<Scored> = self
            .centers
            .iter()
            .enumerate()
            .map(|(position, c)| Scored {
                distance: squared_l2(c, vector),
                position,
            })
            .collect();
        scored.sort();
        scored
    }
}

fn nearest_of(centers: &[Vec<f32>], vector: &[f32]) -> usize {
    centers
        .iter()
        .enumerate()
        .map(|(i, c)| Scored {
            distance: squared_l2(c, vector),
            position: i,
        })
        .min()
        .map_or(0, |s| s.position)
}
