use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::distance::{Scored, TopK, check_vector, check_vectors, squared_l2};
use super::{IndexKind, Neighbor, VectorIndex};
use crate::error::{ConfigError, IndexError};
use crate::models::HnswParams;
use crate::utils::random::seeded_rng;

const MAX_LEVEL: usize = 16;

/// Hierarchical navigable small world graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswIndex {
    dimension: usize,
    params: HnswParams,
    vectors: Vec<Vec<f32>>,
    /// `links[node][level]` lists the node's neighbors on that level.
    links: Vec<Vec<Vec<usize>>>,
    entry_point: Option<usize>,
    max_level: usize,
    built: bool,
}

impl HnswIndex {
    pub fn new(dimension: usize, params: &HnswParams) -> Result<Self, ConfigError> {
        if params.m < 2 {
            return Err(ConfigError::InvalidParameter(format!(
                "hnsw.m must be at least 2, got {}",
                params.m
            )));
        }
        if params.ef_construction == 0 || params.ef_search == 0 {
            return Err(ConfigError::InvalidParameter(
                "hnsw.ef_construction and ef_search must be positive".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            params: params.clone(),
            vectors: Vec::new(),
            links: Vec::new(),
            entry_point: None,
            max_level: 0,
            built: false,
        })
    }

    pub fn empty_like(&self) -> Self {
        Self {
            dimension: self.dimension,
            params: self.params.clone(),
            vectors: Vec::new(),
            links: Vec::new(),
            entry_point: None,
            max_level: 0,
            built: false,
        }
    }

    /// Level for a position, drawn from `-ln(U) / ln(M)` with a per-position seed.
    fn level_for(&self, position: usize) -> usize {
        let mut rng = seeded_rng(self.params.seed ^ position as u64);
        let u: f64 = 1.0 - rng.r#gen::<f64>();
        let level = (-u.ln() / f64::from(self.params.m).ln()).floor();
        (level as usize).min(MAX_LEVEL)
    }

    fn max_links(&self, level: usize) -> usize {
        let m = self.params.m as usize;
        if level == 0 { 2 * m } else { m }
    }

    fn distance_to(&self, node: usize, query: &[f32]) -> f32 {
        squared_l2(&self.vectors[node], query)
    }

    /// Best-first search on one layer. Returns up to `ef` nodes, closest first.
    fn search_layer(&self, query: &[f32], entry: &[Scored], ef: usize, level: usize) -> Vec<Scored> {
        let mut visited: HashSet<usize> = entry.iter().map(|s| s.position).collect();
        let mut candidates: BinaryHeap<Reverse<Scored>> = entry.iter().copied().map(Reverse).collect();
        let mut results: BinaryHeap<Scored> = entry.iter().copied().collect();

        while let Some(Reverse(current)) = candidates.pop() {
            if let Some(worst) = results.peek()
                && results.len() >= ef
                && current.distance > worst.distance
            {
                break;
            }

            for &next in &self.links[current.position][level] {
                if !visited.insert(next) {
                    continue;
                }
                let scored = Scored {
                    distance: self.distance_to(next, query),
                    position: next,
                };
                let admit = results.len() < ef || results.peek().is_some_and(|worst| scored < *worst);
                if admit {
                    candidates.push(Reverse(scored));
                    results.push(scored);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    /// Walk down from the top layer to `stop_level`, keeping only the closest node.
    fn descend(&self, query: &[f32], stop_level: usize) -> Option<Scored> {
        let entry = self.entry_point?;
        let mut best = Scored {
            distance: self.distance_to(entry, query),
            position: entry,
        };
        for level in (stop_level + 1..=self.max_level).rev() {
            if let Some(&closest) = self.search_layer(query, &[best], 1, level).first() {
                best = closest;
            }
        }
        Some(best)
    }

    /// Keep candidates (closest first, distances to the base vector) that open a new
    /// direction: a candidate is dropped when an already selected neighbor is closer
    /// to it than the base is, or is an exact copy of it.
    fn select_neighbors(&self, candidates: &[Scored], limit: usize) -> Vec<usize> {
        let mut selected: Vec<usize> = Vec::with_capacity(limit);
        for candidate in candidates {
            if selected.len() >= limit {
                break;
            }
            let vector = &self.vectors[candidate.position];
            let redundant = selected.iter().any(|&s| {
                let between = squared_l2(vector, &self.vectors[s]);
                between < candidate.distance || between == 0.0
            });
            if !redundant {
                selected.push(candidate.position);
            }
        }
        selected
    }

    fn prune(&mut self, node: usize, level: usize) {
        let limit = self.max_links(level);
        if self.links[node][level].len() <= limit {
            return;
        }
        let mut scored: Vec<Scored> = self.links[node][level]
            .iter()
            .map(|&n| Scored {
                distance: squared_l2(&self.vectors[n], &self.vectors[node]),
                position: n,
            })
            .collect();
        scored.sort();
        self.links[node][level] = self.select_neighbors(&scored, limit);
    }

    fn insert(&mut self, vector: Vec<f32>) {
        let position = self.vectors.len();
        let level = self.level_for(position);
        let query = vector.clone();
        self.vectors.push(vector);
        self.links.push(vec![Vec::new(); level + 1]);

        let Some(mut nearest) = self.descend(&query, level) else {
            self.entry_point = Some(position);
            self.max_level = level;
            return;
        };

        let ef = self.params.ef_construction as usize;
        let mut entry = vec![nearest];
        for l in (0..=level.min(self.max_level)).rev() {
            let found = self.search_layer(&query, &entry, ef, l);
            let selected = self.select_neighbors(&found, self.max_links(l));

            for &neighbor in &selected {
                self.links[neighbor][l].push(position);
                self.prune(neighbor, l);
            }
            self.links[position][l] = selected;

            if let Some(&closest) = found.first() {
                nearest = closest;
            }
            entry = if found.is_empty() { vec![nearest] } else { found };
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = Some(position);
        }
    }
}

impl VectorIndex for HnswIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Hnsw
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
            warn!(kind = "hnsw", "index already built; rebuilding from scratch");
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
        let Some(entry) = self.descend(query, 0) else {
            return Ok(Vec::new());
        };

        let ef = (self.params.ef_search as usize).max(target);
        let found = self.search_layer(query, &[entry], ef, 0);

        let mut top = TopK::new(target);
        if found.len() >= target {
            for scored in found {
                top.push(scored.position, scored.distance);
            }
        } else {
            // Graph did not reach enough nodes; scan everything
            for position in 0..self.vectors.len() {
                top.push(position, self.distance_to(position, query));
            }
        }
        Ok(top.into_sorted())
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({
            "m": self.params.m,
            "ef_construction": self.params.ef_construction,
            "ef_search": self.params.ef_search,
            "seed": self.params.seed,
            "max_level": self.max_level,
        })
    }
}
