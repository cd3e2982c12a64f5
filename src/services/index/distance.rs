//! Distance computation and bounded nearest-neighbor collection.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::Neighbor;
use crate::error::IndexError;

/// Squared Euclidean distance. Smaller is more similar.
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Reject vectors of the wrong length or with NaN/infinite components.
pub fn check_vector(vector: &[f32], dimension: usize) -> Result<(), IndexError> {
    if vector.len() != dimension {
        return Err(IndexError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(IndexError::InvalidVector(
            "vector contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

pub fn check_vectors(vectors: &[Vec<f32>], dimension: usize) -> Result<(), IndexError> {
    vectors.iter().try_for_each(|v| check_vector(v, dimension))
}

/// A position scored by distance, ordered by distance then position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    pub distance: f32,
    pub position: usize,
}

impl Eq for Scored {}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.position.cmp(&other.position))
    }
}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Keeps the `k` smallest scored positions seen so far.
#[derive(Debug)]
pub struct TopK {
    k: usize,
    heap: BinaryHeap<Scored>,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    pub fn push(&mut self, position: usize, distance: f32) {
        if self.k == 0 {
            return;
        }
        let item = Scored { distance, position };
        if self.heap.len() < self.k {
            self.heap.push(item);
        } else if let Some(worst) = self.heap.peek()
            && item < *worst
        {
            self.heap.pop();
            self.heap.push(item);
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Ascending by distance, ties by position.
    pub fn into_sorted(self) -> Vec<Neighbor> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|s| Neighbor {
                position: s.position,
                distance: s.distance,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squared_l2() {
        assert_eq!(squared_l2(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(squared_l2(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_check_vector() {
        assert!(check_vector(&[1.0, 2.0], 2).is_ok());
        assert!(matches!(
            check_vector(&[1.0], 2),
            Err(IndexError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
        assert!(matches!(
            check_vector(&[1.0, f32::INFINITY], 2),
            Err(IndexError::InvalidVector(_))
        ));
    }

    #[test]
    fn test_top_k_keeps_smallest_with_position_ties() {
        let mut top = TopK::new(3);
        for (pos, dist) in [(0, 5.0), (1, 1.0), (2, 3.0), (3, 1.0), (4, 0.5), (5, 9.0)] {
            top.push(pos, dist);
        }
        let result = top.into_sorted();
        let positions: Vec<usize> = result.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![4, 1, 3]);
    }

    #[test]
    fn test_top_k_zero() {
        let mut top = TopK::new(0);
        top.push(0, 1.0);
        assert!(top.is_empty());
    }
}
