//! Seeded sampling helpers shared by the mock embedder and the index structures.

use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Standard normal sample via Box-Muller.
pub fn gaussian<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // Shift into (0, 1] so ln never sees zero
    let u1: f64 = 1.0 - rng.r#gen::<f64>();
    let u2: f64 = rng.r#gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// A vector of `dimension` independent standard normal components.
pub fn gaussian_vector<R: Rng + ?Sized>(rng: &mut R, dimension: usize) -> Vec<f32> {
    (0..dimension).map(|_| gaussian(rng) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_rng_repeats() {
        let a = gaussian_vector(&mut seeded_rng(9), 5);
        let b = gaussian_vector(&mut seeded_rng(9), 5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_gaussian_moments() {
        let mut rng = seeded_rng(1);
        let samples: Vec<f64> = (0..20_000).map(|_| gaussian(&mut rng)).collect();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / samples.len() as f64;
        assert!(mean.abs() < 0.05);
        assert!((var - 1.0).abs() < 0.1);
        assert!(samples.iter().all(|x| x.is_finite()));
    }
}
