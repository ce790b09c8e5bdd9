//! Synthetic spectral cube generation with known line components.
//!
//! Every pixel carries a broad line whose centre drifts across the map; the
//! right half of the map carries a second, narrower line. Gaussian noise is
//! added from a seeded generator, so a given config always yields the same
//! cube.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::cube::Cube;
use crate::domain::{Component, MapShape};
use crate::error::AppError;
use crate::models::predict;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub ny: usize,
    pub nx: usize,
    pub n_channels: usize,
    pub v_min: f64,
    pub v_max: f64,
    /// Standard deviation of the additive noise.
    pub noise: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            ny: 12,
            nx: 12,
            n_channels: 96,
            v_min: -15.0,
            v_max: 15.0,
            noise: 0.05,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticCube {
    pub cube: Cube,
    /// Noise-free components per flat pixel index.
    pub truth: Vec<Vec<Component>>,
}

impl SyntheticCube {
    /// Component-wise mean of the truth over `indices`, using the most common
    /// component count among them.
    pub fn mean_truth(&self, indices: &[usize]) -> Vec<Component> {
        let max_n = indices.iter().map(|&i| self.truth[i].len()).max().unwrap_or(0);
        let mut counts = vec![0usize; max_n + 1];
        for &i in indices {
            counts[self.truth[i].len()] += 1;
        }
        // Most common count; ties go to the larger count.
        let Some((n, _)) = counts.iter().enumerate().max_by_key(|&(n, c)| (*c, n)) else {
            return Vec::new();
        };
        let members: Vec<&Vec<Component>> = indices
            .iter()
            .map(|&i| &self.truth[i])
            .filter(|t| t.len() == n)
            .collect();
        if members.is_empty() {
            return Vec::new();
        }
        let m = members.len() as f64;
        (0..n)
            .map(|j| {
                let (a, c, s) = members.iter().fold((0.0, 0.0, 0.0), |acc, t| {
                    (acc.0 + t[j].amplitude, acc.1 + t[j].centre, acc.2 + t[j].dispersion)
                });
                Component::new(a / m, c / m, s / m)
            })
            .collect()
    }
}

/// Components of the synthetic sky at pixel `(x, y)`.
fn truth_at(x: usize, y: usize, cfg: &SyntheticConfig) -> Vec<Component> {
    let fx = if cfg.nx > 1 { x as f64 / (cfg.nx - 1) as f64 } else { 0.0 };
    let fy = if cfg.ny > 1 { y as f64 / (cfg.ny - 1) as f64 } else { 0.0 };
    let span = cfg.v_max - cfg.v_min;

    let mut comps = vec![Component::new(
        1.0 + 0.5 * fy,
        cfg.v_min + span * (0.3 + 0.1 * fx),
        0.06 * span,
    )];
    if x >= cfg.nx / 2 {
        comps.push(Component::new(0.8, cfg.v_min + span * 0.65, 0.03 * span));
    }
    comps
}

pub fn generate_cube(cfg: &SyntheticConfig) -> Result<SyntheticCube, AppError> {
    if cfg.ny == 0 || cfg.nx == 0 {
        return Err(AppError::config("Synthetic cube needs a non-empty map."));
    }
    if cfg.n_channels < 2 {
        return Err(AppError::config("Synthetic cube needs at least two channels."));
    }
    if !(cfg.v_min.is_finite() && cfg.v_max.is_finite() && cfg.v_max > cfg.v_min) {
        return Err(AppError::config("Invalid synthetic velocity range."));
    }
    if !(cfg.noise.is_finite() && cfg.noise >= 0.0) {
        return Err(AppError::config("Synthetic noise must be finite and >= 0."));
    }

    let shape = MapShape::new(cfg.ny, cfg.nx);
    let dv = (cfg.v_max - cfg.v_min) / (cfg.n_channels - 1) as f64;
    let axis: Vec<f64> = (0..cfg.n_channels).map(|i| cfg.v_min + i as f64 * dv).collect();

    let truth: Vec<Vec<Component>> = (0..shape.len())
        .map(|flat| truth_at(flat % cfg.nx, flat / cfg.nx, cfg))
        .collect();

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let normal = Normal::new(0.0, cfg.noise)
        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

    let plane = shape.len();
    let mut data = vec![0.0; cfg.n_channels * plane];
    for (flat, comps) in truth.iter().enumerate() {
        for (c, &v) in axis.iter().enumerate() {
            data[c * plane + flat] = predict(comps, v) + normal.sample(&mut rng);
        }
    }

    let cube = Cube::new(axis, shape, data, None)?;
    log::debug!(
        "Generated {}x{} synthetic cube with {} channels (seed {})",
        cfg.ny,
        cfg.nx,
        cfg.n_channels,
        cfg.seed
    );
    Ok(SyntheticCube { cube, truth })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_cube() {
        let cfg = SyntheticConfig::default();
        let a = generate_cube(&cfg).unwrap();
        let b = generate_cube(&cfg).unwrap();
        assert_eq!(a.cube.spectrum(17), b.cube.spectrum(17));
        assert_eq!(a.truth, b.truth);
    }

    #[test]
    fn right_half_has_two_components() {
        let cfg = SyntheticConfig::default();
        let syn = generate_cube(&cfg).unwrap();
        assert_eq!(syn.truth[0].len(), 1);
        assert_eq!(syn.truth[cfg.nx - 1].len(), 2);
        assert_eq!(syn.cube.n_channels(), cfg.n_channels);
    }

    #[test]
    fn mean_truth_uses_majority_count() {
        let cfg = SyntheticConfig {
            nx: 4,
            ny: 1,
            ..SyntheticConfig::default()
        };
        let syn = generate_cube(&cfg).unwrap();
        // Pixels 0, 1 have one component; 2, 3 two. Tie → two.
        let mean = syn.mean_truth(&[0, 1, 2, 3]);
        assert_eq!(mean.len(), 2);
        let one = syn.mean_truth(&[0, 1, 2]);
        assert_eq!(one.len(), 1);
        let expected = (syn.truth[0][0].centre + syn.truth[1][0].centre + syn.truth[2][0].centre) / 3.0;
        assert!((one[0].centre - expected).abs() < 1e-12);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = SyntheticConfig {
            v_max: -20.0,
            ..SyntheticConfig::default()
        };
        assert_eq!(generate_cube(&cfg).unwrap_err().exit_code(), 2);
    }
}
