//! Noise estimation.
//!
//! Two estimates are used:
//!
//! - a per-spectrum rms that ignores line emission by reflecting the negative
//!   channels (which, for a positive-line spectrum, are noise only) about
//!   zero and clipping everything above a multiple of their MAD;
//! - a map-level rms, the median of per-spectrum estimates over a random
//!   sample of spectra, used when a spectrum's own estimate is not finite.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Maximum number of spectra sampled for the map-level rms.
pub const MAP_RMS_SAMPLE: usize = 500;

/// Give up on the map-level estimate after this many non-finite spectra.
const MAP_RMS_MAX_FAILURES: usize = 50;

/// Below this fraction of negative channels the spectrum is treated as
/// line-dominated and clipped more tightly.
const NEGATIVE_FRACTION: f64 = 0.47;

/// Robust rms of a single spectrum. Non-finite channels are ignored.
///
/// Returns NaN if the spectrum has no negative channels.
pub fn spectrum_rms(flux: &[f64]) -> f64 {
    let finite: Vec<f64> = flux.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }

    let negatives: Vec<f64> = finite.iter().copied().filter(|v| *v < 0.0).collect();
    let mut reflected: Vec<f64> = negatives.iter().chain(negatives.iter()).map(|v| v.abs()).collect();
    // Reflected noise is symmetric about zero, so |r - median(r)| = |r|.
    let Some(mad) = median_mut(&mut reflected) else {
        return f64::NAN;
    };

    let clip = if (negatives.len() as f64) < NEGATIVE_FRACTION * finite.len() as f64 {
        3.5 * mad
    } else {
        4.0 * mad
    };

    let noise: Vec<f64> = finite.into_iter().filter(|v| *v < clip.abs()).collect();
    if noise.is_empty() {
        return f64::NAN;
    }
    let ss: f64 = noise.iter().map(|v| v * v).sum();
    (ss / noise.len() as f64).sqrt()
}

/// Median per-spectrum rms over a seeded random sample of `keys`.
///
/// `spectrum_of` returns the flux for one key. Returns NaN if no sampled
/// spectrum produced a finite estimate.
pub fn estimate_map_rms<F>(keys: &[usize], spectrum_of: F, seed: u64) -> f64
where
    F: Fn(usize) -> Vec<f64>,
{
    let mut order = keys.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let target = order.len().min(MAP_RMS_SAMPLE);
    let mut values = Vec::with_capacity(target);
    let mut failures = 0usize;

    for key in order {
        if values.len() >= target || failures >= MAP_RMS_MAX_FAILURES {
            break;
        }
        let rms = spectrum_rms(&spectrum_of(key));
        if rms.is_finite() {
            values.push(rms);
        } else {
            failures += 1;
        }
    }

    median_mut(&mut values).unwrap_or(f64::NAN)
}

pub fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_distr::{Distribution, Normal};

    fn noise(n: usize, sigma: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, sigma).unwrap();
        (0..n).map(|_| normal.sample(&mut rng)).collect()
    }

    #[test]
    fn pure_noise_rms_is_close_to_sigma() {
        let flux = noise(4000, 0.2, 7);
        let rms = spectrum_rms(&flux);
        assert!((rms - 0.2).abs() < 0.02, "rms={rms}");
    }

    #[test]
    fn line_emission_is_clipped() {
        let mut flux = noise(2000, 0.1, 11);
        for v in flux.iter_mut().skip(900).take(200) {
            *v += 5.0;
        }
        let rms = spectrum_rms(&flux);
        assert!(rms < 0.15, "emission leaked into rms={rms}");
    }

    #[test]
    fn all_positive_spectrum_has_no_estimate() {
        assert!(spectrum_rms(&[1.0, 2.0, 3.0]).is_nan());
        assert!(spectrum_rms(&[f64::NAN]).is_nan());
    }

    #[test]
    fn map_rms_is_reproducible() {
        let keys: Vec<usize> = (0..40).collect();
        let spectra: Vec<Vec<f64>> = keys.iter().map(|&k| noise(500, 0.3, k as u64)).collect();
        let a = estimate_map_rms(&keys, |k| spectra[k].clone(), 3);
        let b = estimate_map_rms(&keys, |k| spectra[k].clone(), 3);
        assert_eq!(a.to_bits(), b.to_bits());
        assert!((a - 0.3).abs() < 0.03, "map rms={a}");
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median_mut(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median_mut(&mut [4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median_mut(&mut []), None);
    }
}
