//! Evaluation of Gaussian mixtures on a spectral axis.
//!
//! The fitter relies on two primitive operations:
//! - build a design row for a channel given fixed centres and widths (for OLS)
//! - predict the mixture at a channel (for residuals)

use crate::domain::Component;
use crate::math::{profile, unit_profile};

/// Fill a design row for channel velocity `v`: one unit-amplitude column per
/// `(centre, sigma)` pair.
///
/// # Panics
/// Panics if `out` is shorter than `shapes`. Callers should size it correctly.
pub fn fill_design_row(v: f64, shapes: &[(f64, f64)], out: &mut [f64]) {
    for (j, &(centre, sigma)) in shapes.iter().enumerate() {
        out[j] = unit_profile(v, centre, sigma);
    }
}

/// Predict the mixture value at `v`.
pub fn predict(components: &[Component], v: f64) -> f64 {
    components
        .iter()
        .map(|c| profile(v, c.amplitude, c.centre, c.dispersion))
        .sum()
}

/// Residual sum of squares of `components` against `flux` on `axis`.
///
/// Only channels where both axis and flux are finite count. Returns
/// `(rss, n_channels)`.
pub fn residual_sum_of_squares(components: &[Component], axis: &[f64], flux: &[f64]) -> (f64, usize) {
    let mut rss = 0.0;
    let mut n = 0usize;
    for (&v, &y) in axis.iter().zip(flux.iter()) {
        if !(v.is_finite() && y.is_finite()) {
            continue;
        }
        let r = y - predict(components, v);
        rss += r * r;
        n += 1;
    }
    (rss, n)
}
