//! Gaussian line profiles.
//!
//! Components are parameterised by amplitude, centre and dispersion σ:
//!
//! `g(v) = A · exp(-(v - v0)² / (2σ²))`
//!
//! A non-positive or non-finite σ yields a zero profile rather than NaN, so a
//! degenerate component simply stops contributing to the design matrix.

/// Unit-amplitude Gaussian evaluated at `v`.
pub fn unit_profile(v: f64, centre: f64, sigma: f64) -> f64 {
    if !(sigma.is_finite() && sigma > 0.0) {
        return 0.0;
    }
    let z = (v - centre) / sigma;
    (-0.5 * z * z).exp()
}

/// Gaussian with amplitude `amplitude` evaluated at `v`.
pub fn profile(v: f64, amplitude: f64, centre: f64, sigma: f64) -> f64 {
    amplitude * unit_profile(v, centre, sigma)
}
