//! Search grids for the grid fitter.
//!
//! Each fitter step moves one component by a centre offset (in channel widths)
//! and a multiplicative dispersion scale. Offsets are linearly spaced, scales
//! log-spaced so narrowing and widening are symmetric.
//!
//! Why grid search?
//! - It is deterministic given the same inputs.
//! - Amplitudes are linear given centres and widths, so each grid point is a
//!   single least-squares solve.
//! - Parent templates already place components close to the answer, so a
//!   small local grid is enough.

use crate::error::AppError;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(AppError::config(format!(
            "Invalid log range: min={min}, max={max} (must be finite, >0, and max>min)."
        )));
    }
    if steps < 2 {
        return Err(AppError::config("Log-spaced grid steps must be >= 2."));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    Ok(out)
}

/// `steps` linearly spaced points in `[-span, span]`; one step gives `[0]`.
pub fn lin_offsets(span: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(span.is_finite() && span >= 0.0) {
        return Err(AppError::config(format!("Invalid offset span {span}.")));
    }
    if steps == 0 {
        return Err(AppError::config("Offset grid steps must be >= 1."));
    }
    if steps == 1 || span == 0.0 {
        return Ok(vec![0.0]);
    }
    let step = 2.0 * span / (steps as f64 - 1.0);
    Ok((0..steps).map(|i| -span + step * i as f64).collect())
}

/// Dispersion scales in `[1/ratio, ratio]`; a ratio of 1 or one step gives `[1]`.
pub fn width_scales(ratio: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(ratio.is_finite() && ratio >= 1.0) {
        return Err(AppError::config(format!("Width ratio must be >= 1, got {ratio}.")));
    }
    if steps <= 1 || ratio == 1.0 {
        return Ok(vec![1.0]);
    }
    // Snap the midpoint so the identity move is recognised exactly.
    Ok(log_space(1.0 / ratio, ratio, steps)?
        .into_iter()
        .map(|s| if (s - 1.0).abs() < 1e-12 { 1.0 } else { s })
        .collect())
}

/// `(centre offset, dispersion scale)` pairs for one component step.
///
/// The identity move `(0, 1)` is always first, so a step that finds nothing
/// better keeps the current parameters.
pub fn step_grid(offsets: &[f64], scales: &[f64]) -> Vec<(f64, f64)> {
    let mut out = vec![(0.0, 1.0)];
    for &dc in offsets {
        for &s in scales {
            if dc == 0.0 && s == 1.0 {
                continue;
            }
            out.push((dc, s));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_space_includes_endpoints() {
        let v = log_space(0.1, 10.0, 5).unwrap();
        assert!((v[0] - 0.1).abs() < 1e-12);
        assert!((v[v.len() - 1] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn width_scales_are_symmetric() {
        let s = width_scales(2.0, 3).unwrap();
        assert!((s[0] - 0.5).abs() < 1e-12);
        assert!((s[1] - 1.0).abs() < 1e-12);
        assert!((s[2] - 2.0).abs() < 1e-12);
        assert!(width_scales(0.5, 3).is_err());
    }

    #[test]
    fn step_grid_starts_with_identity_once() {
        let offsets = lin_offsets(1.0, 3).unwrap();
        assert_eq!(offsets, vec![-1.0, 0.0, 1.0]);
        let grid = step_grid(&offsets, &[0.5, 1.0, 2.0]);
        assert_eq!(grid[0], (0.0, 1.0));
        assert_eq!(grid.len(), 9);
        assert_eq!(grid.iter().filter(|p| **p == (0.0, 1.0)).count(), 1);
    }
}
