//! Single-spectrum fitting.
//!
//! The decomposition engine only depends on [`SpectrumFitter`]: given a
//! spectrum and initial component guesses, return components plus metrics, or
//! a non-converged result. It never raises for a failed fit.
//!
//! [`GridFitter`] is the built-in implementation. For each component in turn
//! it tries a local grid of `(centre offset, dispersion scale)` moves with the
//! other components held fixed; at every grid point the amplitudes are solved
//! by linear least squares, and the move with the lowest RSS is kept. Passes
//! repeat with the grid shrunk by half until no move improves the fit or the
//! pass budget is spent.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::domain::Component;
use crate::error::AppError;
use crate::fit::offset_grid::{lin_offsets, step_grid, width_scales};
use crate::math::solve_least_squares;
use crate::models::{fill_design_row, predict};

/// Raw fitter output for one spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFit {
    pub components: Vec<Component>,
    pub rss: f64,
    /// Finite channels used.
    pub n_channels: usize,
    pub converged: bool,
}

impl RawFit {
    pub fn failed(n_channels: usize) -> Self {
        Self {
            components: Vec::new(),
            rss: f64::NAN,
            n_channels,
            converged: false,
        }
    }
}

/// Contract of the single-spectrum fitter.
pub trait SpectrumFitter: Sync {
    /// Fit `flux` sampled on `axis`, starting from `guess`.
    fn fit(&self, axis: &[f64], flux: &[f64], guess: &[Component]) -> RawFit;
}

/// Options for [`GridFitter`].
#[derive(Debug, Clone)]
pub struct GridFitOptions {
    /// Maximum number of passes over all components.
    pub passes: usize,
    /// Half-width of the centre search in channel widths (first pass).
    pub centre_span: f64,
    pub centre_steps: usize,
    /// Dispersion search covers `[σ/ratio, σ·ratio]` (first pass).
    pub width_ratio: f64,
    pub width_steps: usize,
    pub channel_width: f64,
}

impl Default for GridFitOptions {
    fn default() -> Self {
        Self {
            passes: 6,
            centre_span: 2.0,
            centre_steps: 9,
            width_ratio: 1.5,
            width_steps: 7,
            channel_width: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GridFitter {
    opts: GridFitOptions,
}

#[derive(Debug, Clone)]
struct Candidate {
    idx: usize,
    shapes: Vec<(f64, f64)>,
    amplitudes: Vec<f64>,
    rss: f64,
}

impl GridFitter {
    pub fn new(opts: GridFitOptions) -> Result<Self, AppError> {
        if opts.passes == 0 {
            return Err(AppError::config("Grid fitter needs at least one pass."));
        }
        if !(opts.channel_width.is_finite() && opts.channel_width > 0.0) {
            return Err(AppError::config(format!(
                "Channel width must be finite and > 0, got {}.",
                opts.channel_width
            )));
        }
        // Validate the grid shape once up front.
        lin_offsets(opts.centre_span, opts.centre_steps)?;
        width_scales(opts.width_ratio, opts.width_steps)?;
        Ok(Self { opts })
    }

    pub fn options(&self) -> &GridFitOptions {
        &self.opts
    }

    /// Grid for pass `pass`: spans halve each pass.
    fn pass_grid(&self, pass: usize) -> Vec<(f64, f64)> {
        let shrink = 0.5_f64.powi(pass as i32);
        let span = self.opts.centre_span * self.opts.channel_width * shrink;
        let ratio = self.opts.width_ratio.powf(shrink);
        // Validated in `new`; shrinking keeps both inside their domains.
        let offsets = lin_offsets(span, self.opts.centre_steps).unwrap_or_else(|_| vec![0.0]);
        let scales = width_scales(ratio, self.opts.width_steps).unwrap_or_else(|_| vec![1.0]);
        step_grid(&offsets, &scales)
    }
}

impl SpectrumFitter for GridFitter {
    fn fit(&self, axis: &[f64], flux: &[f64], guess: &[Component]) -> RawFit {
        let (v, y): (Vec<f64>, Vec<f64>) = axis
            .iter()
            .zip(flux.iter())
            .filter(|(a, b)| a.is_finite() && b.is_finite())
            .map(|(a, b)| (*a, *b))
            .unzip();
        let n = v.len();
        let k = guess.len();

        if k == 0 {
            let rss = y.iter().map(|yi| yi * yi).sum();
            return RawFit {
                components: Vec::new(),
                rss,
                n_channels: n,
                converged: n > 0,
            };
        }
        // Three parameters per component plus at least one residual DOF.
        if n < 3 * k + 1 {
            return RawFit::failed(n);
        }
        if guess
            .iter()
            .any(|c| !(c.centre.is_finite() && c.dispersion.is_finite() && c.dispersion > 0.0))
        {
            return RawFit::failed(n);
        }

        let mut shapes: Vec<(f64, f64)> = guess.iter().map(|c| (c.centre, c.dispersion)).collect();
        let Some((mut amplitudes, mut rss)) = solve_amplitudes(&v, &y, &shapes) else {
            return RawFit::failed(n);
        };

        for pass in 0..self.opts.passes {
            let grid = self.pass_grid(pass);
            let mut improved = false;

            for j in 0..k {
                let Some(best) = best_move(&v, &y, &shapes, j, &grid) else {
                    continue;
                };
                if best.rss < rss {
                    improved = true;
                    shapes = best.shapes;
                    amplitudes = best.amplitudes;
                    rss = best.rss;
                }
            }

            if !improved && pass > 0 {
                break;
            }
        }

        let components: Vec<Component> = shapes
            .iter()
            .zip(amplitudes.iter())
            .map(|(&(centre, sigma), &amp)| Component::new(amp, centre, sigma))
            .collect();
        let converged = rss.is_finite() && components.iter().all(Component::is_finite);

        RawFit {
            components,
            rss,
            n_channels: n,
            converged,
        }
    }
}

/// Evaluate every move of component `j` (in parallel) and keep the best.
fn best_move(
    v: &[f64],
    y: &[f64],
    shapes: &[(f64, f64)],
    j: usize,
    grid: &[(f64, f64)],
) -> Option<Candidate> {
    let (c0, s0) = shapes[j];
    let candidates: Vec<Candidate> = grid
        .par_iter()
        .enumerate()
        .filter_map(|(idx, &(dc, scale))| {
            let mut trial = shapes.to_vec();
            trial[j] = (c0 + dc, s0 * scale);
            solve_amplitudes(v, y, &trial).map(|(amplitudes, rss)| Candidate {
                idx,
                shapes: trial,
                amplitudes,
                rss,
            })
        })
        .collect();

    // Deterministic selection: minimum RSS; break ties by grid index.
    let mut iter = candidates.into_iter();
    let mut best = iter.next()?;
    for c in iter {
        if c.rss < best.rss || (c.rss == best.rss && c.idx < best.idx) {
            best = c;
        }
    }
    Some(best)
}

/// Amplitudes by least squares for fixed `(centre, sigma)` shapes, plus RSS.
fn solve_amplitudes(v: &[f64], y: &[f64], shapes: &[(f64, f64)]) -> Option<(Vec<f64>, f64)> {
    let n = v.len();
    let k = shapes.len();
    let mut x = DMatrix::<f64>::zeros(n, k);
    let mut row = vec![0.0; k];
    for i in 0..n {
        fill_design_row(v[i], shapes, &mut row);
        for jj in 0..k {
            x[(i, jj)] = row[jj];
        }
    }
    let yv = DVector::from_row_slice(y);
    let beta = solve_least_squares(&x, &yv)?;
    let amplitudes: Vec<f64> = beta.iter().copied().collect();

    let comps: Vec<Component> = shapes
        .iter()
        .zip(amplitudes.iter())
        .map(|(&(c, s), &a)| Component::new(a, c, s))
        .collect();
    let rss: f64 = v
        .iter()
        .zip(y.iter())
        .map(|(&vi, &yi)| {
            let r = yi - predict(&comps, vi);
            r * r
        })
        .sum();

    rss.is_finite().then_some((amplitudes, rss))
}
