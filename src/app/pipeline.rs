//! Shared pipeline logic used by the CLI commands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! cube -> coverage -> template acquisition -> decomposition -> combination
//!
//! Every stage returns a new value; nothing is mutated across stages.

use crate::combine::{CombinedStore, combine};
use crate::coverage::{AcquiredModel, CoverageConfig, CoverageSet};
use crate::cube::VelocityTrim;
use crate::data::{SyntheticConfig, SyntheticCube, generate_cube};
use crate::decompose::{DecomposeConfig, decompose};
use crate::domain::{MapShape, ModelStore, ToleranceSet};
use crate::error::AppError;
use crate::fit::{GridFitOptions, GridFitter, SpectrumFitter};
use crate::geometry::{CoverageEntry, validate_width};
use crate::parallel::par_map;
use crate::report::{DecompositionStats, compute_stats};

/// Settings of a synthetic end-to-end run.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub synthetic: SyntheticConfig,
    /// Tile width per level, coarsest first.
    pub widths: Vec<f64>,
    /// Number of independent runs; with more than one, run `r` only uses
    /// level `r % levels`.
    pub runs: usize,
    pub tolerances: ToleranceSet,
    pub velocity_range: Option<(f64, f64)>,
    pub workers: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            synthetic: SyntheticConfig::default(),
            widths: vec![6.0, 3.0],
            runs: 1,
            tolerances: ToleranceSet::default(),
            velocity_range: None,
            workers: 0,
        }
    }
}

/// All computed outputs of a demo run.
#[derive(Debug, Clone)]
pub struct DemoOutput {
    pub synthetic: SyntheticCube,
    /// Coverage per run, with template models attached.
    pub coverage: Vec<CoverageSet>,
    pub stores: Vec<ModelStore>,
    pub combined: CombinedStore,
    pub stats: DecompositionStats,
}

/// Regular, non-overlapping tiling of `shape` with squares of side `width`.
pub fn grid_pattern(shape: MapShape, width: f64) -> Result<Vec<CoverageEntry>, AppError> {
    validate_width(width)?;
    let centres = |n: usize| -> Vec<f64> {
        let mut out = Vec::new();
        let mut start = 0.0;
        while start < n as f64 {
            out.push(start + 0.5 * (width - 1.0));
            start += width;
        }
        out
    };
    let xs = centres(shape.nx);
    let ys = centres(shape.ny);
    let mut entries = Vec::with_capacity(xs.len() * ys.len());
    for &y in &ys {
        for &x in &xs {
            entries.push(CoverageEntry::new(x, y, true));
        }
    }
    Ok(entries)
}

/// Reference fitter tuned to the cube's channel width.
pub fn reference_fitter(channel_width: f64, opts: GridFitOptions) -> Result<GridFitter, AppError> {
    GridFitter::new(GridFitOptions {
        channel_width,
        ..opts
    })
}

/// Template models for every SAA marked for fitting, fitted on the SAA
/// spectrum starting from the mean synthetic truth of its pixels.
pub fn acquire_from_truth<F: SpectrumFitter>(
    set: &CoverageSet,
    synthetic: &SyntheticCube,
    trim: &VelocityTrim,
    fitter: &F,
    workers: usize,
) -> Result<Vec<AcquiredModel>, AppError> {
    let targets: Vec<_> = set.saas().iter().filter(|s| s.to_be_fit).collect();
    let acquired = par_map(workers, &targets, |saa| {
        let guess = synthetic.mean_truth(&saa.indices);
        let fit = fitter.fit(&trim.axis, &trim.apply(&saa.spectrum), &guess);
        AcquiredModel {
            level: saa.key.level,
            tile: saa.key.tile,
            converged: fit.converged && !fit.components.is_empty(),
            components: fit.components,
        }
    })?;
    let failed = acquired.iter().filter(|a| !a.converged).count();
    if failed > 0 {
        log::warn!("{failed} of {} template fits did not converge", acquired.len());
    }
    Ok(acquired)
}

/// Coverage config covering the synthetic map with `widths`.
fn demo_coverage(shape: MapShape, widths: &[f64]) -> Result<CoverageConfig, AppError> {
    let patterns = widths
        .iter()
        .map(|&w| grid_pattern(shape, w))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CoverageConfig {
        map_shape: shape,
        x_offset: 0,
        y_offset: 0,
        moment_mask: None,
        widths: widths.to_vec(),
        patterns,
    })
}

/// Execute the full pipeline on a synthetic cube.
pub fn run_demo(config: &DemoConfig) -> Result<DemoOutput, AppError> {
    if config.widths.is_empty() {
        return Err(AppError::config("Demo needs at least one tile width."));
    }
    if config.runs == 0 {
        return Err(AppError::config("Demo needs at least one run."));
    }
    config.tolerances.validate()?;

    // 1) Synthetic cube.
    let synthetic = generate_cube(&config.synthetic)?;
    let cube = &synthetic.cube;
    let trim = VelocityTrim::new(cube.spectral_axis(), config.velocity_range);
    let fitter = reference_fitter(cube.channel_width(), GridFitOptions::default())?;

    let mut coverage = Vec::with_capacity(config.runs);
    let mut stores = Vec::with_capacity(config.runs);
    for run in 0..config.runs {
        // 2) Coverage for this run.
        let widths = if config.runs == 1 {
            config.widths.clone()
        } else {
            vec![config.widths[run % config.widths.len()]]
        };
        let set = CoverageSet::build(cube, &demo_coverage(cube.map_shape(), &widths)?, config.workers)?;

        // 3) Template models.
        let acquired = acquire_from_truth(&set, &synthetic, &trim, &fitter, config.workers)?;
        let set = set.attach_models(&acquired, &trim)?;

        // 4) Decomposition.
        let decompose_config = DecomposeConfig {
            run_id: run,
            tolerances: config.tolerances,
            velocity_range: config.velocity_range,
            workers: config.workers,
            noise_seed: config.synthetic.seed.wrapping_add(run as u64),
        };
        stores.push(decompose(cube, &set, &fitter, &decompose_config)?);
        coverage.push(set);
    }

    // 5) Combination.
    let combined = combine(&stores)?;
    let stats = compute_stats(&combined.store);

    Ok(DemoOutput {
        synthetic,
        coverage,
        stores,
        combined,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_demo(runs: usize) -> DemoConfig {
        DemoConfig {
            synthetic: SyntheticConfig {
                ny: 6,
                nx: 6,
                n_channels: 64,
                ..SyntheticConfig::default()
            },
            widths: vec![6.0, 3.0],
            runs,
            workers: 2,
            ..DemoConfig::default()
        }
    }

    #[test]
    fn grid_pattern_partitions_the_map() {
        let entries = grid_pattern(MapShape::new(12, 12), 3.0).unwrap();
        assert_eq!(entries.len(), 16);
        assert_eq!((entries[0].x, entries[0].y), (1.0, 1.0));
        assert_eq!(entries[15].x, 10.0);
        assert!(grid_pattern(MapShape::new(2, 2), -1.0).is_err());
    }

    #[test]
    fn demo_covers_every_spectrum() {
        let out = run_demo(&small_demo(1)).unwrap();
        assert_eq!(out.combined.store.len(), 36);
        assert_eq!(out.stats.n_spectra, 36);
        assert!(out.stats.n_fitted > 30, "fitted {}", out.stats.n_fitted);
        // Two levels → usually two candidates per spectrum.
        assert!(out.stats.mean_candidates > 1.0);
        assert_eq!(out.coverage[0].levels().len(), 2);
    }

    #[test]
    fn demo_runs_combine_over_the_same_keys() {
        let out = run_demo(&small_demo(2)).unwrap();
        assert_eq!(out.stores.len(), 2);
        assert_eq!(out.combined.store.len(), 36);
        let shared = out
            .combined
            .provenance
            .values()
            .filter(|p| p.contributing_runs.len() == 2)
            .count();
        assert!(shared > 0);
    }

    #[test]
    fn demo_is_reproducible() {
        let a = run_demo(&small_demo(1)).unwrap();
        let b = run_demo(&DemoConfig {
            workers: 1,
            ..small_demo(1)
        })
        .unwrap();
        assert_eq!(a.combined.store.entries.len(), b.combined.store.entries.len());
        for (k, e) in &a.combined.store.entries {
            let other = &b.combined.store.entries[k];
            assert_eq!(e.model.as_ref().map(|m| &m.components), other.model.as_ref().map(|m| &m.components));
        }
    }
}
