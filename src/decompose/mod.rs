//! Decomposition engine: propagate SAA template models down to every spectrum.
//!
//! For each spectrum key, levels are visited from the widest tiles to the
//! narrowest. Every SAA of a level that contains the pixel is evaluated:
//!
//! 1. no template model on the SAA → `NoParentModel`
//! 2. fit the pixel spectrum using the template components as guesses
//! 3. T0 on the raw count, then T1..T5 (see `fit::tolerance`)
//! 4. if filtering changed the components, refit once from the survivors and
//!    filter again
//! 5. the survivors, re-evaluated on the spectrum, become a candidate
//!
//! Candidates are reduced to one model with `select_model`; the rest are kept
//! as alternatives. Spectra that no level covers stay unfit.

use crate::coverage::CoverageSet;
use crate::cube::{Cube, VelocityTrim};
use crate::domain::{
    Component, LevelOutcome, Model, ModelStore, Provenance, SaaKey, SpectrumEntry, ToleranceSet,
};
use crate::error::AppError;
use crate::fit::{
    SpectrumFitter, ToleranceContext, ToleranceVerdict, apply_tolerances, filter_components,
    select_model,
};
use crate::math::{estimate_map_rms, spectrum_rms};
use crate::models::residual_sum_of_squares;
use crate::parallel::par_map;

#[derive(Debug, Clone, Default)]
pub struct DecomposeConfig {
    /// Identifier recorded in the provenance of every candidate.
    pub run_id: usize,
    pub tolerances: ToleranceSet,
    /// Only channels inside this velocity range are fitted.
    pub velocity_range: Option<(f64, f64)>,
    /// Worker threads (0 = default).
    pub workers: usize,
    /// Seed for sampling spectra in the map-level noise estimate.
    pub noise_seed: u64,
}

/// Read-only state shared by every per-spectrum task.
struct RunContext<'a, F> {
    cube: &'a Cube,
    coverage: &'a CoverageSet,
    fitter: &'a F,
    trim: VelocityTrim,
    levels: Vec<usize>,
    tolerances: ToleranceSet,
    run_id: usize,
    map_rms: f64,
    channel_width: f64,
}

/// Decompose every spectrum of the coverage footprint.
///
/// The returned store holds exactly one entry per spectrum key.
pub fn decompose<F: SpectrumFitter>(
    cube: &Cube,
    coverage: &CoverageSet,
    fitter: &F,
    config: &DecomposeConfig,
) -> Result<ModelStore, AppError> {
    config.tolerances.validate()?;
    let shape = cube.map_shape();
    if coverage.map_shape() != shape {
        return Err(AppError::config(format!(
            "Coverage map {}x{} does not match cube map {}x{}.",
            coverage.map_shape().ny,
            coverage.map_shape().nx,
            shape.ny,
            shape.nx
        )));
    }
    let keys = coverage.spectrum_keys();
    if keys.is_empty() {
        return Err(AppError::new(3, "Coverage footprint contains no valid spectra."));
    }
    if let Some(&bad) = keys.iter().find(|&&k| k >= shape.len()) {
        return Err(AppError::config(format!(
            "Spectrum key {bad} lies outside the {}x{} map.",
            shape.ny, shape.nx
        )));
    }

    let trim = VelocityTrim::new(cube.spectral_axis(), config.velocity_range);
    let map_rms = estimate_map_rms(keys, |k| trim.apply(&cube.spectrum(k)), config.noise_seed);
    log::info!(
        "Run {}: decomposing {} spectra over {} channels (map rms {map_rms:.4})",
        config.run_id,
        keys.len(),
        trim.len()
    );

    let ctx = RunContext {
        cube,
        coverage,
        fitter,
        trim,
        levels: coverage.levels_by_resolution(),
        tolerances: config.tolerances,
        run_id: config.run_id,
        map_rms,
        channel_width: cube.channel_width(),
    };

    let entries = par_map(config.workers, keys, |&key| decompose_spectrum(key, &ctx))?;

    let mut store = ModelStore::new(shape);
    for entry in entries {
        store.insert(entry);
    }
    let unfit = store.unfit_count();
    log::info!(
        "Run {}: {} spectra fitted, {unfit} unfit",
        config.run_id,
        store.fitted_count()
    );
    if unfit > 0 {
        log::warn!("Run {}: {unfit} spectra have no surviving model", config.run_id);
    }
    Ok(store)
}

fn decompose_spectrum<F: SpectrumFitter>(key: usize, ctx: &RunContext<'_, F>) -> SpectrumEntry {
    let shape = ctx.cube.map_shape();
    // Keys are validated against the map before the run starts.
    let location = shape.location(key).unwrap_or_default();
    let flux = ctx.trim.apply(&ctx.cube.spectrum(key));
    let own_rms = spectrum_rms(&flux);
    let rms = if own_rms.is_finite() { own_rms } else { ctx.map_rms };

    let mut entry = SpectrumEntry::unfit(key, location, rms);
    let mut candidates = Vec::new();

    for &level in &ctx.levels {
        for &tile in ctx.coverage.owners_in_level(level, key) {
            let saa_key = SaaKey::new(level, tile);
            let outcome = match evaluate_level(saa_key, &flux, rms, ctx) {
                Ok(model) => {
                    let outcome = LevelOutcome::Candidate {
                        saa: saa_key,
                        n_components: model.n_components(),
                    };
                    candidates.push(model);
                    outcome
                }
                Err(outcome) => outcome,
            };
            log::debug!("Spectrum {key}: {outcome:?}");
            entry.outcomes.push(outcome);
        }
    }

    if let Some(sel) = select_model(&candidates) {
        let chosen = candidates.remove(sel.index);
        entry.model = Some(chosen);
        entry.selection = Some(sel.rule);
        entry.alternatives = candidates;
    }
    entry
}

/// Fit one spectrum against one parent SAA.
fn evaluate_level<F: SpectrumFitter>(
    saa_key: SaaKey,
    flux: &[f64],
    rms: f64,
    ctx: &RunContext<'_, F>,
) -> Result<Model, LevelOutcome> {
    let parent = ctx
        .coverage
        .get(saa_key)
        .and_then(|saa| saa.model.as_ref())
        .ok_or(LevelOutcome::NoParentModel { saa: saa_key })?;

    let axis = &ctx.trim.axis;
    let raw = ctx.fitter.fit(axis, flux, &parent.components);
    if !raw.converged {
        return Err(LevelOutcome::NotConverged { saa: saa_key });
    }

    let tctx = ToleranceContext {
        rms,
        channel_width: ctx.channel_width,
    };
    let components = match apply_tolerances(&raw.components, &parent.components, &ctx.tolerances, &tctx) {
        ToleranceVerdict::CountRejected { raw, parent } => {
            return Err(LevelOutcome::CountRejected {
                saa: saa_key,
                raw,
                parent,
            });
        }
        ToleranceVerdict::AllFiltered => return Err(LevelOutcome::AllFiltered { saa: saa_key }),
        ToleranceVerdict::Accepted { components, changed } => {
            if changed {
                refine(axis, flux, components, &parent.components, &tctx, ctx)
            } else {
                components
            }
        }
    };
    if components.is_empty() {
        return Err(LevelOutcome::AllFiltered { saa: saa_key });
    }

    let (rss, n) = residual_sum_of_squares(&components, axis, flux);
    Ok(Model::new(
        components,
        rss,
        n,
        true,
        rms,
        Provenance::candidate(ctx.run_id, saa_key),
    ))
}

/// Refit from filtered survivors and filter again (no T0).
///
/// A refit that fails to converge, or that comes back with more components
/// than it was given, keeps the survivors as they are.
fn refine<F: SpectrumFitter>(
    axis: &[f64],
    flux: &[f64],
    survivors: Vec<Component>,
    parent: &[Component],
    tctx: &ToleranceContext,
    ctx: &RunContext<'_, F>,
) -> Vec<Component> {
    let refit = ctx.fitter.fit(axis, flux, &survivors);
    if !refit.converged || refit.components.len() > survivors.len() {
        return survivors;
    }
    filter_components(&refit.components, parent, &ctx.tolerances, tctx)
}
