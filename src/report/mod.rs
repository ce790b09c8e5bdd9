//! Reporting utilities: decomposition statistics and fit-quality rankings.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{LevelOutcome, ModelStore, SpectrumEntry};
use crate::fit::SelectionRule;

pub mod format;

pub use format::*;

/// How often each per-level outcome occurred over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub no_parent_model: usize,
    pub not_converged: usize,
    pub count_rejected: usize,
    pub all_filtered: usize,
    pub candidate: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecompositionStats {
    pub n_spectra: usize,
    pub n_fitted: usize,
    pub n_unfit: usize,
    pub n_components: usize,
    /// Component count → number of fitted spectra.
    pub component_histogram: BTreeMap<usize, usize>,
    /// Mean components per fitted spectrum.
    pub mean_components: f64,
    /// Mean candidates (retained + alternatives) per fitted spectrum.
    pub mean_candidates: f64,
    pub single: usize,
    pub minimum_aic: usize,
    pub near_tie: usize,
    pub outcomes: OutcomeCounts,
}

pub fn compute_stats(store: &ModelStore) -> DecompositionStats {
    let mut stats = DecompositionStats {
        n_spectra: store.len(),
        n_fitted: 0,
        n_unfit: 0,
        n_components: 0,
        component_histogram: BTreeMap::new(),
        mean_components: f64::NAN,
        mean_candidates: f64::NAN,
        single: 0,
        minimum_aic: 0,
        near_tie: 0,
        outcomes: OutcomeCounts::default(),
    };
    let mut candidates = 0usize;

    for entry in store.entries.values() {
        for outcome in &entry.outcomes {
            match outcome {
                LevelOutcome::NoParentModel { .. } => stats.outcomes.no_parent_model += 1,
                LevelOutcome::NotConverged { .. } => stats.outcomes.not_converged += 1,
                LevelOutcome::CountRejected { .. } => stats.outcomes.count_rejected += 1,
                LevelOutcome::AllFiltered { .. } => stats.outcomes.all_filtered += 1,
                LevelOutcome::Candidate { .. } => stats.outcomes.candidate += 1,
            }
        }

        let Some(model) = &entry.model else {
            stats.n_unfit += 1;
            continue;
        };
        stats.n_fitted += 1;
        stats.n_components += model.n_components();
        *stats.component_histogram.entry(model.n_components()).or_default() += 1;
        candidates += 1 + entry.alternatives.len();
        match entry.selection {
            Some(SelectionRule::Single) => stats.single += 1,
            Some(SelectionRule::MinimumAic) => stats.minimum_aic += 1,
            Some(SelectionRule::NearTie) => stats.near_tie += 1,
            None => {}
        }
    }

    if stats.n_fitted > 0 {
        let n = stats.n_fitted as f64;
        stats.mean_components = stats.n_components as f64 / n;
        stats.mean_candidates = candidates as f64 / n;
    }
    stats
}

/// Residual rms of the retained model in units of the spectrum rms.
pub fn residual_ratio(entry: &SpectrumEntry) -> Option<f64> {
    let model = entry.model.as_ref()?;
    if model.n_channels() == 0 || !(entry.rms.is_finite() && entry.rms > 0.0) {
        return None;
    }
    let ratio = (model.rss() / model.n_channels() as f64).sqrt() / entry.rms;
    ratio.is_finite().then_some(ratio)
}

/// The `top_n` fitted spectra with the largest residual ratio.
pub fn worst_fits(store: &ModelStore, top_n: usize) -> Vec<(&SpectrumEntry, f64)> {
    let mut rows: Vec<(&SpectrumEntry, f64)> = store
        .entries
        .values()
        .filter_map(|e| residual_ratio(e).map(|r| (e, r)))
        .collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.key.cmp(&b.0.key)));
    rows.truncate(top_n);
    rows
}
