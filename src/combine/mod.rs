//! Combine model stores from independent decomposition runs.
//!
//! Keys are the union over all stores. A key fitted by exactly one run is
//! taken as is; a key fitted by several runs goes through `select_model`
//! jointly, and every other run's model and alternatives are appended to the
//! winner's alternatives (de-duplicated by structural equivalence). Keys that
//! no run fitted stay unfit and are counted.
//!
//! The key space is the union of the stores' keys. Map pixels that no store
//! holds (outside every run's footprint) are not invented as unfit entries;
//! they are counted separately as absent.
//!
//! "Run" here is a store's position in the input list. It is unrelated to the
//! run id recorded in each model's [`Provenance`](crate::domain::Provenance)
//! by `decompose`, which defaults to 0 for every run.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::{MODEL_EQ_EPS, Model, ModelStore, SpectrumEntry};
use crate::error::AppError;
use crate::fit::select_model;

/// Where the combined model of one spectrum came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectrumProvenance {
    /// Position in the input list of the store whose model was retained.
    /// Not the model's `provenance.run`.
    pub source_run: Option<usize>,
    /// Runs that produced a model for this spectrum.
    pub contributing_runs: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedStore {
    pub store: ModelStore,
    pub provenance: BTreeMap<usize, SpectrumProvenance>,
    pub unfit_count: usize,
    /// Map pixels held by no input store.
    #[serde(default)]
    pub absent_count: usize,
}

/// Merge `stores` into a single store covering the union of their keys.
pub fn combine(stores: &[ModelStore]) -> Result<CombinedStore, AppError> {
    let Some(first) = stores.first() else {
        return Err(AppError::config("Nothing to combine: no model stores given."));
    };
    let shape = first.map_shape;
    for (run, s) in stores.iter().enumerate() {
        if s.map_shape != shape {
            return Err(AppError::config(format!(
                "Store {run} has map {}x{}, expected {}x{}.",
                s.map_shape.ny, s.map_shape.nx, shape.ny, shape.nx
            )));
        }
    }

    let shared = shared_run_ids(stores);
    if !shared.is_empty() {
        log::warn!(
            "Run ids {shared:?} occur in more than one store; model provenance cannot tell those runs apart \
             (pass distinct --run-id values to decompose)"
        );
    }

    // Key -> (run, entry) for every run that has the key.
    let mut by_key: BTreeMap<usize, Vec<(usize, &SpectrumEntry)>> = BTreeMap::new();
    for (run, s) in stores.iter().enumerate() {
        for (&key, entry) in &s.entries {
            by_key.entry(key).or_default().push((run, entry));
        }
    }

    let mut store = ModelStore::new(shape);
    let mut provenance = BTreeMap::new();
    let mut multi = 0usize;

    for (key, present) in by_key {
        let fitted: Vec<(usize, &SpectrumEntry)> =
            present.iter().copied().filter(|(_, e)| e.is_fitted()).collect();
        let contributing_runs: Vec<usize> = fitted.iter().map(|(run, _)| *run).collect();

        let (entry, source_run) = match fitted.as_slice() {
            [] => {
                // Keep the first run's diagnostics for the unfit entry.
                let (_, e) = present[0];
                (e.clone(), None)
            }
            [(run, e)] => ((*e).clone(), Some(*run)),
            _ => {
                multi += 1;
                combine_fitted(&fitted)
            }
        };

        provenance.insert(
            key,
            SpectrumProvenance {
                source_run,
                contributing_runs,
            },
        );
        store.insert(entry);
    }

    let unfit_count = store.unfit_count();
    let absent_count = shape.len().saturating_sub(store.len());
    if absent_count > 0 {
        log::info!("{absent_count} map pixels are held by no store");
    }
    log::info!(
        "Combined {} stores: {} spectra, {multi} selected across runs, {unfit_count} unfit",
        stores.len(),
        store.len()
    );
    if unfit_count > 0 {
        log::warn!("{unfit_count} spectra are unfit in every run");
    }

    Ok(CombinedStore {
        store,
        provenance,
        unfit_count,
        absent_count,
    })
}

/// Model run ids (from `Provenance::run`) that appear in more than one store.
pub fn shared_run_ids(stores: &[ModelStore]) -> Vec<usize> {
    let mut seen_in: BTreeMap<usize, usize> = BTreeMap::new();
    for s in stores {
        let ids: BTreeSet<usize> = s
            .entries
            .values()
            .flat_map(|e| e.model.iter().chain(e.alternatives.iter()))
            .filter_map(|m| m.provenance.run)
            .collect();
        for id in ids {
            *seen_in.entry(id).or_default() += 1;
        }
    }
    seen_in
        .into_iter()
        .filter(|&(_, n)| n > 1)
        .map(|(id, _)| id)
        .collect()
}

/// Joint selection over entries that all carry a model.
fn combine_fitted(fitted: &[(usize, &SpectrumEntry)]) -> (SpectrumEntry, Option<usize>) {
    let models: Vec<&Model> = fitted.iter().filter_map(|(_, e)| e.model.as_ref()).collect();
    let Some(sel) = select_model(&models) else {
        return (fitted[0].1.clone(), Some(fitted[0].0));
    };

    let (source_run, winner) = fitted[sel.index];
    let mut entry = winner.clone();
    entry.selection = Some(sel.rule);

    let Some(chosen) = entry.model.clone() else {
        return (entry, Some(source_run));
    };
    for (i, (_, other)) in fitted.iter().enumerate() {
        if i == sel.index {
            continue;
        }
        let pool = other.model.iter().chain(other.alternatives.iter());
        for m in pool {
            push_unique(&mut entry.alternatives, &chosen, m);
        }
        entry.outcomes.extend(other.outcomes.iter().cloned());
    }
    (entry, Some(source_run))
}

fn push_unique(alternatives: &mut Vec<Model>, chosen: &Model, candidate: &Model) {
    if candidate.equivalent(chosen, MODEL_EQ_EPS) {
        return;
    }
    if alternatives.iter().any(|m| m.equivalent(candidate, MODEL_EQ_EPS)) {
        return;
    }
    alternatives.push(candidate.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Component, MapShape, PixelLocation, Provenance, SaaKey};

    fn shape() -> MapShape {
        MapShape::new(3, 4)
    }

    fn model(run: usize, comps: Vec<Component>, rss: f64) -> Model {
        Model::new(comps, rss, 50, true, 0.1, Provenance::candidate(run, SaaKey::new(0, 0)))
    }

    fn fitted(key: usize, m: Model) -> SpectrumEntry {
        let loc = shape().location(key).unwrap();
        let mut e = SpectrumEntry::unfit(key, loc, 0.1);
        e.model = Some(m);
        e
    }

    fn store_with(entries: Vec<SpectrumEntry>) -> ModelStore {
        let mut s = ModelStore::new(shape());
        for e in entries {
            s.insert(e);
        }
        s
    }

    #[test]
    fn disjoint_runs_cover_the_union() {
        let one = vec![Component::new(1.0, 0.0, 1.0)];
        let a = store_with((0..5).map(|k| fitted(k, model(0, one.clone(), 1.0))).collect());
        let b = store_with((5..12).map(|k| fitted(k, model(1, one.clone(), 1.0))).collect());

        let out = combine(&[a, b]).unwrap();
        assert_eq!(out.store.len(), 12);
        assert_eq!(out.unfit_count, 0);
        assert_eq!(out.absent_count, 0);
        assert_eq!(out.provenance[&3].source_run, Some(0));
        assert_eq!(out.provenance[&9].source_run, Some(1));
        assert_eq!(out.provenance[&9].contributing_runs, vec![1]);
    }

    #[test]
    fn overlapping_keys_are_selected_and_deduplicated() {
        let two = vec![Component::new(1.0, 0.0, 1.0), Component::new(0.5, 4.0, 1.0)];
        let one = vec![Component::new(1.0, 0.0, 1.0)];

        // Run 0: 2 components, slightly lower AIC. Run 1: 1 component within ΔAIC 2.
        let m0 = model(0, two.clone(), 1.0);
        let rss1 = 50.0 * ((m0.aic() + 1.0 - 6.0) / 50.0).exp();
        let m1 = model(1, one.clone(), rss1);
        assert!((m1.aic() - m0.aic() - 1.0).abs() < 1e-9);

        let mut e0 = fitted(2, m0.clone());
        // An alternative equivalent to run 1's model must not be duplicated.
        e0.alternatives.push(model(0, one.clone(), 3.0));
        let a = store_with(vec![e0]);
        let b = store_with(vec![fitted(2, m1.clone())]);

        let out = combine(&[a, b]).unwrap();
        let entry = out.store.get(2).unwrap();
        assert_eq!(entry.model.as_ref().unwrap().n_components(), 1);
        assert_eq!(out.provenance[&2].source_run, Some(1));
        assert_eq!(out.provenance[&2].contributing_runs, vec![0, 1]);
        // Run 0's model is kept; its alternative duplicates the winner.
        assert_eq!(entry.alternatives.len(), 1);
        assert!(entry.alternatives[0].equivalent(&m0, MODEL_EQ_EPS));
    }

    #[test]
    fn unfit_everywhere_stays_unfit() {
        let loc = PixelLocation::new(0, 0);
        let a = store_with(vec![SpectrumEntry::unfit(0, loc, 0.1)]);
        let b = store_with(vec![SpectrumEntry::unfit(0, loc, 0.1)]);
        let out = combine(&[a, b]).unwrap();
        assert_eq!(out.unfit_count, 1);
        assert_eq!(out.provenance[&0].source_run, None);
        assert!(out.provenance[&0].contributing_runs.is_empty());
    }

    #[test]
    fn fitted_run_wins_over_unfit_run() {
        let loc = PixelLocation::new(1, 0);
        let a = store_with(vec![SpectrumEntry::unfit(1, loc, 0.1)]);
        let b = store_with(vec![fitted(1, model(1, vec![Component::new(1.0, 0.0, 1.0)], 1.0))]);
        let out = combine(&[a, b]).unwrap();
        assert!(out.store.get(1).unwrap().is_fitted());
        assert_eq!(out.provenance[&1].source_run, Some(1));
    }

    #[test]
    fn pixels_outside_every_store_are_counted_as_absent() {
        let one = vec![Component::new(1.0, 0.0, 1.0)];
        let a = store_with((0..5).map(|k| fitted(k, model(0, one.clone(), 1.0))).collect());
        let out = combine(&[a]).unwrap();
        assert_eq!(out.store.len(), 5);
        assert_eq!(out.unfit_count, 0);
        assert_eq!(out.absent_count, 7);
    }

    #[test]
    fn source_run_is_the_input_position_not_the_model_run_id() {
        let one = vec![Component::new(1.0, 0.0, 1.0)];
        // Both runs were decomposed with the default run id 0.
        let a = store_with(vec![fitted(0, model(0, one.clone(), 1.0))]);
        let b = store_with(vec![fitted(1, model(0, one.clone(), 1.0))]);
        assert_eq!(shared_run_ids(&[a.clone(), b.clone()]), vec![0]);

        let out = combine(&[a, b]).unwrap();
        assert_eq!(out.provenance[&1].source_run, Some(1));
        assert_eq!(out.store.get(1).unwrap().model.as_ref().unwrap().provenance.run, Some(0));

        let c = store_with(vec![fitted(2, model(1, one.clone(), 1.0))]);
        let d = store_with(vec![fitted(3, model(2, one, 1.0))]);
        assert!(shared_run_ids(&[c, d]).is_empty());
    }

    #[test]
    fn shape_mismatch_and_empty_input_are_errors() {
        let a = ModelStore::new(shape());
        let b = ModelStore::new(MapShape::new(2, 2));
        assert_eq!(combine(&[a, b]).unwrap_err().exit_code(), 2);
        assert!(combine(&[]).is_err());
    }
}
