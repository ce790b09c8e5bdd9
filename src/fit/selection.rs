//! Model selection using AIC with a fixed ΔAIC tie-break.
//!
//! For each candidate:
//! - AIC = n · ln(RSS/n) + 2k, with `k = 3 × components` and `n` the fitted channels
//!
//! Selection rules:
//! 1. Choose the candidate with minimum AIC (`best`)
//! 2. Among the others, find the one with the smallest ΔAIC to `best`
//! 3. If that ΔAIC < 2, pick it instead of `best`
//!
//! Ties in ΔAIC go to fewer components, then to input order. Ties in AIC make
//! the candidate with more components `best`, so the simpler one sits at
//! ΔAIC 0 and wins step 3. Non-finite AIC ranks behind every finite value.

use std::borrow::Borrow;
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::domain::Model;

/// Near-tie threshold on ΔAIC.
pub const DELTA_AIC_THRESHOLD: f64 = 2.0;

/// Which branch of the selection rule produced the retained model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    /// Only one candidate was available.
    Single,
    /// The minimum-AIC candidate.
    MinimumAic,
    /// A competitor within the ΔAIC threshold replaced the minimum-AIC candidate.
    NearTie,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    /// Index into the candidate slice.
    pub index: usize,
    pub rule: SelectionRule,
    /// ΔAIC of the closest competitor (`None` with a single candidate).
    pub delta_aic: Option<f64>,
}

/// Akaike information criterion for a least-squares fit.
pub fn aic(n: usize, rss: f64, k: usize) -> f64 {
    if n == 0 {
        return f64::NAN;
    }
    let n_f = n as f64;
    let rss_per = (rss / n_f).max(1e-300);
    n_f * rss_per.ln() + 2.0 * k as f64
}

fn rank_aic(m: &Model) -> f64 {
    if m.aic().is_finite() { m.aic() } else { f64::INFINITY }
}

/// Ordering on `(score, component count, input index)`, fewer components first.
fn order(a: (f64, usize, usize), b: (f64, usize, usize)) -> Ordering {
    a.0.total_cmp(&b.0)
        .then(a.1.cmp(&b.1))
        .then(a.2.cmp(&b.2))
}

/// Like [`order`], but more components first.
fn order_best(a: (f64, usize, usize), b: (f64, usize, usize)) -> Ordering {
    a.0.total_cmp(&b.0)
        .then(b.1.cmp(&a.1))
        .then(a.2.cmp(&b.2))
}

/// Pick one model from `candidates`; `None` when the slice is empty.
pub fn select_model<M: Borrow<Model>>(candidates: &[M]) -> Option<Selection> {
    match candidates.len() {
        0 => return None,
        1 => {
            return Some(Selection {
                index: 0,
                rule: SelectionRule::Single,
                delta_aic: None,
            });
        }
        _ => {}
    }

    let keyed: Vec<(f64, usize, usize)> = candidates
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let m = m.borrow();
            (rank_aic(m), m.n_components(), i)
        })
        .collect();

    let best = keyed.iter().copied().min_by(|a, b| order_best(*a, *b))?;

    let runner_up = keyed
        .iter()
        .filter(|k| k.2 != best.2)
        .map(|&(score, nc, i)| (score - best.0, nc, i))
        .min_by(|a, b| order(*a, *b))?;

    let delta = runner_up.0;
    if delta.is_finite() && delta < DELTA_AIC_THRESHOLD {
        Some(Selection {
            index: runner_up.2,
            rule: SelectionRule::NearTie,
            delta_aic: Some(delta),
        })
    } else {
        Some(Selection {
            index: best.2,
            rule: SelectionRule::MinimumAic,
            delta_aic: delta.is_finite().then_some(delta),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Component, Provenance, SaaKey};

    fn model_with_aic(aic: f64, n_comp: usize) -> Model {
        let comps = (0..n_comp)
            .map(|i| Component::new(1.0, i as f64 * 5.0, 1.0))
            .collect();
        Model::with_aic(comps, aic, Provenance::template(SaaKey::new(0, 0)))
    }

    #[test]
    fn aic_matches_formula() {
        let v = aic(100, 4.0, 6);
        assert!((v - (100.0 * 0.04_f64.ln() + 12.0)).abs() < 1e-12);
        // Perfect fits stay finite.
        assert!(aic(10, 0.0, 3).is_finite());
        assert!(aic(0, 1.0, 3).is_nan());
    }

    #[test]
    fn near_tie_prefers_the_competitor() {
        let a = model_with_aic(100.0, 2);
        let b = model_with_aic(101.0, 1);
        let sel = select_model(&[a, b]).unwrap();
        assert_eq!(sel.index, 1);
        assert_eq!(sel.rule, SelectionRule::NearTie);
        assert!((sel.delta_aic.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn clear_winner_is_kept() {
        let a = model_with_aic(100.0, 2);
        let b = model_with_aic(102.0, 1);
        let sel = select_model(&[&a, &b]).unwrap();
        assert_eq!(sel.index, 0);
        assert_eq!(sel.rule, SelectionRule::MinimumAic);
    }

    #[test]
    fn empty_and_single_inputs() {
        let none: [Model; 0] = [];
        assert!(select_model(&none).is_none());
        let sel = select_model(&[model_with_aic(5.0, 3)]).unwrap();
        assert_eq!((sel.index, sel.rule), (0, SelectionRule::Single));
    }

    #[test]
    fn delta_ties_prefer_fewer_components_then_order() {
        // best = 0; candidates 1..=3 all at ΔAIC 1.
        let models = [
            model_with_aic(50.0, 2),
            model_with_aic(51.0, 3),
            model_with_aic(51.0, 1),
            model_with_aic(51.0, 1),
        ];
        let sel = select_model(&models).unwrap();
        assert_eq!(sel.index, 2);
    }

    #[test]
    fn equal_aic_retains_the_simpler_model_in_either_order() {
        let models = [model_with_aic(100.0, 2), model_with_aic(100.0, 1)];
        let sel = select_model(&models).unwrap();
        assert_eq!(sel.index, 1);
        assert_eq!(sel.rule, SelectionRule::NearTie);
        assert_eq!(sel.delta_aic, Some(0.0));

        let reversed = [model_with_aic(100.0, 1), model_with_aic(100.0, 2)];
        let sel = select_model(&reversed).unwrap();
        assert_eq!(sel.index, 0);
        assert_eq!(reversed[sel.index].n_components(), 1);
    }

    #[test]
    fn equal_aic_and_size_keep_input_order() {
        let models = [model_with_aic(7.0, 1), model_with_aic(7.0, 1)];
        let sel = select_model(&models).unwrap();
        // The first is `best`; the second sits at ΔAIC 0.
        assert_eq!((sel.index, sel.rule), (1, SelectionRule::NearTie));
    }

    #[test]
    fn non_finite_aic_ranks_last() {
        let models = [model_with_aic(f64::NAN, 1), model_with_aic(30.0, 2)];
        let sel = select_model(&models).unwrap();
        assert_eq!(sel.index, 1);
        assert_eq!(sel.rule, SelectionRule::MinimumAic);
        assert_eq!(sel.delta_aic, None);
    }
}
