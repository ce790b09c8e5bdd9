//! Formatted terminal output.
//!
//! Formatting lives in one place so the pipeline stages stay free of
//! presentation code and output changes stay localized.

use crate::combine::CombinedStore;
use crate::coverage::CoverageSet;
use crate::domain::{ModelStore, ToleranceSet};
use crate::report::{DecompositionStats, worst_fits};

/// Per-level SAA counts of a coverage set.
pub fn format_coverage_summary(set: &CoverageSet) -> String {
    let mut out = String::new();
    out.push_str("=== specdecomp - coverage ===\n");
    out.push_str(&format!(
        "Map: {}x{} | spectra in footprint: {}\n",
        set.map_shape().ny,
        set.map_shape().nx,
        set.spectrum_keys().len()
    ));
    out.push_str(&format!(
        "{:<6} {:>8} {:>8} {:>8} {:>8}\n",
        "level", "width", "saas", "to_fit", "empty"
    ));
    for (level, info) in set.levels().iter().enumerate() {
        let saas = set.level_saas(level);
        let to_fit = saas.iter().filter(|s| s.to_be_fit).count();
        let empty = saas.iter().filter(|s| s.is_empty()).count();
        out.push_str(&format!(
            "{level:<6} {:>8.2} {:>8} {to_fit:>8} {empty:>8}\n",
            info.width, info.len
        ));
    }
    out
}

/// Run statistics, optionally with the tolerances that produced them.
pub fn format_stats(stats: &DecompositionStats, tolerances: Option<&ToleranceSet>) -> String {
    let mut out = String::new();
    out.push_str("=== specdecomp - decomposition ===\n");
    if let Some(t) = tolerances {
        out.push_str(&format!(
            "Tolerances: T0={} T1={} T2={} T3={} T4={} T5={}\n",
            t.t0, t.t1, t.t2, t.t3, t.t4, t.t5
        ));
    }
    out.push_str(&format!(
        "Spectra: n={} | fitted={} | unfit={}\n",
        stats.n_spectra, stats.n_fitted, stats.n_unfit
    ));
    out.push_str(&format!(
        "Components: total={} | mean per fitted spectrum={}\n",
        stats.n_components,
        fmt_mean(stats.mean_components)
    ));
    out.push_str(&format!(
        "Candidates per fitted spectrum: {}\n",
        fmt_mean(stats.mean_candidates)
    ));
    out.push_str(&format!(
        "Selection: single={} | minimum AIC={} | near tie={}\n",
        stats.single, stats.minimum_aic, stats.near_tie
    ));
    let o = &stats.outcomes;
    out.push_str(&format!(
        "Level outcomes: candidate={} | no parent={} | not converged={} | T0 rejected={} | all filtered={}\n",
        o.candidate, o.no_parent_model, o.not_converged, o.count_rejected, o.all_filtered
    ));

    out.push_str("\nComponent histogram:\n");
    for (n, count) in &stats.component_histogram {
        out.push_str(&format!("{n:>4} | {count:>8}\n"));
    }
    out
}

/// Table of the spectra with the largest residual ratio.
pub fn format_worst_fits(store: &ModelStore, top_n: usize) -> String {
    let mut out = String::new();
    out.push_str("Largest residuals (rms of residual / spectrum rms):\n");
    out.push_str(&format!(
        "{:>8} {:>5} {:>5} {:>6} {:>10} {:>10} {:>8}\n",
        "key", "x", "y", "ncomp", "ratio", "aic", "saa"
    ));
    out.push_str(&format!(
        "{:->8} {:->5} {:->5} {:->6} {:->10} {:->10} {:->8}\n",
        "", "", "", "", "", "", ""
    ));
    for (entry, ratio) in worst_fits(store, top_n) {
        let Some(model) = &entry.model else {
            continue;
        };
        out.push_str(&format!(
            "{:>8} {:>5} {:>5} {:>6} {:>10.3} {:>10.2} {:>8}\n",
            entry.key,
            entry.location.x,
            entry.location.y,
            model.n_components(),
            ratio,
            model.aic(),
            model.provenance.saa_key().to_string()
        ));
    }
    out
}

pub fn format_combine_summary(combined: &CombinedStore, n_stores: usize) -> String {
    let mut out = String::new();
    out.push_str("=== specdecomp - combine ===\n");
    let multi = combined
        .provenance
        .values()
        .filter(|p| p.contributing_runs.len() > 1)
        .count();
    out.push_str(&format!(
        "Stores: {n_stores} | spectra: {} | selected across runs: {multi} | unfit: {} | absent: {}\n",
        combined.store.len(),
        combined.unfit_count,
        combined.absent_count
    ));
    let mut per_run = vec![0usize; n_stores];
    for p in combined.provenance.values() {
        if let Some(run) = p.source_run {
            if let Some(slot) = per_run.get_mut(run) {
                *slot += 1;
            }
        }
    }
    for (run, count) in per_run.iter().enumerate() {
        out.push_str(&format!("  run {run}: {count} retained\n"));
    }
    out
}

fn fmt_mean(v: f64) -> String {
    if v.is_finite() { format!("{v:.3}") } else { "-".to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::compute_stats;

    #[test]
    fn stats_text_lists_counts() {
        let store = ModelStore::new(crate::domain::MapShape::new(1, 1));
        let text = format_stats(&compute_stats(&store), Some(&ToleranceSet::default()));
        assert!(text.contains("Spectra: n=0 | fitted=0 | unfit=0"));
        assert!(text.contains("T3=2.5"));
        assert!(text.contains("mean per fitted spectrum=-"));
    }
}
