//! Tolerance filtering of a raw fit against its parent model.
//!
//! - T0 guards the raw component count against the parent count (applied once)
//! - T1..T4 drop individual components
//! - T5 merges close pairs into their parameter mean
//!
//! T1..T5 are repeated until a pass leaves the component count unchanged, so
//! the filter is idempotent: filtering an already-filtered list is a no-op.

use crate::domain::{Component, ToleranceSet};

/// Per-spectrum quantities the tolerances are scaled by.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToleranceContext {
    /// Noise level of the spectrum being fitted.
    pub rms: f64,
    /// Spectral channel width.
    pub channel_width: f64,
}

/// Result of [`apply_tolerances`].
#[derive(Debug, Clone, PartialEq)]
pub enum ToleranceVerdict {
    /// T0 rejected the raw component count.
    CountRejected { raw: usize, parent: usize },
    /// Nothing survived T1..T5.
    AllFiltered,
    /// Surviving components; `changed` is false when the raw list passed untouched.
    Accepted {
        components: Vec<Component>,
        changed: bool,
    },
}

/// T0: `|raw − parent| <= t0`.
pub fn count_guard(raw: usize, parent: usize, t0: f64) -> bool {
    (raw as f64 - parent as f64).abs() <= t0
}

/// Index of the parent component nearest in centre (first on ties).
fn nearest_parent(c: &Component, parent: &[Component]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, p) in parent.iter().enumerate() {
        let d = (c.centre - p.centre).abs();
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

fn passes_t1(c: &Component, tol: &ToleranceSet, ctx: &ToleranceContext) -> bool {
    !(c.amplitude < tol.t1 * ctx.rms)
}

fn passes_t2(c: &Component, tol: &ToleranceSet, ctx: &ToleranceContext) -> bool {
    !(c.fwhm() < tol.t2 * ctx.channel_width)
}

fn passes_t3(c: &Component, p: &Component, tol: &ToleranceSet) -> bool {
    let lo = c.dispersion.min(p.dispersion);
    let hi = c.dispersion.max(p.dispersion);
    lo > 0.0 && hi / lo <= tol.t3
}

fn passes_t4(c: &Component, p: &Component, tol: &ToleranceSet) -> bool {
    (c.centre - p.centre).abs() <= tol.t4 * p.dispersion
}

/// T5: repeatedly merge the closest pair closer than `t5 × min(FWHM)`.
///
/// The merged component takes the slot of the earlier member of the pair.
fn merge_close(mut comps: Vec<Component>, t5: f64) -> Vec<Component> {
    loop {
        let mut pick: Option<(usize, usize, f64)> = None;
        for i in 0..comps.len() {
            for j in (i + 1)..comps.len() {
                let sep = (comps[i].centre - comps[j].centre).abs();
                let limit = t5 * comps[i].fwhm().min(comps[j].fwhm());
                if sep < limit && pick.is_none_or(|(_, _, s)| sep < s) {
                    pick = Some((i, j, sep));
                }
            }
        }
        let Some((i, j, _)) = pick else {
            return comps;
        };
        comps[i] = comps[i].mean_with(&comps[j]);
        comps.remove(j);
    }
}

fn filter_pass(
    comps: &[Component],
    parent: &[Component],
    tol: &ToleranceSet,
    ctx: &ToleranceContext,
) -> Vec<Component> {
    let kept: Vec<Component> = comps
        .iter()
        .filter(|c| c.is_finite())
        .filter(|c| passes_t1(c, tol, ctx))
        .filter(|c| passes_t2(c, tol, ctx))
        .filter(|c| match nearest_parent(c, parent) {
            Some(pi) => passes_t3(c, &parent[pi], tol) && passes_t4(c, &parent[pi], tol),
            None => false,
        })
        .copied()
        .collect();
    merge_close(kept, tol.t5)
}

/// Apply T1..T5 until the component count stops changing.
///
/// Never returns more components than it was given. With an empty `parent`
/// nothing can be matched and every component is dropped.
pub fn filter_components(
    comps: &[Component],
    parent: &[Component],
    tol: &ToleranceSet,
    ctx: &ToleranceContext,
) -> Vec<Component> {
    let mut current = comps.to_vec();
    loop {
        let next = filter_pass(&current, parent, tol, ctx);
        if next.len() == current.len() {
            return next;
        }
        current = next;
    }
}

/// T0 on the raw count, then T1..T5.
pub fn apply_tolerances(
    raw: &[Component],
    parent: &[Component],
    tol: &ToleranceSet,
    ctx: &ToleranceContext,
) -> ToleranceVerdict {
    if !count_guard(raw.len(), parent.len(), tol.t0) {
        return ToleranceVerdict::CountRejected {
            raw: raw.len(),
            parent: parent.len(),
        };
    }
    let components = filter_components(raw, parent, tol, ctx);
    if components.is_empty() {
        return ToleranceVerdict::AllFiltered;
    }
    let changed = components.as_slice() != raw;
    ToleranceVerdict::Accepted {
        components,
        changed,
    }
}
