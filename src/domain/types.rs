//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed between pipeline stages as plain values
//! - persisted as JSON between runs (coverage, decomposition, combination)
//! - compared deterministically (ordered maps, explicit tolerances)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::fit::selection::{SelectionRule, aic};

/// `FWHM = 2·sqrt(2 ln 2)·σ` for a Gaussian profile.
pub const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949_3;

/// Default epsilon for structural model equivalence.
pub const MODEL_EQ_EPS: f64 = 1e-6;

/// Spatial shape of the map plane (`ny` rows by `nx` columns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapShape {
    pub ny: usize,
    pub nx: usize,
}

impl MapShape {
    pub fn new(ny: usize, nx: usize) -> Self {
        Self { ny, nx }
    }

    /// Number of pixels in the map.
    pub fn len(self) -> usize {
        self.ny * self.nx
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    pub fn contains(self, loc: PixelLocation) -> bool {
        loc.x < self.nx && loc.y < self.ny
    }

    /// Row-major flat index of `loc`, or `None` if it lies outside the map.
    pub fn flat_index(self, loc: PixelLocation) -> Option<usize> {
        self.contains(loc).then(|| loc.y * self.nx + loc.x)
    }

    /// Inverse of [`MapShape::flat_index`].
    pub fn location(self, flat: usize) -> Option<PixelLocation> {
        if self.nx == 0 || flat >= self.len() {
            return None;
        }
        Some(PixelLocation {
            x: flat % self.nx,
            y: flat / self.nx,
        })
    }
}

/// Integer `(x, y)` coordinate in the map plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PixelLocation {
    pub x: usize,
    pub y: usize,
}

impl PixelLocation {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Composite key of a spectral averaging area: refinement level + tile index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SaaKey {
    pub level: usize,
    pub tile: usize,
}

impl SaaKey {
    pub fn new(level: usize, tile: usize) -> Self {
        Self { level, tile }
    }
}

impl std::fmt::Display for SaaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}/T{}", self.level, self.tile)
    }
}

/// One Gaussian line component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub amplitude: f64,
    /// Centre velocity.
    pub centre: f64,
    /// Velocity dispersion σ.
    pub dispersion: f64,
}

impl Component {
    pub fn new(amplitude: f64, centre: f64, dispersion: f64) -> Self {
        Self {
            amplitude,
            centre,
            dispersion,
        }
    }

    pub fn fwhm(&self) -> f64 {
        self.dispersion * FWHM_PER_SIGMA
    }

    /// Component whose parameters are the arithmetic mean of `self` and `other`.
    pub fn mean_with(&self, other: &Component) -> Component {
        Component {
            amplitude: 0.5 * (self.amplitude + other.amplitude),
            centre: 0.5 * (self.centre + other.centre),
            dispersion: 0.5 * (self.dispersion + other.dispersion),
        }
    }

    /// Parameter-wise comparison within `eps`.
    pub fn approx_eq(&self, other: &Component, eps: f64) -> bool {
        (self.amplitude - other.amplitude).abs() <= eps
            && (self.centre - other.centre).abs() <= eps
            && (self.dispersion - other.dispersion).abs() <= eps
    }

    pub fn is_finite(&self) -> bool {
        self.amplitude.is_finite() && self.centre.is_finite() && self.dispersion.is_finite()
    }
}

/// Where a model came from. Set when the model is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Provenance {
    /// Decomposition run that produced the model (`None` for SAA templates).
    pub run: Option<usize>,
    pub level: usize,
    pub tile: usize,
}

impl Provenance {
    pub fn template(key: SaaKey) -> Self {
        Self {
            run: None,
            level: key.level,
            tile: key.tile,
        }
    }

    pub fn candidate(run: usize, key: SaaKey) -> Self {
        Self {
            run: Some(run),
            level: key.level,
            tile: key.tile,
        }
    }

    pub fn saa_key(&self) -> SaaKey {
        SaaKey::new(self.level, self.tile)
    }
}

/// Components plus fit-quality metrics.
///
/// Models are immutable: every metric is derived from the component list in
/// [`Model::new`], and filtering produces a new model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub components: Vec<Component>,
    #[serde(with = "crate::io::nan::float")]
    rss: f64,
    n_channels: usize,
    dof: i64,
    #[serde(with = "crate::io::nan::float")]
    aic: f64,
    converged: bool,
    #[serde(with = "crate::io::nan::float")]
    rms: f64,
    pub provenance: Provenance,
}

impl Model {
    pub fn new(
        components: Vec<Component>,
        rss: f64,
        n_channels: usize,
        converged: bool,
        rms: f64,
        provenance: Provenance,
    ) -> Self {
        let k = 3 * components.len();
        Self {
            dof: n_channels as i64 - k as i64,
            aic: aic(n_channels, rss, k),
            components,
            rss,
            n_channels,
            converged,
            rms,
            provenance,
        }
    }

    /// Model with a fixed AIC, for exercising selection without real fits.
    #[cfg(test)]
    pub(crate) fn with_aic(components: Vec<Component>, aic: f64, provenance: Provenance) -> Self {
        Self {
            aic,
            ..Self::new(components, 1.0, 100, true, 0.1, provenance)
        }
    }

    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    /// Residual sum of squares over the fitted channels.
    pub fn rss(&self) -> f64 {
        self.rss
    }

    /// Number of finite channels used in the fit.
    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// Degrees of freedom (`n_channels - 3 × components`).
    pub fn dof(&self) -> i64 {
        self.dof
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Noise level of the spectrum the model was fitted to.
    pub fn rms(&self) -> f64 {
        self.rms
    }

    /// Number of free parameters used for information criteria.
    pub fn param_count(&self) -> usize {
        3 * self.components.len()
    }

    /// Structural equivalence: same component count and every parameter within `eps`.
    ///
    /// Used instead of `==` when de-duplicating models that may have been
    /// reconstructed from files.
    pub fn equivalent(&self, other: &Model, eps: f64) -> bool {
        self.components.len() == other.components.len()
            && self
                .components
                .iter()
                .zip(other.components.iter())
                .all(|(a, b)| a.approx_eq(b, eps))
    }
}

/// Tolerances T0..T5 governing how parent models propagate to child spectra.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceSet {
    /// Maximum |raw component count − parent component count|.
    pub t0: f64,
    /// Amplitude floor as a multiple of the spectrum rms.
    pub t1: f64,
    /// Minimum FWHM as a multiple of the channel width.
    pub t2: f64,
    /// Maximum dispersion ratio relative to the matched parent component.
    pub t3: f64,
    /// Maximum centre offset as a multiple of the matched parent dispersion.
    pub t4: f64,
    /// Merge distance as a multiple of the narrower FWHM of a pair.
    pub t5: f64,
}

impl Default for ToleranceSet {
    fn default() -> Self {
        Self {
            t0: 2.0,
            t1: 3.0,
            t2: 1.0,
            t3: 2.5,
            t4: 2.5,
            t5: 0.5,
        }
    }
}

impl ToleranceSet {
    pub fn from_array(t: [f64; 6]) -> Self {
        Self {
            t0: t[0],
            t1: t[1],
            t2: t[2],
            t3: t[3],
            t4: t[4],
            t5: t[5],
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let all = [self.t0, self.t1, self.t2, self.t3, self.t4, self.t5];
        if all.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(AppError::config(format!(
                "Tolerances must be finite and >= 0, got {all:?}."
            )));
        }
        if self.t3 < 1.0 {
            return Err(AppError::config(format!(
                "T3 is a ratio bound and must be >= 1, got {}.",
                self.t3
            )));
        }
        Ok(())
    }
}

/// What happened when a spectrum was evaluated against one parent SAA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LevelOutcome {
    /// The owning SAA has no fitted model.
    NoParentModel { saa: SaaKey },
    /// The fitter did not converge.
    NotConverged { saa: SaaKey },
    /// T0 count guard rejected the raw fit.
    CountRejected {
        saa: SaaKey,
        raw: usize,
        parent: usize,
    },
    /// No component survived T1..T5.
    AllFiltered { saa: SaaKey },
    /// A candidate model was produced.
    Candidate { saa: SaaKey, n_components: usize },
}

impl LevelOutcome {
    pub fn saa(&self) -> SaaKey {
        match self {
            LevelOutcome::NoParentModel { saa }
            | LevelOutcome::NotConverged { saa }
            | LevelOutcome::CountRejected { saa, .. }
            | LevelOutcome::AllFiltered { saa }
            | LevelOutcome::Candidate { saa, .. } => *saa,
        }
    }
}

/// Final state of one spectrum in a [`ModelStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumEntry {
    pub key: usize,
    pub location: PixelLocation,
    #[serde(with = "crate::io::nan::float")]
    pub rms: f64,
    /// Selected model; `None` means the spectrum is unfit.
    pub model: Option<Model>,
    /// Rule that selected `model`.
    pub selection: Option<SelectionRule>,
    /// Candidates that were not selected, kept for provenance.
    pub alternatives: Vec<Model>,
    /// Per-SAA diagnostics, in evaluation order.
    pub outcomes: Vec<LevelOutcome>,
}

impl SpectrumEntry {
    pub fn unfit(key: usize, location: PixelLocation, rms: f64) -> Self {
        Self {
            key,
            location,
            rms,
            model: None,
            selection: None,
            alternatives: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }
}

/// Terminal artifact of a decomposition: one entry per spectrum key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStore {
    pub map_shape: MapShape,
    pub entries: BTreeMap<usize, SpectrumEntry>,
}

impl ModelStore {
    pub fn new(map_shape: MapShape) -> Self {
        Self {
            map_shape,
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, entry: SpectrumEntry) {
        self.entries.insert(entry.key, entry);
    }

    pub fn get(&self, key: usize) -> Option<&SpectrumEntry> {
        self.entries.get(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fitted_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_fitted()).count()
    }

    pub fn unfit_count(&self) -> usize {
        self.len() - self.fitted_count()
    }
}
