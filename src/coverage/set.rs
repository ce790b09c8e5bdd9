//! The coverage set: every SAA of every refinement level.
//!
//! SAAs live in one flat arena; a level is a contiguous `start..start + len`
//! range of it, so `(level, tile)` resolves to `levels[level].start + tile`.
//! Each level also carries a reverse lookup from cube flat index to the tiles
//! of that level containing it, built once after the level's SAAs exist.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::coverage::saa::{CoverageContext, Saa, build_saa};
use crate::cube::{Cube, VelocityTrim};
use crate::domain::{Component, MapShape, Model, Provenance, SaaKey};
use crate::error::AppError;
use crate::geometry::{CoverageEntry, tiles_for_level, validate_width};
use crate::math::spectrum_rms;
use crate::models::residual_sum_of_squares;
use crate::parallel::par_map;

/// Coverage as supplied by the coverage provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageConfig {
    /// Shape of the coverage (moment) map.
    pub map_shape: MapShape,
    #[serde(default)]
    pub x_offset: usize,
    #[serde(default)]
    pub y_offset: usize,
    /// Optional validity of map pixels, row-major over `map_shape`.
    #[serde(default)]
    pub moment_mask: Option<Vec<bool>>,
    /// Tile width per refinement level.
    pub widths: Vec<f64>,
    /// Coverage pattern per refinement level.
    pub patterns: Vec<Vec<CoverageEntry>>,
}

impl CoverageConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.widths.is_empty() {
            return Err(AppError::config("Coverage needs at least one refinement level."));
        }
        if self.widths.len() != self.patterns.len() {
            return Err(AppError::config(format!(
                "Coverage has {} tile widths but {} coverage patterns.",
                self.widths.len(),
                self.patterns.len()
            )));
        }
        for &w in &self.widths {
            validate_width(w)?;
        }
        if self.map_shape.is_empty() {
            return Err(AppError::config("Coverage map shape is empty."));
        }
        if let Some(mask) = &self.moment_mask {
            if mask.len() != self.map_shape.len() {
                return Err(AppError::config(format!(
                    "Moment mask length {} does not match coverage map size {}.",
                    mask.len(),
                    self.map_shape.len()
                )));
            }
        }
        Ok(())
    }
}

/// Model for one SAA as returned by the model acquisition step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquiredModel {
    pub level: usize,
    pub tile: usize,
    pub converged: bool,
    pub components: Vec<Component>,
}

impl AcquiredModel {
    pub fn key(&self) -> SaaKey {
        SaaKey::new(self.level, self.tile)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelInfo {
    pub width: f64,
    pub start: usize,
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverageSet {
    map_shape: MapShape,
    levels: Vec<LevelInfo>,
    saas: Vec<Saa>,
    spectrum_keys: Vec<usize>,
    /// Per level: cube flat index -> tile indices containing it.
    owners: Vec<BTreeMap<usize, Vec<usize>>>,
}

impl CoverageSet {
    /// Tile every level and build its SAAs on `workers` threads.
    pub fn build(cube: &Cube, config: &CoverageConfig, workers: usize) -> Result<Self, AppError> {
        config.validate()?;
        let ctx = CoverageContext {
            cube,
            map_shape: config.map_shape,
            x_offset: config.x_offset,
            y_offset: config.y_offset,
            moment_mask: config.moment_mask.as_deref(),
        };

        // Geometry for every level first so configuration errors surface
        // before any averaging work starts.
        let level_tiles = config
            .widths
            .iter()
            .zip(config.patterns.iter())
            .map(|(&w, entries)| tiles_for_level(w, entries))
            .collect::<Result<Vec<_>, _>>()?;

        let mut saas = Vec::new();
        let mut levels = Vec::with_capacity(level_tiles.len());
        for (level, tiles) in level_tiles.iter().enumerate() {
            let built = par_map(workers, tiles, |tile| build_saa(level, tile, &ctx))?;
            let n_fit = built.iter().filter(|s| s.to_be_fit).count();
            log::info!(
                "Level {level}: built {} SAAs at width {} ({n_fit} to be fit)",
                built.len(),
                config.widths[level]
            );
            levels.push(LevelInfo {
                width: config.widths[level],
                start: saas.len(),
                len: built.len(),
            });
            saas.extend(built);
        }

        Self::from_parts(cube.map_shape(), levels, saas, ctx.footprint())
    }

    /// Reassemble a set from its persisted parts, rebuilding the reverse lookup.
    pub fn from_parts(
        map_shape: MapShape,
        levels: Vec<LevelInfo>,
        saas: Vec<Saa>,
        spectrum_keys: Vec<usize>,
    ) -> Result<Self, AppError> {
        let mut owners = Vec::with_capacity(levels.len());
        let mut expected_start = 0usize;
        for (level, info) in levels.iter().enumerate() {
            if info.start != expected_start || info.start + info.len > saas.len() {
                return Err(AppError::config(format!(
                    "Level {level} range {}..{} is inconsistent with {} SAAs.",
                    info.start,
                    info.start + info.len,
                    saas.len()
                )));
            }
            expected_start += info.len;

            let mut lookup: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
            for (tile, saa) in saas[info.start..info.start + info.len].iter().enumerate() {
                if saa.key != SaaKey::new(level, tile) {
                    return Err(AppError::config(format!(
                        "SAA at level {level} position {tile} carries key {}.",
                        saa.key
                    )));
                }
                for &flat in &saa.indices {
                    if flat >= map_shape.len() {
                        return Err(AppError::config(format!(
                            "SAA {} covers pixel {flat} outside the {}x{} map.",
                            saa.key, map_shape.ny, map_shape.nx
                        )));
                    }
                    lookup.entry(flat).or_default().push(tile);
                }
            }
            owners.push(lookup);
        }
        if expected_start != saas.len() {
            return Err(AppError::config(format!(
                "Levels account for {expected_start} SAAs but {} are present.",
                saas.len()
            )));
        }

        let mut spectrum_keys = spectrum_keys;
        spectrum_keys.sort_unstable();
        spectrum_keys.dedup();

        Ok(Self {
            map_shape,
            levels,
            saas,
            spectrum_keys,
            owners,
        })
    }

    pub fn map_shape(&self) -> MapShape {
        self.map_shape
    }

    pub fn levels(&self) -> &[LevelInfo] {
        &self.levels
    }

    pub fn saas(&self) -> &[Saa] {
        &self.saas
    }

    pub fn level_saas(&self, level: usize) -> &[Saa] {
        match self.levels.get(level) {
            Some(info) => &self.saas[info.start..info.start + info.len],
            None => &[],
        }
    }

    pub fn get(&self, key: SaaKey) -> Option<&Saa> {
        let info = self.levels.get(key.level)?;
        if key.tile >= info.len {
            return None;
        }
        self.saas.get(info.start + key.tile)
    }

    /// Every valid pixel of the run footprint, covered or not.
    pub fn spectrum_keys(&self) -> &[usize] {
        &self.spectrum_keys
    }

    /// Tiles of `level` whose footprint contains `flat`.
    pub fn owners_in_level(&self, level: usize, flat: usize) -> &[usize] {
        self.owners
            .get(level)
            .and_then(|lookup| lookup.get(&flat))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All `(level, tile)` keys whose footprint contains `flat`, by level index.
    pub fn saas_containing(&self, flat: usize) -> Vec<SaaKey> {
        (0..self.levels.len())
            .flat_map(|level| {
                self.owners_in_level(level, flat)
                    .iter()
                    .map(move |&tile| SaaKey::new(level, tile))
            })
            .collect()
    }

    /// Level indices from coarsest (widest tiles) to finest; ties keep index order.
    pub fn levels_by_resolution(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.levels.len()).collect();
        order.sort_by(|&a, &b| {
            self.levels[b]
                .width
                .partial_cmp(&self.levels[a].width)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order
    }

    /// Number of SAAs marked for fitting.
    pub fn to_be_fit_count(&self) -> usize {
        self.saas.iter().filter(|s| s.to_be_fit).count()
    }

    /// Attach acquired template models, producing a new coverage set.
    ///
    /// Non-converged acquisitions leave the SAA without a model. A model for
    /// an SAA that is not marked for fitting is ignored.
    pub fn attach_models(self, acquired: &[AcquiredModel], trim: &VelocityTrim) -> Result<Self, AppError> {
        let mut next = self;
        let mut attached = 0usize;
        for item in acquired {
            let key = item.key();
            let Some(info) = next.levels.get(key.level).copied() else {
                return Err(AppError::config(format!("Acquired model for unknown SAA {key}.")));
            };
            if key.tile >= info.len {
                return Err(AppError::config(format!("Acquired model for unknown SAA {key}.")));
            }
            let saa = &mut next.saas[info.start + key.tile];
            if !saa.to_be_fit {
                log::warn!("Ignoring acquired model for SAA {key}: not marked for fitting");
                continue;
            }
            if !item.converged {
                log::debug!("SAA {key}: acquisition did not converge");
                saa.model = None;
                continue;
            }
            if item.components.iter().any(|c| !c.is_finite()) {
                return Err(AppError::config(format!(
                    "Acquired model for SAA {key} has non-finite parameters."
                )));
            }

            let flux = trim.apply(&saa.spectrum);
            let (rss, n) = residual_sum_of_squares(&item.components, &trim.axis, &flux);
            saa.model = Some(Model::new(
                item.components.clone(),
                rss,
                n,
                true,
                spectrum_rms(&flux),
                Provenance::template(key),
            ));
            attached += 1;
        }
        log::info!(
            "Attached {attached} template models ({} SAAs marked for fitting)",
            next.to_be_fit_count()
        );
        Ok(next)
    }
}
