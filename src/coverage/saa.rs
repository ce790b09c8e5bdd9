//! Spectral averaging areas.
//!
//! An SAA is built from one tile:
//!
//! 1. embed the tile mask and the moment mask (map coordinates) into the cube
//!    pixel grid at the trimming offset, AND-ed with cube validity;
//! 2. empty footprint → all-NaN spectrum and `to_be_fit = false`;
//! 3. otherwise average every finite value inside the footprint, channel by
//!    channel, scanning only the footprint's bounding box;
//! 4. record the flat cube indices of the footprint (the SAA's children).

use serde::{Deserialize, Serialize};

use crate::cube::Cube;
use crate::domain::{MapShape, Model, SaaKey};
use crate::geometry::Tile;

/// Inputs shared by every SAA of a coverage run.
#[derive(Debug, Clone, Copy)]
pub struct CoverageContext<'a> {
    pub cube: &'a Cube,
    /// Shape of the coverage (moment) map.
    pub map_shape: MapShape,
    /// Column of the cube where map column 0 lies.
    pub x_offset: usize,
    /// Row of the cube where map row 0 lies.
    pub y_offset: usize,
    /// Validity of map pixels (e.g. a thresholded moment-0 map).
    pub moment_mask: Option<&'a [bool]>,
}

impl CoverageContext<'_> {
    /// Cube flat index of map flat index `map_flat`, if it lands inside the cube.
    pub fn cube_index(&self, map_flat: usize) -> Option<usize> {
        let loc = self.map_shape.location(map_flat)?;
        let cube_shape = self.cube.map_shape();
        let x = loc.x + self.x_offset;
        let y = loc.y + self.y_offset;
        (x < cube_shape.nx && y < cube_shape.ny).then(|| y * cube_shape.nx + x)
    }

    fn moment_ok(&self, map_flat: usize) -> bool {
        self.moment_mask
            .is_none_or(|m| m.get(map_flat).copied().unwrap_or(false))
    }

    /// Cube-grid mask of a map-grid tile mask.
    pub fn cube_mask(&self, tile_mask: &[bool]) -> Vec<bool> {
        let mut out = vec![false; self.cube.map_shape().len()];
        for (map_flat, &inside) in tile_mask.iter().enumerate() {
            if !inside || !self.moment_ok(map_flat) {
                continue;
            }
            if let Some(flat) = self.cube_index(map_flat) {
                if self.cube.is_valid(flat) {
                    out[flat] = true;
                }
            }
        }
        out
    }

    /// Cube flat indices of every valid pixel the coverage map can reach.
    pub fn footprint(&self) -> Vec<usize> {
        let mut keys: Vec<usize> = (0..self.map_shape.len())
            .filter(|&m| self.moment_ok(m))
            .filter_map(|m| self.cube_index(m))
            .filter(|&flat| self.cube.is_valid(flat))
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Saa {
    pub key: SaaKey,
    pub centre_x: f64,
    pub centre_y: f64,
    pub width: f64,
    /// Mean spectrum over the full spectral axis (NaN where undefined).
    #[serde(with = "crate::io::nan::vec")]
    pub spectrum: Vec<f64>,
    /// Sorted cube flat indices covered by this SAA.
    pub indices: Vec<usize>,
    pub to_be_fit: bool,
    /// Template model, once acquired.
    pub model: Option<Model>,
}

impl Saa {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Build the SAA for `tile` at refinement `level`.
pub fn build_saa(level: usize, tile: &Tile, ctx: &CoverageContext<'_>) -> Saa {
    let tile_mask = tile.mask(ctx.map_shape, None);
    let mask = ctx.cube_mask(&tile_mask);
    let indices: Vec<usize> = mask
        .iter()
        .enumerate()
        .filter_map(|(flat, &m)| m.then_some(flat))
        .collect();

    let key = SaaKey::new(level, tile.index);
    let n_chan = ctx.cube.n_channels();
    if indices.is_empty() {
        return Saa {
            key,
            centre_x: tile.centre_x,
            centre_y: tile.centre_y,
            width: tile.width,
            spectrum: vec![f64::NAN; n_chan],
            indices,
            to_be_fit: false,
            model: None,
        };
    }

    Saa {
        key,
        centre_x: tile.centre_x,
        centre_y: tile.centre_y,
        width: tile.width,
        spectrum: mean_spectrum(ctx.cube, &mask, &indices),
        indices,
        to_be_fit: tile.to_be_fit,
        model: None,
    }
}

/// Per-channel mean of finite values over the masked pixels.
fn mean_spectrum(cube: &Cube, mask: &[bool], indices: &[usize]) -> Vec<f64> {
    let shape = cube.map_shape();
    let (mut x0, mut x1, mut y0, mut y1) = (usize::MAX, 0usize, usize::MAX, 0usize);
    for &flat in indices {
        let (x, y) = (flat % shape.nx, flat / shape.nx);
        x0 = x0.min(x);
        x1 = x1.max(x);
        y0 = y0.min(y);
        y1 = y1.max(y);
    }

    (0..cube.n_channels())
        .map(|c| {
            let mut sum = 0.0;
            let mut n = 0usize;
            for y in y0..=y1 {
                for x in x0..=x1 {
                    if !mask[y * shape.nx + x] {
                        continue;
                    }
                    let v = cube.value(c, y, x);
                    if v.is_finite() {
                        sum += v;
                        n += 1;
                    }
                }
            }
            if n == 0 { f64::NAN } else { sum / n as f64 }
        })
        .collect()
}
