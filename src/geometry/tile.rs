//! Square coverage tiles and their pixel masks.
//!
//! A tile is the closed, axis-aligned square of side `w` centred on a coverage
//! entry. Pixel `(x, y)` is inside iff `|x - cx| <= w/2` and `|y - cy| <= w/2`,
//! so pixels exactly on the boundary belong to the tile. Tiles of one level
//! are not checked for overlap.

use serde::{Deserialize, Serialize};

use crate::domain::{MapShape, PixelLocation};
use crate::error::AppError;

/// One entry of a coverage pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageEntry {
    pub x: f64,
    pub y: f64,
    pub to_be_fit: bool,
}

impl CoverageEntry {
    pub fn new(x: f64, y: f64, to_be_fit: bool) -> Self {
        Self { x, y, to_be_fit }
    }
}

/// Geometric descriptor of one tile. Owns no data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub index: usize,
    pub centre_x: f64,
    pub centre_y: f64,
    pub width: f64,
    pub to_be_fit: bool,
}

impl Tile {
    pub fn contains(&self, loc: PixelLocation) -> bool {
        let half = 0.5 * self.width;
        (loc.x as f64 - self.centre_x).abs() <= half && (loc.y as f64 - self.centre_y).abs() <= half
    }

    /// Boolean mask over `shape`, optionally restricted to `valid` pixels.
    pub fn mask(&self, shape: MapShape, valid: Option<&[bool]>) -> Vec<bool> {
        map_locations(shape)
            .into_iter()
            .enumerate()
            .map(|(flat, loc)| {
                valid.is_none_or(|v| v.get(flat).copied().unwrap_or(false)) && self.contains(loc)
            })
            .collect()
    }
}

/// Reject non-positive or non-finite widths before any geometry is built.
pub fn validate_width(width: f64) -> Result<(), AppError> {
    if !(width.is_finite() && width > 0.0) {
        return Err(AppError::config(format!(
            "Tile width must be finite and > 0, got {width}."
        )));
    }
    Ok(())
}

/// Build the tiles of one refinement level from its coverage pattern.
pub fn tiles_for_level(width: f64, entries: &[CoverageEntry]) -> Result<Vec<Tile>, AppError> {
    validate_width(width)?;
    for (i, e) in entries.iter().enumerate() {
        if !(e.x.is_finite() && e.y.is_finite()) {
            return Err(AppError::config(format!(
                "Coverage entry {i} has a non-finite centre ({}, {}).",
                e.x, e.y
            )));
        }
    }
    Ok(entries
        .iter()
        .enumerate()
        .map(|(index, e)| Tile {
            index,
            centre_x: e.x,
            centre_y: e.y,
            width,
            to_be_fit: e.to_be_fit,
        })
        .collect())
}

/// Every pixel location of the map in row-major order.
pub fn map_locations(shape: MapShape) -> Vec<PixelLocation> {
    let mut out = Vec::with_capacity(shape.len());
    for y in 0..shape.ny {
        for x in 0..shape.nx {
            out.push(PixelLocation::new(x, y));
        }
    }
    out
}

/// Locations where `mask` is true, in row-major order.
pub fn unmasked_locations(mask: &[bool], shape: MapShape) -> Vec<PixelLocation> {
    map_locations(shape)
        .into_iter()
        .zip(mask.iter())
        .filter_map(|(loc, &m)| m.then_some(loc))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_pixels_are_inside() {
        let tiles = tiles_for_level(2.0, &[CoverageEntry::new(1.0, 1.0, true)]).unwrap();
        let mask = tiles[0].mask(MapShape::new(4, 4), None);
        let inside = unmasked_locations(&mask, MapShape::new(4, 4));
        assert_eq!(inside.len(), 9);
        assert!(inside.contains(&PixelLocation::new(0, 0)));
        assert!(inside.contains(&PixelLocation::new(2, 2)));
        assert!(!inside.contains(&PixelLocation::new(3, 1)));
    }

    #[test]
    fn non_overlapping_pattern_partitions_valid_pixels() {
        let shape = MapShape::new(4, 6);
        // Invalidate one column to check the union matches the validity mask.
        let valid: Vec<bool> = map_locations(shape).iter().map(|l| l.x != 5).collect();
        let entries = [
            CoverageEntry::new(0.5, 0.5, true),
            CoverageEntry::new(2.5, 0.5, true),
            CoverageEntry::new(4.5, 0.5, false),
            CoverageEntry::new(0.5, 2.5, true),
            CoverageEntry::new(2.5, 2.5, true),
            CoverageEntry::new(4.5, 2.5, true),
        ];
        let tiles = tiles_for_level(2.0, &entries).unwrap();
        let masks: Vec<Vec<bool>> = tiles.iter().map(|t| t.mask(shape, Some(&valid))).collect();

        for flat in 0..shape.len() {
            let owners = masks.iter().filter(|m| m[flat]).count();
            if valid[flat] {
                assert_eq!(owners, 1, "pixel {flat} owned {owners} times");
            } else {
                assert_eq!(owners, 0);
            }
        }
    }

    #[test]
    fn invalid_width_is_rejected_up_front() {
        let entries = [CoverageEntry::new(1.0, 1.0, true)];
        assert_eq!(tiles_for_level(0.0, &entries).unwrap_err().exit_code(), 2);
        assert!(tiles_for_level(-3.0, &entries).is_err());
        assert!(tiles_for_level(f64::NAN, &entries).is_err());
    }

    #[test]
    fn map_locations_are_row_major() {
        let shape = MapShape::new(2, 3);
        let locs = map_locations(shape);
        assert_eq!(locs.len(), 6);
        for (flat, loc) in locs.iter().enumerate() {
            assert_eq!(shape.flat_index(*loc), Some(flat));
        }
    }
}
