//! In-memory spectral cube.
//!
//! The cube is stored channel-major (`data[c · ny · nx + y · nx + x]`), i.e. the
//! layout of `cube[:, y, x]` indexing: one spatial plane per spectral channel.
//! It is read-only once built; all pipeline stages borrow it immutably.

use crate::domain::{MapShape, PixelLocation};
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Cube {
    spectral_axis: Vec<f64>,
    map_shape: MapShape,
    data: Vec<f64>,
    /// Optional per-pixel validity (row-major over the map).
    validity: Option<Vec<bool>>,
}

impl Cube {
    pub fn new(
        spectral_axis: Vec<f64>,
        map_shape: MapShape,
        data: Vec<f64>,
        validity: Option<Vec<bool>>,
    ) -> Result<Self, AppError> {
        if spectral_axis.is_empty() {
            return Err(AppError::config("Cube has an empty spectral axis."));
        }
        if spectral_axis.iter().any(|v| !v.is_finite()) {
            return Err(AppError::config("Cube spectral axis contains non-finite values."));
        }
        if map_shape.is_empty() {
            return Err(AppError::config("Cube has an empty map plane."));
        }
        let expected = spectral_axis.len() * map_shape.len();
        if data.len() != expected {
            return Err(AppError::config(format!(
                "Cube data length {} does not match {} channels x {} x {} pixels.",
                data.len(),
                spectral_axis.len(),
                map_shape.ny,
                map_shape.nx
            )));
        }
        if let Some(mask) = &validity {
            if mask.len() != map_shape.len() {
                return Err(AppError::config(format!(
                    "Cube validity mask length {} does not match map size {}.",
                    mask.len(),
                    map_shape.len()
                )));
            }
        }
        Ok(Self {
            spectral_axis,
            map_shape,
            data,
            validity,
        })
    }

    pub fn map_shape(&self) -> MapShape {
        self.map_shape
    }

    pub fn n_channels(&self) -> usize {
        self.spectral_axis.len()
    }

    pub fn spectral_axis(&self) -> &[f64] {
        &self.spectral_axis
    }

    /// Raw channel-major samples.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn validity(&self) -> Option<&[bool]> {
        self.validity.as_deref()
    }

    /// Mean absolute spacing between adjacent channels.
    pub fn channel_width(&self) -> f64 {
        let n = self.spectral_axis.len();
        if n < 2 {
            return 1.0;
        }
        let span: f64 = self
            .spectral_axis
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .sum();
        span / (n - 1) as f64
    }

    /// Value at channel `c`, row `y`, column `x` (no bounds check beyond the slice).
    pub fn value(&self, c: usize, y: usize, x: usize) -> f64 {
        self.data[c * self.map_shape.len() + y * self.map_shape.nx + x]
    }

    /// Full spectrum at a flat pixel index.
    pub fn spectrum(&self, flat: usize) -> Vec<f64> {
        let plane = self.map_shape.len();
        (0..self.n_channels()).map(|c| self.data[c * plane + flat]).collect()
    }

    pub fn spectrum_at(&self, loc: PixelLocation) -> Option<Vec<f64>> {
        self.map_shape.flat_index(loc).map(|flat| self.spectrum(flat))
    }

    /// Pixel passes the validity mask and has at least one finite channel.
    pub fn is_valid(&self, flat: usize) -> bool {
        if flat >= self.map_shape.len() {
            return false;
        }
        if let Some(mask) = &self.validity {
            if !mask[flat] {
                return false;
            }
        }
        let plane = self.map_shape.len();
        (0..self.n_channels()).any(|c| self.data[c * plane + flat].is_finite())
    }
}

/// Channel selection for a velocity range.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityTrim {
    /// Indices of the kept channels, in axis order.
    pub channels: Vec<usize>,
    /// Spectral axis restricted to `channels`.
    pub axis: Vec<f64>,
}

impl VelocityTrim {
    /// Keep channels with `min(range) <= v <= max(range)`.
    ///
    /// If no channel falls inside the range (or no range is given) every
    /// channel is kept.
    pub fn new(axis: &[f64], range: Option<(f64, f64)>) -> Self {
        let mut channels: Vec<usize> = match range {
            Some((a, b)) => {
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                (0..axis.len()).filter(|&i| axis[i] >= lo && axis[i] <= hi).collect()
            }
            None => Vec::new(),
        };
        if channels.is_empty() {
            channels = (0..axis.len()).collect();
        }
        let trimmed = channels.iter().map(|&i| axis[i]).collect();
        Self {
            channels,
            axis: trimmed,
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Restrict a full-length spectrum to the kept channels.
    pub fn apply(&self, flux: &[f64]) -> Vec<f64> {
        self.channels
            .iter()
            .map(|&i| flux.get(i).copied().unwrap_or(f64::NAN))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_cube() -> Cube {
        // 3 channels over a 2x2 map; value = 100*c + 10*y + x.
        let shape = MapShape::new(2, 2);
        let mut data = Vec::new();
        for c in 0..3 {
            for y in 0..2 {
                for x in 0..2 {
                    data.push((100 * c + 10 * y + x) as f64);
                }
            }
        }
        Cube::new(vec![-1.0, 0.0, 1.0], shape, data, None).unwrap()
    }

    #[test]
    fn spectrum_reads_channel_major_layout() {
        let cube = ramp_cube();
        assert_eq!(cube.spectrum(3), vec![11.0, 111.0, 211.0]);
        assert_eq!(cube.spectrum_at(PixelLocation::new(0, 1)).unwrap(), vec![10.0, 110.0, 210.0]);
        assert_eq!(cube.value(2, 0, 1), 201.0);
        assert!((cube.channel_width() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn validity_requires_mask_and_finite_data() {
        let shape = MapShape::new(1, 3);
        let data = vec![1.0, f64::NAN, 2.0, 1.0, f64::NAN, 2.0];
        let cube = Cube::new(vec![0.0, 1.0], shape, data, Some(vec![true, true, false])).unwrap();
        assert!(cube.is_valid(0));
        assert!(!cube.is_valid(1));
        assert!(!cube.is_valid(2));
        assert!(!cube.is_valid(3));
    }

    #[test]
    fn data_length_mismatch_is_config_error() {
        let err = Cube::new(vec![0.0], MapShape::new(2, 2), vec![0.0; 3], None).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn trim_falls_back_to_full_axis() {
        let axis = [-2.0, -1.0, 0.0, 1.0, 2.0];
        let trim = VelocityTrim::new(&axis, Some((1.5, -0.5)));
        assert_eq!(trim.channels, vec![2, 3]);
        assert_eq!(trim.apply(&[5.0, 6.0, 7.0, 8.0, 9.0]), vec![7.0, 8.0]);

        let none = VelocityTrim::new(&axis, Some((10.0, 20.0)));
        assert_eq!(none.len(), 5);
    }
}
