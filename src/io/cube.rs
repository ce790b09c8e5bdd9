//! Cube JSON interchange.
//!
//! ```json
//! { "spectral_axis": [...], "map_shape": {"ny": 2, "nx": 3},
//!   "data": [... channel-major, null for NaN ...], "validity": null }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cube::Cube;
use crate::domain::MapShape;
use crate::error::AppError;
use crate::io::{read_json, write_json};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CubeFile {
    pub spectral_axis: Vec<f64>,
    pub map_shape: MapShape,
    #[serde(with = "crate::io::nan::vec")]
    pub data: Vec<f64>,
    #[serde(default)]
    pub validity: Option<Vec<bool>>,
}

impl From<&Cube> for CubeFile {
    fn from(cube: &Cube) -> Self {
        Self {
            spectral_axis: cube.spectral_axis().to_vec(),
            map_shape: cube.map_shape(),
            data: cube.data().to_vec(),
            validity: cube.validity().map(<[bool]>::to_vec),
        }
    }
}

pub fn read_cube(path: &Path) -> Result<Cube, AppError> {
    let file: CubeFile = read_json(path, "cube JSON")?;
    let cube = Cube::new(file.spectral_axis, file.map_shape, file.data, file.validity)?;
    log::info!(
        "Loaded cube {}x{} with {} channels from {}",
        cube.map_shape().ny,
        cube.map_shape().nx,
        cube.n_channels(),
        path.display()
    );
    Ok(cube)
}

pub fn write_cube(path: &Path, cube: &Cube) -> Result<(), AppError> {
    write_json(path, &CubeFile::from(cube), "cube JSON")
}
