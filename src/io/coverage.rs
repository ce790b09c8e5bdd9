//! Coverage files.
//!
//! - coverage config (input; widths + patterns per level)
//! - SAA set (output of `coverage`, input of `decompose`)
//! - acquired models (one entry per fitted SAA)
//! - chunk listing (SAA keys per acquisition chunk)

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coverage::{AcquiredModel, CoverageConfig, CoverageSet, LevelInfo, Saa};
use crate::domain::{MapShape, SaaKey};
use crate::error::AppError;
use crate::io::{TOOL_NAME, read_json, write_json};

/// Persisted form of a [`CoverageSet`]; the pixel lookup is rebuilt on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaaSetFile {
    pub tool: String,
    pub created: DateTime<Utc>,
    pub map_shape: MapShape,
    pub levels: Vec<LevelInfo>,
    pub saas: Vec<Saa>,
    pub spectrum_keys: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkFile {
    pub tool: String,
    pub created: DateTime<Utc>,
    pub level: usize,
    pub chunks: Vec<Vec<SaaKey>>,
}

pub fn read_coverage_config(path: &Path) -> Result<CoverageConfig, AppError> {
    let config: CoverageConfig = read_json(path, "coverage config")?;
    config.validate()?;
    Ok(config)
}

pub fn write_saa_set(path: &Path, set: &CoverageSet) -> Result<(), AppError> {
    let file = SaaSetFile {
        tool: TOOL_NAME.to_string(),
        created: Utc::now(),
        map_shape: set.map_shape(),
        levels: set.levels().to_vec(),
        saas: set.saas().to_vec(),
        spectrum_keys: set.spectrum_keys().to_vec(),
    };
    write_json(path, &file, "SAA set")?;
    log::info!("Wrote {} SAAs to {}", file.saas.len(), path.display());
    Ok(())
}

pub fn read_saa_set(path: &Path) -> Result<CoverageSet, AppError> {
    let file: SaaSetFile = read_json(path, "SAA set")?;
    log::debug!("SAA set {} written by {} at {}", path.display(), file.tool, file.created);
    CoverageSet::from_parts(file.map_shape, file.levels, file.saas, file.spectrum_keys)
}

pub fn read_acquired_models(path: &Path) -> Result<Vec<AcquiredModel>, AppError> {
    read_json(path, "acquired models")
}

pub fn write_acquired_models(path: &Path, models: &[AcquiredModel]) -> Result<(), AppError> {
    write_json(path, &models, "acquired models")
}

pub fn write_chunks(path: &Path, level: usize, chunks: &[Vec<SaaKey>]) -> Result<(), AppError> {
    let file = ChunkFile {
        tool: TOOL_NAME.to_string(),
        created: Utc::now(),
        level,
        chunks: chunks.to_vec(),
    };
    write_json(path, &file, "chunk listing")
}
