//! Model store files.
//!
//! A store file wraps a [`ModelStore`] in a small envelope. Combined stores
//! also carry per-spectrum provenance, so a combined file can be combined
//! again.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::combine::{CombinedStore, SpectrumProvenance};
use crate::domain::ModelStore;
use crate::error::AppError;
use crate::io::{TOOL_NAME, read_json, write_json};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreFile {
    pub tool: String,
    pub created: DateTime<Utc>,
    /// Run identifier for single-run stores.
    #[serde(default)]
    pub run_id: Option<usize>,
    pub store: ModelStore,
    #[serde(default)]
    pub provenance: Option<BTreeMap<usize, SpectrumProvenance>>,
}

pub fn write_store(path: &Path, store: &ModelStore, run_id: usize) -> Result<(), AppError> {
    let file = StoreFile {
        tool: TOOL_NAME.to_string(),
        created: Utc::now(),
        run_id: Some(run_id),
        store: store.clone(),
        provenance: None,
    };
    write_json(path, &file, "model store")?;
    log::info!("Wrote {} spectra to {}", store.len(), path.display());
    Ok(())
}

pub fn write_combined(path: &Path, combined: &CombinedStore) -> Result<(), AppError> {
    let file = StoreFile {
        tool: TOOL_NAME.to_string(),
        created: Utc::now(),
        run_id: None,
        store: combined.store.clone(),
        provenance: Some(combined.provenance.clone()),
    };
    write_json(path, &file, "model store")?;
    log::info!("Wrote {} combined spectra to {}", combined.store.len(), path.display());
    Ok(())
}

pub fn read_store(path: &Path) -> Result<StoreFile, AppError> {
    read_json(path, "model store")
}
