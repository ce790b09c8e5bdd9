//! Export a model store to CSV.
//!
//! One row per component of the retained model; unfit spectra get a single
//! row with empty model columns. Meant for spreadsheets and plotting scripts.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::ModelStore;
use crate::error::AppError;

fn fmt_opt(v: f64) -> String {
    if v.is_finite() { format!("{v:.6}") } else { String::new() }
}

/// Write the retained models of `store` to a CSV file.
pub fn write_store_csv(path: &Path, store: &ModelStore) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;
    let mut out = BufWriter::new(file);

    writeln!(
        out,
        "key,x,y,rms,n_components,selection,aic,rss,run,level,tile,component,amplitude,centre,dispersion"
    )
    .map_err(|e| AppError::new(2, format!("Failed to write export CSV header: {e}")))?;

    for entry in store.entries.values() {
        let prefix = format!("{},{},{},{}", entry.key, entry.location.x, entry.location.y, fmt_opt(entry.rms));
        let Some(model) = &entry.model else {
            writeln!(out, "{prefix},0,,,,,,,,,,")
                .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
            continue;
        };
        let selection = entry
            .selection
            .map(|r| format!("{r:?}").to_lowercase())
            .unwrap_or_default();
        let p = model.provenance;
        for (i, c) in model.components.iter().enumerate() {
            writeln!(
                out,
                "{prefix},{},{selection},{},{},{},{},{},{i},{:.6},{:.6},{:.6}",
                model.n_components(),
                fmt_opt(model.aic()),
                fmt_opt(model.rss()),
                p.run.map(|r| r.to_string()).unwrap_or_default(),
                p.level,
                p.tile,
                c.amplitude,
                c.centre,
                c.dispersion,
            )
            .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
        }
    }

    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}
