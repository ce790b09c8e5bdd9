//! Input/output helpers.
//!
//! - cube JSON read/write (`cube`)
//! - coverage config, SAA sets, acquired models, chunk listings (`coverage`)
//! - model store files (`store`)
//! - CSV export of a model store (`export`)
//! - serde adapters for NaN-carrying floats (`nan`)

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::AppError;

pub mod coverage;
pub mod cube;
pub mod export;
pub mod nan;
pub mod store;

pub use coverage::*;
pub use cube::*;
pub use export::*;
pub use store::*;

/// Name recorded in every file envelope.
pub const TOOL_NAME: &str = "specdecomp";

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create {what} '{}': {e}", path.display())))?;
    write_json_to(file, value, what)
}

/// Buffered pretty JSON into `writer`; the final flush is checked.
fn write_json_to<W: Write, T: Serialize>(writer: W, value: &T, what: &str) -> Result<(), AppError> {
    let mut out = BufWriter::new(writer);
    serde_json::to_writer_pretty(&mut out, value)
        .map_err(|e| AppError::new(2, format!("Failed to write {what}: {e}")))?;
    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush {what}: {e}")))
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open {what} '{}': {e}", path.display())))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::new(2, format!("Invalid {what} '{}': {e}", path.display())))
}

#[cfg(test)]
pub(crate) fn temp_path(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("specdecomp-test-{}", std::process::id()));
    let _ = std::fs::create_dir_all(&dir);
    dir.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts nothing, like a full disk.
    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("no space left on device"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_final_flush_is_reported() {
        // Small enough to sit in the buffer until the flush.
        let err = write_json_to(FullDisk, &vec![1.0, 2.0, 3.0], "store").unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("flush"), "{}", err.message());
    }

    #[test]
    fn json_round_trips_through_a_file() {
        let path = temp_path("io_round_trip.json");
        write_json(&path, &vec![0.5, 1.5], "values").unwrap();
        let back: Vec<f64> = read_json(&path, "values").unwrap();
        assert_eq!(back, vec![0.5, 1.5]);
    }
}
