//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - map geometry (`MapShape`, `PixelLocation`, `SaaKey`)
//! - line-shape values (`Component`, `Model`, `Provenance`)
//! - run policy (`ToleranceSet`)
//! - decomposition outputs (`LevelOutcome`, `SpectrumEntry`, `ModelStore`)

pub mod types;

pub use types::*;
