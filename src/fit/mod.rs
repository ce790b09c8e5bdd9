//! Spectrum fitting and model selection.
//!
//! Responsibilities:
//!
//! - fit one spectrum from parent guesses (`GridFitter`, parallel grid moves)
//! - filter raw fits against the parent model (tolerances T0..T5)
//! - select a model among candidates using AIC + ΔAIC tie-break

pub mod fitter;
pub mod offset_grid;
pub mod selection;
pub mod tolerance;

pub use fitter::*;
pub use offset_grid::*;
pub use selection::*;
pub use tolerance::*;
