//! Coverage: spectral averaging areas at one or more refinement levels.
//!
//! - `saa`: build one SAA from one tile
//! - `set`: all levels, keyed by `(level, tile)`, with pixel reverse lookup
//! - `chunk`: split a level for distributed model acquisition

pub mod chunk;
pub mod saa;
pub mod set;

pub use chunk::*;
pub use saa::*;
pub use set::*;
