//! Input data generation.

pub mod synthetic;

pub use synthetic::*;
