//! Mathematical utilities: Gaussian profiles, least squares, noise estimation.

pub mod gaussian;
pub mod noise;
pub mod ols;

pub use gaussian::*;
pub use noise::*;
pub use ols::*;
