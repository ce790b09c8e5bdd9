//! Tile geometry: which map pixels fall inside each coverage tile.

pub mod tile;

pub use tile::*;
