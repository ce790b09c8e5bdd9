//! `specdecomp` library crate.
//!
//! The binary (`specdecomp`) is a thin wrapper around this library so that:
//!
//! - every pipeline stage is testable without spawning processes
//! - stages are reusable from other front-ends
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod combine;
pub mod coverage;
pub mod cube;
pub mod data;
pub mod decompose;
pub mod domain;
pub mod error;
pub mod fit;
pub mod geometry;
pub mod io;
pub mod math;
pub mod models;
pub mod parallel;
pub mod report;
