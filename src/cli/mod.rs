//! Command-line parsing for the spectral decomposition tool.
//!
//! The goal of this module is to keep **argument parsing** separate from
//! command dispatch (`app`) and from the pipeline stages.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "specdecomp",
    version,
    about = "Coarse-to-fine Gaussian decomposition of spectral cubes"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Tile a cube into spectral averaging areas (SAAs) at one or more widths.
    Coverage(CoverageArgs),
    /// Propagate SAA template models down to every spectrum.
    Decompose(DecomposeArgs),
    /// Merge model stores from independent runs.
    Combine(CombineArgs),
    /// Summarize a model store.
    Stats(StatsArgs),
    /// Run the whole pipeline on a synthetic cube.
    Demo(DemoArgs),
}

/// Worker pool size shared by the compute-heavy commands.
#[derive(Debug, Args, Clone)]
pub struct WorkerArgs {
    /// Worker threads (0 = 75% of the available CPUs).
    #[arg(long, env = "SPECDECOMP_WORKERS", default_value_t = 0)]
    pub workers: usize,
}

/// Tolerances T0..T5.
#[derive(Debug, Args, Clone)]
pub struct ToleranceArgs {
    /// T0: maximum difference between raw and parent component counts.
    #[arg(long, default_value_t = 2.0)]
    pub t0: f64,

    /// T1: amplitude floor as a multiple of the spectrum rms.
    #[arg(long, default_value_t = 3.0)]
    pub t1: f64,

    /// T2: minimum FWHM as a multiple of the channel width.
    #[arg(long, default_value_t = 1.0)]
    pub t2: f64,

    /// T3: maximum dispersion ratio to the matched parent component.
    #[arg(long, default_value_t = 2.5)]
    pub t3: f64,

    /// T4: maximum centre offset in parent dispersions.
    #[arg(long, default_value_t = 2.5)]
    pub t4: f64,

    /// T5: merge distance as a multiple of the narrower FWHM.
    #[arg(long, default_value_t = 0.5)]
    pub t5: f64,
}

/// Velocity range used for fitting.
#[derive(Debug, Args, Clone)]
pub struct VelocityArgs {
    /// Lower end of the fitted velocity range.
    #[arg(long, requires = "vel_max", allow_negative_numbers = true)]
    pub vel_min: Option<f64>,

    /// Upper end of the fitted velocity range.
    #[arg(long, requires = "vel_min", allow_negative_numbers = true)]
    pub vel_max: Option<f64>,
}

#[derive(Debug, Args)]
pub struct CoverageArgs {
    /// Cube JSON file.
    #[arg(long, value_name = "JSON")]
    pub cube: PathBuf,

    /// Coverage config JSON (map shape, offsets, widths, patterns).
    #[arg(long, value_name = "JSON")]
    pub config: PathBuf,

    /// Output SAA set JSON.
    #[arg(short, long, value_name = "JSON")]
    pub output: PathBuf,

    /// Also write a chunk listing for this level.
    #[arg(long, requires = "chunks_output")]
    pub chunk_level: Option<usize>,

    /// Number of acquisition chunks.
    #[arg(long, default_value_t = 1)]
    pub chunks: usize,

    /// Chunk listing output JSON.
    #[arg(long, value_name = "JSON")]
    pub chunks_output: Option<PathBuf>,

    #[command(flatten)]
    pub workers: WorkerArgs,
}

#[derive(Debug, Args)]
pub struct DecomposeArgs {
    /// Cube JSON file.
    #[arg(long, value_name = "JSON")]
    pub cube: PathBuf,

    /// SAA set JSON written by `coverage`.
    #[arg(long, value_name = "JSON")]
    pub saas: PathBuf,

    /// Acquired template models JSON.
    #[arg(long, value_name = "JSON")]
    pub models: PathBuf,

    /// Output model store JSON.
    #[arg(short, long, value_name = "JSON")]
    pub output: PathBuf,

    /// Run identifier recorded in model provenance.
    #[arg(long, default_value_t = 0)]
    pub run_id: usize,

    /// Seed for the map-level noise sample.
    #[arg(long, default_value_t = 0)]
    pub noise_seed: u64,

    /// Export the retained models to CSV.
    #[arg(long, value_name = "CSV")]
    pub export_csv: Option<PathBuf>,

    #[command(flatten)]
    pub tolerances: ToleranceArgs,

    #[command(flatten)]
    pub velocity: VelocityArgs,

    #[command(flatten)]
    pub fitter: FitterArgs,

    #[command(flatten)]
    pub workers: WorkerArgs,
}

/// Reference fitter search settings.
#[derive(Debug, Args, Clone)]
pub struct FitterArgs {
    /// Coordinate search passes.
    #[arg(long, default_value_t = 6)]
    pub fit_passes: usize,

    /// Centre search half-width in channels (first pass).
    #[arg(long, default_value_t = 2.0)]
    pub centre_span: f64,

    /// Centre grid points.
    #[arg(long, default_value_t = 9)]
    pub centre_steps: usize,

    /// Dispersion search ratio (first pass).
    #[arg(long, default_value_t = 1.5)]
    pub width_ratio: f64,

    /// Dispersion grid points.
    #[arg(long, default_value_t = 7)]
    pub width_steps: usize,
}

#[derive(Debug, Args)]
pub struct CombineArgs {
    /// Model store JSON files, in run order.
    #[arg(required = true, num_args = 1.., value_name = "JSON")]
    pub stores: Vec<PathBuf>,

    /// Output combined store JSON.
    #[arg(short, long, value_name = "JSON")]
    pub output: PathBuf,

    /// Export the retained models to CSV.
    #[arg(long, value_name = "CSV")]
    pub export_csv: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Model store JSON.
    #[arg(value_name = "JSON")]
    pub store: PathBuf,

    /// Show the N spectra with the largest residuals.
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Print statistics as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DemoArgs {
    /// Map rows.
    #[arg(long, default_value_t = 12)]
    pub ny: usize,

    /// Map columns.
    #[arg(long, default_value_t = 12)]
    pub nx: usize,

    /// Spectral channels.
    #[arg(long, default_value_t = 96)]
    pub channels: usize,

    /// Noise standard deviation.
    #[arg(long, default_value_t = 0.05)]
    pub noise: f64,

    /// Random seed for the synthetic cube.
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Tile widths, coarsest first.
    #[arg(long, value_delimiter = ',', default_values_t = vec![6.0, 3.0])]
    pub widths: Vec<f64>,

    /// Independent runs to decompose and combine.
    #[arg(long, default_value_t = 1)]
    pub runs: usize,

    /// Show the N spectra with the largest residuals.
    #[arg(long, default_value_t = 5)]
    pub top: usize,

    /// Write the final model store to JSON.
    #[arg(long, value_name = "JSON")]
    pub output: Option<PathBuf>,

    /// Export the final models to CSV.
    #[arg(long, value_name = "CSV")]
    pub export_csv: Option<PathBuf>,

    #[command(flatten)]
    pub tolerances: ToleranceArgs,

    #[command(flatten)]
    pub velocity: VelocityArgs,

    #[command(flatten)]
    pub workers: WorkerArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn decompose_parses_tolerances_and_range() {
        let cli = Cli::try_parse_from([
            "specdecomp",
            "decompose",
            "--cube",
            "c.json",
            "--saas",
            "s.json",
            "--models",
            "m.json",
            "-o",
            "out.json",
            "--t0",
            "1",
            "--vel-min",
            "-5",
            "--vel-max",
            "5",
            "--workers",
            "2",
        ])
        .unwrap();
        let Command::Decompose(args) = cli.command else {
            panic!("expected decompose");
        };
        assert_eq!(args.tolerances.t0, 1.0);
        assert_eq!(args.tolerances.t5, 0.5);
        assert_eq!(args.velocity.vel_min, Some(-5.0));
        assert_eq!(args.workers.workers, 2);
    }

    #[test]
    fn demo_widths_are_comma_separated() {
        let cli = Cli::try_parse_from(["specdecomp", "demo", "--widths", "4,2,1"]).unwrap();
        let Command::Demo(args) = cli.command else {
            panic!("expected demo");
        };
        assert_eq!(args.widths, vec![4.0, 2.0, 1.0]);
        assert_eq!(args.runs, 1);
    }
}
