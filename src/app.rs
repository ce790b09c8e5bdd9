//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - converts them into typed stage configs
//! - runs the pipeline stages
//! - prints reports and writes output files

use clap::Parser;

use crate::cli::{
    CombineArgs, Command, CoverageArgs, DecomposeArgs, DemoArgs, FitterArgs, StatsArgs, ToleranceArgs,
    VelocityArgs,
};
use crate::coverage::{CoverageSet, chunk_level};
use crate::cube::VelocityTrim;
use crate::data::SyntheticConfig;
use crate::decompose::{DecomposeConfig, decompose};
use crate::domain::{ModelStore, ToleranceSet};
use crate::error::AppError;
use crate::fit::GridFitOptions;
use crate::report::{compute_stats, format_combine_summary, format_coverage_summary, format_stats, format_worst_fits};

pub mod pipeline;

/// Entry point for the `specdecomp` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Coverage(args) => handle_coverage(args),
        Command::Decompose(args) => handle_decompose(args),
        Command::Combine(args) => handle_combine(args),
        Command::Stats(args) => handle_stats(args),
        Command::Demo(args) => handle_demo(args),
    }
}

fn handle_coverage(args: CoverageArgs) -> Result<(), AppError> {
    let cube = crate::io::read_cube(&args.cube)?;
    let config = crate::io::read_coverage_config(&args.config)?;
    let set = CoverageSet::build(&cube, &config, args.workers.workers)?;
    crate::io::write_saa_set(&args.output, &set)?;

    if let (Some(level), Some(path)) = (args.chunk_level, &args.chunks_output) {
        let chunks = chunk_level(&set, level, args.chunks)?;
        crate::io::write_chunks(path, level, &chunks)?;
        log::info!("Wrote {} chunks for level {level} to {}", chunks.len(), path.display());
    }

    println!("{}", format_coverage_summary(&set));
    Ok(())
}

fn handle_decompose(args: DecomposeArgs) -> Result<(), AppError> {
    let tolerances = tolerances_from_args(&args.tolerances);
    tolerances.validate()?;
    let velocity_range = velocity_range_from_args(&args.velocity);

    let cube = crate::io::read_cube(&args.cube)?;
    let set = crate::io::read_saa_set(&args.saas)?;
    let acquired = crate::io::read_acquired_models(&args.models)?;
    let trim = VelocityTrim::new(cube.spectral_axis(), velocity_range);
    let set = set.attach_models(&acquired, &trim)?;

    let fitter = pipeline::reference_fitter(cube.channel_width(), fit_options_from_args(&args.fitter))?;
    let config = DecomposeConfig {
        run_id: args.run_id,
        tolerances,
        velocity_range,
        workers: args.workers.workers,
        noise_seed: args.noise_seed,
    };
    let store = decompose(&cube, &set, &fitter, &config)?;

    crate::io::write_store(&args.output, &store, args.run_id)?;
    if let Some(path) = &args.export_csv {
        crate::io::write_store_csv(path, &store)?;
    }

    println!("{}", format_stats(&compute_stats(&store), Some(&tolerances)));
    Ok(())
}

fn handle_combine(args: CombineArgs) -> Result<(), AppError> {
    let stores = args
        .stores
        .iter()
        .map(|p| crate::io::read_store(p).map(|f| f.store))
        .collect::<Result<Vec<ModelStore>, _>>()?;
    let combined = crate::combine::combine(&stores)?;

    crate::io::write_combined(&args.output, &combined)?;
    if let Some(path) = &args.export_csv {
        crate::io::write_store_csv(path, &combined.store)?;
    }

    println!("{}", format_combine_summary(&combined, stores.len()));
    println!("{}", format_stats(&compute_stats(&combined.store), None));
    Ok(())
}

fn handle_stats(args: StatsArgs) -> Result<(), AppError> {
    let file = crate::io::read_store(&args.store)?;
    let stats = compute_stats(&file.store);

    if args.json {
        let text = serde_json::to_string_pretty(&stats)
            .map_err(|e| AppError::new(4, format!("Failed to serialize statistics: {e}")))?;
        println!("{text}");
        return Ok(());
    }

    println!("{}", format_stats(&stats, None));
    if args.top > 0 {
        println!("{}", format_worst_fits(&file.store, args.top));
    }
    Ok(())
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = demo_config_from_args(&args);
    let out = pipeline::run_demo(&config)?;

    for (run, set) in out.coverage.iter().enumerate() {
        println!("Run {run}:");
        println!("{}", format_coverage_summary(set));
    }
    if out.stores.len() > 1 {
        println!("{}", format_combine_summary(&out.combined, out.stores.len()));
    }
    println!("{}", format_stats(&out.stats, Some(&config.tolerances)));
    if args.top > 0 {
        println!("{}", format_worst_fits(&out.combined.store, args.top));
    }

    if let Some(path) = &args.output {
        crate::io::write_combined(path, &out.combined)?;
    }
    if let Some(path) = &args.export_csv {
        crate::io::write_store_csv(path, &out.combined.store)?;
    }
    Ok(())
}

pub fn tolerances_from_args(args: &ToleranceArgs) -> ToleranceSet {
    ToleranceSet::from_array([args.t0, args.t1, args.t2, args.t3, args.t4, args.t5])
}

pub fn velocity_range_from_args(args: &VelocityArgs) -> Option<(f64, f64)> {
    match (args.vel_min, args.vel_max) {
        (Some(lo), Some(hi)) => Some((lo, hi)),
        _ => None,
    }
}

pub fn fit_options_from_args(args: &FitterArgs) -> GridFitOptions {
    GridFitOptions {
        passes: args.fit_passes,
        centre_span: args.centre_span,
        centre_steps: args.centre_steps,
        width_ratio: args.width_ratio,
        width_steps: args.width_steps,
        ..GridFitOptions::default()
    }
}

pub fn demo_config_from_args(args: &DemoArgs) -> pipeline::DemoConfig {
    pipeline::DemoConfig {
        synthetic: SyntheticConfig {
            ny: args.ny,
            nx: args.nx,
            n_channels: args.channels,
            noise: args.noise,
            seed: args.seed,
            ..SyntheticConfig::default()
        },
        widths: args.widths.clone(),
        runs: args.runs,
        tolerances: tolerances_from_args(&args.tolerances),
        velocity_range: velocity_range_from_args(&args.velocity),
        workers: args.workers.workers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;

    #[test]
    fn demo_args_become_config() {
        let cli = Cli::try_parse_from([
            "specdecomp",
            "demo",
            "--nx",
            "8",
            "--t5",
            "0.2",
            "--vel-min",
            "-10",
            "--vel-max",
            "10",
        ])
        .unwrap();
        let Command::Demo(args) = cli.command else {
            panic!("expected demo");
        };
        let config = demo_config_from_args(&args);
        assert_eq!(config.synthetic.nx, 8);
        assert_eq!(config.tolerances.t5, 0.2);
        assert_eq!(config.tolerances.t0, ToleranceSet::default().t0);
        assert_eq!(config.velocity_range, Some((-10.0, 10.0)));
    }

    #[test]
    fn stage_files_chain_through_decompose_and_combine() {
        use crate::coverage::CoverageConfig;
        use crate::data::generate_cube;
        use crate::io::temp_path;

        let syn = generate_cube(&SyntheticConfig {
            ny: 4,
            nx: 4,
            n_channels: 48,
            ..SyntheticConfig::default()
        })
        .unwrap();
        let shape = syn.cube.map_shape();
        let coverage = CoverageConfig {
            map_shape: shape,
            x_offset: 0,
            y_offset: 0,
            moment_mask: None,
            widths: vec![2.0],
            patterns: vec![pipeline::grid_pattern(shape, 2.0).unwrap()],
        };
        let set = CoverageSet::build(&syn.cube, &coverage, 1).unwrap();
        let trim = VelocityTrim::new(syn.cube.spectral_axis(), None);
        let fitter = pipeline::reference_fitter(syn.cube.channel_width(), GridFitOptions::default()).unwrap();
        let acquired = pipeline::acquire_from_truth(&set, &syn, &trim, &fitter, 1).unwrap();

        let cube_path = temp_path("app_cube.json");
        let saa_path = temp_path("app_saas.json");
        let models_path = temp_path("app_models.json");
        let store_path = temp_path("app_store.json");
        let combined_path = temp_path("app_combined.json");
        crate::io::write_cube(&cube_path, &syn.cube).unwrap();
        crate::io::write_saa_set(&saa_path, &set).unwrap();
        crate::io::write_acquired_models(&models_path, &acquired).unwrap();

        let cli = Cli::try_parse_from([
            "specdecomp",
            "decompose",
            "--cube",
            cube_path.to_str().unwrap(),
            "--saas",
            saa_path.to_str().unwrap(),
            "--models",
            models_path.to_str().unwrap(),
            "-o",
            store_path.to_str().unwrap(),
            "--workers",
            "1",
        ])
        .unwrap();
        let Command::Decompose(args) = cli.command else {
            panic!("expected decompose");
        };
        handle_decompose(args).unwrap();

        let cli = Cli::try_parse_from([
            "specdecomp",
            "combine",
            store_path.to_str().unwrap(),
            store_path.to_str().unwrap(),
            "-o",
            combined_path.to_str().unwrap(),
        ])
        .unwrap();
        let Command::Combine(args) = cli.command else {
            panic!("expected combine");
        };
        handle_combine(args).unwrap();

        let single = crate::io::read_store(&store_path).unwrap();
        let combined = crate::io::read_store(&combined_path).unwrap();
        assert_eq!(single.store.len(), 16);
        assert_eq!(combined.store.len(), 16);
        assert_eq!(combined.store.fitted_count(), single.store.fitted_count());
        assert!(combined.provenance.is_some());
    }
}
