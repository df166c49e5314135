//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - runs the sample/aggregate/fit pipeline
//! - prints the report and the plot
//! - writes the optional export

use clap::Parser;

use crate::cli::Cli;
use crate::domain::RunConfig;
use crate::error::{Error, Result};
use crate::fit::FitOptions;

pub mod pipeline;

/// Entry point for the `polyfit` binary.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = run_config_from_args(&cli);
    let run = match pipeline::run(&config) {
        Ok(run) => run,
        Err(Error::NonConvergentFit(best)) => {
            // Show the best estimate for diagnosis, then fail.
            eprintln!("{}", crate::report::format_fit(&best));
            return Err(Error::NonConvergentFit(best));
        }
        Err(err) => return Err(err),
    };

    println!("{}", crate::report::format_run_summary(&run, &config)?);

    let band = run.fit_band(pipeline::BAND_STEP)?;
    if !cli.no_plot {
        let plot = crate::plot::render_ascii_plot(&run.grid, &run.dataset, band.as_ref(), cli.width, cli.height);
        println!("{plot}");
    }

    if let Some(path) = &cli.export {
        crate::io::export::write_run_json(path, &run, band.as_ref(), &config)?;
    }

    Ok(())
}

/// `env_logger` on stderr; `RUST_LOG` overrides the default `warn`.
fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("warn");
    // A second init (e.g. from a test harness) is harmless.
    let _ = env_logger::Builder::from_env(env).format_timestamp(None).try_init();
}

pub fn run_config_from_args(args: &Cli) -> RunConfig {
    RunConfig {
        data_degree: args.data_degree,
        fit_degree: args.fit_degree,
        seed: args.seed,
        noise_mean: args.mu,
        noise_width: args.sig,
        sample_count: args.nsamp,
        use_linear_subset: args.linear,
        run_fit: !args.no_fit,
        fit_options: FitOptions {
            max_iterations: args.max_iterations,
            svd_cut: if args.no_svd_cut { None } else { Some(args.svd_cut) },
            ..FitOptions::default()
        },
    }
}
