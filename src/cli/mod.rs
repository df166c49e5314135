//! Command-line parsing for the polynomial noise/fit demo.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! sampling/fitting code; `app::run_config_from_args` turns the parsed flags
//! into a `RunConfig`.

use std::path::PathBuf;

use clap::Parser;

/// Top-level CLI.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "polyfit",
    version,
    about = "Generate noisy polynomial data and fit it by correlated least squares"
)]
pub struct Cli {
    /// Degree of the polynomial the data is generated from (0..=2).
    #[arg(long = "data-n", default_value_t = 1)]
    pub data_degree: u32,

    /// Degree of the fitted polynomial.
    #[arg(long = "fit-n", default_value_t = 1)]
    pub fit_degree: u32,

    /// Random seed for the noise draws (fresh entropy when omitted).
    #[arg(long)]
    pub seed: Option<u64>,

    /// Mean of the Gaussian noise.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub mu: f64,

    /// Width (standard deviation) of the Gaussian noise.
    #[arg(long, default_value_t = 1.0)]
    pub sig: f64,

    /// Number of noisy draws averaged into the dataset.
    #[arg(long, default_value_t = 100)]
    pub nsamp: usize,

    /// Treat every fitted coefficient as linear (variable projection).
    #[arg(long)]
    pub linear: bool,

    /// Only generate and summarize the data.
    #[arg(long)]
    pub no_fit: bool,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Export the run (dataset, fit, band) to JSON.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Iteration budget of the nonlinear search.
    #[arg(long = "max-iter", default_value_t = 1000)]
    pub max_iterations: usize,

    /// Relative eigenvalue floor applied to the data correlation matrix.
    #[arg(long = "svd-cut", default_value_t = 1e-12, conflicts_with = "no_svd_cut")]
    pub svd_cut: f64,

    /// Require a positive definite data covariance (no eigenvalue floor).
    #[arg(long)]
    pub no_svd_cut: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_run() {
        let cli = Cli::parse_from(["polyfit"]);
        assert_eq!(cli.data_degree, 1);
        assert_eq!(cli.fit_degree, 1);
        assert_eq!(cli.nsamp, 100);
        assert_eq!(cli.mu, 0.0);
        assert_eq!(cli.sig, 1.0);
        assert!(cli.seed.is_none());
        assert!(!cli.linear && !cli.no_fit && !cli.no_plot);
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::parse_from([
            "polyfit", "--data-n", "2", "--fit-n", "3", "--seed", "11", "--mu", "-0.5", "--sig", "0.2",
            "--nsamp", "40", "--linear", "--no-svd-cut",
        ]);
        assert_eq!(cli.data_degree, 2);
        assert_eq!(cli.fit_degree, 3);
        assert_eq!(cli.seed, Some(11));
        assert_eq!(cli.mu, -0.5);
        assert_eq!(cli.nsamp, 40);
        assert!(cli.linear);
        assert!(cli.no_svd_cut);
    }

    #[test]
    fn svd_cut_flags_conflict() {
        assert!(Cli::try_parse_from(["polyfit", "--svd-cut", "1e-8", "--no-svd-cut"]).is_err());
    }
}
