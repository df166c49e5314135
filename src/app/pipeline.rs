//! Shared run pipeline used by the CLI and by the integration tests.
//!
//! Keeping this in one place keeps the binary about presentation only:
//! truth polynomial -> noise draws -> aggregated dataset -> optional fit

use log::info;

use crate::data::{aggregate, NoiseSampler, ObservedDataset};
use crate::domain::{Coefficients, FitResult, Grid, RunConfig, UncertainValues};
use crate::error::{Error, Result};
use crate::models::{evaluate_grid, evaluate_uncertain};

/// Truth coefficients `p_0, p_1, p_2` the data is generated from.
const TRUTH: [(u32, f64); 3] = [(0, 1.5), (1, -0.3), (2, 0.04)];

/// Step of the reporting grid the fit band is drawn on.
pub const BAND_STEP: f64 = 0.1;

/// All computed outputs of a single run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub grid: Grid,
    /// Coefficients the data was generated from.
    pub truth: Coefficients,
    pub dataset: ObservedDataset,
    pub fit: Option<FitResult>,
}

/// Fitted curve on a fine grid, for plotting and export.
#[derive(Debug, Clone)]
pub struct FitBand {
    pub xs: Vec<f64>,
    pub values: UncertainValues,
}

impl FitBand {
    pub fn mean(&self) -> &[f64] {
        &self.values.mean
    }

    pub fn sdev(&self) -> Vec<f64> {
        self.values.sdev()
    }
}

impl RunOutput {
    /// The fitted polynomial with its propagated uncertainty over the data
    /// span, sampled every `step`. `None` when no fit was run.
    pub fn fit_band(&self, step: f64) -> Result<Option<FitBand>> {
        let Some(fit) = &self.fit else {
            return Ok(None);
        };
        let fine = self.grid.fine(step)?;
        let values = evaluate_uncertain(fine.points(), &fit.uncertain());
        Ok(Some(FitBand {
            xs: fine.points().to_vec(),
            values,
        }))
    }
}

/// The full truth table.
pub fn truth_table() -> Result<Coefficients> {
    Coefficients::new(TRUTH)
}

/// Check a configuration against the default grid before doing any work.
pub fn validate(config: &RunConfig, grid: &Grid) -> Result<()> {
    let max_truth = TRUTH.len() as u32 - 1;
    if config.data_degree > max_truth {
        return Err(Error::config(format!(
            "data degree must be <= {max_truth} (truth is known for p_0..p_{max_truth}), got {}",
            config.data_degree
        )));
    }
    if config.fit_degree as usize + 1 > grid.len() {
        return Err(Error::config(format!(
            "fit degree {} needs {} points, the grid has {}",
            config.fit_degree,
            config.fit_degree as usize + 1,
            grid.len()
        )));
    }
    if config.sample_count == 0 {
        return Err(Error::config("sample count must be >= 1"));
    }
    if !config.noise_mean.is_finite() {
        return Err(Error::config(format!("noise mean must be finite, got {}", config.noise_mean)));
    }
    if !(config.noise_width.is_finite() && config.noise_width >= 0.0) {
        return Err(Error::config(format!(
            "noise width must be finite and >= 0, got {}",
            config.noise_width
        )));
    }
    if config.run_fit {
        config.fit_options.validate()?;
    }
    Ok(())
}

/// Start values of the fit: the truth where known, 0.0 beyond it.
pub fn initial_coefficients(fit_degree: u32) -> Result<Coefficients> {
    let truth = truth_table()?;
    Coefficients::new((0..=fit_degree).map(|d| (d, truth.get(d).unwrap_or(0.0))))
}

/// Execute the pipeline and return every intermediate the front end shows.
pub fn run(config: &RunConfig) -> Result<RunOutput> {
    let grid = Grid::default();
    validate(config, &grid)?;

    // 1) Noise-free truth.
    let truth = truth_table()?.truncated(config.data_degree);
    let signal = evaluate_grid(grid.points(), &truth);
    info!("truth: degree {} over {} points", config.data_degree, grid.len());

    // 2) Draws around it.
    let mut sampler = NoiseSampler::new(config.seed);
    let noise = sampler.sample(&grid, config.noise_mean, config.noise_width, config.sample_count)?;
    let samples = noise.with_signal(&signal)?;
    info!(
        "sampled {} draws, noise N({}, {})",
        noise.count(),
        config.noise_mean,
        config.noise_width
    );

    // 3) One dataset with a full covariance.
    let dataset = aggregate(&samples)?;

    // 4) Fit.
    let fit = if config.run_fit {
        let initial = initial_coefficients(config.fit_degree)?;
        let linear = if config.use_linear_subset {
            initial.degrees()
        } else {
            Vec::new()
        };
        info!(
            "fitting degree {} ({} linear parameters)",
            config.fit_degree,
            linear.len()
        );
        Some(crate::fit::fit(&grid, &dataset, &initial, &linear, &config.fit_options)?)
    } else {
        None
    };

    Ok(RunOutput {
        grid,
        truth,
        dataset,
        fit,
    })
}
