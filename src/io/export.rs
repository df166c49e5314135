//! Export a finished run to JSON.
//!
//! The export is the portable representation of a run, meant for post-hoc
//! exploration in notebooks or scripts:
//! - the run configuration
//! - the aggregated dataset (means, sdev, full covariance)
//! - fitted coefficients with covariance and diagnostics
//! - the fit band on the fine grid

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::app::pipeline::{FitBand, RunOutput};
use crate::domain::{key_name, FitResult, RunConfig, StrategyKind};
use crate::error::{Error, Result};

/// Top-level JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFile {
    pub tool: String,
    pub config: ConfigSection,
    pub dataset: DatasetSection,
    pub fit: Option<FitSection>,
    pub band: Option<BandSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSection {
    pub data_degree: u32,
    pub fit_degree: u32,
    pub seed: Option<u64>,
    pub noise_mean: f64,
    pub noise_width: f64,
    pub sample_count: usize,
    pub use_linear_subset: bool,
    pub max_iterations: usize,
    pub svd_cut: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSection {
    pub x: Vec<f64>,
    pub mean: Vec<f64>,
    pub sdev: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSection {
    /// Keyed by `p_<k>`.
    pub values: BTreeMap<String, f64>,
    pub sdev: BTreeMap<String, f64>,
    pub initial: BTreeMap<String, f64>,
    /// Rows/columns ordered by increasing degree.
    pub covariance: Vec<Vec<f64>>,
    pub chi2: f64,
    pub dof: usize,
    pub q: f64,
    pub log_likelihood: f64,
    pub iterations: usize,
    pub strategy: StrategyKind,
    pub svd_modified: usize,
    pub converged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandSection {
    pub x: Vec<f64>,
    pub mean: Vec<f64>,
    pub sdev: Vec<f64>,
}

impl RunFile {
    pub fn new(run: &RunOutput, band: Option<&FitBand>, config: &RunConfig) -> Self {
        Self {
            tool: "polyfit".to_string(),
            config: ConfigSection {
                data_degree: config.data_degree,
                fit_degree: config.fit_degree,
                seed: config.seed,
                noise_mean: config.noise_mean,
                noise_width: config.noise_width,
                sample_count: config.sample_count,
                use_linear_subset: config.use_linear_subset,
                max_iterations: config.fit_options.max_iterations,
                svd_cut: config.fit_options.svd_cut,
            },
            dataset: DatasetSection {
                x: run.grid.points().to_vec(),
                mean: run.dataset.mean().to_vec(),
                sdev: run.dataset.sdev(),
                covariance: rows(run.dataset.covariance()),
            },
            fit: run.fit.as_ref().map(FitSection::new),
            band: band.map(|b| BandSection {
                x: b.xs.clone(),
                mean: b.mean().to_vec(),
                sdev: b.sdev(),
            }),
        }
    }
}

impl FitSection {
    fn new(fit: &FitResult) -> Self {
        let degrees = fit.values.degrees();
        Self {
            values: fit.values.iter().map(|(d, v)| (key_name(d), v)).collect(),
            sdev: degrees.iter().zip(&fit.sdev).map(|(&d, &s)| (key_name(d), s)).collect(),
            initial: fit.initial.iter().map(|(d, v)| (key_name(d), v)).collect(),
            covariance: rows(&fit.covariance),
            chi2: fit.chi2,
            dof: fit.dof,
            q: fit.q,
            log_likelihood: fit.log_likelihood,
            iterations: fit.iterations,
            strategy: fit.strategy,
            svd_modified: fit.svd_modified,
            converged: fit.converged,
        }
    }
}

fn rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter().map(|r| r.iter().copied().collect()).collect()
}

/// Write a run JSON file.
pub fn write_run_json(path: &Path, run: &RunOutput, band: Option<&FitBand>, config: &RunConfig) -> Result<()> {
    let file = File::create(path).map_err(|source| Error::Io {
        context: format!("Failed to create export JSON '{}'", path.display()),
        source,
    })?;

    write_run_to(BufWriter::new(file), &RunFile::new(run, band, config))?;

    log::info!("exported run to {}", path.display());
    Ok(())
}

/// Serialize into `w` and flush it, so a failed final write is reported.
fn write_run_to<W: Write>(mut w: W, doc: &RunFile) -> Result<()> {
    serde_json::to_writer_pretty(&mut w, doc).map_err(|e| Error::Io {
        context: "Failed to write export JSON".to_string(),
        source: e.into(),
    })?;
    w.flush().map_err(|source| Error::Io {
        context: "Failed to flush export JSON".to_string(),
        source,
    })
}

/// Read a run JSON file.
pub fn read_run_json(path: &Path) -> Result<RunFile> {
    let file = File::open(path).map_err(|source| Error::Io {
        context: format!("Failed to open export JSON '{}'", path.display()),
        source,
    })?;
    serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| Error::Io {
        context: "Invalid export JSON".to_string(),
        source: e.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::{run, BAND_STEP};

    fn seeded() -> RunConfig {
        RunConfig {
            seed: Some(3),
            sample_count: 20,
            ..RunConfig::default()
        }
    }

    #[test]
    fn document_carries_fit_and_band() {
        let config = seeded();
        let out = run(&config).unwrap();
        let band = out.fit_band(BAND_STEP).unwrap();
        let doc = RunFile::new(&out, band.as_ref(), &config);

        assert_eq!(doc.dataset.x.len(), 51);
        assert_eq!(doc.dataset.covariance.len(), 51);
        let fit = doc.fit.as_ref().unwrap();
        assert_eq!(fit.values.keys().cloned().collect::<Vec<_>>(), vec!["p_0", "p_1"]);
        assert_eq!(fit.initial["p_0"], 1.5);
        assert_eq!(doc.band.as_ref().unwrap().x.len(), 101);

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["fit"]["strategy"], "levenberg_marquardt");
        assert_eq!(json["config"]["svd_cut"], 1e-12);
    }

    #[test]
    fn file_round_trip() {
        let config = RunConfig {
            run_fit: false,
            ..seeded()
        };
        let out = run(&config).unwrap();
        let path = std::env::temp_dir().join(format!("polyfit-export-{}.json", std::process::id()));

        write_run_json(&path, &out, None, &config).unwrap();
        let back = read_run_json(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        let expected = RunFile::new(&out, None, &config);
        assert_eq!(back.config, expected.config);
        assert_eq!(back.dataset.x.len(), expected.dataset.x.len());
        for (a, b) in back.dataset.mean.iter().zip(&expected.dataset.mean) {
            approx::assert_relative_eq!(*a, *b, max_relative = 1e-15);
        }
        assert!(back.fit.is_none());
        assert!(back.band.is_none());
    }

    /// Accepts every write and fails on flush, like a full disk.
    struct FailingFlush(Vec<u8>);

    impl Write for FailingFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::other("no space left on device"))
        }
    }

    #[test]
    fn failed_flush_is_reported() {
        let config = RunConfig {
            run_fit: false,
            ..seeded()
        };
        let out = run(&config).unwrap();
        let doc = RunFile::new(&out, None, &config);

        let err = write_run_to(FailingFlush(Vec::new()), &doc).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));

        let mut buf = Vec::new();
        write_run_to(&mut buf, &doc).unwrap();
        assert!(!buf.is_empty());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_run_json(Path::new("/nonexistent/polyfit.json")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.exit_code(), 2);
    }
}
