//! Gaussian noise draws over a sample grid.
//!
//! The generator is an owned `StdRng` seeded once at construction, so two
//! samplers never share state and a fixed seed always reproduces the same
//! draws.

use log::debug;
use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::domain::Grid;
use crate::error::{Error, Result};

/// `count` independent noise vectors, one row per draw and one column per
/// grid point.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseDraws {
    values: DMatrix<f64>,
}

impl NoiseDraws {
    /// Draws × points.
    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn count(&self) -> usize {
        self.values.nrows()
    }

    pub fn point_count(&self) -> usize {
        self.values.ncols()
    }

    /// Add the noise-free signal to every draw, giving the observed samples.
    pub fn with_signal(&self, signal: &[f64]) -> Result<DMatrix<f64>> {
        if signal.len() != self.point_count() {
            return Err(Error::DimensionMismatch {
                what: "signal values",
                expected: self.point_count(),
                actual: signal.len(),
            });
        }
        let mut samples = self.values.clone();
        for (j, mut column) in samples.column_iter_mut().enumerate() {
            column.add_scalar_mut(signal[j]);
        }
        Ok(samples)
    }
}

/// Seedable source of i.i.d. Normal(mean, width) noise.
#[derive(Debug, Clone)]
pub struct NoiseSampler {
    rng: StdRng,
}

impl NoiseSampler {
    /// `Some(seed)` is reproducible; `None` seeds from system entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Discard the current generator state.
    pub fn reseed(&mut self, seed: Option<u64>) {
        *self = Self::new(seed);
    }

    /// Draw `count` noise vectors, each with one value per grid point.
    pub fn sample(&mut self, grid: &Grid, mean: f64, width: f64, count: usize) -> Result<NoiseDraws> {
        if !mean.is_finite() {
            return Err(Error::config(format!("noise mean must be finite, got {mean}")));
        }
        if !(width.is_finite() && width >= 0.0) {
            return Err(Error::config(format!(
                "noise width must be finite and >= 0, got {width}"
            )));
        }
        if count == 0 {
            return Err(Error::config("sample count must be >= 1"));
        }

        let normal = Normal::new(mean, width)
            .map_err(|e| Error::config(format!("noise distribution error: {e}")))?;

        // Row-major fill: draw 0 takes the first `len(grid)` variates, and so on.
        let n = grid.len();
        let values = DMatrix::from_row_iterator(
            count,
            n,
            (0..count * n).map(|_| normal.sample(&mut self.rng)),
        );
        debug!("drew {count} noise vectors over {n} points (mean={mean}, width={width})");

        Ok(NoiseDraws { values })
    }
}

/// One-shot sampling with a freshly seeded generator.
pub fn sample(grid: &Grid, mean: f64, width: f64, count: usize, seed: Option<u64>) -> Result<NoiseDraws> {
    NoiseSampler::new(seed).sample(grid, mean, width, count)
}
