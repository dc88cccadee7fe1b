use std::fmt;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::{MonteCarloError, MonteCarloResult};
use crate::linalg::ensure_finite_vector;

/// Running sums of photon Stokes samples.
///
/// Tallies from different batches combine with [`StokesTally::merge`]; the
/// sums are plain additions so the result only depends on the order in
/// which batches are merged, which the driver keeps fixed.
#[derive(Debug, Clone, PartialEq)]
pub struct StokesTally {
    pub sum: DVector<f64>,
    pub sum_sq: DVector<f64>,
    pub count: u64,
}

impl StokesTally {
    pub fn new(stokes_dim: usize) -> Self {
        Self {
            sum: DVector::zeros(stokes_dim),
            sum_sq: DVector::zeros(stokes_dim),
            count: 0,
        }
    }

    pub fn stokes_dim(&self) -> usize {
        self.sum.len()
    }

    /// Add the Stokes vector of one photon.
    pub fn add(&mut self, sample: &DVector<f64>) -> MonteCarloResult<()> {
        if sample.len() != self.stokes_dim() {
            return Err(MonteCarloError::inconsistency(format!(
                "photon sample has {} Stokes elements, tally has {}",
                sample.len(),
                self.stokes_dim()
            )));
        }
        ensure_finite_vector(sample, "photon sample")?;
        self.sum += sample;
        self.sum_sq += sample.component_mul(sample);
        self.count += 1;
        Ok(())
    }

    /// Fold another tally into this one.
    pub fn merge(&mut self, other: &StokesTally) -> MonteCarloResult<()> {
        if other.stokes_dim() != self.stokes_dim() {
            return Err(MonteCarloError::inconsistency(format!(
                "cannot merge tallies with Stokes dimensions {} and {}",
                self.stokes_dim(),
                other.stokes_dim()
            )));
        }
        self.sum += &other.sum;
        self.sum_sq += &other.sum_sq;
        self.count += other.count;
        Ok(())
    }

    /// Mean and standard error of the mean over the photons added so far.
    ///
    /// The variance estimate `ΣI²/N - mean²` is clamped at zero, so a set of
    /// identical samples has zero error.
    pub fn finalize(&self) -> MonteCarloResult<StokesEstimate> {
        if self.count == 0 {
            return Err(MonteCarloError::inconsistency("cannot finalize a tally without photons"));
        }
        let n = self.count as f64;
        let mean = &self.sum / n;
        let error = DVector::from_iterator(
            mean.len(),
            self.sum_sq
                .iter()
                .zip(mean.iter())
                .map(|(&sq, &m)| ((sq / n - m * m).max(0.0) / n).sqrt()),
        );
        Ok(StokesEstimate {
            mean,
            error,
            photons: self.count,
        })
    }
}

/// Mean Stokes vector of a set of photons with its standard error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StokesEstimate {
    pub mean: DVector<f64>,
    pub error: DVector<f64>,
    pub photons: u64,
}

impl StokesEstimate {
    /// Error relative to the mean for each Stokes element, 0 where the mean is 0.
    pub fn rel_error(&self) -> DVector<f64> {
        self.error.zip_map(&self.mean, |e, m| if m != 0.0 { e / m.abs() } else { 0.0 })
    }
}

impl fmt::Display for StokesEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stokes estimate over {} photons", self.photons)?;
        let rel = self.rel_error();
        for (i, (m, e)) in self.mean.iter().zip(self.error.iter()).enumerate() {
            writeln!(f, "  I[{}]: {:.6e} +/- {:.3e} ({:.2}%)", i, m, e, rel[i] * 100.0)?;
        }
        Ok(())
    }
}
