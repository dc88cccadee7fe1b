use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MonteCarloError, MonteCarloResult};

/// Run configuration of a Monte Carlo radiance calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Number of photon histories to trace
    pub photons: u64,
    /// Number of batches the photons are split into for parallel execution
    pub batches: usize,
    /// Seed of the run; negative values take a seed from the system clock
    pub seed: i64,
    /// Number of Stokes components, 1 to 4
    pub stokes_dim: usize,
    /// Frequency in Hz
    pub frequency: f64,
    /// Maximum number of path stepper calls per traced path
    pub max_path_steps: usize,
    /// Number of rejected direction proposals after which a warning is logged
    pub rejection_warn_threshold: u64,
    /// Write each photon's contribution to this file
    pub photon_log: Option<PathBuf>,
    /// Write the paths traced after scattering events to this file as JSON Lines
    pub record_paths: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            photons: 10_000,
            batches: 10,
            seed: 0,
            stokes_dim: 1,
            frequency: 183.31e9,
            max_path_steps: 5000,
            rejection_warn_threshold: 10_000,
            photon_log: None,
            record_paths: None,
        }
    }
}

impl Settings {
    /// Settings for `photons` histories at `frequency`, everything else default.
    pub fn new(photons: u64, stokes_dim: usize, frequency: f64) -> Self {
        Self {
            photons,
            stokes_dim,
            frequency,
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> MonteCarloResult<Self> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> MonteCarloResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> MonteCarloResult<()> {
        if self.photons == 0 {
            return Err(MonteCarloError::invalid_settings("at least one photon is required"));
        }
        if self.batches == 0 {
            return Err(MonteCarloError::invalid_settings("at least one batch is required"));
        }
        if !(1..=4).contains(&self.stokes_dim) {
            return Err(MonteCarloError::invalid_settings(format!(
                "stokes_dim must be between 1 and 4, got {}",
                self.stokes_dim
            )));
        }
        if !self.frequency.is_finite() || self.frequency <= 0.0 {
            return Err(MonteCarloError::invalid_settings(format!(
                "frequency must be positive, got {}",
                self.frequency
            )));
        }
        if self.max_path_steps == 0 {
            return Err(MonteCarloError::invalid_settings("max_path_steps must be positive"));
        }
        Ok(())
    }

    /// Photon index ranges of the batches, in batch order.
    ///
    /// The partition depends only on `photons` and `batches`; batches never
    /// outnumber photons.
    pub fn batch_ranges(&self) -> Vec<Range<u64>> {
        let n_batches = (self.batches as u64).min(self.photons).max(1);
        (0..n_batches)
            .map(|b| (b * self.photons / n_batches)..((b + 1) * self.photons / n_batches))
            .collect()
    }
}
