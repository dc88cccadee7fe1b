//! Sampling of new viewing directions at scattering events.
//!
//! Directions are either isotropic, with density 1/4π, or drawn by rejection
//! against the phase function peak, with density `Z[0,0] / C_sca`.

use nalgebra::{DMatrix, DVector};
use rand::Rng;

use crate::error::{MonteCarloError, MonteCarloResult};
use crate::linalg::ensure_finite_matrix;
use crate::medium::{OpticalState, PhaseFunction};
use crate::physics::LineOfSight;

/// Probability density of an isotropic direction (sr^-1)
pub const ISOTROPIC_DENSITY: f64 = 1.0 / (4.0 * std::f64::consts::PI);

/// A new line of sight drawn at a scattering event.
#[derive(Debug, Clone)]
pub struct DirectionSample {
    pub los: LineOfSight,
    /// Probability density of `los` per steradian
    pub density: f64,
    /// Bulk phase matrix for scattering from the new direction into the old one
    pub phase_matrix: DMatrix<f64>,
    /// Number of proposals drawn (1 for isotropic sampling)
    pub attempts: u64,
}

/// Draw an isotropic line of sight: `cos(za) = 1 - 2u`, azimuth uniform in [-180, 180).
pub fn isotropic_los<R: Rng + ?Sized>(rng: &mut R) -> LineOfSight {
    let cos_za: f64 = 1.0 - 2.0 * rng.gen::<f64>();
    let azimuth = 360.0 * rng.gen::<f64>() - 180.0;
    LineOfSight::new(cos_za.clamp(-1.0, 1.0).acos().to_degrees(), azimuth)
}

/// Samples new lines of sight at scattering events.
///
/// When the phase function reports per-particle-type peaks of Z[0,0] the
/// sampler proposes isotropic directions and accepts them with probability
/// `Z[0,0] / Σ pnd_i Z11max_i`, so that accepted directions follow the phase
/// function itself. Otherwise directions are isotropic and the phase matrix
/// enters the importance weight.
pub struct DirectionSampler<'a> {
    phase: &'a (dyn PhaseFunction + Sync),
    peak: Option<DVector<f64>>,
    warn_threshold: u64,
}

impl<'a> DirectionSampler<'a> {
    pub fn new(phase: &'a (dyn PhaseFunction + Sync), warn_threshold: u64) -> Self {
        Self {
            phase,
            peak: phase.peak_phase_function(),
            warn_threshold,
        }
    }

    pub fn uses_rejection(&self) -> bool {
        self.peak.is_some()
    }

    /// Sample the line of sight the photon came from before scattering into `los`.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        los: &LineOfSight,
        state: &OpticalState,
        rng: &mut R,
    ) -> MonteCarloResult<DirectionSample> {
        match &self.peak {
            None => {
                let new_los = isotropic_los(rng);
                let phase_matrix = self.phase_matrix(&new_los, los, state)?;
                Ok(DirectionSample {
                    los: new_los,
                    density: ISOTROPIC_DENSITY,
                    phase_matrix,
                    attempts: 1,
                })
            }
            Some(peak) => self.sample_rejection(los, state, peak, rng),
        }
    }

    fn sample_rejection<R: Rng + ?Sized>(
        &self,
        los: &LineOfSight,
        state: &OpticalState,
        peak: &DVector<f64>,
        rng: &mut R,
    ) -> MonteCarloResult<DirectionSample> {
        if peak.len() != state.pnd.len() {
            return Err(MonteCarloError::inconsistency(format!(
                "{} phase function peaks for {} particle types",
                peak.len(),
                state.pnd.len()
            )));
        }
        let z11_max = state.pnd.dot(peak);
        if !z11_max.is_finite() || z11_max <= 0.0 {
            return Err(MonteCarloError::inconsistency(format!(
                "bulk phase function peak {} is not positive",
                z11_max
            )));
        }
        let c_sca = state.scattering_coefficient();
        if !c_sca.is_finite() || c_sca <= 0.0 {
            return Err(MonteCarloError::inconsistency(format!(
                "scattering coefficient {} at a scattering event",
                c_sca
            )));
        }

        let mut attempts = 0u64;
        loop {
            attempts += 1;
            if attempts == self.warn_threshold {
                log::warn!(
                    "direction rejection sampling has drawn {} proposals (Z11 peak {:.3e})",
                    attempts,
                    z11_max
                );
            }
            let new_los = isotropic_los(rng);
            let phase_matrix = self.phase_matrix(&new_los, los, state)?;
            let z11 = phase_matrix[(0, 0)];
            if rng.gen::<f64>() * z11_max <= z11 {
                log::debug!("direction accepted after {} proposals", attempts);
                return Ok(DirectionSample {
                    los: new_los,
                    density: z11 / c_sca,
                    phase_matrix,
                    attempts,
                });
            }
        }
    }

    /// Phase matrix for light arriving along `from` and leaving along `into`.
    ///
    /// Both are viewing directions; the phase function is queried with the
    /// photon propagation directions.
    fn phase_matrix(&self, from: &LineOfSight, into: &LineOfSight, state: &OpticalState) -> MonteCarloResult<DMatrix<f64>> {
        let z = self.phase.phase_matrix(
            &from.photon_direction(),
            &into.photon_direction(),
            &state.pnd,
            state.temperature,
        )?;
        let n = state.extinction.nrows();
        if z.nrows() != n || z.ncols() != n {
            return Err(MonteCarloError::inconsistency(format!(
                "phase matrix is {}x{}, expected {}x{}",
                z.nrows(),
                z.ncols(),
                n,
                n
            )));
        }
        ensure_finite_matrix(&z, "phase matrix")?;
        Ok(z)
    }
}
