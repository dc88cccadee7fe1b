//! Reversed photon histories.
//!
//! A photon starts at the sensor looking along the line of sight. At every
//! step a path length is sampled on the current propagation path and the
//! photon either
//!
//! * leaves the cloud box and collects the boundary radiance,
//!   `Q T_total I_boundary / P`,
//! * is absorbed and collects thermal emission,
//!   `Q T K_abs B(ν, T) / (g (1 - a))`,
//! * or scatters, `Q <- Q T Z / (g g_dir a)`, after which a new path is
//!   traced from the scattering point along the sampled direction.
//!
//! The first interaction is forced onto the line of sight; the transmitted
//! boundary radiance along it is added once per run by the driver.

use nalgebra::DVector;
use rand::Rng;

use crate::diagnostics::RecordedPath;
use crate::error::{MonteCarloError, MonteCarloResult};
use crate::evolution::EvolutionChain;
use crate::interpolate::interpolate;
use crate::linalg::ensure_finite_vector;
use crate::medium::Scene;
use crate::path::{trace_path, PropagationPath};
use crate::pathlength::{sample_forced, sample_free, PathLengthSample};
use crate::photon::{Photon, PhotonOutcome, Termination};
use crate::physics::planck;
use crate::scatter::DirectionSampler;
use crate::settings::Settings;

/// Traces photon histories for one line of sight.
pub struct PhotonSimulator<'a> {
    scene: Scene<'a>,
    settings: &'a Settings,
    directions: DirectionSampler<'a>,
    los_path: &'a PropagationPath,
    los_chain: &'a EvolutionChain,
    record_paths: bool,
}

impl<'a> PhotonSimulator<'a> {
    /// `los_path` and `los_chain` describe the viewing path from the sensor
    /// to the far side of the cloud box and are shared by all photons.
    pub fn new(
        scene: Scene<'a>,
        settings: &'a Settings,
        los_path: &'a PropagationPath,
        los_chain: &'a EvolutionChain,
    ) -> Self {
        Self {
            scene,
            settings,
            directions: DirectionSampler::new(scene.phase, settings.rejection_warn_threshold),
            los_path,
            los_chain,
            record_paths: settings.record_paths.is_some(),
        }
    }

    pub fn uses_rejection_sampling(&self) -> bool {
        self.directions.uses_rejection()
    }

    /// Trace photon `index` to termination.
    pub fn simulate<R: Rng + ?Sized>(&self, index: u64, rng: &mut R) -> MonteCarloResult<PhotonOutcome> {
        let stokes_dim = self.settings.stokes_dim;
        let mut photon = Photon::new(index, self.los_path.los, stokes_dim);
        let mut attempts = 0u64;
        let mut recorded = Vec::new();
        // Path traced after the latest scattering event; None while on the line of sight
        let mut traced: Option<(PropagationPath, EvolutionChain)> = None;

        loop {
            let (path, chain) = match &traced {
                Some((path, chain)) => (path, chain),
                None => (self.los_path, self.los_chain),
            };
            let sample = if photon.scattering_order == 0 {
                sample_forced(chain, rng)
            } else {
                sample_free(chain, rng)
            };

            match sample {
                PathLengthSample::Transparent => {
                    let outcome = photon.terminate(DVector::zeros(stokes_dim), Termination::Transparent);
                    return Ok(self.finish(outcome, attempts, recorded));
                }
                PathLengthSample::Exit { probability } => {
                    let end = path
                        .last()
                        .ok_or_else(|| MonteCarloError::inconsistency("propagation path has no points"))?;
                    let incoming = self.scene.boundary.incoming(&end.position, &path.los)?;
                    check_stokes(&incoming, stokes_dim, "boundary radiance")?;
                    let stokes = &photon.weight * chain.total_transmission() * incoming / probability;
                    let outcome = photon.terminate(stokes, Termination::BoundaryExit);
                    return Ok(self.finish(outcome, attempts, recorded));
                }
                PathLengthSample::Interaction { distance, density } => {
                    let point = interpolate(path, chain, distance)?;
                    let albedo = point.state.albedo();

                    if rng.gen::<f64>() >= albedo {
                        let divisor = checked_divisor(density * (1.0 - albedo))?;
                        let b = planck(self.settings.frequency, point.state.temperature);
                        let stokes = &photon.weight * &point.transmission * &point.state.absorption * (b / divisor);
                        let outcome = photon.terminate(stokes, Termination::Emission);
                        return Ok(self.finish(outcome, attempts, recorded));
                    }

                    let direction = self.directions.sample(&photon.los, &point.state, rng)?;
                    attempts += direction.attempts;
                    let divisor = checked_divisor(density * direction.density * albedo)?;
                    photon.scatter(&point.transmission, &direction.phase_matrix, divisor, direction.los);

                    let new_path = trace_path(
                        self.scene.stepper,
                        &point.path_point(),
                        &direction.los,
                        self.settings.max_path_steps,
                    )?;
                    let new_chain = EvolutionChain::from_path(
                        &new_path,
                        self.scene.optics,
                        self.settings.frequency,
                        stokes_dim,
                    )?;
                    if self.record_paths {
                        recorded.push(RecordedPath {
                            photon: index,
                            scattering_order: photon.scattering_order,
                            path: new_path.clone(),
                        });
                    }
                    traced = Some((new_path, new_chain));
                }
            }
        }
    }

    fn finish(&self, mut outcome: PhotonOutcome, attempts: u64, paths: Vec<RecordedPath>) -> PhotonOutcome {
        log::debug!(
            "photon {}: {:?} after {} scattering events",
            outcome.index,
            outcome.termination,
            outcome.scattering_order
        );
        outcome.rejection_attempts = attempts;
        outcome.paths = paths;
        outcome
    }
}

/// Weight divisor of an event; underflowing densities cannot be divided by.
fn checked_divisor(value: f64) -> MonteCarloResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(MonteCarloError::inconsistency(format!(
            "sampling probability {} is not positive",
            value
        )))
    }
}

fn check_stokes(v: &DVector<f64>, stokes_dim: usize, what: &str) -> MonteCarloResult<()> {
    if v.len() != stokes_dim {
        return Err(MonteCarloError::inconsistency(format!(
            "{} has {} Stokes elements, expected {}",
            what,
            v.len(),
            stokes_dim
        )));
    }
    ensure_finite_vector(v, what)
}
