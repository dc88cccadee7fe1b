//! Optical description of the cloud box as seen by the photon tracer.
//!
//! The tracer never looks at atmospheric fields or scattering databases
//! directly; it asks three collaborators for what it needs:
//!
//! * [`OpticalProperties`]: bulk extinction matrix, absorption vector,
//!   particle number densities and temperature at a grid position.
//! * [`PhaseFunction`]: the bulk single-scattering phase matrix for a pair of
//!   propagation directions, plus the per-particle-type peak of its (0,0)
//!   element when rejection sampling is needed.
//! * [`BoundaryRadiance`]: the Stokes vector entering the box at the
//!   position where a reversed photon path leaves it.
//!
//! All three are bundled with the [`PathStepper`] in a [`Scene`] that is passed
//! by reference through the simulation.

use nalgebra::{DMatrix, DVector, Vector3};

use crate::error::{CollaboratorError, MonteCarloError, MonteCarloResult};
use crate::linalg::{ensure_finite_matrix, ensure_finite_vector};
use crate::path::{GridPosition, PathStepper};
use crate::physics::LineOfSight;

/// Optical properties of the medium at one point.
#[derive(Debug, Clone, PartialEq)]
pub struct OpticalState {
    /// Bulk extinction matrix K (stokes_dim x stokes_dim), m^-1
    pub extinction: DMatrix<f64>,
    /// Bulk absorption coefficient vector K_abs (stokes_dim), m^-1
    pub absorption: DVector<f64>,
    /// Particle number density per particle type, m^-3
    pub pnd: DVector<f64>,
    /// Temperature in K
    pub temperature: f64,
}

impl OpticalState {
    /// Unpolarized medium: K = k·I, K_abs = [k_abs, 0, ...].
    pub fn scalar(stokes_dim: usize, extinction: f64, absorption: f64, pnd: DVector<f64>, temperature: f64) -> Self {
        let mut abs_vec = DVector::zeros(stokes_dim);
        abs_vec[0] = absorption;
        Self {
            extinction: DMatrix::identity(stokes_dim, stokes_dim) * extinction,
            absorption: abs_vec,
            pnd,
            temperature,
        }
    }

    /// Scattering coefficient K[0,0] - K_abs[0].
    pub fn scattering_coefficient(&self) -> f64 {
        self.extinction[(0, 0)] - self.absorption[0]
    }

    /// Single-scattering albedo `1 - K_abs[0] / K[0,0]`, clamped to [0, 1].
    ///
    /// A point without extinction has albedo zero.
    pub fn albedo(&self) -> f64 {
        let k11 = self.extinction[(0, 0)];
        if k11 <= 0.0 {
            return 0.0;
        }
        (1.0 - self.absorption[0] / k11).clamp(0.0, 1.0)
    }

    /// Check shapes against the Stokes dimension and reject NaN values.
    pub fn validate(&self, stokes_dim: usize) -> MonteCarloResult<()> {
        if self.extinction.nrows() != stokes_dim || self.extinction.ncols() != stokes_dim {
            return Err(MonteCarloError::inconsistency(format!(
                "extinction matrix is {}x{}, expected {}x{}",
                self.extinction.nrows(),
                self.extinction.ncols(),
                stokes_dim,
                stokes_dim
            )));
        }
        if self.absorption.len() != stokes_dim {
            return Err(MonteCarloError::inconsistency(format!(
                "absorption vector has {} elements, expected {}",
                self.absorption.len(),
                stokes_dim
            )));
        }
        ensure_finite_matrix(&self.extinction, "extinction matrix")?;
        ensure_finite_vector(&self.absorption, "absorption vector")?;
        ensure_finite_vector(&self.pnd, "particle number density")?;
        if !self.temperature.is_finite() {
            return Err(MonteCarloError::inconsistency("temperature is not finite"));
        }
        Ok(())
    }

    /// Linear interpolation between two states, `weight` in [0, 1].
    pub fn lerp(&self, other: &OpticalState, weight: f64) -> OpticalState {
        OpticalState {
            extinction: &self.extinction + (&other.extinction - &self.extinction) * weight,
            absorption: &self.absorption + (&other.absorption - &self.absorption) * weight,
            pnd: &self.pnd + (&other.pnd - &self.pnd) * weight,
            temperature: self.temperature + weight * (other.temperature - self.temperature),
        }
    }
}

/// Provider of bulk optical properties inside the cloud box.
pub trait OpticalProperties {
    fn optical_state(&self, grid_position: &GridPosition, frequency: f64) -> Result<OpticalState, CollaboratorError>;
}

/// Provider of the bulk single-scattering phase matrix.
///
/// Directions are photon propagation directions. The returned matrix is not
/// normalized: integrated over all incoming directions its (0,0) element
/// gives the scattering coefficient.
pub trait PhaseFunction {
    fn phase_matrix(
        &self,
        incoming: &LineOfSight,
        outgoing: &LineOfSight,
        pnd: &DVector<f64>,
        temperature: f64,
    ) -> Result<DMatrix<f64>, CollaboratorError>;

    /// Maximum of Z[0,0] per particle type (per unit number density).
    ///
    /// Returning `Some` marks the phase function as strongly peaked and
    /// switches new directions to rejection sampling.
    fn peak_phase_function(&self) -> Option<DVector<f64>> {
        None
    }
}

/// Incoming radiance at the cloud-box boundary.
pub trait BoundaryRadiance {
    /// Stokes vector arriving at `position` from the direction `los` looks into.
    fn incoming(&self, position: &Vector3<f64>, los: &LineOfSight) -> Result<DVector<f64>, CollaboratorError>;
}

/// The collaborators one simulation runs against.
#[derive(Clone, Copy)]
pub struct Scene<'a> {
    pub stepper: &'a (dyn PathStepper + Sync),
    pub optics: &'a (dyn OpticalProperties + Sync),
    pub phase: &'a (dyn PhaseFunction + Sync),
    pub boundary: &'a (dyn BoundaryRadiance + Sync),
}

impl<'a> Scene<'a> {
    pub fn new(
        stepper: &'a (dyn PathStepper + Sync),
        optics: &'a (dyn OpticalProperties + Sync),
        phase: &'a (dyn PhaseFunction + Sync),
        boundary: &'a (dyn BoundaryRadiance + Sync),
    ) -> Self {
        Self {
            stepper,
            optics,
            phase,
            boundary,
        }
    }
}
