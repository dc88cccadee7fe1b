use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::diagnostics::RecordedPath;
use crate::physics::LineOfSight;

/// State of one reversed photon history.
#[derive(Debug, Clone)]
pub struct Photon {
    pub index: u64,
    /// Importance weight Q accumulated over scattering events
    pub weight: DMatrix<f64>,
    pub scattering_order: u32,
    /// Current viewing direction; the photon travels the opposite way
    pub los: LineOfSight,
}

impl Photon {
    /// Fresh photon: identity weight, scattering order zero.
    pub fn new(index: u64, los: LineOfSight, stokes_dim: usize) -> Self {
        Self {
            index,
            weight: DMatrix::identity(stokes_dim, stokes_dim),
            scattering_order: 0,
            los,
        }
    }

    /// Update the weight for a scattering event, `Q <- Q T Z / divisor`,
    /// and continue along `new_los`.
    pub fn scatter(&mut self, transmission: &DMatrix<f64>, phase_matrix: &DMatrix<f64>, divisor: f64, new_los: LineOfSight) {
        self.weight = &self.weight * transmission * phase_matrix / divisor;
        self.scattering_order += 1;
        self.los = new_los;
    }

    /// End the history with `stokes` as its contribution.
    pub fn terminate(self, stokes: DVector<f64>, termination: Termination) -> PhotonOutcome {
        PhotonOutcome {
            index: self.index,
            stokes,
            scattering_order: self.scattering_order,
            termination,
            rejection_attempts: 0,
            paths: Vec::new(),
        }
    }
}

/// How a photon history ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Termination {
    /// Thermal emission at an absorption event
    Emission,
    /// The photon left the cloud box and picked up the boundary radiance
    BoundaryExit,
    /// No extinction along the line of sight
    Transparent,
}

/// Contribution of one photon.
#[derive(Debug, Clone)]
pub struct PhotonOutcome {
    pub index: u64,
    pub stokes: DVector<f64>,
    pub scattering_order: u32,
    pub termination: Termination,
    /// Direction proposals drawn over all scattering events
    pub rejection_attempts: u64,
    /// Propagation paths traced after scattering events, when recording is enabled
    pub paths: Vec<RecordedPath>,
}
