// Toy collaborators shared by the integration tests: a homogeneous cubic
// cloud box crossed by straight lines, isotropic or linearly anisotropic
// scattering and a uniform boundary radiance.

#![allow(dead_code)]

use cloudbox_mc::{
    Background, BoundaryRadiance, CollaboratorError, GridPosition, LineOfSight, OpticalProperties, OpticalState,
    PathPoint, PathStepper, PhaseFunction, PropagationPath, Sensor, Settings,
};
use nalgebra::{DMatrix, DVector, Vector3};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const FREQUENCY: f64 = 100e9;
pub const TEMPERATURE: f64 = 250.0;

/// Cube [0, side]^3 traversed in straight steps of at most `step_length`.
pub struct CubeStepper {
    pub side: f64,
    pub step_length: f64,
}

impl CubeStepper {
    fn distance_to_exit(&self, p: &Vector3<f64>, d: &Vector3<f64>) -> f64 {
        let mut exit = f64::INFINITY;
        for axis in 0..3 {
            if d[axis] > 1e-14 {
                exit = exit.min((self.side - p[axis]) / d[axis]);
            } else if d[axis] < -1e-14 {
                exit = exit.min(-p[axis] / d[axis]);
            }
        }
        exit.max(0.0)
    }
}

impl PathStepper for CubeStepper {
    fn step(&self, start: &PathPoint, los: &LineOfSight) -> Result<PropagationPath, CollaboratorError> {
        let d = los.unit_vector();
        let exit = self.distance_to_exit(&start.position, &d);
        let s = exit.min(self.step_length);
        let end = start.position + d * s;
        let background = if s >= exit {
            Background::CloudBoxBoundary
        } else {
            Background::Inside
        };
        Ok(PropagationPath {
            los: *los,
            points: vec![
                start.clone(),
                PathPoint::new(end, GridPosition::new(end.z, end.y, end.x), s),
            ],
            background,
        })
    }
}

/// Never reaches the boundary.
pub struct StuckStepper;

impl PathStepper for StuckStepper {
    fn step(&self, start: &PathPoint, los: &LineOfSight) -> Result<PropagationPath, CollaboratorError> {
        Ok(PropagationPath {
            los: *los,
            points: vec![start.clone(), start.clone()],
            background: Background::Inside,
        })
    }
}

/// Same optical state everywhere, one particle type with number density 1.
pub struct Homogeneous {
    pub extinction: f64,
    pub absorption: f64,
    pub stokes_dim: usize,
}

impl OpticalProperties for Homogeneous {
    fn optical_state(&self, _grid: &GridPosition, _frequency: f64) -> Result<OpticalState, CollaboratorError> {
        Ok(OpticalState::scalar(
            self.stokes_dim,
            self.extinction,
            self.absorption,
            DVector::from_element(1, 1.0),
            TEMPERATURE,
        ))
    }
}

pub struct FailingOptics;

impl OpticalProperties for FailingOptics {
    fn optical_state(&self, grid: &GridPosition, _frequency: f64) -> Result<OpticalState, CollaboratorError> {
        Err(format!("no optical data at pressure index {}", grid.pressure).into())
    }
}

/// Unpolarized phase function Z[0,0] = C_sca (1 + g cos Θ) / 4π per unit number density.
pub struct LinearPhase {
    pub scattering: f64,
    pub asymmetry: f64,
    pub stokes_dim: usize,
    pub rejection: bool,
}

impl LinearPhase {
    pub fn isotropic(scattering: f64, stokes_dim: usize) -> Self {
        Self {
            scattering,
            asymmetry: 0.0,
            stokes_dim,
            rejection: false,
        }
    }
}

impl PhaseFunction for LinearPhase {
    fn phase_matrix(
        &self,
        incoming: &LineOfSight,
        outgoing: &LineOfSight,
        pnd: &DVector<f64>,
        _temperature: f64,
    ) -> Result<DMatrix<f64>, CollaboratorError> {
        let mu = incoming.cos_angle_to(outgoing);
        let mut z = DMatrix::zeros(self.stokes_dim, self.stokes_dim);
        z[(0, 0)] = pnd[0] * self.scattering * (1.0 + self.asymmetry * mu) / (4.0 * std::f64::consts::PI);
        Ok(z)
    }

    fn peak_phase_function(&self) -> Option<DVector<f64>> {
        self.rejection.then(|| {
            DVector::from_element(
                1,
                self.scattering * (1.0 + self.asymmetry.abs()) / (4.0 * std::f64::consts::PI),
            )
        })
    }
}

pub struct FailingPhase;

impl PhaseFunction for FailingPhase {
    fn phase_matrix(
        &self,
        _incoming: &LineOfSight,
        _outgoing: &LineOfSight,
        _pnd: &DVector<f64>,
        _temperature: f64,
    ) -> Result<DMatrix<f64>, CollaboratorError> {
        Err("phase matrix table not loaded".into())
    }
}

/// Wraps a phase function, counts its evaluations and fails every call after `limit`.
pub struct CountingPhase {
    pub inner: LinearPhase,
    pub limit: Option<usize>,
    calls: AtomicUsize,
}

impl CountingPhase {
    pub fn new(inner: LinearPhase, limit: Option<usize>) -> Self {
        Self {
            inner,
            limit,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PhaseFunction for CountingPhase {
    fn phase_matrix(
        &self,
        incoming: &LineOfSight,
        outgoing: &LineOfSight,
        pnd: &DVector<f64>,
        temperature: f64,
    ) -> Result<DMatrix<f64>, CollaboratorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.limit {
            Some(limit) if call > limit => Err(format!("phase matrix call {} over limit {}", call, limit).into()),
            _ => self.inner.phase_matrix(incoming, outgoing, pnd, temperature),
        }
    }

    fn peak_phase_function(&self) -> Option<DVector<f64>> {
        self.inner.peak_phase_function()
    }
}

/// Unpolarized radiance `radiance` entering from every direction.
pub struct UniformBoundary {
    pub radiance: f64,
    pub stokes_dim: usize,
}

impl BoundaryRadiance for UniformBoundary {
    fn incoming(&self, _position: &Vector3<f64>, _los: &LineOfSight) -> Result<DVector<f64>, CollaboratorError> {
        let mut stokes = DVector::zeros(self.stokes_dim);
        stokes[0] = self.radiance;
        Ok(stokes)
    }
}

/// Sensor at the centre of the top face looking straight down.
pub fn top_sensor(side: f64) -> Sensor {
    let position = Vector3::new(0.5 * side, 0.5 * side, side);
    Sensor::new(
        position,
        GridPosition::new(position.z, position.y, position.x),
        LineOfSight::new(180.0, 0.0),
    )
}

pub fn settings(photons: u64, stokes_dim: usize, seed: i64) -> Settings {
    Settings {
        photons,
        batches: 8,
        seed,
        stokes_dim,
        frequency: FREQUENCY,
        ..Default::default()
    }
}

pub fn assert_close(actual: f64, expected: f64, rel: f64) {
    let tol = rel * expected.abs().max(f64::MIN_POSITIVE);
    assert!(
        (actual - expected).abs() <= tol,
        "expected {:e}, got {:e} (relative tolerance {})",
        expected,
        actual,
        rel
    );
}
