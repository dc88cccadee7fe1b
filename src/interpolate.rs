//! Quantities at an arbitrary distance along a propagation path.

use nalgebra::{DMatrix, Vector3};

use crate::error::{MonteCarloError, MonteCarloResult};
use crate::evolution::EvolutionChain;
use crate::linalg::matrix_exp;
use crate::medium::OpticalState;
use crate::path::{GridPosition, PathPoint, PropagationPath};
use crate::utilities::bracket;

/// Everything the photon tracer needs at an interaction point.
#[derive(Debug, Clone)]
pub struct InteractionPoint {
    /// Transmission from the path start to the point
    pub transmission: DMatrix<f64>,
    /// Optical state interpolated between the bracketing path points
    pub state: OpticalState,
    pub position: Vector3<f64>,
    pub grid_position: GridPosition,
    /// Index of the path segment holding the point
    pub segment: usize,
    pub distance: f64,
}

impl InteractionPoint {
    /// Path point from which a new propagation path is traced.
    pub fn path_point(&self) -> PathPoint {
        PathPoint::new(self.position, self.grid_position, 0.0)
    }
}

/// Interpolate transmission and medium properties at `distance` along `path`.
///
/// The transmission is the cumulative operator at the start of the
/// bracketing segment times the segment's operator evaluated over the
/// residual length, `T_i exp(-K̄_i (s - s_i))`. Extinction, absorption,
/// particle number densities, temperature, position and grid position are
/// interpolated linearly.
pub fn interpolate(path: &PropagationPath, chain: &EvolutionChain, distance: f64) -> MonteCarloResult<InteractionPoint> {
    if path.len() != chain.len() {
        return Err(MonteCarloError::inconsistency(format!(
            "path has {} points but its evolution chain {}",
            path.len(),
            chain.len()
        )));
    }
    if !distance.is_finite() {
        return Err(MonteCarloError::inconsistency(format!(
            "interaction distance {} is not finite",
            distance
        )));
    }

    if chain.len() < 2 {
        // Degenerate single-point path
        let point = &path.points[0];
        return Ok(InteractionPoint {
            transmission: chain.cumulative()[0].clone(),
            state: chain.states()[0].clone(),
            position: point.position,
            grid_position: point.grid_position,
            segment: 0,
            distance: 0.0,
        });
    }

    let distances = chain.distances();
    let (i, weight) = bracket(distances, distance);
    let residual = (distance - distances[i]).clamp(0.0, distances[i + 1] - distances[i]);

    let transmission = if residual > 0.0 {
        &chain.cumulative()[i] * matrix_exp(&(&chain.mean_extinction()[i] * -residual))?
    } else {
        chain.cumulative()[i].clone()
    };

    let (a, b) = (&path.points[i], &path.points[i + 1]);
    let states = chain.states();
    Ok(InteractionPoint {
        transmission,
        state: states[i].lerp(&states[i + 1], weight),
        position: a.position + (b.position - a.position) * weight,
        grid_position: a.grid_position.lerp(&b.grid_position, weight),
        segment: i,
        distance: distances[i] + residual,
    })
}
