//! Propagation paths inside the cloud box.
//!
//! A [`PathStepper`] advances a ray one step at a time; [`trace_path`]
//! concatenates those steps until the stepper reports the cloud-box
//! boundary, and gives up with [`MonteCarloError::Divergence`] after
//! `max_steps` calls.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{CollaboratorError, MonteCarloError, MonteCarloResult};
use crate::physics::LineOfSight;

/// Fractional grid indices of a point relative to the atmospheric grids.
///
/// The integer part is the index of the grid cell, the fractional part the
/// relative distance towards the next grid point. `latitude` and
/// `longitude` stay at zero for 1-D and 2-D atmospheres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GridPosition {
    pub pressure: f64,
    pub latitude: f64,
    pub longitude: f64,
}

impl GridPosition {
    pub fn new(pressure: f64, latitude: f64, longitude: f64) -> Self {
        Self {
            pressure,
            latitude,
            longitude,
        }
    }

    /// Linear interpolation between two grid positions, `weight` in [0, 1].
    pub fn lerp(&self, other: &GridPosition, weight: f64) -> GridPosition {
        GridPosition {
            pressure: self.pressure + weight * (other.pressure - self.pressure),
            latitude: self.latitude + weight * (other.latitude - self.latitude),
            longitude: self.longitude + weight * (other.longitude - self.longitude),
        }
    }
}

/// One point of a propagation path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    /// Position in the atmosphere's coordinates. 2-D atmospheres leave `z` at zero.
    pub position: Vector3<f64>,
    pub grid_position: GridPosition,
    /// Cumulative path length from the first point of the path (m).
    pub distance: f64,
}

impl PathPoint {
    pub fn new(position: Vector3<f64>, grid_position: GridPosition, distance: f64) -> Self {
        Self {
            position,
            grid_position,
            distance,
        }
    }
}

/// What lies at the end of a propagation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Background {
    /// The path stops inside the cloud box and must be stepped further.
    Inside,
    /// The last point lies on the cloud-box boundary.
    CloudBoxBoundary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationPath {
    pub los: LineOfSight,
    pub points: Vec<PathPoint>,
    pub background: Background,
}

impl PropagationPath {
    /// Single-point path at `start`, not yet stepped.
    pub fn start(point: PathPoint, los: LineOfSight) -> Self {
        Self {
            los,
            points: vec![PathPoint { distance: 0.0, ..point }],
            background: Background::Inside,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Cumulative distances of all points.
    pub fn distances(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.distance).collect()
    }

    /// Total length of the path (distance of the last point).
    pub fn total_length(&self) -> f64 {
        self.points.last().map(|p| p.distance).unwrap_or(0.0)
    }

    pub fn first(&self) -> Option<&PathPoint> {
        self.points.first()
    }

    /// End point, where the photon leaves the cloud box.
    pub fn last(&self) -> Option<&PathPoint> {
        self.points.last()
    }

    /// Append a step whose first point coincides with our last point.
    ///
    /// The step's distances are relative to its own first point and are
    /// shifted onto this path's cumulative scale.
    fn extend_with(&mut self, step: PropagationPath) -> MonteCarloResult<()> {
        let offset = self.total_length();
        let mut points = step.points.into_iter();
        if points.next().is_none() {
            return Err(MonteCarloError::inconsistency("path stepper returned an empty step"));
        }
        for mut point in points {
            point.distance += offset;
            self.points.push(point);
        }
        self.background = step.background;
        Ok(())
    }

    /// Check that distances are finite and non-decreasing and start at zero.
    pub fn validate(&self) -> MonteCarloResult<()> {
        let first = self
            .points
            .first()
            .ok_or_else(|| MonteCarloError::inconsistency("propagation path has no points"))?;
        if first.distance != 0.0 {
            return Err(MonteCarloError::inconsistency(format!(
                "propagation path starts at distance {} instead of 0",
                first.distance
            )));
        }
        for (i, pair) in self.points.windows(2).enumerate() {
            let ds = pair[1].distance - pair[0].distance;
            if !ds.is_finite() || ds < 0.0 {
                return Err(MonteCarloError::inconsistency(format!(
                    "path segment {} has invalid length {}",
                    i, ds
                )));
            }
        }
        Ok(())
    }
}

/// Geometric ray stepper through the atmosphere grids.
///
/// `step` advances the ray by one step starting at `start` along `los`. The
/// returned path begins with `start` at distance zero and reports
/// [`Background::CloudBoxBoundary`] once its last point is on the boundary.
pub trait PathStepper {
    fn step(&self, start: &PathPoint, los: &LineOfSight) -> Result<PropagationPath, CollaboratorError>;
}

/// Trace a full path from `start` along `los` to the cloud-box boundary.
pub fn trace_path<S: PathStepper + ?Sized>(
    stepper: &S,
    start: &PathPoint,
    los: &LineOfSight,
    max_steps: usize,
) -> MonteCarloResult<PropagationPath> {
    let mut path = PropagationPath::start(start.clone(), *los);
    let mut steps = 0usize;

    while path.background == Background::Inside {
        steps += 1;
        if steps > max_steps {
            return Err(MonteCarloError::Divergence {
                steps,
                limit: max_steps,
            });
        }
        let tail = path
            .last()
            .cloned()
            .ok_or_else(|| MonteCarloError::inconsistency("propagation path has no points"))?;
        let tail = PathPoint { distance: 0.0, ..tail };
        let step = stepper.step(&tail, los)?;
        path.extend_with(step)?;
    }

    log::trace!("traced path with {} points in {} steps", path.len(), steps);
    path.validate()?;
    Ok(path)
}
